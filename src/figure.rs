//! A recorded figure: the canvas geometry plus the ordered list of drawing
//! calls a plotting library made. Replaying it through a [`Backend`] lets
//! any figure be rendered without the library that produced it.

use std::path::Path as FsPath;

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, QuadMesh, RasterImage};
use crate::color::Rgba;
use crate::error::Result;
use crate::gc::GraphicsContext;
use crate::geometry::{Affine, Path};
use crate::renderer::Metadata;
use crate::text::{FontProperties, TextAnchor};

fn default_dpi() -> f64 {
    72.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    /// Size in inches.
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_dpi")]
    pub dpi: f64,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub commands: Vec<DrawCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Path {
        #[serde(default)]
        gc: GraphicsContext,
        path: Path,
        #[serde(default)]
        transform: Affine,
        #[serde(default)]
        face: Option<Rgba>,
    },
    Markers {
        #[serde(default)]
        gc: GraphicsContext,
        marker: Path,
        #[serde(default)]
        marker_transform: Affine,
        path: Path,
        #[serde(default)]
        transform: Affine,
        #[serde(default)]
        face: Option<Rgba>,
    },
    Image {
        #[serde(default)]
        gc: GraphicsContext,
        x: f64,
        y: f64,
        width: u32,
        height: u32,
        /// RGBA8 rows, bottom row first.
        data: Vec<u8>,
        #[serde(default)]
        transform: Option<Affine>,
    },
    Text {
        #[serde(default)]
        gc: GraphicsContext,
        x: f64,
        y: f64,
        text: String,
        #[serde(default)]
        prop: FontProperties,
        #[serde(default)]
        angle: f64,
        #[serde(default)]
        ismath: bool,
        #[serde(default)]
        anchor: Option<TextAnchor>,
    },
    QuadMesh {
        #[serde(default)]
        gc: GraphicsContext,
        #[serde(default)]
        master_transform: Affine,
        #[serde(flatten)]
        mesh: QuadMesh,
    },
}

impl Figure {
    pub fn new(width: f64, height: f64, dpi: f64) -> Self {
        Self {
            width,
            height,
            dpi,
            metadata: Metadata::default(),
            commands: Vec::new(),
        }
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_path(path: &FsPath) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    /// Replay every command in order. Stops at the first failing call.
    pub fn draw(&self, backend: &mut dyn Backend) -> Result<()> {
        for (idx, command) in self.commands.iter().enumerate() {
            log::trace!("replaying command {idx}");
            command.draw(backend)?;
        }
        Ok(())
    }
}

impl DrawCommand {
    pub fn draw(&self, backend: &mut dyn Backend) -> Result<()> {
        match self {
            DrawCommand::Path {
                gc,
                path,
                transform,
                face,
            } => backend.draw_path(gc, path, transform, *face),
            DrawCommand::Markers {
                gc,
                marker,
                marker_transform,
                path,
                transform,
                face,
            } => backend.draw_markers(gc, marker, marker_transform, path, transform, *face),
            DrawCommand::Image {
                gc,
                x,
                y,
                width,
                height,
                data,
                transform,
            } => {
                let image = RasterImage::new(*width, *height, data.clone())?;
                backend.draw_image(gc, *x, *y, &image, transform.as_ref())
            }
            DrawCommand::Text {
                gc,
                x,
                y,
                text,
                prop,
                angle,
                ismath,
                anchor,
            } => backend.draw_text(gc, *x, *y, text, prop, *angle, *ismath, anchor.as_ref()),
            DrawCommand::QuadMesh {
                gc,
                master_transform,
                mesh,
            } => backend.draw_quad_mesh(gc, master_transform, mesh),
        }
    }
}
