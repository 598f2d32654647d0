//! The callback interface a plotting library drives when it draws a figure.

use serde::{Deserialize, Serialize};

use crate::color::Rgba;
use crate::error::Result;
use crate::gc::GraphicsContext;
use crate::geometry::{Affine, Path, Point};
use crate::metrics::{TextExtent, measure_text};
use crate::text::{FontProperties, TextAnchor};

/// Row-major RGBA8 pixels, first row at the bottom as the host stores them.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RasterImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(crate::error::Error::MalformedImage(format!(
                "{width}x{height} RGBA image needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Grid of `(mesh_height + 1) x (mesh_width + 1)` vertices in data units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadMesh {
    pub mesh_width: usize,
    pub mesh_height: usize,
    pub coordinates: Vec<Point>,
    #[serde(default)]
    pub offsets: Vec<Point>,
    #[serde(default)]
    pub offset_transform: Affine,
    #[serde(default)]
    pub facecolors: Vec<Rgba>,
    #[serde(default)]
    pub edgecolors: Vec<Rgba>,
    #[serde(default)]
    pub antialiased: bool,
}

impl QuadMesh {
    pub fn vertex(&self, row: usize, col: usize) -> Point {
        self.coordinates[row * (self.mesh_width + 1) + col]
    }
}

/// Drawing callbacks. Coordinates are display pixels with the origin at the
/// bottom-left corner of the figure; lengths inside a [`GraphicsContext`]
/// are points.
pub trait Backend {
    fn draw_path(
        &mut self,
        gc: &GraphicsContext,
        path: &Path,
        transform: &Affine,
        face: Option<Rgba>,
    ) -> Result<()>;

    /// Stamp `marker` (in points, relative to the vertex) at every vertex of
    /// `path`.
    fn draw_markers(
        &mut self,
        gc: &GraphicsContext,
        marker: &Path,
        marker_transform: &Affine,
        path: &Path,
        transform: &Affine,
        face: Option<Rgba>,
    ) -> Result<()> {
        let points: Vec<Point> = path.vertices().map(|p| transform.apply(p)).collect();
        for point in points {
            if !point.is_finite() {
                continue;
            }
            let placed = marker_transform.then(&Affine::translate(point.x, point.y));
            self.draw_path(gc, marker, &placed, face)?;
        }
        Ok(())
    }

    /// Draw `image` with its lower-left corner at `(x, y)`. Without a
    /// transform the image keeps its pixel size; with one, the transform
    /// maps the unit square onto the image extent, offset by `(x, y)`.
    fn draw_image(
        &mut self,
        gc: &GraphicsContext,
        x: f64,
        y: f64,
        image: &RasterImage,
        transform: Option<&Affine>,
    ) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    fn draw_text(
        &mut self,
        gc: &GraphicsContext,
        x: f64,
        y: f64,
        text: &str,
        prop: &FontProperties,
        angle: f64,
        ismath: bool,
        anchor: Option<&TextAnchor>,
    ) -> Result<()>;

    fn draw_quad_mesh(
        &mut self,
        gc: &GraphicsContext,
        master_transform: &Affine,
        mesh: &QuadMesh,
    ) -> Result<()>;

    fn get_image_magnification(&self) -> f64 {
        1.0
    }

    fn option_scale_image(&self) -> bool {
        true
    }

    fn points_to_pixels(&self, points: f64) -> f64 {
        points
    }

    fn new_gc(&self) -> GraphicsContext {
        GraphicsContext::default()
    }

    fn get_text_width_height_descent(&self, text: &str, prop: &FontProperties) -> TextExtent {
        let extent = measure_text(text, prop);
        TextExtent {
            width: self.points_to_pixels(extent.width),
            height: self.points_to_pixels(extent.height),
            descent: self.points_to_pixels(extent.descent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PathSegment;

    #[derive(Default)]
    struct Recorder {
        transforms: Vec<Affine>,
    }

    impl Backend for Recorder {
        fn draw_path(&mut self, _: &GraphicsContext, _: &Path, transform: &Affine, _: Option<Rgba>) -> Result<()> {
            self.transforms.push(*transform);
            Ok(())
        }

        fn draw_image(&mut self, _: &GraphicsContext, _: f64, _: f64, _: &RasterImage, _: Option<&Affine>) -> Result<()> {
            Ok(())
        }

        fn draw_text(
            &mut self,
            _: &GraphicsContext,
            _: f64,
            _: f64,
            _: &str,
            _: &FontProperties,
            _: f64,
            _: bool,
            _: Option<&TextAnchor>,
        ) -> Result<()> {
            Ok(())
        }

        fn draw_quad_mesh(&mut self, _: &GraphicsContext, _: &Affine, _: &QuadMesh) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn markers_are_stamped_at_each_vertex() {
        let mut recorder = Recorder::default();
        let marker = Path::rect(-1.0, -1.0, 2.0, 2.0);
        let path = Path::new(vec![
            PathSegment::MoveTo { to: Point::new(1.0, 1.0) },
            PathSegment::LineTo { to: Point::new(f64::NAN, 0.0) },
            PathSegment::LineTo { to: Point::new(2.0, 3.0) },
            PathSegment::Close,
        ]);
        recorder
            .draw_markers(
                &GraphicsContext::default(),
                &marker,
                &Affine::IDENTITY,
                &path,
                &Affine::scale(10.0, 10.0),
                None,
            )
            .unwrap();
        assert_eq!(recorder.transforms, vec![Affine::translate(10.0, 10.0), Affine::translate(20.0, 30.0)]);
    }

    #[test]
    fn image_size_is_validated() {
        assert!(RasterImage::new(2, 2, vec![0; 16]).is_ok());
        assert!(RasterImage::new(2, 2, vec![0; 15]).is_err());
        assert!(RasterImage::new(0, 3, Vec::new()).unwrap().is_empty());
    }
}
