use std::io::Write;
use std::path::{Path as FsPath, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, QuadMesh, RasterImage};
use crate::color::Rgba;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gc::GraphicsContext;
use crate::geometry::{Affine, Bbox, Path, PathSegment, Point};
use crate::text::{self, FontProperties, FontStyle, FontWeight, TextAnchor};
use crate::typst::{Call, Expr, Writer, format_number, quote};

const PROLOGUE: &str = include_str!("prologue.typ");

/// Document metadata. When any field is set the page geometry and the
/// document properties are written too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    /// `YYYY-MM-DD` or an ISO 8601 date-time.
    pub date: Option<String>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author.is_none() && self.date.is_none()
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(datetime) = value.parse::<NaiveDateTime>() {
        return Ok(datetime.date());
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.date_naive());
    }
    Err(Error::InvalidDate(value.to_string()))
}

/// Generation time, pinned by `SOURCE_DATE_EPOCH` when it is set.
pub fn default_timestamp() -> NaiveDateTime {
    let pinned = std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|datetime| datetime.naive_utc());
    let now = pinned.unwrap_or_else(|| chrono::Local::now().naive_local());
    now.with_nanosecond(0).unwrap_or(now)
}

#[derive(Debug, Clone)]
enum Item {
    Plain(Expr),
    Clipped { rect: Bbox, exprs: Vec<Expr> },
}

/// Collects drawing calls as Typst expressions and writes them as one
/// fixed-size block.
#[derive(Debug)]
pub struct TypstRenderer {
    config: Config,
    /// Figure size in inches.
    width: f64,
    height: f64,
    dpi: f64,
    image_dpi: f64,
    path: Option<PathBuf>,
    metadata: Metadata,
    timestamp: NaiveDateTime,
    image_counter: usize,
    items: Vec<Item>,
}

impl TypstRenderer {
    pub fn new(width: f64, height: f64, dpi: f64, config: Config) -> Self {
        Self {
            config,
            width,
            height,
            dpi,
            image_dpi: 72.0,
            path: None,
            metadata: Metadata::default(),
            timestamp: default_timestamp(),
            image_counter: 0,
            items: Vec::new(),
        }
    }

    /// Target file; detached images are written next to it.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_image_dpi(mut self, image_dpi: f64) -> Self {
        self.image_dpi = image_dpi;
        self
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Prologue with helpers, the user preamble and, with metadata, the
    /// document and page setup.
    pub fn begin<W: Write>(&self, out: &mut W) -> Result<()> {
        let stamp = self.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string();
        let text = PROLOGUE
            .replace("{{ date }}", &stamp)
            .replace("{{ preamble }}", &self.config.preamble);
        out.write_all(text.as_bytes())?;
        out.write_all(b"\n")?;

        if self.metadata.is_empty() {
            return Ok(());
        }
        let title = self
            .metadata
            .title
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(quote)
            .unwrap_or_else(|| "none".to_string());
        let author = self
            .metadata
            .author
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(quote)
            .unwrap_or_else(|| "()".to_string());
        let date = match self.metadata.date.as_deref() {
            Some(value) => parse_date(value)?,
            None => self.timestamp.date(),
        };
        writeln!(
            out,
            "#set document(title: {title}, author: {author}, date: datetime(year: {}, month: {}, day: {}))",
            date.format("%Y"),
            date.format("%-m"),
            date.format("%-d"),
        )?;
        writeln!(
            out,
            "#set page(width: {}in, height: {}in, margin: 0pt)",
            self.number(self.width),
            self.number(self.height),
        )?;
        writeln!(out)?;
        Ok(())
    }

    /// Everything drawn so far as `#block({...}, ...)`.
    pub fn finish<W: Write>(&self, out: &mut W) -> Result<()> {
        let block = Call::new("block")
            .arg(self.main_block())
            .kwarg("spacing", Expr::pt(0.0))
            .kwarg("above", Expr::pt(0.0))
            .kwarg("below", Expr::pt(0.0))
            .kwarg("width", Expr::inches(self.width))
            .kwarg("height", Expr::inches(self.height));
        let mut writer = Writer::new(self.config.precision);
        writer.write("#");
        Expr::from(block).write_to(&mut writer);
        writer.newline();
        out.write_all(writer.as_str().as_bytes())?;
        Ok(())
    }

    pub fn main_block(&self) -> Expr {
        let exprs = self
            .items
            .iter()
            .map(|item| match item {
                Item::Plain(expr) => expr.clone(),
                Item::Clipped { rect, exprs } => self.clip_group(rect, exprs),
            })
            .collect();
        Expr::Block(exprs)
    }

    /// Number of top-level items in the main block.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn number(&self, value: f64) -> String {
        format_number(value, self.config.precision)
    }

    fn point(&self, p: Point) -> Expr {
        Expr::point(p.x / self.dpi, self.height - p.y / self.dpi)
    }

    fn push(&mut self, gc: &GraphicsContext, expr: Expr) {
        let expr = match gc.url.as_deref() {
            Some(url) => Call::new("link").arg(Expr::str(url)).arg(expr).into(),
            None => expr,
        };
        let Some(rect) = gc.cliprect else {
            self.items.push(Item::Plain(expr));
            return;
        };
        if let Some(Item::Clipped { rect: last, exprs }) = self.items.last_mut()
            && *last == rect
        {
            exprs.push(expr);
            return;
        }
        self.items.push(Item::Clipped {
            rect,
            exprs: vec![expr],
        });
    }

    fn clip_group(&self, rect: &Bbox, exprs: &[Expr]) -> Expr {
        let x0 = rect.left() / self.dpi;
        let y0 = self.height - rect.top() / self.dpi;
        let shifted = Call::new("place")
            .arg(Expr::Block(exprs.to_vec()))
            .kwarg("dx", Expr::inches(-x0))
            .kwarg("dy", Expr::inches(-y0));
        let clip = Call::new("box")
            .arg(shifted)
            .kwarg("width", Expr::inches(rect.width() / self.dpi))
            .kwarg("height", Expr::inches(rect.height() / self.dpi))
            .kwarg("clip", true);
        Call::new("place")
            .arg(clip)
            .kwarg("dx", Expr::inches(x0))
            .kwarg("dy", Expr::inches(y0))
            .into()
    }

    fn encode_png(image: &RasterImage, flip_rows: bool, mirror_columns: bool) -> Result<Vec<u8>> {
        let row_len = image.width as usize * 4;
        let mut pixels = Vec::with_capacity(image.data.len());
        let rows: Box<dyn Iterator<Item = &[u8]>> = if flip_rows {
            Box::new(image.data.chunks_exact(row_len).rev())
        } else {
            Box::new(image.data.chunks_exact(row_len))
        };
        for row in rows {
            if mirror_columns {
                for pixel in row.chunks_exact(4).rev() {
                    pixels.extend_from_slice(pixel);
                }
            } else {
                pixels.extend_from_slice(row);
            }
        }

        let mut buf = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buf, image.width, image.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&pixels)?;
            writer.finish()?;
        }
        Ok(buf)
    }

    fn image_source(&mut self, png: Vec<u8>) -> Result<Expr> {
        if !self.config.detached_images {
            let data = BASE64.encode(&png);
            return Ok(Call::new("base64.decode").arg(Expr::str(data)).into());
        }
        let Some(path) = self.path.as_deref() else {
            return Err(Error::MissingOutputPath);
        };
        let image_path = detached_image_path(path, self.image_counter);
        self.image_counter += 1;
        std::fs::write(&image_path, png)?;
        log::debug!("wrote raster image to {}", image_path.display());
        let name = image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Expr::str(name))
    }
}

/// `figure.typ` -> `figure.image0.png`.
pub fn detached_image_path(path: &FsPath, index: usize) -> PathBuf {
    path.with_extension(format!("image{index}.png"))
}

enum Op {
    Move(Expr),
    Draw(Expr),
}

impl Backend for TypstRenderer {
    fn draw_path(
        &mut self,
        gc: &GraphicsContext,
        path: &Path,
        transform: &Affine,
        face: Option<Rgba>,
    ) -> Result<()> {
        let fill = match face {
            Some(color) => gc.fill_color(color).to_expr(),
            None => Expr::None,
        };
        let stroke = gc.stroke_expr();
        if fill == Expr::None && stroke == Expr::None {
            return Ok(());
        }

        // Each move starts a subpath; the curve element has no other way to
        // lift the pen.
        let mut subpaths: Vec<Vec<Op>> = Vec::new();
        for segment in path.segments(transform) {
            let op = match segment {
                PathSegment::MoveTo { to } => {
                    subpaths.push(Vec::new());
                    Op::Move(Call::new("curve.move").arg(self.point(to)).into())
                }
                PathSegment::LineTo { to } => {
                    Op::Draw(Call::new("curve.line").arg(self.point(to)).into())
                }
                PathSegment::QuadTo { ctrl, to } => Op::Draw(
                    Call::new("curve.quad")
                        .arg(self.point(ctrl))
                        .arg(self.point(to))
                        .into(),
                ),
                PathSegment::CubicTo { ctrl1, ctrl2, to } => Op::Draw(
                    Call::new("curve.cubic")
                        .arg(self.point(ctrl1))
                        .arg(self.point(ctrl2))
                        .arg(self.point(to))
                        .into(),
                ),
                PathSegment::Close => Op::Draw(
                    Call::new("curve.close")
                        .kwarg("mode", Expr::str("straight"))
                        .into(),
                ),
            };
            if subpaths.is_empty() {
                subpaths.push(Vec::new());
            }
            if let Some(current) = subpaths.last_mut() {
                current.push(op);
            }
        }

        for ops in subpaths {
            if !ops.iter().any(|op| matches!(op, Op::Draw(_))) {
                continue;
            }
            let mut curve = Call::new("curve");
            for op in ops {
                match op {
                    Op::Move(expr) | Op::Draw(expr) => curve.args.push(expr),
                }
            }
            let curve = curve.kwarg("fill", fill.clone()).kwarg("stroke", stroke.clone());
            let place = Call::new("place")
                .arg(curve)
                .kwarg("dx", Expr::inches(0.0))
                .kwarg("dy", Expr::inches(0.0));
            self.push(gc, place.into());
        }
        Ok(())
    }

    fn draw_image(
        &mut self,
        gc: &GraphicsContext,
        x: f64,
        y: f64,
        image: &RasterImage,
        transform: Option<&Affine>,
    ) -> Result<()> {
        if image.is_empty() {
            return Ok(());
        }
        let (w_px, h_px) = (image.width as f64, image.height as f64);
        let (left, bottom, width, height, flip_rows, mirror) = match transform {
            None => (
                x,
                y,
                w_px / self.image_dpi,
                h_px / self.image_dpi,
                true,
                false,
            ),
            Some(t) => {
                if !t.is_axis_aligned() {
                    log::warn!("rotated or sheared image transform {t:?} is drawn axis-aligned");
                }
                // The transform maps the unit square onto the image extent,
                // relative to (x, y).
                let p0 = t.apply(Point::new(0.0, 0.0));
                let p1 = t.apply(Point::new(1.0, 1.0));
                (
                    x + p0.x.min(p1.x),
                    y + p0.y.min(p1.y),
                    (p1.x - p0.x).abs() / self.dpi,
                    (p1.y - p0.y).abs() / self.dpi,
                    t.d >= 0.0,
                    t.a < 0.0,
                )
            }
        };

        let png = Self::encode_png(image, flip_rows, mirror)?;
        let source = self.image_source(png)?;
        let mut call = Call::new("image").arg(source);
        if !self.config.detached_images {
            call.set("format", Expr::str("png"));
        }
        let call = call
            .kwarg("width", Expr::inches(width))
            .kwarg("height", Expr::inches(height));
        let place = Call::new("place")
            .arg(call)
            .kwarg("dx", Expr::inches(left / self.dpi))
            .kwarg("dy", Expr::inches(self.height - bottom / self.dpi - height));
        self.push(gc, place.into());
        Ok(())
    }

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
    ) -> Result<()> {
        let (dx, dy, size, alignment, baseline, rotation) = match anchor {
            Some(anchor) => {
                let (alignment, baseline) = text::alignment(anchor.halign, anchor.valign);
                (
                    anchor.position.x / self.dpi,
                    self.height - anchor.position.y / self.dpi,
                    anchor.fontsize,
                    alignment,
                    baseline,
                    anchor.rotation,
                )
            }
            None => (
                x / self.dpi,
                self.height - y / self.dpi,
                prop.size,
                "center + horizon".to_string(),
                false,
                angle,
            ),
        };

        let content = text::to_content(text, ismath || self.config.parse_math);
        let mut call = Call::new("draw-text")
            .arg(Expr::Content(content))
            .kwarg("dx", Expr::inches(dx))
            .kwarg("dy", Expr::inches(dy))
            .kwarg("size", Expr::pt(size))
            .kwarg("alignment", Expr::raw(alignment))
            .kwarg("baseline", baseline)
            .kwarg("angle", Expr::deg((360.0 - rotation).rem_euclid(360.0)));
        if prop.weight != FontWeight::NORMAL {
            call.set("weight", Expr::Int(prop.weight.0 as i64));
        }
        if prop.style != FontStyle::Normal {
            call.set("style", Expr::str(prop.style.as_typst()));
        }
        let color = gc.stroke_color();
        if color != Rgba::BLACK {
            call.set("fill", color.to_expr());
        }
        self.push(gc, call.into());
        Ok(())
    }

    fn draw_quad_mesh(
        &mut self,
        gc: &GraphicsContext,
        master_transform: &Affine,
        mesh: &QuadMesh,
    ) -> Result<()> {
        let expected = mesh
            .mesh_width
            .checked_add(1)
            .zip(mesh.mesh_height.checked_add(1))
            .and_then(|(cols, rows)| cols.checked_mul(rows))
            .ok_or_else(|| {
                Error::MalformedMesh(format!(
                    "{}x{} mesh is too large",
                    mesh.mesh_width, mesh.mesh_height
                ))
            })?;
        if mesh.coordinates.len() != expected {
            return Err(Error::MalformedMesh(format!(
                "{}x{} mesh needs {expected} vertices, got {}",
                mesh.mesh_width,
                mesh.mesh_height,
                mesh.coordinates.len()
            )));
        }

        for i in 0..mesh.mesh_height {
            for j in 0..mesh.mesh_width {
                let idx = i * mesh.mesh_width + j;
                let offset = if mesh.offsets.is_empty() {
                    Point::default()
                } else {
                    mesh.offset_transform
                        .apply(mesh.offsets[idx % mesh.offsets.len()])
                };
                let quad = Affine::translate(offset.x, offset.y);
                let transform = master_transform.then(&quad);

                let face = (!mesh.facecolors.is_empty())
                    .then(|| gc.fill_color(mesh.facecolors[idx % mesh.facecolors.len()]));
                let fill = face.map(|color| color.to_expr()).unwrap_or(Expr::None);
                let stroke = if gc.linewidth > 0.0 {
                    let edge = if mesh.edgecolors.is_empty() {
                        face
                    } else {
                        Some(mesh.edgecolors[idx % mesh.edgecolors.len()])
                    };
                    match edge {
                        Some(edge) => Call::new("stroke")
                            .kwarg("paint", edge.to_expr())
                            .kwarg("thickness", Expr::pt(gc.linewidth))
                            .into(),
                        None => Expr::None,
                    }
                } else {
                    Expr::None
                };
                if fill == Expr::None && stroke == Expr::None {
                    continue;
                }

                // Walk the cell anti-clockwise starting from the upper-left.
                let corners = [(i + 1, j), (i + 1, j + 1), (i, j + 1), (i, j)];
                let points: Vec<Point> = corners
                    .iter()
                    .map(|&(row, col)| transform.apply(mesh.vertex(row, col)))
                    .collect();
                if points.iter().any(|p| !p.is_finite()) {
                    log::debug!("skipping quad ({i}, {j}) with non-finite vertices");
                    continue;
                }
                let mut polygon = Call::new("polygon");
                for point in points {
                    polygon.args.push(self.point(point));
                }
                let polygon = polygon.kwarg("fill", fill).kwarg("stroke", stroke);
                let place = Call::new("place")
                    .arg(polygon)
                    .kwarg("dx", Expr::inches(0.0))
                    .kwarg("dy", Expr::inches(0.0));
                self.push(gc, place.into());
            }
        }
        Ok(())
    }
}
