use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

/// Affine map `(x, y) -> (a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub const IDENTITY: Affine = Affine::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub const fn translate(dx: f64, dy: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, dx, dy)
    }

    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// `self` applied first, then `next`.
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            a: next.a * self.a + next.c * self.b,
            b: next.b * self.a + next.d * self.b,
            c: next.a * self.c + next.c * self.d,
            d: next.b * self.c + next.d * self.d,
            e: next.a * self.e + next.c * self.f + next.e,
            f: next.b * self.e + next.d * self.f + next.f,
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point {
            x: self.a * p.x + self.c * p.y + self.e,
            y: self.b * p.x + self.d * p.y + self.f,
        }
    }

    /// No rotation or shear.
    pub fn is_axis_aligned(&self) -> bool {
        self.b == 0.0 && self.c == 0.0
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<[f64; 6]> for Affine {
    fn from([a, b, c, d, e, f]: [f64; 6]) -> Self {
        Self::new(a, b, c, d, e, f)
    }
}

impl From<Affine> for [f64; 6] {
    fn from(m: Affine) -> Self {
        [m.a, m.b, m.c, m.d, m.e, m.f]
    }
}

/// Axis-aligned box in display pixels, origin at the bottom left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Bbox {
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_bounds(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }

    pub fn left(&self) -> f64 {
        self.x0.min(self.x1)
    }

    pub fn top(&self) -> f64 {
        self.y0.max(self.y1)
    }
}

/// Vertex codes used by the host library's path objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PathCode {
    Stop = 0,
    MoveTo = 1,
    LineTo = 2,
    Curve3 = 3,
    Curve4 = 4,
    ClosePoly = 79,
}

impl TryFrom<u8> for PathCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PathCode::Stop),
            1 => Ok(PathCode::MoveTo),
            2 => Ok(PathCode::LineTo),
            3 => Ok(PathCode::Curve3),
            4 => Ok(PathCode::Curve4),
            79 => Ok(PathCode::ClosePoly),
            other => Err(Error::MalformedPath(format!("unknown vertex code {other}"))),
        }
    }
}

impl From<PathCode> for u8 {
    fn from(code: PathCode) -> Self {
        code as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PathSegment {
    MoveTo { to: Point },
    LineTo { to: Point },
    QuadTo { ctrl: Point, to: Point },
    CubicTo { ctrl1: Point, ctrl2: Point, to: Point },
    Close,
}

impl PathSegment {
    fn map(&self, transform: &Affine) -> PathSegment {
        match *self {
            PathSegment::MoveTo { to } => PathSegment::MoveTo {
                to: transform.apply(to),
            },
            PathSegment::LineTo { to } => PathSegment::LineTo {
                to: transform.apply(to),
            },
            PathSegment::QuadTo { ctrl, to } => PathSegment::QuadTo {
                ctrl: transform.apply(ctrl),
                to: transform.apply(to),
            },
            PathSegment::CubicTo { ctrl1, ctrl2, to } => PathSegment::CubicTo {
                ctrl1: transform.apply(ctrl1),
                ctrl2: transform.apply(ctrl2),
                to: transform.apply(to),
            },
            PathSegment::Close => PathSegment::Close,
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            PathSegment::MoveTo { to } | PathSegment::LineTo { to } => to.is_finite(),
            PathSegment::QuadTo { ctrl, to } => ctrl.is_finite() && to.is_finite(),
            PathSegment::CubicTo { ctrl1, ctrl2, to } => {
                ctrl1.is_finite() && ctrl2.is_finite() && to.is_finite()
            }
            PathSegment::Close => true,
        }
    }

    pub fn end_point(&self) -> Option<Point> {
        match self {
            PathSegment::MoveTo { to }
            | PathSegment::LineTo { to }
            | PathSegment::QuadTo { to, .. }
            | PathSegment::CubicTo { to, .. } => Some(*to),
            PathSegment::Close => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Path {
    pub segments: Vec<PathSegment>,
}

impl Path {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Open polyline through `points`.
    pub fn polyline(points: &[Point]) -> Self {
        let segments = points
            .iter()
            .enumerate()
            .map(|(idx, &to)| {
                if idx == 0 {
                    PathSegment::MoveTo { to }
                } else {
                    PathSegment::LineTo { to }
                }
            })
            .collect();
        Self { segments }
    }

    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        let mut path = Self::polyline(&[
            Point::new(x, y),
            Point::new(x + width, y),
            Point::new(x + width, y + height),
            Point::new(x, y + height),
        ]);
        path.segments.push(PathSegment::Close);
        path
    }

    /// Group a vertex array and its per-vertex codes into segments. Curve
    /// codes repeat on every vertex of the curve (control points included).
    pub fn from_codes(vertices: &[[f64; 2]], codes: Option<&[PathCode]>) -> Result<Self> {
        let Some(codes) = codes else {
            let points: Vec<Point> = vertices.iter().copied().map(Point::from).collect();
            return Ok(Self::polyline(&points));
        };
        if codes.len() != vertices.len() {
            return Err(Error::MalformedPath(format!(
                "{} vertices but {} codes",
                vertices.len(),
                codes.len()
            )));
        }

        let mut segments = Vec::new();
        let mut idx = 0;
        while idx < codes.len() {
            let code = codes[idx];
            let take = match code {
                PathCode::Stop => break,
                PathCode::MoveTo | PathCode::LineTo | PathCode::ClosePoly => 1,
                PathCode::Curve3 => 2,
                PathCode::Curve4 => 3,
            };
            if idx + take > codes.len() || codes[idx..idx + take].iter().any(|c| *c != code) {
                return Err(Error::MalformedPath(format!(
                    "curve at vertex {idx} needs {take} vertices"
                )));
            }
            let pts: Vec<Point> = vertices[idx..idx + take]
                .iter()
                .copied()
                .map(Point::from)
                .collect();
            segments.push(match code {
                PathCode::MoveTo => PathSegment::MoveTo { to: pts[0] },
                PathCode::LineTo => PathSegment::LineTo { to: pts[0] },
                PathCode::Curve3 => PathSegment::QuadTo {
                    ctrl: pts[0],
                    to: pts[1],
                },
                PathCode::Curve4 => PathSegment::CubicTo {
                    ctrl1: pts[0],
                    ctrl2: pts[1],
                    to: pts[2],
                },
                PathCode::ClosePoly => PathSegment::Close,
                PathCode::Stop => unreachable!("handled above"),
            });
            idx += take;
        }
        Ok(Self { segments })
    }

    pub fn vertices(&self) -> impl Iterator<Item = Point> + '_ {
        self.segments.iter().filter_map(PathSegment::end_point)
    }

    /// Segments mapped through `transform`. A segment with a non-finite
    /// coordinate is dropped and the next drawable one starts a new subpath.
    pub fn segments(&self, transform: &Affine) -> Vec<PathSegment> {
        let mut out = Vec::with_capacity(self.segments.len());
        let mut broken = false;
        for segment in &self.segments {
            let mapped = segment.map(transform);
            if !mapped.is_finite() {
                log::debug!("dropping non-finite path segment {segment:?}");
                broken = true;
                continue;
            }
            if broken {
                match mapped {
                    PathSegment::Close => continue,
                    other => {
                        broken = false;
                        if let Some(to) = other.end_point() {
                            out.push(PathSegment::MoveTo { to });
                        }
                        continue;
                    }
                }
            }
            out.push(mapped);
        }
        out
    }
}

/// Either serialised form: `{"segments": [...]}` or the host's
/// `{"vertices": [...], "codes": [...]}` arrays.
#[derive(Deserialize)]
#[serde(untagged)]
enum PathRepr {
    Segments {
        segments: Vec<PathSegment>,
    },
    Raw {
        vertices: Vec<[f64; 2]>,
        #[serde(default)]
        codes: Option<Vec<PathCode>>,
    },
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match PathRepr::deserialize(deserializer)? {
            PathRepr::Segments { segments } => Ok(Path { segments }),
            PathRepr::Raw { vertices, codes } => {
                Path::from_codes(&vertices, codes.as_deref()).map_err(serde::de::Error::custom)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_curve_codes() {
        let vertices = [[0.0, 0.0], [1.0, 1.0], [2.0, 0.0], [3.0, 1.0], [4.0, 1.0], [5.0, 0.0], [0.0, 0.0]];
        let codes = [
            PathCode::MoveTo,
            PathCode::Curve3,
            PathCode::Curve3,
            PathCode::Curve4,
            PathCode::Curve4,
            PathCode::Curve4,
            PathCode::ClosePoly,
        ];
        let path = Path::from_codes(&vertices, Some(&codes)).unwrap();
        assert_eq!(path.segments.len(), 4);
        assert!(matches!(path.segments[1], PathSegment::QuadTo { .. }));
        assert!(matches!(path.segments[2], PathSegment::CubicTo { .. }));
        assert_eq!(path.segments[3], PathSegment::Close);
    }

    #[test]
    fn truncated_curve_is_an_error() {
        let vertices = [[0.0, 0.0], [1.0, 1.0]];
        let codes = [PathCode::MoveTo, PathCode::Curve4];
        assert!(Path::from_codes(&vertices, Some(&codes)).is_err());
    }

    #[test]
    fn stop_ends_the_path() {
        let vertices = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        let codes = [PathCode::MoveTo, PathCode::LineTo, PathCode::Stop];
        let path = Path::from_codes(&vertices, Some(&codes)).unwrap();
        assert_eq!(path.segments.len(), 2);
    }

    #[test]
    fn nan_breaks_the_line() {
        let path = Path::polyline(&[
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(f64::NAN, 2.0),
            Point::new(3.0, 3.0),
            Point::new(4.0, 4.0),
        ]);
        let segments = path.segments(&Affine::IDENTITY);
        assert_eq!(
            segments,
            vec![
                PathSegment::MoveTo { to: Point::new(0.0, 0.0) },
                PathSegment::LineTo { to: Point::new(1.0, 1.0) },
                PathSegment::MoveTo { to: Point::new(3.0, 3.0) },
                PathSegment::LineTo { to: Point::new(4.0, 4.0) },
            ]
        );
    }

    #[test]
    fn affine_composition_order() {
        let m = Affine::scale(2.0, 3.0).then(&Affine::translate(1.0, 1.0));
        assert_eq!(m.apply(Point::new(1.0, 1.0)), Point::new(3.0, 4.0));
        assert!(m.is_axis_aligned());
    }

    #[test]
    fn json_accepts_vertex_codes() {
        let value = serde_json::json!({"vertices": [[0, 0], [1, 0], [1, 1]], "codes": [1, 2, 79]});
        let path: Path = serde_json::from_value(value).unwrap();
        assert_eq!(path.segments.last(), Some(&PathSegment::Close));
    }
}
