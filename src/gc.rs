use crate::color::Rgba;
use crate::geometry::Bbox;
use crate::typst::{Call, Expr};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapStyle {
    #[default]
    Butt,
    Round,
    Projecting,
}

impl CapStyle {
    pub fn as_typst(self) -> &'static str {
        match self {
            CapStyle::Butt => "butt",
            CapStyle::Round => "round",
            CapStyle::Projecting => "square",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinStyle {
    Miter,
    #[default]
    Round,
    Bevel,
}

impl JoinStyle {
    pub fn as_typst(self) -> &'static str {
        match self {
            JoinStyle::Miter => "miter",
            JoinStyle::Round => "round",
            JoinStyle::Bevel => "bevel",
        }
    }
}

/// Dash pattern in points. `pattern: None` is a solid line.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dashes {
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub pattern: Option<Vec<f64>>,
}

/// Line and clip state shared by the drawing calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsContext {
    pub rgb: Rgba,
    /// Overrides the alpha channel of both stroke and fill when set.
    pub alpha: Option<f64>,
    pub linewidth: f64,
    pub capstyle: CapStyle,
    pub joinstyle: JoinStyle,
    pub dashes: Dashes,
    pub cliprect: Option<Bbox>,
    pub url: Option<String>,
    pub antialiased: bool,
}

impl Default for GraphicsContext {
    fn default() -> Self {
        Self {
            rgb: Rgba::BLACK,
            alpha: None,
            linewidth: 1.0,
            capstyle: CapStyle::Butt,
            joinstyle: JoinStyle::Round,
            dashes: Dashes::default(),
            cliprect: None,
            url: None,
            antialiased: true,
        }
    }
}

impl GraphicsContext {
    pub fn stroke_color(&self) -> Rgba {
        match self.alpha {
            Some(alpha) => self.rgb.with_alpha(alpha),
            None => self.rgb,
        }
    }

    pub fn fill_color(&self, face: Rgba) -> Rgba {
        match self.alpha {
            Some(alpha) => face.with_alpha(alpha),
            None => face,
        }
    }

    /// `stroke(...)` for the current line style, or `none` for zero width.
    pub fn stroke_expr(&self) -> Expr {
        if self.linewidth.is_nan() || self.linewidth <= 0.0 {
            return Expr::None;
        }
        let mut stroke = Call::new("stroke")
            .kwarg("paint", self.stroke_color().to_expr())
            .kwarg("thickness", Expr::pt(self.linewidth))
            .kwarg("cap", Expr::str(self.capstyle.as_typst()))
            .kwarg("join", Expr::str(self.joinstyle.as_typst()));

        if let Some(pattern) = self.dashes.pattern.as_deref()
            && !pattern.is_empty()
        {
            let array = Expr::Array(pattern.iter().map(|&bound| Expr::pt(bound)).collect());
            if self.dashes.offset != 0.0 {
                stroke.set(
                    "dash",
                    Expr::Dict(vec![
                        ("array".to_string(), array),
                        ("phase".to_string(), Expr::pt(self.dashes.offset)),
                    ]),
                );
            } else {
                stroke.set("dash", array);
            }
        }
        stroke.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projecting_cap_maps_to_square() {
        let gc = GraphicsContext {
            capstyle: CapStyle::Projecting,
            joinstyle: JoinStyle::Miter,
            ..Default::default()
        };
        let text = gc.stroke_expr().to_string();
        assert!(text.contains("cap: \"square\""));
        assert!(text.contains("join: \"miter\""));
        assert!(text.contains("thickness: 1pt"));
    }

    #[test]
    fn dash_with_and_without_phase() {
        let mut gc = GraphicsContext {
            dashes: Dashes {
                offset: 0.0,
                pattern: Some(vec![3.7, 1.6]),
            },
            ..Default::default()
        };
        assert!(gc.stroke_expr().to_string().contains("dash: (3.7pt, 1.6pt))"));

        gc.dashes.offset = 2.0;
        assert!(
            gc.stroke_expr()
                .to_string()
                .contains("dash: (array: (3.7pt, 1.6pt), phase: 2pt))")
        );
    }

    #[test]
    fn zero_width_has_no_stroke() {
        let gc = GraphicsContext {
            linewidth: 0.0,
            ..Default::default()
        };
        assert_eq!(gc.stroke_expr(), Expr::None);
    }

    #[test]
    fn nan_width_has_no_stroke() {
        let gc = GraphicsContext {
            linewidth: f64::NAN,
            ..Default::default()
        };
        assert_eq!(gc.stroke_expr(), Expr::None);
    }

    #[test]
    fn alpha_overrides_color_channel() {
        let gc = GraphicsContext {
            alpha: Some(0.5),
            ..Default::default()
        };
        assert_eq!(gc.stroke_color().a, 0.5);
        assert_eq!(gc.fill_color(Rgba::WHITE).a, 0.5);
    }

    #[test]
    fn deserializes_with_defaults() {
        let gc: GraphicsContext =
            serde_json::from_str(r#"{"rgb": "r", "linewidth": 1.5, "capstyle": "round"}"#).unwrap();
        assert_eq!(gc.linewidth, 1.5);
        assert_eq!(gc.capstyle, CapStyle::Round);
        assert_eq!(gc.joinstyle, JoinStyle::Round);
        assert!(gc.cliprect.is_none());
    }
}
