use crate::error::{Error, Result};
use crate::typst::{Call, Expr};
use serde::{Deserialize, Deserializer, Serialize};

/// RGBA colour with float components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

const NAMED_COLORS: &[(&str, &str)] = &[
    ("black", "#000000"),
    ("white", "#ffffff"),
    ("red", "#ff0000"),
    ("green", "#008000"),
    ("blue", "#0000ff"),
    ("cyan", "#00ffff"),
    ("magenta", "#ff00ff"),
    ("yellow", "#ffff00"),
    ("gray", "#808080"),
    ("grey", "#808080"),
    ("orange", "#ffa500"),
    ("purple", "#800080"),
    ("brown", "#a52a2a"),
    ("pink", "#ffc0cb"),
    ("olive", "#808000"),
    ("navy", "#000080"),
    ("teal", "#008080"),
    ("none", "#00000000"),
    ("transparent", "#00000000"),
    // Single-letter plotting shorthands.
    ("k", "#000000"),
    ("w", "#ffffff"),
    ("r", "#ff0000"),
    ("g", "#008000"),
    ("b", "#0000ff"),
    ("c", "#00bfbf"),
    ("m", "#bf00bf"),
    ("y", "#bfbf00"),
    // Default property cycle.
    ("tab:blue", "#1f77b4"),
    ("tab:orange", "#ff7f0e"),
    ("tab:green", "#2ca02c"),
    ("tab:red", "#d62728"),
    ("tab:purple", "#9467bd"),
    ("tab:brown", "#8c564b"),
    ("tab:pink", "#e377c2"),
    ("tab:gray", "#7f7f7f"),
    ("tab:olive", "#bcbd22"),
    ("tab:cyan", "#17becf"),
];

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Build from 3 or 4 components, clamping each into `[0, 1]`.
    pub fn from_components(components: &[f64]) -> Result<Self> {
        let clamp = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        match components {
            [r, g, b] => Ok(Self::new(clamp(*r), clamp(*g), clamp(*b), 1.0)),
            [r, g, b, a] => Ok(Self::new(clamp(*r), clamp(*g), clamp(*b), clamp(*a))),
            _ => Err(Error::InvalidColor(format!(
                "expected 3 or 4 components, got {}",
                components.len()
            ))),
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        if let Some((_, hex)) = NAMED_COLORS.iter().find(|(name, _)| *name == lower) {
            return Self::parse_hex(hex);
        }
        if trimmed.starts_with('#') {
            return Self::parse_hex(trimmed);
        }
        // Grey levels written as a bare number string, e.g. "0.75".
        if let Ok(level) = trimmed.parse::<f64>()
            && (0.0..=1.0).contains(&level)
        {
            return Ok(Self::new(level, level, level, 1.0));
        }
        Err(Error::InvalidColor(input.to_string()))
    }

    fn parse_hex(input: &str) -> Result<Self> {
        let digits = input.trim_start_matches('#');
        if !digits.is_ascii() {
            return Err(Error::InvalidColor(input.to_string()));
        }
        let channel = |slice: &str| -> Result<f64> {
            u8::from_str_radix(slice, 16)
                .map(|v| v as f64 / 255.0)
                .map_err(|_| Error::InvalidColor(input.to_string()))
        };
        match digits.len() {
            3 | 4 => {
                let mut parts = Vec::with_capacity(4);
                for idx in 0..digits.len() {
                    let nibble = &digits[idx..idx + 1];
                    parts.push(channel(&format!("{nibble}{nibble}"))?);
                }
                if parts.len() == 3 {
                    parts.push(1.0);
                }
                Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
            }
            6 | 8 => {
                let r = channel(&digits[0..2])?;
                let g = channel(&digits[2..4])?;
                let b = channel(&digits[4..6])?;
                let a = if digits.len() == 8 {
                    channel(&digits[6..8])?
                } else {
                    1.0
                };
                Ok(Self::new(r, g, b, a))
            }
            _ => Err(Error::InvalidColor(input.to_string())),
        }
    }

    pub fn with_alpha(self, alpha: f64) -> Self {
        Self {
            a: alpha.clamp(0.0, 1.0),
            ..self
        }
    }

    /// `rgb(R%, G%, B%, A%)`.
    pub fn to_expr(&self) -> Expr {
        Call::new("rgb")
            .arg(Expr::percent(self.r * 100.0))
            .arg(Expr::percent(self.g * 100.0))
            .arg(Expr::percent(self.b * 100.0))
            .arg(Expr::percent(self.a * 100.0))
            .into()
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::BLACK
    }
}

impl std::str::FromStr for Rgba {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColorRepr {
    Name(String),
    Components(Vec<f64>),
    Fields { r: f64, g: f64, b: f64, a: Option<f64> },
}

impl<'de> Deserialize<'de> for Rgba {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let parsed = match ColorRepr::deserialize(deserializer)? {
            ColorRepr::Name(name) => Rgba::parse(&name),
            ColorRepr::Components(components) => Rgba::from_components(&components),
            ColorRepr::Fields { r, g, b, a } => Rgba::from_components(&[r, g, b, a.unwrap_or(1.0)]),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_names() {
        assert_eq!(Rgba::parse("#ff0000").unwrap(), Rgba::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(Rgba::parse("#fff").unwrap(), Rgba::WHITE);
        assert_eq!(Rgba::parse("k").unwrap(), Rgba::BLACK);
        assert_eq!(Rgba::parse(" Black ").unwrap(), Rgba::BLACK);
        assert_eq!(Rgba::parse("none").unwrap().a, 0.0);
        let grey = Rgba::parse("0.5").unwrap();
        assert_eq!((grey.r, grey.g, grey.b), (0.5, 0.5, 0.5));
        assert!(Rgba::parse("#12345").is_err());
        assert!(Rgba::parse("chartreuse-ish").is_err());
    }

    #[test]
    fn components_are_clamped() {
        let color = Rgba::from_components(&[1.5, -0.2, 0.5]).unwrap();
        assert_eq!(color, Rgba::new(1.0, 0.0, 0.5, 1.0));
        assert!(Rgba::from_components(&[0.1, 0.2]).is_err());
    }

    #[test]
    fn renders_percent_rgb() {
        let color = Rgba::new(0.5, 0.25, 0.0, 1.0);
        assert_eq!(color.to_expr().to_string(), "rgb(\n  50%,\n  25%,\n  0%,\n  100%)");
    }

    #[test]
    fn deserializes_any_representation() {
        let colors: Vec<Rgba> =
            serde_json::from_str(r##"["#000000", [1.0, 1.0, 1.0], {"r": 0.0, "g": 0.0, "b": 1.0}]"##)
                .unwrap();
        assert_eq!(colors[0], Rgba::BLACK);
        assert_eq!(colors[1], Rgba::WHITE);
        assert_eq!(colors[2], Rgba::new(0.0, 0.0, 1.0, 1.0));
    }
}
