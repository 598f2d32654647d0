use crate::text::{FontProperties, FontStyle};
use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Mutex;
use ttf_parser::{Face, GlyphId};

static TEXT_MEASURER: Lazy<Mutex<TextMeasurer>> = Lazy::new(|| Mutex::new(TextMeasurer::new()));

const FALLBACK_ADVANCE: f64 = 0.56;
const FALLBACK_ASCENT: f64 = 0.8;
const FALLBACK_DESCENT: f64 = 0.2;
const LINE_SPACING: f64 = 1.2;

/// Extent of a rendered string in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextExtent {
    pub width: f64,
    /// Total height including the descent.
    pub height: f64,
    pub descent: f64,
}

/// Width, height and descent of `text` set in `prop`. Falls back to
/// per-character estimates when no matching font is installed.
pub fn measure_text(text: &str, prop: &FontProperties) -> TextExtent {
    let size = prop.size.max(0.0);
    if size == 0.0 {
        return TextExtent {
            width: 0.0,
            height: 0.0,
            descent: 0.0,
        };
    }
    let stripped = text.replace('$', "");
    let lines: Vec<&str> = stripped.split('\n').collect();
    let measured = TEXT_MEASURER
        .lock()
        .ok()
        .and_then(|mut guard| guard.measure(&lines, prop));
    let (width, ascent, descent) = match measured {
        Some(metrics) => metrics,
        None => {
            let widest = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
            (
                widest as f64 * size * FALLBACK_ADVANCE,
                size * FALLBACK_ASCENT,
                size * FALLBACK_DESCENT,
            )
        }
    };
    let extra_lines = lines.len().saturating_sub(1) as f64;
    TextExtent {
        width,
        height: ascent + descent + extra_lines * size * LINE_SPACING,
        descent,
    }
}

struct TextMeasurer {
    db: Database,
    loaded_system_fonts: bool,
    cache: HashMap<String, Option<FontFace>>,
}

impl TextMeasurer {
    fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            cache: HashMap::new(),
        }
    }

    /// `(width, ascent, descent)` in points.
    fn measure(&mut self, lines: &[&str], prop: &FontProperties) -> Option<(f64, f64, f64)> {
        let key = cache_key(prop);
        if !self.cache.contains_key(&key) {
            let face = self.load_face(prop, &key);
            self.cache.insert(key.clone(), face);
        }
        let face = self.cache.get_mut(&key).and_then(|face| face.as_mut())?;
        let mut width = 0.0f64;
        for line in lines {
            let normalized = line.replace('\t', "    ");
            width = width.max(face.measure_width(&normalized, prop.size)?);
        }
        let scale = prop.size / face.units_per_em as f64;
        Some((
            width,
            face.ascender as f64 * scale,
            -(face.descender as f64) * scale,
        ))
    }

    fn load_face(&mut self, prop: &FontProperties, key: &str) -> Option<FontFace> {
        if let Some(face) = load_cached_face(key) {
            return Some(face);
        }
        #[derive(Clone, Copy)]
        enum FamilyToken {
            Generic(fontdb::Family<'static>),
            Name(usize),
        }

        let mut names: Vec<String> = Vec::new();
        let mut order: Vec<FamilyToken> = Vec::new();
        for part in &prop.family {
            let raw = part.trim().trim_matches('"').trim_matches('\'');
            if raw.is_empty() {
                continue;
            }
            match raw.to_ascii_lowercase().as_str() {
                "serif" => order.push(FamilyToken::Generic(Family::Serif)),
                "sans-serif" | "sans" => order.push(FamilyToken::Generic(Family::SansSerif)),
                "monospace" => order.push(FamilyToken::Generic(Family::Monospace)),
                "cursive" => order.push(FamilyToken::Generic(Family::Cursive)),
                "fantasy" => order.push(FamilyToken::Generic(Family::Fantasy)),
                _ => {
                    let idx = names.len();
                    names.push(raw.to_string());
                    order.push(FamilyToken::Name(idx));
                }
            }
        }
        if order.is_empty() {
            order.push(FamilyToken::Generic(Family::SansSerif));
        }

        let families: Vec<Family<'_>> = order
            .iter()
            .map(|token| match *token {
                FamilyToken::Generic(family) => family,
                FamilyToken::Name(idx) => Family::Name(names[idx].as_str()),
            })
            .collect();

        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }

        let query = Query {
            families: &families,
            weight: Weight(prop.weight.0),
            stretch: Stretch::Normal,
            style: match prop.style {
                FontStyle::Normal => Style::Normal,
                FontStyle::Italic => Style::Italic,
                FontStyle::Oblique => Style::Oblique,
            },
        };
        let Some(id) = self.db.query(&query) else {
            log::debug!("no installed font matches {}", prop.family_list());
            return None;
        };
        let mut loaded: Option<FontFace> = None;
        self.db.with_face_data(id, |data, index| {
            let bytes = data.to_vec();
            if Face::parse(&bytes, index).is_ok() {
                if let Some((font_path, meta_path)) = cache_paths(key)
                    && !font_path.exists()
                {
                    if let Some(parent) = font_path.parent() {
                        let _ = fs::create_dir_all(parent);
                    }
                    let _ = fs::write(&font_path, &bytes);
                    let _ = fs::write(&meta_path, index.to_string());
                }
                loaded = FontFace::new(bytes, index);
            }
        });
        loaded
    }
}

struct FontFace {
    _data: Vec<u8>,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    face: Face<'static>,
    glyph_cache: HashMap<char, Option<u16>>,
    advance_cache: HashMap<u16, u16>,
}

impl FontFace {
    fn new(data: Vec<u8>, index: u32) -> Option<Self> {
        let parsed = Face::parse(&data, index).ok()?;
        // The face borrows the heap buffer of `data`, which lives as long as `self`.
        let face = unsafe { std::mem::transmute::<Face<'_>, Face<'static>>(parsed) };
        Some(Self {
            units_per_em: face.units_per_em().max(1),
            ascender: face.ascender(),
            descender: face.descender(),
            _data: data,
            face,
            glyph_cache: HashMap::new(),
            advance_cache: HashMap::new(),
        })
    }

    fn measure_width(&mut self, text: &str, font_size: f64) -> Option<f64> {
        let scale = font_size / self.units_per_em as f64;
        let fallback = font_size * FALLBACK_ADVANCE;
        let mut width = 0.0f64;

        for ch in text.chars() {
            let glyph = match self.glyph_cache.get(&ch) {
                Some(cached) => *cached,
                None => {
                    let glyph = self.face.glyph_index(ch).map(|id| id.0);
                    self.glyph_cache.insert(ch, glyph);
                    glyph
                }
            };

            let Some(glyph_id) = glyph else {
                width += fallback;
                continue;
            };

            let advance = match self.advance_cache.get(&glyph_id) {
                Some(value) => *value,
                None => {
                    let value = self.face.glyph_hor_advance(GlyphId(glyph_id)).unwrap_or(0);
                    self.advance_cache.insert(glyph_id, value);
                    value
                }
            };
            width += advance as f64 * scale;
        }

        Some(width.max(0.0))
    }
}

fn cache_key(prop: &FontProperties) -> String {
    let family = prop.family_list();
    let family = if family.trim().is_empty() {
        "sans-serif"
    } else {
        family.trim()
    };
    format!("{family}|{}|{}", prop.weight.0, prop.style.as_typst())
}

fn cache_paths(key: &str) -> Option<(PathBuf, PathBuf)> {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))?;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();
    let dir = base.join("typplot").join("font-cache");
    let font_path = dir.join(format!("{hash:x}.font"));
    let meta_path = dir.join(format!("{hash:x}.meta"));
    Some((font_path, meta_path))
}

fn load_cached_face(key: &str) -> Option<FontFace> {
    let (font_path, meta_path) = cache_paths(key)?;
    if !font_path.exists() || !meta_path.exists() {
        return None;
    }
    let bytes = fs::read(font_path).ok()?;
    let index: u32 = fs::read_to_string(meta_path).ok()?.trim().parse().ok()?;
    FontFace::new(bytes, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_zero_sized_text() {
        let extent = measure_text("", &FontProperties::with_size(10.0));
        assert_eq!(extent.width, 0.0);
        assert!(extent.height > 0.0);

        let zero = measure_text("abc", &FontProperties::with_size(0.0));
        assert_eq!(zero.height, 0.0);
    }

    #[test]
    fn longer_text_is_wider() {
        let prop = FontProperties::with_size(12.0);
        let short = measure_text("lp", &prop);
        let long = measure_text("lp lp lp lp", &prop);
        assert!(long.width > short.width);
        assert!(short.descent >= 0.0);
        assert!(short.height > short.descent);
    }

    #[test]
    fn extra_lines_add_height() {
        let prop = FontProperties::with_size(10.0);
        let one = measure_text("x", &prop);
        let two = measure_text("x\ny", &prop);
        assert!((two.height - one.height - 12.0).abs() < 1e-9);
    }

    #[test]
    fn cache_key_includes_style() {
        let mut prop = FontProperties::with_size(10.0);
        let regular = cache_key(&prop);
        prop.style = FontStyle::Italic;
        assert_ne!(regular, cache_key(&prop));
    }
}
