//! Text labels: font properties, anchoring and conversion of label strings
//! (plain text with optional `$...$` mathtext) into Typst content.

use serde::{Deserialize, Deserializer, Serialize};

use crate::geometry::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
    Oblique,
}

impl FontStyle {
    pub fn as_typst(self) -> &'static str {
        match self {
            FontStyle::Normal => "normal",
            FontStyle::Italic => "italic",
            FontStyle::Oblique => "oblique",
        }
    }
}

/// Numeric font weight, 100..=900.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FontWeight(pub u16);

impl FontWeight {
    pub const NORMAL: FontWeight = FontWeight(400);
    pub const BOLD: FontWeight = FontWeight(700);

    pub fn from_name(name: &str) -> Option<Self> {
        let weight = match name.trim().to_ascii_lowercase().as_str() {
            "thin" | "hairline" => 100,
            "ultralight" | "extralight" | "extra light" => 200,
            "light" => 300,
            "normal" | "regular" | "book" | "roman" => 400,
            "medium" => 500,
            "semibold" | "demibold" | "demi" => 600,
            "bold" => 700,
            "extra bold" | "extrabold" | "ultrabold" | "heavy" => 800,
            "black" => 900,
            other => return other.parse::<u16>().ok().map(|w| FontWeight(w.clamp(100, 900))),
        };
        Some(FontWeight(weight))
    }
}

impl Default for FontWeight {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl<'de> Deserialize<'de> for FontWeight {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u16),
            Name(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(weight) => Ok(FontWeight(weight.clamp(100, 900))),
            Repr::Name(name) => FontWeight::from_name(&name)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown font weight: {name}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontProperties {
    pub family: Vec<String>,
    pub style: FontStyle,
    pub weight: FontWeight,
    /// Size in points.
    pub size: f64,
}

impl Default for FontProperties {
    fn default() -> Self {
        Self {
            family: vec!["sans-serif".to_string()],
            style: FontStyle::Normal,
            weight: FontWeight::NORMAL,
            size: 10.0,
        }
    }
}

impl FontProperties {
    pub fn with_size(size: f64) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn family_list(&self) -> String {
        self.family.join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HAlign {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VAlign {
    Top,
    #[default]
    Center,
    CenterBaseline,
    Baseline,
    Bottom,
}

/// Placement data of the text artist behind a `draw_text` call. When it is
/// available it takes precedence over the raw position and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnchor {
    /// Anchor position in display pixels.
    pub position: Point,
    #[serde(default)]
    pub halign: HAlign,
    #[serde(default)]
    pub valign: VAlign,
    pub fontsize: f64,
    /// Rotation in degrees, counter-clockwise.
    #[serde(default)]
    pub rotation: f64,
}

/// Typst alignment expression and whether the anchor refers to the baseline.
pub fn alignment(halign: HAlign, valign: VAlign) -> (String, bool) {
    let horizontal = match halign {
        HAlign::Left => "left",
        HAlign::Center => "center",
        HAlign::Right => "right",
    };
    let (vertical, baseline) = match valign {
        VAlign::Top => ("top", false),
        VAlign::Bottom => ("bottom", false),
        VAlign::Center => ("horizon", false),
        VAlign::CenterBaseline => ("horizon", true),
        VAlign::Baseline => ("bottom", true),
    };
    (format!("{horizontal} + {vertical}"), baseline)
}

/// Convert a label into Typst markup. With `parse_math`, `$...$` spans are
/// translated from mathtext to Typst math; otherwise every `$` is literal.
pub fn to_content(text: &str, parse_math: bool) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut rest = text;
    let mut at_start = true;
    while !rest.is_empty() {
        let span = if parse_math { math_span(rest) } else { None };
        match span {
            Some((start, end)) => {
                escape_markup(&rest[..start], &mut out, at_start);
                out.push('$');
                out.push_str(&convert_math(&rest[start + 1..end]));
                out.push('$');
                rest = &rest[end + 1..];
            }
            None => {
                escape_markup(rest, &mut out, at_start);
                rest = "";
            }
        }
        at_start = false;
    }
    out
}

/// Byte offsets of the next pair of unescaped `$`.
fn math_span(text: &str) -> Option<(usize, usize)> {
    let mut positions = Vec::with_capacity(2);
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            '$' if !escaped => {
                positions.push(idx);
                if positions.len() == 2 {
                    return Some((positions[0], positions[1]));
                }
            }
            _ => escaped = false,
        }
    }
    None
}

fn escape_markup(text: &str, out: &mut String, at_start: bool) {
    let chars: Vec<char> = text.chars().collect();
    let mut line_start = at_start;
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        let next = chars.get(idx + 1).copied();
        match ch {
            '\\' if next == Some('$') => {
                out.push_str("\\$");
                idx += 2;
                line_start = false;
                continue;
            }
            '\\' | '#' | '*' | '_' | '`' | '<' | '>' | '@' | '[' | ']' | '~' | '$' => {
                out.push('\\');
                out.push(ch);
            }
            '/' if matches!(next, Some('/') | Some('*')) => out.push_str("\\/"),
            '-' | '+' | '=' if line_start && matches!(next, None | Some(' ')) => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => {
                out.push_str(" \\ ");
                idx += 1;
                continue;
            }
            _ => out.push(ch),
        }
        line_start = false;
        idx += 1;
    }
}

const SYMBOLS: &[(&str, &str)] = &[
    ("times", "times"),
    ("cdot", "dot.op"),
    ("div", "div"),
    ("pm", "plus.minus"),
    ("mp", "minus.plus"),
    ("infty", "infinity"),
    ("leq", "<="),
    ("le", "<="),
    ("geq", ">="),
    ("ge", ">="),
    ("neq", "!="),
    ("ne", "!="),
    ("approx", "approx"),
    ("sim", "tilde.op"),
    ("propto", "prop"),
    ("circ", "compose"),
    ("degree", "degree"),
    ("ldots", "dots"),
    ("dots", "dots"),
    ("cdots", "dots.c"),
    ("partial", "diff"),
    ("nabla", "nabla"),
    ("rightarrow", "arrow.r"),
    ("to", "arrow.r"),
    ("leftarrow", "arrow.l"),
    ("Rightarrow", "arrow.r.double"),
    ("in", "in"),
    ("sum", "sum"),
    ("prod", "product"),
    ("int", "integral"),
    ("langle", "angle.l"),
    ("rangle", "angle.r"),
    ("hbar", "planck.reduce"),
    ("ell", "ell"),
    ("prime", "prime"),
    ("AA", "Å"),
    ("minus", "-"),
];

const FONT_COMMANDS: &[(&str, &str)] = &[
    ("mathrm", "upright"),
    ("mathbf", "bold"),
    ("mathit", "italic"),
    ("mathsf", "sans"),
    ("mathtt", "mono"),
    ("mathcal", "cal"),
    ("mathbb", "bb"),
    ("mathfrak", "frak"),
    ("boldsymbol", "bold"),
];

/// Translate mathtext (a TeX subset) into Typst math syntax.
pub fn convert_math(src: &str) -> String {
    let chars: Vec<char> = src.chars().collect();
    let mut converter = MathConverter {
        chars: &chars,
        pos: 0,
    };
    converter.sequence(false).trim().to_string()
}

struct MathConverter<'a> {
    chars: &'a [char],
    pos: usize,
}

#[derive(Default)]
struct MathOut {
    buf: String,
    last_ident: bool,
    script: bool,
}

impl MathOut {
    fn push_atom(&mut self, atom: &str) {
        let glue = self.last_ident
            || (matches!(self.buf.chars().last(), Some(c) if c.is_alphanumeric())
                && atom.starts_with(|c: char| c.is_alphabetic()));
        if glue && !self.buf.ends_with(' ') {
            self.buf.push(' ');
        }
        self.buf.push_str(atom);
        self.last_ident = false;
        self.script = false;
    }

    fn push_ident(&mut self, ident: &str) {
        if matches!(self.buf.chars().last(), Some(c) if c.is_alphanumeric() || c == ')' || c == '"')
            || self.last_ident
        {
            self.buf.push(' ');
        }
        self.buf.push_str(ident);
        self.last_ident = true;
        self.script = false;
    }

    fn push_raw(&mut self, raw: &str) {
        self.buf.push_str(raw);
        self.last_ident = false;
        self.script = false;
    }

    /// A function call or string that behaves like an identifier for spacing.
    fn push_raw_ident(&mut self, call: &str) {
        let script = self.script;
        if !script {
            self.push_ident(call);
        } else {
            self.buf.push_str(call);
            self.last_ident = true;
            self.script = false;
        }
    }

    fn space(&mut self) {
        if !self.buf.is_empty() && !self.buf.ends_with(' ') {
            self.buf.push(' ');
        }
        self.last_ident = false;
    }
}

impl MathConverter<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn sequence(&mut self, in_group: bool) -> String {
        let mut out = MathOut::default();
        while let Some(ch) = self.peek() {
            match ch {
                '}' if in_group => {
                    self.pos += 1;
                    break;
                }
                '\\' => {
                    self.pos += 1;
                    self.command(&mut out);
                }
                '{' => {
                    self.pos += 1;
                    let inner = self.sequence(true);
                    if out.script {
                        out.push_raw(&format!("({inner})"));
                    } else {
                        out.push_atom(&inner);
                    }
                }
                '^' | '_' => {
                    self.pos += 1;
                    out.buf.push(ch);
                    out.last_ident = false;
                    out.script = true;
                }
                c if c.is_ascii_alphabetic() => {
                    let start = self.pos;
                    let limit = if out.script { 1 } else { usize::MAX };
                    while self.pos - start < limit
                        && self.peek().is_some_and(|c| c.is_ascii_alphabetic())
                    {
                        self.pos += 1;
                    }
                    let run: String = self.chars[start..self.pos].iter().collect();
                    if run.chars().count() == 1 {
                        out.push_atom(&run);
                    } else {
                        out.push_raw_ident(&format!("italic(\"{run}\")"));
                    }
                }
                c if c.is_ascii_digit() => {
                    let start = self.pos;
                    if out.script {
                        self.pos += 1;
                    } else {
                        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
                            self.pos += 1;
                        }
                    }
                    let run: String = self.chars[start..self.pos].iter().collect();
                    out.push_atom(&run);
                }
                c if c.is_whitespace() => {
                    self.pos += 1;
                    out.space();
                }
                '/' | '"' | '#' | '&' | '$' => {
                    self.pos += 1;
                    out.push_raw(&format!("\\{ch}"));
                }
                _ => {
                    self.pos += 1;
                    out.push_raw(&ch.to_string());
                }
            }
        }
        out.buf
    }

    /// Single token or braced group used as a command argument.
    fn argument(&mut self) -> String {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        match self.peek() {
            Some('{') => {
                self.pos += 1;
                self.sequence(true).trim().to_string()
            }
            Some('\\') => {
                self.pos += 1;
                let mut out = MathOut::default();
                self.command(&mut out);
                out.buf
            }
            Some(ch) => {
                self.pos += 1;
                ch.to_string()
            }
            None => String::new(),
        }
    }

    fn raw_argument(&mut self) -> String {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        if self.peek() != Some('{') {
            return self.argument();
        }
        self.pos += 1;
        let start = self.pos;
        let mut depth = 1;
        while let Some(ch) = self.peek() {
            self.pos += 1;
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return self.chars[start..self.pos - 1].iter().collect();
                    }
                }
                _ => {}
            }
        }
        self.chars[start..].iter().collect()
    }

    fn command(&mut self, out: &mut MathOut) {
        let Some(first) = self.peek() else {
            out.push_raw("\\\\");
            return;
        };
        if !first.is_ascii_alphabetic() {
            self.pos += 1;
            match first {
                ',' => out.push_ident("thin"),
                ':' | ';' | '>' => out.push_ident("med"),
                '!' => {}
                ' ' => out.space(),
                '{' | '}' => out.push_raw(&first.to_string()),
                '$' | '#' | '&' | '_' | '\\' => out.push_raw(&format!("\\{first}")),
                other => out.push_raw(&other.to_string()),
            }
            return;
        }
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        match name.as_str() {
            "mathdefault" | "mathregular" | "displaystyle" | "left" | "right" => {
                if matches!(name.as_str(), "mathdefault" | "mathregular") {
                    let inner = self.argument();
                    out.push_atom(&inner);
                }
            }
            "text" | "textrm" | "mbox" => {
                let text = self.raw_argument();
                out.push_raw_ident(&crate::typst::quote(&text));
            }
            "frac" | "dfrac" | "tfrac" => {
                let num = self.argument();
                let den = self.argument();
                out.push_raw_ident(&format!("frac({num}, {den})"));
            }
            "sqrt" => {
                let inner = self.argument();
                out.push_raw_ident(&format!("sqrt({inner})"));
            }
            "quad" | "qquad" => out.push_ident(&name),
            _ => {
                if let Some((_, func)) = FONT_COMMANDS.iter().find(|(cmd, _)| *cmd == name) {
                    let raw = self.raw_argument();
                    let arg = if !raw.is_empty() && raw.chars().all(|c| c.is_alphabetic() || c == ' ') {
                        crate::typst::quote(&raw)
                    } else {
                        convert_math(&raw)
                    };
                    out.push_raw_ident(&format!("{func}({arg})"));
                } else if let Some((_, symbol)) = SYMBOLS.iter().find(|(cmd, _)| *cmd == name) {
                    if symbol.starts_with(|c: char| c.is_ascii_alphabetic()) {
                        out.push_ident(symbol);
                    } else {
                        out.push_raw(symbol);
                    }
                } else {
                    // Greek letters and operators such as \sin share their names.
                    out.push_ident(&name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_mapping() {
        assert_eq!(alignment(HAlign::Left, VAlign::Top), ("left + top".to_string(), false));
        assert_eq!(
            alignment(HAlign::Center, VAlign::Center),
            ("center + horizon".to_string(), false)
        );
        assert_eq!(
            alignment(HAlign::Right, VAlign::CenterBaseline),
            ("right + horizon".to_string(), true)
        );
        assert_eq!(
            alignment(HAlign::Center, VAlign::Baseline),
            ("center + bottom".to_string(), true)
        );
    }

    #[test]
    fn plain_text_is_escaped() {
        assert_eq!(to_content("a_b #1 [x] *y*", true), r"a\_b \#1 \[x\] \*y\*");
        assert_eq!(to_content("- item", true), r"\- item");
        assert_eq!(to_content("a - b", true), "a - b");
        assert_eq!(to_content("https://x.org", true), r"https:\//x.org");
        assert_eq!(to_content("line one\nline two", true), r"line one \ line two");
    }

    #[test]
    fn math_spans_are_converted() {
        assert_eq!(to_content(r"$\mathdefault{10^{2}}$", true), "$10^(2)$");
        assert_eq!(to_content(r"$\mathregular{10^{-1}}$", true), "$10^(-1)$");
        assert_eq!(to_content("$x^2$", true), "$x^2$");
        assert_eq!(to_content(r"$2 \times 10^{-3}$", true), "$2 times 10^(-3)$");
        assert_eq!(to_content(r"Rank $r$", true), "Rank $r$");
        assert_eq!(to_content(r"$f(x)$", true), "$f(x)$");
        assert_eq!(to_content(r"$\alpha + \beta$", true), "$alpha + beta$");
    }

    #[test]
    fn math_fonts_and_fractions() {
        assert_eq!(convert_math(r"\mathrm{kg}"), "upright(\"kg\")");
        assert_eq!(convert_math(r"\frac{a}{b}"), "frac(a, b)");
        assert_eq!(convert_math(r"\sqrt{2}"), "sqrt(2)");
        assert_eq!(convert_math("abc"), "italic(\"abc\")");
        assert_eq!(convert_math(r"a \leq b"), "a <= b");
        assert_eq!(convert_math("a/b"), r"a\/b");
    }

    #[test]
    fn unmatched_dollar_is_literal() {
        assert_eq!(to_content("costs $5", true), r"costs \$5");
        assert_eq!(to_content(r"\$5 and \$6", true), r"\$5 and \$6");
        assert_eq!(to_content("$x$", false), r"\$x\$");
    }

    #[test]
    fn weights_parse_from_names_and_numbers() {
        assert_eq!(FontWeight::from_name("bold"), Some(FontWeight::BOLD));
        assert_eq!(FontWeight::from_name("550"), Some(FontWeight(550)));
        assert_eq!(FontWeight::from_name("wobbly"), None);
        let props: FontProperties = serde_json::from_str(r#"{"weight": "semibold", "size": 8}"#).unwrap();
        assert_eq!(props.weight, FontWeight(600));
        assert_eq!(props.size, 8.0);
    }
}
