//! A small expression tree for Typst code and a writer that lays it out.
//!
//! Only the handful of constructs a figure needs are modelled: literals,
//! lengths and angles, arrays, dictionaries, function calls, content blocks
//! and code blocks.

use std::fmt;

pub const DEFAULT_PRECISION: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Pt,
    Cm,
    Mm,
    In,
    Em,
    Px,
    Deg,
    Rad,
    Percent,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Pt => "pt",
            Unit::Cm => "cm",
            Unit::Mm => "mm",
            Unit::In => "in",
            Unit::Em => "em",
            Unit::Px => "px",
            Unit::Deg => "deg",
            Unit::Rad => "rad",
            Unit::Percent => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    None,
    Auto,
    Bool(bool),
    Int(i64),
    Scalar(f64, Option<Unit>),
    /// Quoted string literal.
    Str(String),
    /// Verbatim code, e.g. `center + horizon`.
    Raw(String),
    /// Markup between square brackets. The text must already be escaped.
    Content(String),
    Array(Vec<Expr>),
    Dict(Vec<(String, Expr)>),
    Call(Call),
    Block(Vec<Expr>),
}

impl Expr {
    pub fn pt(value: f64) -> Self {
        Expr::Scalar(value, Some(Unit::Pt))
    }

    pub fn inches(value: f64) -> Self {
        Expr::Scalar(value, Some(Unit::In))
    }

    pub fn deg(value: f64) -> Self {
        Expr::Scalar(value, Some(Unit::Deg))
    }

    pub fn percent(value: f64) -> Self {
        Expr::Scalar(value, Some(Unit::Percent))
    }

    pub fn float(value: f64) -> Self {
        Expr::Scalar(value, None)
    }

    pub fn str(value: impl Into<String>) -> Self {
        Expr::Str(value.into())
    }

    pub fn raw(value: impl Into<String>) -> Self {
        Expr::Raw(value.into())
    }

    /// A point `(x, y)` in inches.
    pub fn point(x: f64, y: f64) -> Self {
        Expr::Array(vec![Expr::inches(x), Expr::inches(y)])
    }

    pub fn write_to(&self, writer: &mut Writer) {
        match self {
            Expr::None => writer.write("none"),
            Expr::Auto => writer.write("auto"),
            Expr::Bool(value) => writer.write(if *value { "true" } else { "false" }),
            Expr::Int(value) => writer.write(&value.to_string()),
            Expr::Scalar(value, unit) => {
                let number = format_number(*value, writer.precision);
                match unit {
                    // `float.nan` and `float.inf` cannot take a unit suffix.
                    Some(unit) if !value.is_finite() => {
                        writer.write(&format!("({number} * 1{})", unit.as_str()))
                    }
                    Some(unit) => writer.write(&format!("{number}{}", unit.as_str())),
                    None => writer.write(&number),
                }
            }
            Expr::Str(value) => writer.write(&quote(value)),
            Expr::Raw(value) => writer.write(value),
            Expr::Content(value) => {
                writer.write("[");
                writer.write(value);
                writer.write("]");
            }
            Expr::Array(items) => {
                writer.write("(");
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        writer.write(", ");
                    }
                    item.write_to(writer);
                }
                if items.len() == 1 {
                    writer.write(",");
                }
                writer.write(")");
            }
            Expr::Dict(entries) => {
                if entries.is_empty() {
                    writer.write("(:)");
                    return;
                }
                writer.write("(");
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        writer.write(", ");
                    }
                    writer.write(&format!("{key}: "));
                    value.write_to(writer);
                }
                writer.write(")");
            }
            Expr::Call(call) => call.write_to(writer),
            Expr::Block(exprs) => {
                if exprs.is_empty() {
                    writer.write("{}");
                    return;
                }
                writer.writeln("{");
                writer.indented(|writer| {
                    for expr in exprs {
                        expr.write_to(writer);
                        writer.newline();
                    }
                });
                writer.write("}");
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = Writer::new(DEFAULT_PRECISION);
        self.write_to(&mut writer);
        f.write_str(writer.as_str())
    }
}

impl From<Call> for Expr {
    fn from(call: Call) -> Self {
        Expr::Call(call)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Bool(value)
    }
}

impl<T: Into<Expr>> From<Option<T>> for Expr {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Expr::None)
    }
}

/// Function call with positional arguments followed by named ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
    pub kwargs: Vec<(String, Expr)>,
}

impl Call {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kwargs: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Expr>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: &str, value: impl Into<Expr>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert a named argument, replacing an existing one in place.
    pub fn set(&mut self, key: &str, value: impl Into<Expr>) {
        let value = value.into();
        if let Some(slot) = self.kwargs.iter_mut().find(|(name, _)| name == key) {
            slot.1 = value;
        } else {
            self.kwargs.push((key.to_string(), value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Expr> {
        self.kwargs
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    fn write_to(&self, writer: &mut Writer) {
        if self.args.is_empty() && self.kwargs.is_empty() {
            writer.write(&format!("{}()", self.name));
            return;
        }
        writer.write(&format!("{}(", self.name));
        writer.indented(|writer| {
            writer.newline();
            for (idx, arg) in self.args.iter().enumerate() {
                if idx > 0 {
                    writer.writeln(",");
                }
                arg.write_to(writer);
            }
            if !self.args.is_empty() && !self.kwargs.is_empty() {
                writer.writeln(",");
            }
            for (idx, (key, value)) in self.kwargs.iter().enumerate() {
                if idx > 0 {
                    writer.writeln(",");
                }
                writer.write(&format!("{key}: "));
                value.write_to(writer);
            }
        });
        writer.write(")");
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = Writer::new(DEFAULT_PRECISION);
        self.write_to(&mut writer);
        f.write_str(writer.as_str())
    }
}

/// Indentation-aware text sink. Two spaces per nesting level.
#[derive(Debug)]
pub struct Writer {
    buf: String,
    depth: usize,
    indented: bool,
    precision: usize,
}

impl Writer {
    pub fn new(precision: usize) -> Self {
        Self {
            buf: String::new(),
            depth: 0,
            indented: false,
            precision,
        }
    }

    pub fn write(&mut self, content: &str) {
        if !self.indented {
            self.indented = true;
            for _ in 0..self.depth {
                self.buf.push_str("  ");
            }
        }
        self.buf.push_str(content);
    }

    pub fn writeln(&mut self, content: &str) {
        if !content.is_empty() {
            self.write(content);
        }
        self.newline();
    }

    pub fn newline(&mut self) {
        self.buf.push('\n');
        self.indented = false;
    }

    pub fn indented<F: FnOnce(&mut Self)>(&mut self, f: F) {
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

/// Shortest decimal form with at most `precision` fractional digits.
pub fn format_number(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "float.nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "float.inf" } else { "-float.inf" }.to_string();
    }
    let mut text = format!("{value:.precision$}");
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}
