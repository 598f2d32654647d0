//! Tick labels for logarithmic axes written as Typst math, so that the
//! including document typesets them with its own math font.

fn is_close_to_int(x: f64) -> bool {
    let rounded = x.round();
    (x - rounded).abs() <= 1e-9 * x.abs().max(rounded.abs())
}

/// Format values as `base^exponent`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogFormatter {
    pub base: f64,
    pub label_only_base: bool,
    pub sublabels: Option<Vec<f64>>,
    /// Decades with `|exponent| < min_exponent` are written out in full.
    pub min_exponent: f64,
    /// Non-decade values as `coeff times base^exponent`.
    pub sci_notation: bool,
}

impl Default for LogFormatter {
    fn default() -> Self {
        Self {
            base: 10.0,
            label_only_base: false,
            sublabels: None,
            min_exponent: 0.0,
            sci_notation: false,
        }
    }
}

impl LogFormatter {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    pub fn sci_notation(base: f64) -> Self {
        Self {
            base,
            sci_notation: true,
            ..Self::default()
        }
    }

    pub fn format(&self, value: f64) -> String {
        if value == 0.0 {
            return "$0$".to_string();
        }
        let sign = if value < 0.0 { "-" } else { "" };
        let x = value.abs();
        let b = self.base;

        let mut fx = x.ln() / b.ln();
        let is_decade = is_close_to_int(fx);
        let exponent = if is_decade { fx.round() } else { fx.floor() };
        let coeff = b.powf(fx - exponent).round();

        if self.label_only_base && !is_decade {
            return String::new();
        }
        if let Some(sublabels) = &self.sublabels
            && !sublabels.iter().any(|&label| label == coeff)
        {
            return String::new();
        }
        if is_decade {
            fx = fx.round();
        }

        let base = if b.fract() == 0.0 {
            format!("{b:.0}")
        } else {
            format_g(b)
        };

        if fx.abs() < self.min_exponent {
            format!("${sign}{}$", format_g(x))
        } else if !is_decade {
            self.non_decade(sign, &base, fx)
        } else {
            format!("${sign}{base}^{}$", exponent_term(fx as i64))
        }
    }

    fn non_decade(&self, sign: &str, base: &str, fx: f64) -> String {
        if !self.sci_notation {
            return format!("${sign}{base}^({fx:.2})$");
        }
        let b: f64 = base.parse().unwrap_or(self.base);
        let exponent = fx.floor();
        let mut coeff = b.powf(fx - exponent);
        if is_close_to_int(coeff) {
            coeff = coeff.round();
        }
        format!(
            "${sign}{} times {base}^{}$",
            format_g(coeff),
            exponent_term(exponent as i64)
        )
    }
}

/// Negative exponents need parentheses to stay in the superscript.
fn exponent_term(exponent: i64) -> String {
    if exponent < 0 {
        format!("({exponent})")
    } else {
        exponent.to_string()
    }
}

/// `%g` with six significant digits.
pub fn format_g(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }
    const PRECISION: i32 = 6;
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if (-4..PRECISION).contains(&exp) {
        let decimals = (PRECISION - 1 - exp).max(0) as usize;
        trim_fraction(format!("{value:.decimals$}"))
    } else {
        let mantissa = trim_fraction(mantissa.to_string());
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    }
}

fn trim_fraction(mut text: String) -> String {
    if text.contains('.') {
        let len = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(len);
    }
    text
}
