use crate::error::Result;
use crate::typst::DEFAULT_PRECISION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variables are looked up with this prefix.
pub const ENV_PREFIX: &str = "TYPST_PLOT_";

const FIELDS: &[&str] = &["preamble", "detached_images", "precision", "parse_math"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Typst code inserted after the prologue, e.g. `#set text(font: "..")`.
    pub preamble: String,
    /// Write raster images as separate PNG files next to the output.
    pub detached_images: bool,
    /// Fractional digits of lengths, angles and colour components.
    pub precision: usize,
    /// Translate `$...$` spans in labels into Typst math.
    pub parse_math: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preamble: String::new(),
            detached_images: false,
            precision: DEFAULT_PRECISION,
            parse_math: true,
        }
    }
}

impl Config {
    /// Build from the keys of `table` that start with `prefix`. Unknown keys
    /// are ignored; with `drop` the unknown prefixed ones are also removed
    /// from `table`.
    pub fn from_table(table: &mut toml::Table, drop: bool, prefix: &str) -> Result<Self> {
        let mut selected = toml::Table::new();
        let mut unknown = Vec::new();
        for (key, value) in table.iter() {
            let Some(name) = key.strip_prefix(prefix) else {
                continue;
            };
            if FIELDS.contains(&name) {
                selected.insert(name.to_string(), value.clone());
            } else {
                unknown.push(key.clone());
            }
        }
        if drop {
            for key in unknown {
                table.remove(&key);
            }
        }
        Ok(toml::Value::Table(selected).try_into()?)
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    pub fn from_toml_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_toml_path(path),
        None => Ok(Config::default()),
    }
}

/// Locate the typst binary: `TYPST_PLOT_COMPILER`, then `PATH`, then a bare
/// `typst` left for the OS to resolve.
pub fn find_compiler() -> PathBuf {
    let default = Path::new("typst");
    if let Some(value) = std::env::var_os(format!("{ENV_PREFIX}COMPILER")) {
        let path = expand_home(Path::new(&value));
        if !path.is_file() {
            log::warn!("no typst compiler is found at {}", path.display());
        }
        return absolute(path);
    }
    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            let candidate = dir.join(default);
            if candidate.is_file() {
                return absolute(candidate);
            }
        }
    }
    log::warn!(
        "typst compiler is not found in PATH; consider setting {ENV_PREFIX}COMPILER to its location"
    );
    default.to_path_buf()
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_table_with_prefix() {
        let mut table: toml::Table = toml::from_str(
            r#"
preamble = "lorem ipsum"
"typst.detached_images" = true
"typst.colour" = "red"
"svg.preamble" = "lorem ipsum"
"#,
        )
        .unwrap();
        let config = Config::from_table(&mut table, false, "typst.").unwrap();
        assert_eq!(config.preamble, "");
        assert!(config.detached_images);
        assert!(table.contains_key("typst.colour"));

        Config::from_table(&mut table, true, "typst.").unwrap();
        assert!(!table.contains_key("typst.colour"));
        assert!(table.contains_key("typst.detached_images"));
        assert!(table.contains_key("svg.preamble"));
    }

    #[test]
    fn from_toml_ignores_unknown_keys() {
        let config = Config::from_toml_str(
            r##"
preamble = '#let hello = ", world!"'
unknown-key = 32
"##,
        )
        .unwrap();
        assert_eq!(config.preamble, r#"#let hello = ", world!""#);
        assert!(!config.detached_images);
        assert_eq!(config.precision, DEFAULT_PRECISION);
        assert!(config.parse_math);
    }

    #[test]
    fn wrong_types_are_errors() {
        assert!(Config::from_toml_str("detached_images = 'yes'").is_err());
    }

    #[test]
    fn home_is_expanded() {
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_home(Path::new("~/bin/typst")), PathBuf::from(home).join("bin/typst"));
        }
        assert_eq!(expand_home(Path::new("/usr/bin/typst")), PathBuf::from("/usr/bin/typst"));
    }
}
