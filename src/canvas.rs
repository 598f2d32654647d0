//! Output surfaces: Typst markup directly, or PDF/PNG/SVG by running the
//! typst compiler on the generated markup.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{Config, find_compiler};
use crate::error::{Diagnostic, Error, RenderingError, Result};
use crate::figure::Figure;
use crate::renderer::{Metadata, TypstRenderer};

/// Author recorded in compiled documents that do not name one.
pub const DEFAULT_AUTHOR: &str = "typst-plot-backend";

static DIAGNOSTIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<filename>.*):(?P<line>\d+):(?P<column>\d+): error: (?P<reason>.*)$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    Typ,
    Pdf,
    Png,
    Svg,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Typ => "typ",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "typ" | "typst" => Ok(OutputFormat::Typ),
            "pdf" => Ok(OutputFormat::Pdf),
            "png" => Ok(OutputFormat::Png),
            "svg" => Ok(OutputFormat::Svg),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Render `figure` as Typst markup into `out`. `path` is where the markup
/// ends up; detached images are written next to it.
pub fn print_typ<W: Write>(
    figure: &Figure,
    out: &mut W,
    config: &Config,
    path: Option<&Path>,
    metadata: &Metadata,
) -> Result<()> {
    let mut renderer = TypstRenderer::new(figure.width, figure.height, figure.dpi, config.clone())
        .with_metadata(metadata.clone());
    if let Some(path) = path {
        renderer = renderer.with_output_path(path);
    }
    renderer.begin(out)?;
    figure.draw(&mut renderer)?;
    renderer.finish(out)?;
    out.flush()?;
    Ok(())
}

pub fn print_typ_file(figure: &Figure, path: &Path, config: &Config, metadata: &Metadata) -> Result<()> {
    create_parent(path)?;
    let file = fs::File::create(path)?;
    let mut out = BufWriter::new(file);
    print_typ(figure, &mut out, config, Some(path), metadata)
}

/// Handle on a typst executable.
#[derive(Debug, Clone)]
pub struct Compiler {
    path: PathBuf,
}

impl Compiler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// See [`find_compiler`].
    pub fn locate() -> Self {
        Self::new(find_compiler())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compile `root/input` into `root/output`.
    pub fn compile(&self, root: &Path, input: &str, output: &str, format: OutputFormat, ppi: f64) -> Result<()> {
        log::debug!("running {} compile on {}", self.path.display(), root.join(input).display());
        let result = Command::new(&self.path)
            .current_dir(root)
            .arg("compile")
            .arg(format!("--root={}", root.display()))
            .arg(format!("--format={}", format.as_str()))
            .arg("--diagnostic-format=short")
            .arg(format!("--ppi={}", ppi.round()))
            .arg(input)
            .arg(output)
            .output()
            .map_err(|source| Error::CompilerLaunch {
                path: self.path.clone(),
                source,
            })?;
        if result.status.success() {
            return Ok(());
        }
        let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
        let errors = parse_diagnostics(&stderr);
        Err(RenderingError {
            stdout,
            stderr,
            errors,
        }
        .into())
    }
}

pub fn parse_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    stderr
        .lines()
        .filter_map(|line| {
            let caps = DIAGNOSTIC_RE.captures(line.trim_end())?;
            Some(Diagnostic {
                filename: caps["filename"].to_string(),
                line: caps["line"].parse().ok()?,
                column: caps["column"].parse().ok()?,
                reason: caps["reason"].to_string(),
            })
        })
        .collect()
}

/// Render `figure` to `out_path` in `format`, using the compiler found by
/// [`find_compiler`] for anything but markup.
pub fn print_as(
    figure: &Figure,
    format: OutputFormat,
    out_path: &Path,
    config: &Config,
    metadata: &Metadata,
    dpi: Option<f64>,
) -> Result<()> {
    if format == OutputFormat::Typ {
        return print_typ_file(figure, out_path, config, metadata);
    }
    print_with(&Compiler::locate(), figure, format, out_path, config, metadata, dpi)
}

/// Like [`print_as`] with an explicit compiler.
pub fn print_with(
    compiler: &Compiler,
    figure: &Figure,
    format: OutputFormat,
    out_path: &Path,
    config: &Config,
    metadata: &Metadata,
    dpi: Option<f64>,
) -> Result<()> {
    if format == OutputFormat::Typ {
        return print_typ_file(figure, out_path, config, metadata);
    }
    let mut metadata = metadata.clone();
    if metadata.author.is_none() {
        metadata.author = Some(DEFAULT_AUTHOR.to_string());
    }

    let tmp = tempfile::tempdir()?;
    let input = "main.typ";
    let output = format!("main.{}", format.as_str());
    print_typ_file(figure, &tmp.path().join(input), config, &metadata)?;
    compiler.compile(tmp.path(), input, &output, format, dpi.unwrap_or(figure.dpi))?;

    create_parent(out_path)?;
    move_file(&tmp.path().join(&output), out_path)?;
    log::info!("wrote {}", out_path.display());
    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Rename, or copy when the temp dir sits on another filesystem.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_from_names_and_paths() {
        assert_eq!("PDF".parse::<OutputFormat>().unwrap(), OutputFormat::Pdf);
        assert_eq!(OutputFormat::from_path(Path::new("out/plot.svg")), Some(OutputFormat::Svg));
        assert_eq!(OutputFormat::from_path(Path::new("plot.typ")), Some(OutputFormat::Typ));
        assert_eq!(OutputFormat::from_path(Path::new("plot")), None);
        assert!(matches!("eps".parse::<OutputFormat>(), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn diagnostics_are_parsed_from_short_format() {
        let stderr = "\
main.typ:12:5: error: unknown variable: foo
main.typ:3:1: warning: unused import
/tmp/x/main.typ:40:18: error: expected length, found string
";
        let errors = parse_diagnostics(stderr);
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors[0],
            Diagnostic {
                filename: "main.typ".to_string(),
                line: 12,
                column: 5,
                reason: "unknown variable: foo".to_string(),
            }
        );
        assert_eq!(errors[1].filename, "/tmp/x/main.typ");
        assert_eq!(errors[1].column, 18);
    }

    #[test]
    fn rendering_error_lists_diagnostics() {
        let err = RenderingError {
            stdout: String::new(),
            stderr: String::new(),
            errors: parse_diagnostics("main.typ:1:2: error: oops\n"),
        };
        assert_eq!(
            err.to_string(),
            "Typst renderer failed with 1 errors. They are shown below\n  main.typ:1:2: oops"
        );
    }

    #[test]
    fn missing_compiler_is_a_launch_error() {
        let tmp = tempfile::tempdir().unwrap();
        let compiler = Compiler::new(tmp.path().join("no-such-typst"));
        let result = compiler.compile(tmp.path(), "main.typ", "main.pdf", OutputFormat::Pdf, 72.0);
        assert!(matches!(result, Err(Error::CompilerLaunch { .. })));
    }
}
