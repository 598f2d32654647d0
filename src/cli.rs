use crate::canvas::{OutputFormat, print_as, print_typ};
use crate::config::load_config;
use crate::figure::Figure;
use crate::renderer::Metadata;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "typplot", version, about = "Render recorded plot figures as Typst markup, PDF, PNG or SVG")]
pub struct Args {
    /// Figure recording (.json) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file (typ/pdf/png/svg). Markup goes to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format. Inferred from the output extension when omitted.
    #[arg(short = 'e', long = "outputFormat", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Renderer config TOML file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Typst code inserted after the prologue
    #[arg(long)]
    pub preamble: Option<String>,

    /// Write raster images as PNG files next to the output
    #[arg(long = "detached-images")]
    pub detached_images: bool,

    /// Raster resolution for compiled output
    #[arg(long)]
    pub dpi: Option<f64>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub author: Option<String>,

    /// Document date, YYYY-MM-DD
    #[arg(long)]
    pub date: Option<String>,
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(preamble) = &args.preamble {
        config.preamble = preamble.clone();
    }
    if args.detached_images {
        config.detached_images = true;
    }

    let figure = read_figure(args.input.as_deref())?;
    let metadata = merge_metadata(&figure.metadata, &args);
    let format = resolve_format(args.output_format, args.output.as_deref())?;

    match (format, args.output.as_deref()) {
        (OutputFormat::Typ, None) => {
            if config.detached_images {
                return Err(anyhow::anyhow!("--detached-images needs an output path"));
            }
            let stdout = io::stdout();
            let mut out = stdout.lock();
            print_typ(&figure, &mut out, &config, None, &metadata)?;
        }
        (format, Some(output)) => {
            print_as(&figure, format, output, &config, &metadata, args.dpi)
                .with_context(|| format!("failed to render {}", output.display()))?;
        }
        (format, None) => {
            return Err(anyhow::anyhow!(
                "Output path required for {} output",
                format.as_str()
            ));
        }
    }
    Ok(())
}

fn read_figure(path: Option<&Path>) -> Result<Figure> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return Figure::from_path(path).with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Figure::from_json_str(&buf)?)
}

fn resolve_format(explicit: Option<OutputFormat>, output: Option<&Path>) -> Result<OutputFormat> {
    if let Some(format) = explicit {
        return Ok(format);
    }
    match output {
        None => Ok(OutputFormat::Typ),
        Some(path) => OutputFormat::from_path(path).ok_or_else(|| {
            anyhow::anyhow!(
                "Cannot infer output format from {}; pass --outputFormat",
                path.display()
            )
        }),
    }
}

/// Command-line metadata wins over what the recording carries.
fn merge_metadata(recorded: &Metadata, args: &Args) -> Metadata {
    Metadata {
        title: args.title.clone().or_else(|| recorded.title.clone()),
        author: args.author.clone().or_else(|| recorded.author.clone()),
        date: args.date.clone().or_else(|| recorded.date.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_comes_from_flag_then_extension() {
        assert_eq!(resolve_format(None, None).unwrap(), OutputFormat::Typ);
        assert_eq!(resolve_format(None, Some(Path::new("a/b.pdf"))).unwrap(), OutputFormat::Pdf);
        assert_eq!(
            resolve_format(Some(OutputFormat::Svg), Some(Path::new("plot.pdf"))).unwrap(),
            OutputFormat::Svg
        );
        assert!(resolve_format(None, Some(Path::new("plot.eps"))).is_err());
    }

    #[test]
    fn flags_override_recorded_metadata() {
        let args = Args::parse_from(["typplot", "--title", "Flag", "--date", "2024-01-01"]);
        let recorded = Metadata {
            title: Some("Recorded".to_string()),
            author: Some("Someone".to_string()),
            date: None,
        };
        let merged = merge_metadata(&recorded, &args);
        assert_eq!(merged.title.as_deref(), Some("Flag"));
        assert_eq!(merged.author.as_deref(), Some("Someone"));
        assert_eq!(merged.date.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn parses_short_flags() {
        let args = Args::parse_from(["typplot", "-i", "fig.json", "-o", "fig.png", "-e", "png", "--dpi", "150"]);
        assert_eq!(args.input.as_deref(), Some(Path::new("fig.json")));
        assert_eq!(args.output_format, Some(OutputFormat::Png));
        assert_eq!(args.dpi, Some(150.0));
        assert!(!args.detached_images);
    }
}
