use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid figure recording: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to encode raster image: {0}")]
    Png(#[from] png::EncodingError),
    #[error("invalid colour: {0}")]
    InvalidColor(String),
    #[error("malformed path: {0}")]
    MalformedPath(String),
    #[error("malformed quad mesh: {0}")]
    MalformedMesh(String),
    #[error("malformed image: {0}")]
    MalformedImage(String),
    #[error("wrong date format in metadata: {0}")]
    InvalidDate(String),
    #[error("cannot save raster image files to filesystem since target directory is not specified")]
    MissingOutputPath,
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to run typst compiler at {path}: {source}")]
    CompilerLaunch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Rendering(#[from] RenderingError),
}

/// One `file:line:column: error: reason` line of compiler output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub filename: String,
    pub line: usize,
    pub column: usize,
    pub reason: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: {}", self.filename, self.line, self.column, self.reason)
    }
}

/// The typst binary exited with a failure status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderingError {
    pub stdout: String,
    pub stderr: String,
    pub errors: Vec<Diagnostic>,
}

impl fmt::Display for RenderingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Typst renderer failed with {} errors. They are shown below",
            self.errors.len()
        )?;
        for error in &self.errors {
            write!(f, "\n  {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RenderingError {}
