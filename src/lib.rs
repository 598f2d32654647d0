pub mod backend;
pub mod canvas;
#[cfg(feature = "cli")]
pub mod cli;
pub mod color;
pub mod config;
pub mod error;
pub mod figure;
pub mod gc;
pub mod geometry;
pub mod metrics;
pub mod renderer;
pub mod text;
pub mod ticker;
pub mod typst;

pub use backend::Backend;
#[cfg(feature = "cli")]
pub use cli::run;
pub use error::{Error, Result};
pub use figure::Figure;
pub use renderer::{Metadata, TypstRenderer};
