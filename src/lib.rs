pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod matching;
pub mod prompt;
pub mod resolver;
pub mod result_log;
pub mod sample;

pub use app::{BrandcapApp, CaptionInput, CaptionOutcome};
pub use catalog::{Catalog, CatalogEntry, CatalogLoadReport};
pub use config::{Config, ConfigManager};
pub use error::{CaptionError, ResolveError};
pub use matching::MatchMode;
pub use prompt::Tone;
pub use resolver::{CaptionRequest, CaptionResolver, CaptionResult, CaptionSource};
