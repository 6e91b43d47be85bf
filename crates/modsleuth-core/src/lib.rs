/// ModSleuth Core — archive indexing, conflict resolution and asset caching
/// for a vehicle mod catalog.
///
/// This crate contains all business logic with zero UI dependencies. A
/// frontend (the `modsleuth` CLI, or a GUI) drives a [`pipeline::Pipeline`]
/// directly or through the [`monitor`] scheduler and reads the results back
/// with [`catalog::Catalog`].
///
/// # Modules
///
/// - [`config`] — TOML configuration and derived output paths.
/// - [`error`] — Error taxonomy shared by every stage.
/// - [`model`] — Archive records, derived cache names, resolved entries.
/// - [`scanner`] — Archive discovery, structural indexing, `zip_structure.txt`.
/// - [`reserved`] — Stock vehicle names that mods must not claim.
/// - [`resolver`] — Conflict & fallback resolution and catalog rendering.
/// - [`extract`] — Parallel metadata / preview extraction into the cache.
/// - [`pipeline`] — One complete pass, with progress events.
/// - [`monitor`] — Filesystem watching and debounced scheduling.
/// - [`catalog`] — Loading the finalized catalog for display.
/// - [`fsio`] — Atomic file writes.
pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod fsio;
pub mod model;
pub mod monitor;
pub mod pipeline;
pub mod reserved;
pub mod resolver;
pub mod scanner;

pub use config::Config;
pub use error::{ErrorKind, PipelineError, Result};
pub use pipeline::{start_pass, Pipeline};
