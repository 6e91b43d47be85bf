/// Scanner module — finds archives on disk and builds their structural index.
///
/// - [`locator`] walks the roots with `jwalk` and returns archive paths with
///   modification times.
/// - [`indexer`] opens each archive and classifies its entries.
/// - [`manifest`] reads and writes the text form of the index.
pub mod indexer;
pub mod locator;
pub mod manifest;

pub use indexer::{index_archives, IndexReport};
pub use locator::{locate_archives, normalize_key, LocatedArchive};
