/// Error taxonomy for the ingestion pipeline.
///
/// Almost every variant is *per-unit*: it is recorded against one archive,
/// one manifest line or one cache file, counted, logged, and the batch moves
/// on. Only the variants for which [`PipelineError::is_fatal`] returns `true`
/// abort a pass.
use std::io;
use std::path::PathBuf;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Broad error category, used for counting and summary output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SourceNotFound,
    CorruptArchive,
    MalformedManifestLine,
    AssetProcessingFailure,
    IoFailure,
    /// A directory-level precondition failed; the pass is abandoned.
    Fatal,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::SourceNotFound => "source not found",
            Self::CorruptArchive => "corrupt archive",
            Self::MalformedManifestLine => "malformed manifest line",
            Self::AssetProcessingFailure => "asset processing failure",
            Self::IoFailure => "I/O failure",
            Self::Fatal => "fatal",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("archive not found: {}", path.display())]
    ArchiveNotFound { path: PathBuf },

    #[error("`{entry}` not found inside {archive}")]
    EntryNotFound { archive: String, entry: String },

    #[error("corrupt or unreadable archive {}: {source}", path.display())]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("malformed line {line}: {text:?}")]
    MalformedManifestLine { line: usize, text: String },

    #[error("failed to process image `{entry}` from {archive}: {source}")]
    AssetProcessing {
        archive: String,
        entry: String,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("input manifest is missing: {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("cache directory {} cannot be created: {source}", path.display())]
    CacheUncreatable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Wrap an `io::Error` together with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArchiveNotFound { .. } | Self::EntryNotFound { .. } => ErrorKind::SourceNotFound,
            Self::CorruptArchive { .. } => ErrorKind::CorruptArchive,
            Self::MalformedManifestLine { .. } => ErrorKind::MalformedManifestLine,
            Self::AssetProcessing { .. } => ErrorKind::AssetProcessingFailure,
            Self::Io { .. } => ErrorKind::IoFailure,
            Self::ManifestMissing(_) | Self::CacheUncreatable { .. } | Self::Config(_) => {
                ErrorKind::Fatal
            }
        }
    }

    /// `true` when the error invalidates the whole pass rather than one unit.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_unit_errors_are_not_fatal() {
        let missing = PipelineError::EntryNotFound {
            archive: "cars.zip".into(),
            entry: "vehicles/roamer/info.json".into(),
        };
        assert_eq!(missing.kind(), ErrorKind::SourceNotFound);
        assert!(!missing.is_fatal());

        let io = PipelineError::io("/tmp/x", io::Error::other("boom"));
        assert_eq!(io.kind(), ErrorKind::IoFailure);
        assert!(!io.is_fatal());
    }

    #[test]
    fn directory_preconditions_are_fatal() {
        assert!(PipelineError::ManifestMissing(PathBuf::from("zip_structure.txt")).is_fatal());
        assert!(PipelineError::Config("workers must be > 0".into()).is_fatal());
    }

    #[test]
    fn display_includes_context() {
        let err = PipelineError::MalformedManifestLine {
            line: 7,
            text: "garbage".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains("garbage"));
    }
}
