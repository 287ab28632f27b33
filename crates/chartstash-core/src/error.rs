//! Error taxonomy of index synchronization.

use chartstash_schema::IndexError;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::registry::RegistryError;
use crate::resolve::UrlError;
use crate::store::StoreError;

/// Result alias for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Step of an operation a storage failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading the index
    Load,
    /// Writing the index
    Store,
    /// Uploading a chart archive
    Upload,
    /// Deleting a chart archive
    Delete,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Load => "load index",
            Self::Store => "store index",
            Self::Upload => "upload chart",
            Self::Delete => "delete chart",
        })
    }
}

/// Every way a synchronization operation can fail.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Push without `force` of a version the index already has.
    #[error("chart {name}-{version} is already indexed")]
    AlreadyIndexed {
        /// Chart name.
        name: String,
        /// Chart version.
        version: String,
    },

    /// The index changed between load and store (the index path).
    #[error("index {0} is out-of-date")]
    IndexOutOfDate(String),

    /// The chart, or the requested version of it, is not indexed.
    #[error("chart {name}{} not found in index", version.as_ref().map(|v| format!("-{v}")).unwrap_or_default())]
    ChartNotFound {
        /// Chart name.
        name: String,
        /// Requested version, `None` for "any version".
        version: Option<String>,
    },

    /// No repository is registered under this name.
    #[error("repository {0} not found")]
    RepoNotFound(String),

    /// Storage failure while reading or writing the index.
    #[error("{stage}: {source}")]
    Store {
        /// Step that failed.
        stage: Stage,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// The chart archive could not be loaded.
    #[error("load chart: {0}")]
    Archive(#[from] ArchiveError),

    /// The index document could not be parsed or serialized.
    #[error("{0}")]
    Index(#[source] IndexError),

    /// A repository or download URL is malformed.
    #[error("resolve url: {0}")]
    Url(#[from] UrlError),

    /// Helm's repository registry could not be read.
    #[error("repository registry: {0}")]
    Registry(#[from] RegistryError),

    /// The index write succeeded but the archive operation that follows it
    /// did not; the index and storage may now disagree.
    #[error("index updated, but {stage} {path} failed: {source}")]
    ArchiveTransfer {
        /// [`Stage::Upload`] or [`Stage::Delete`].
        stage: Stage,
        /// Storage path of the archive.
        path: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// An archive-only upload whose bytes differ from the indexed entry.
    #[error("chart {name}-{version} is indexed with a different digest")]
    DigestMismatch {
        /// Chart name.
        name: String,
        /// Chart version.
        version: String,
    },

    /// An archive-only delete of a version the index still references.
    #[error("chart {name}-{version} is still indexed")]
    StillIndexed {
        /// Chart name.
        name: String,
        /// Chart version.
        version: String,
    },

    /// The retry loop hit [`SyncOptions::max_attempts`](crate::SyncOptions).
    #[error("index {path} still out-of-date after {attempts} attempts")]
    RetriesExhausted {
        /// Index path.
        path: String,
        /// Attempts made.
        attempts: u32,
    },

    /// The retry loop ran past [`SyncOptions::deadline`](crate::SyncOptions).
    #[error("index {path} still out-of-date after {elapsed_ms}ms")]
    DeadlineExceeded {
        /// Index path.
        path: String,
        /// Time spent in the loop.
        elapsed_ms: u128,
    },
}

/// Payload-free classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)] // mirrors the `SyncError` variants
pub enum ErrorKind {
    AlreadyIndexed,
    IndexOutOfDate,
    ChartNotFound,
    RepoNotFound,
    Storage,
    Archive,
    Index,
    Url,
    Registry,
    ArchiveTransfer,
    DigestMismatch,
    StillIndexed,
    /// Retries exhausted or deadline exceeded
    Contention,
}

impl SyncError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyIndexed { .. } => ErrorKind::AlreadyIndexed,
            Self::IndexOutOfDate(_) => ErrorKind::IndexOutOfDate,
            Self::ChartNotFound { .. } => ErrorKind::ChartNotFound,
            Self::RepoNotFound(_) => ErrorKind::RepoNotFound,
            Self::Store { .. } => ErrorKind::Storage,
            Self::Archive(_) => ErrorKind::Archive,
            Self::Index(_) => ErrorKind::Index,
            Self::Url(_) => ErrorKind::Url,
            Self::Registry(_) => ErrorKind::Registry,
            Self::ArchiveTransfer { .. } => ErrorKind::ArchiveTransfer,
            Self::DigestMismatch { .. } => ErrorKind::DigestMismatch,
            Self::StillIndexed { .. } => ErrorKind::StillIndexed,
            Self::RetriesExhausted { .. } | Self::DeadlineExceeded { .. } => ErrorKind::Contention,
        }
    }

    /// True for the one error the retry loop recovers from.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::IndexOutOfDate(_))
    }

    pub(crate) fn store(stage: Stage, source: StoreError) -> Self {
        Self::Store { stage, source }
    }
}

impl From<IndexError> for SyncError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::ChartNotFound(name) => Self::ChartNotFound {
                name,
                version: None,
            },
            IndexError::VersionNotFound { name, version } => Self::ChartNotFound {
                name,
                version: Some(version),
            },
            other => Self::Index(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_not_found_maps_to_chart_not_found() {
        let err = SyncError::from(IndexError::VersionNotFound {
            name: "foo".into(),
            version: "1.0.0".into(),
        });
        assert_eq!(err.kind(), ErrorKind::ChartNotFound);
        assert_eq!(err.to_string(), "chart foo-1.0.0 not found in index");

        let err = SyncError::from(IndexError::ChartNotFound("foo".into()));
        assert_eq!(err.to_string(), "chart foo not found in index");
    }

    #[test]
    fn test_only_out_of_date_is_conflict() {
        assert!(SyncError::IndexOutOfDate("s3://b/index.yaml".into()).is_conflict());
        assert!(!SyncError::RepoNotFound("stable".into()).is_conflict());
        assert!(
            !SyncError::RetriesExhausted {
                path: "p".into(),
                attempts: 3
            }
            .is_conflict()
        );
    }

    #[test]
    fn test_store_error_names_stage() {
        let err = SyncError::store(Stage::Load, StoreError::NotFound("s3://b/index.yaml".into()));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().starts_with("load index:"));
    }
}
