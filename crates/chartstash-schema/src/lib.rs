//! Shared types for chartstash: the chart repository index document and the
//! digests recorded in it.
//!
//! The index is the Helm `index.yaml` format. Everything here is pure data
//! manipulation; reading and writing the document remotely lives in
//! `chartstash-core`.

pub mod hash;
pub mod index;
pub mod version;

// Re-exports
pub use hash::{DigestError, Sha256Digest};
pub use index::{ChartMetadata, ChartVersion, IndexError, IndexFile};
pub use version::compare_versions;

/// File name of the index document at the root of every chart repository.
pub const INDEX_FILE_NAME: &str = "index.yaml";

/// `apiVersion` written into freshly created index documents.
pub const INDEX_API_VERSION: &str = "v1";
