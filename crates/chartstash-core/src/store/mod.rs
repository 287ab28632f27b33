//! Remote blob storage.
//!
//! The [`BlobStore`] trait is the seam between the synchronization engine and
//! whatever actually holds the bytes. Every read hands back a [`ChangeToken`]
//! describing the state that was read, and every write takes a
//! [`Precondition`] the store must enforce (natively when it can, by
//! re-reading and comparing when it cannot).

mod memory;
mod object;

pub use memory::MemoryStore;
pub use object::ObjectStore;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chartstash_schema::Sha256Digest;
use thiserror::Error;
use url::Url;

/// Result alias for blob store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Blob store failures. Every variant names the blob path.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No blob at the path.
    #[error("object {0} not found")]
    NotFound(String),

    /// A write precondition did not hold.
    #[error("object {0} was modified since it was read")]
    Conflict(String),

    /// The path is not a supported blob URL.
    #[error("incorrect url {0:?}, should be \"s3://bucket/path\" or \"file:///path\"")]
    InvalidPath(String),

    /// Any other backend failure.
    #[error("storage backend error on {path}: {source}")]
    Backend {
        /// Blob path.
        path: String,
        /// Underlying `opendal` error.
        #[source]
        source: opendal::Error,
    },
}

impl StoreError {
    /// True for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True for [`StoreError::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Opaque marker of a blob's remote state at read time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeToken(String);

impl ChangeToken {
    /// Wrap a backend-provided token (an ETag, for instance).
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Token derived from content alone, for backends that expose neither
    /// an ETag nor an object version.
    pub fn fingerprint(data: &[u8]) -> Self {
        Self(format!("sha256:{}", Sha256Digest::compute(data)))
    }

    /// The token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Condition a write must satisfy against the blob's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional overwrite
    Any,
    /// The blob must not exist yet
    Absent,
    /// The blob must still be in the state the token was taken from
    Matches(ChangeToken),
}

impl From<Option<ChangeToken>> for Precondition {
    fn from(token: Option<ChangeToken>) -> Self {
        token.map_or(Self::Absent, Self::Matches)
    }
}

/// Bytes of a blob together with the state they were read at.
#[derive(Debug, Clone)]
pub struct Blob {
    /// Blob contents
    pub data: Vec<u8>,
    /// State `data` was read at
    pub token: ChangeToken,
}

/// Storage the synchronization engine reads and writes through.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a blob. The token never describes a newer state than `data`, so a
    /// write conditioned on it can only fail spuriously, never overwrite
    /// unseen changes.
    async fn get(&self, path: &str) -> StoreResult<Blob>;

    /// Current token of a blob, `None` when it does not exist.
    async fn head(&self, path: &str) -> StoreResult<Option<ChangeToken>>;

    /// Write a blob, failing with [`StoreError::Conflict`] when `condition`
    /// does not hold.
    async fn put(&self, path: &str, data: Vec<u8>, condition: &Precondition) -> StoreResult<()>;

    /// Delete a blob. Deleting a missing blob is not an error.
    async fn delete(&self, path: &str) -> StoreResult<()>;
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn get(&self, path: &str) -> StoreResult<Blob> {
        (**self).get(path).await
    }

    async fn head(&self, path: &str) -> StoreResult<Option<ChangeToken>> {
        (**self).head(path).await
    }

    async fn put(&self, path: &str, data: Vec<u8>, condition: &Precondition) -> StoreResult<()> {
        (**self).put(path, data, condition).await
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        (**self).delete(path).await
    }
}

/// Check `condition` against a freshly observed token.
///
/// This is the best-effort path for backends without conditional writes: it
/// narrows the race window to the gap between this check and the write.
pub fn check_precondition(
    path: &str,
    current: Option<&ChangeToken>,
    condition: &Precondition,
) -> StoreResult<()> {
    let holds = match condition {
        Precondition::Any => true,
        Precondition::Absent => current.is_none(),
        Precondition::Matches(expected) => current == Some(expected),
    };
    if holds {
        Ok(())
    } else {
        Err(StoreError::Conflict(path.to_string()))
    }
}

/// Read the full contents of a blob.
pub async fn fetch<S: BlobStore + ?Sized>(store: &S, path: &str) -> StoreResult<Vec<u8>> {
    Ok(store.get(path).await?.data)
}

/// Which backend a path addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// S3-compatible object storage
    Bucket,
    /// Local filesystem
    Local,
}

/// A blob URL split into its bucket and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPath {
    /// Backend the path addresses
    pub location: Location,
    /// Bucket name, empty for local paths
    pub bucket: String,
    /// Object key, or the absolute file path without its leading `/`
    pub key: String,
}

/// Split `s3://bucket/key` (also `bos://`, `bs://`) or `file:///path` into a
/// [`BlobPath`].
pub fn split_path(path: &str) -> StoreResult<BlobPath> {
    let invalid = || StoreError::InvalidPath(path.to_string());
    let url = Url::parse(path).map_err(|_| invalid())?;

    let location = match url.scheme() {
        "s3" | "bos" | "bs" => Location::Bucket,
        "file" => Location::Local,
        _ => return Err(invalid()),
    };

    let bucket = url.host_str().unwrap_or_default().to_string();
    if location == Location::Bucket && bucket.is_empty() {
        return Err(invalid());
    }

    // Keys are stored unescaped: `my%20chart.tgz` is the object `my chart.tgz`.
    let key = urlencoding::decode(url.path().trim_start_matches('/'))
        .map_err(|_| invalid())?
        .into_owned();
    if key.is_empty() {
        return Err(invalid());
    }

    Ok(BlobPath {
        location,
        bucket,
        key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path_buckets() {
        for scheme in ["s3", "bos", "bs"] {
            let p = split_path(&format!("{scheme}://charts/stable/index.yaml")).unwrap();
            assert_eq!(p.location, Location::Bucket);
            assert_eq!(p.bucket, "charts");
            assert_eq!(p.key, "stable/index.yaml");
        }
    }

    #[test]
    fn test_split_path_unescapes_key() {
        let p = split_path("s3://charts/stable/my%20chart-1.0.0.tgz").unwrap();
        assert_eq!(p.key, "stable/my chart-1.0.0.tgz");

        let p = split_path("s3://charts/stable/my chart-1.0.0.tgz").unwrap();
        assert_eq!(p.key, "stable/my chart-1.0.0.tgz");
    }

    #[test]
    fn test_split_path_local() {
        let p = split_path("file:///tmp/repo/index.yaml").unwrap();
        assert_eq!(p.location, Location::Local);
        assert_eq!(p.bucket, "");
        assert_eq!(p.key, "tmp/repo/index.yaml");
    }

    #[test]
    fn test_split_path_rejects() {
        for bad in [
            "gs://bucket/key",
            "s3://bucket",
            "s3://bucket/",
            "bucket/key",
            "https://bucket/key",
        ] {
            assert!(
                matches!(split_path(bad), Err(StoreError::InvalidPath(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_check_precondition() {
        let a = ChangeToken::new("a");
        let b = ChangeToken::new("b");

        assert!(check_precondition("p", None, &Precondition::Any).is_ok());
        assert!(check_precondition("p", None, &Precondition::Absent).is_ok());
        assert!(check_precondition("p", Some(&a), &Precondition::Absent).is_err());
        assert!(check_precondition("p", Some(&a), &Precondition::Matches(a.clone())).is_ok());
        assert!(check_precondition("p", Some(&b), &Precondition::Matches(a.clone())).is_err());
        assert!(check_precondition("p", None, &Precondition::Matches(a)).is_err());
    }

    #[test]
    fn test_fingerprint_is_content_addressed() {
        assert_eq!(ChangeToken::fingerprint(b"x"), ChangeToken::fingerprint(b"x"));
        assert_ne!(ChangeToken::fingerprint(b"x"), ChangeToken::fingerprint(b"y"));
        assert!(ChangeToken::fingerprint(b"").as_str().starts_with("sha256:"));
    }
}
