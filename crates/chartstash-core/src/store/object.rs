//! `opendal`-backed blob store.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use opendal::services::{Fs, S3};
use opendal::{Capability, ErrorKind, Metadata, Operator};
use tracing::debug;

use super::{
    Blob, BlobPath, BlobStore, ChangeToken, Location, Precondition, StoreError, StoreResult,
    check_precondition, split_path,
};
use crate::config::StoreConfig;

/// Written objects must never be served from an intermediate cache.
const CACHE_CONTROL: &str = "no-cache, max-age=0, no-transform";

/// Tokens built from an object version rather than an ETag.
const VERSION_PREFIX: &str = "version:";

/// Blob store backed by `opendal`: S3-compatible buckets for `s3://`,
/// `bos://` and `bs://` paths, the local filesystem for `file://` paths.
///
/// One operator is built lazily per bucket and reused.
#[derive(Debug)]
pub struct ObjectStore {
    config: StoreConfig,
    operators: Mutex<HashMap<String, Operator>>,
}

impl ObjectStore {
    /// Create a store; operators are built on first use.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            operators: Mutex::new(HashMap::new()),
        }
    }

    fn resolve(&self, path: &str) -> StoreResult<(Operator, String)> {
        let blob_path = split_path(path)?;
        let op = self.operator(&blob_path, path)?;
        Ok((op, blob_path.key))
    }

    fn operator(&self, blob_path: &BlobPath, path: &str) -> StoreResult<Operator> {
        let mut operators = self.operators.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(op) = operators.get(&blob_path.bucket) {
            return Ok(op.clone());
        }

        let op = match blob_path.location {
            Location::Bucket => {
                let mut builder = S3::default()
                    .bucket(&blob_path.bucket)
                    .endpoint(&self.config.endpoint)
                    .region(&self.config.region);
                if let Some(access_key) = &self.config.access_key {
                    builder = builder.access_key_id(access_key);
                }
                if let Some(secret_key) = &self.config.secret_key {
                    builder = builder.secret_access_key(secret_key);
                }
                Operator::new(builder).map(|b| b.finish())
            }
            Location::Local => Operator::new(Fs::default().root("/")).map(|b| b.finish()),
        }
        .map_err(|source| StoreError::Backend {
            path: path.to_string(),
            source,
        })?;

        debug!(bucket = %blob_path.bucket, "initialized storage operator");
        operators.insert(blob_path.bucket.clone(), op.clone());
        Ok(op)
    }

    /// Token for an object whose metadata has already been fetched. Falls
    /// back to fingerprinting `data`, reading the object if none is given.
    async fn token(
        op: &Operator,
        key: &str,
        path: &str,
        meta: &Metadata,
        data: Option<&[u8]>,
    ) -> StoreResult<ChangeToken> {
        if let Some(etag) = meta.etag() {
            return Ok(ChangeToken::new(etag));
        }
        if let Some(version) = meta.version() {
            return Ok(ChangeToken::new(format!("{VERSION_PREFIX}{version}")));
        }
        match data {
            Some(data) => Ok(ChangeToken::fingerprint(data)),
            None => {
                let data = op.read(key).await.map_err(|e| map_error(path, e))?;
                Ok(ChangeToken::fingerprint(&data.to_vec()))
            }
        }
    }
}

/// The ETag a token carries, if it carries one.
fn etag_of(token: &ChangeToken) -> Option<&str> {
    let s = token.as_str();
    if s.starts_with(VERSION_PREFIX) || s.starts_with("sha256:") {
        None
    } else {
        Some(s)
    }
}

/// Conditional header a write carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteCondition<'a> {
    IfNotExists,
    IfMatch(&'a str),
}

/// The header enforcing `condition` natively, when the backend advertises
/// one and `emulate` is off.
fn write_condition<'a>(
    capability: &Capability,
    condition: &'a Precondition,
    emulate: bool,
) -> Option<WriteCondition<'a>> {
    if emulate {
        return None;
    }
    match condition {
        Precondition::Any => None,
        Precondition::Absent => capability
            .write_with_if_not_exists
            .then_some(WriteCondition::IfNotExists),
        Precondition::Matches(token) => etag_of(token)
            .filter(|_| capability.write_with_if_match)
            .map(WriteCondition::IfMatch),
    }
}

fn map_error(path: &str, err: opendal::Error) -> StoreError {
    match err.kind() {
        ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
        ErrorKind::ConditionNotMatch => StoreError::Conflict(path.to_string()),
        _ => StoreError::Backend {
            path: path.to_string(),
            source: err,
        },
    }
}

#[async_trait]
impl BlobStore for ObjectStore {
    async fn get(&self, path: &str) -> StoreResult<Blob> {
        let (op, key) = self.resolve(path)?;

        // Metadata first: the token may then lag the bytes, never lead them.
        let meta = op.stat(&key).await.map_err(|e| map_error(path, e))?;
        let data = op
            .read(&key)
            .await
            .map_err(|e| map_error(path, e))?
            .to_vec();
        let token = Self::token(&op, &key, path, &meta, Some(&data)).await?;

        debug!(path, token = %token, bytes = data.len(), "read object");
        Ok(Blob { data, token })
    }

    async fn head(&self, path: &str) -> StoreResult<Option<ChangeToken>> {
        let (op, key) = self.resolve(path)?;
        let meta = match op.stat(&key).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(map_error(path, e)),
        };
        match Self::token(&op, &key, path, &meta, None).await {
            Ok(token) => Ok(Some(token)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put(&self, path: &str, data: Vec<u8>, condition: &Precondition) -> StoreResult<()> {
        let (op, key) = self.resolve(path)?;
        let capability = op.info().full_capability();

        // Checked even when a conditional header follows: the advertised
        // capability is the service's, not the endpoint's.
        if *condition != Precondition::Any {
            let current = self.head(path).await?;
            debug!(path, current = ?current, "checking precondition");
            check_precondition(path, current.as_ref(), condition)?;
        }

        let mut write = op.write_with(&key, data);
        if capability.write_with_cache_control {
            write = write.cache_control(CACHE_CONTROL);
        }
        let native = write_condition(&capability, condition, self.config.emulate_conditions);
        match native {
            Some(WriteCondition::IfNotExists) => write = write.if_not_exists(true),
            Some(WriteCondition::IfMatch(etag)) => write = write.if_match(etag),
            None => {}
        }

        write.await.map_err(|e| map_error(path, e))?;
        debug!(path, native = ?native, "wrote object");
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let (op, key) = self.resolve(path)?;
        op.delete(&key).await.map_err(|e| map_error(path, e))
    }
}
