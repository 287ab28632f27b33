//! Index synchronization engine.
//!
//! Every index mutation is a read-modify-write cycle: load the index and its
//! change token, apply the mutation to the fresh document, then write it back
//! only if the remote index is still in the state the token describes. A
//! write that loses the race fails with [`SyncError::IndexOutOfDate`]; with
//! `retry` the whole cycle runs again against the newer document, bounded by
//! [`SyncOptions`].
//!
//! Archive uploads and deletions happen strictly after the index write they
//! belong to has succeeded.

use std::path::Path;
use std::time::Instant;

use chartstash_schema::{ChartVersion, IndexFile};
use tracing::{debug, info, warn};

use crate::archive::ChartArchive;
use crate::config::SyncOptions;
use crate::error::{Stage, SyncError, SyncResult};
use crate::repo::Repository;
use crate::resolve::{archive_location, resolve_download_url, resolve_reference};
use crate::store::{BlobStore, Precondition, StoreError};

/// Flags for [`IndexSync::push_chart`].
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Replace an already indexed version
    pub force: bool,
    /// Reload and reapply on `IndexOutOfDate`
    pub retry: bool,
    /// Publish a public download URL instead of the storage path
    pub public: bool,
    /// Public base URL; defaults to the bucket's CDN address
    pub public_url: Option<String>,
}

/// Runs index operations against a [`BlobStore`].
#[derive(Debug)]
pub struct IndexSync<S> {
    store: S,
    options: SyncOptions,
}

impl<S: BlobStore> IndexSync<S> {
    /// Create an engine with the default retry bounds.
    pub fn new(store: S) -> Self {
        Self::with_options(store, SyncOptions::default())
    }

    /// Create an engine with explicit retry bounds.
    pub fn with_options(store: S, options: SyncOptions) -> Self {
        Self { store, options }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Retry bounds in use.
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Initialize the repository with an empty index.
    ///
    /// An existing non-empty index is left untouched. Returns whether an
    /// index was written.
    pub async fn create(&self, repo: &mut Repository) -> SyncResult<bool> {
        let path = repo.index_url().to_string();

        let condition = match self.store.get(&path).await {
            Ok(blob) if !blob.data.iter().all(u8::is_ascii_whitespace) => {
                info!(path = %path, "repository already initialized");
                repo.set_token(Some(blob.token));
                return Ok(false);
            }
            Ok(blob) => Precondition::Matches(blob.token),
            Err(StoreError::NotFound(_)) => Precondition::Absent,
            Err(e) => return Err(SyncError::store(Stage::Load, e)),
        };

        let data = IndexFile::new().to_yaml()?;
        match self.store.put(&path, data, &condition).await {
            Ok(()) => {
                info!(path = %path, "initialized repository");
                repo.set_token(None);
                Ok(true)
            }
            // Lost the race to another initializer.
            Err(StoreError::Conflict(_)) => {
                info!(path = %path, "repository initialized concurrently");
                Ok(false)
            }
            Err(e) => Err(SyncError::store(Stage::Store, e)),
        }
    }

    /// Load the index and remember its change token in `repo`.
    pub async fn load_index(&self, repo: &mut Repository) -> SyncResult<IndexFile> {
        let blob = self
            .store
            .get(repo.index_url())
            .await
            .map_err(|e| SyncError::store(Stage::Load, e))?;
        let index = IndexFile::parse(&blob.data)?;

        debug!(
            path = repo.index_url(),
            token = %blob.token,
            charts = index.entries.len(),
            "loaded index"
        );
        repo.set_token(Some(blob.token));
        Ok(index)
    }

    /// Write `index` back, provided the remote index has not changed since
    /// `repo` last loaded it.
    ///
    /// On success the token is consumed: storing again requires a reload.
    pub async fn store_index(&self, repo: &mut Repository, index: &mut IndexFile) -> SyncResult<()> {
        index.sort_entries();
        index.touch();
        let data = index.to_yaml()?;

        let condition = Precondition::from(repo.token().cloned());
        let path = repo.index_url().to_string();
        match self.store.put(&path, data, &condition).await {
            Ok(()) => {
                debug!(path = %path, "stored index");
                repo.set_token(None);
                Ok(())
            }
            Err(StoreError::Conflict(_)) => Err(SyncError::IndexOutOfDate(path)),
            Err(e) => Err(SyncError::store(Stage::Store, e)),
        }
    }

    /// Run `mutate` against the freshly loaded index and store the result.
    ///
    /// With `retry`, an out-of-date write reloads the index and runs `mutate`
    /// again, so every check inside it sees the newest document. Errors from
    /// `mutate` are returned as-is and never retried.
    pub async fn update_index<T, F>(
        &self,
        repo: &mut Repository,
        retry: bool,
        mut mutate: F,
    ) -> SyncResult<T>
    where
        F: FnMut(&mut IndexFile) -> SyncResult<T>,
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let mut index = self.load_index(repo).await?;
            let value = mutate(&mut index)?;

            let err = match self.store_index(repo, &mut index).await {
                Ok(()) => return Ok(value),
                Err(err) if retry && err.is_conflict() => err,
                Err(err) => return Err(err),
            };

            warn!(path = repo.index_url(), attempt, "{err}, retrying");
            if attempt >= self.options.max_attempts {
                return Err(SyncError::RetriesExhausted {
                    path: repo.index_url().to_string(),
                    attempts: attempt,
                });
            }
            if let Some(deadline) = self.options.deadline {
                let elapsed = started.elapsed();
                if elapsed >= deadline {
                    return Err(SyncError::DeadlineExceeded {
                        path: repo.index_url().to_string(),
                        elapsed_ms: elapsed.as_millis(),
                    });
                }
            }
        }
    }

    /// Index the chart archive at `path` and upload it.
    pub async fn push_chart(
        &self,
        repo: &mut Repository,
        path: &Path,
        options: &PushOptions,
    ) -> SyncResult<ChartVersion> {
        let archive = ChartArchive::load(path).await?;
        self.push_archive(repo, archive, options).await
    }

    /// Index an in-memory chart archive and upload it.
    ///
    /// The archive is uploaded only once the index write has succeeded; a
    /// failed upload leaves the new entry in place and is reported as
    /// [`SyncError::ArchiveTransfer`].
    pub async fn push_archive(
        &self,
        repo: &mut Repository,
        archive: ChartArchive,
        options: &PushOptions,
    ) -> SyncResult<ChartVersion> {
        let name = archive.metadata.name.clone();
        let version = archive.metadata.version.clone();
        let download_base = resolve_download_url(
            repo.base_url(),
            options.public,
            options.public_url.as_deref(),
        )?;
        let entry_url = resolve_reference(&download_base, &archive.file_name)?;
        let archive_path = resolve_reference(repo.base_url(), &archive.file_name)?;

        info!(chart = %name, version = %version, digest = %archive.digest, "pushing chart");

        let entry = self
            .update_index(repo, options.retry, |index| {
                if !options.force && index.has(&name, &version) {
                    return Err(SyncError::AlreadyIndexed {
                        name: name.clone(),
                        version: version.clone(),
                    });
                }
                let entry =
                    index.add_or_replace(archive.metadata.clone(), &entry_url, &archive.digest);
                Ok(entry.clone())
            })
            .await?;

        self.upload(&archive_path, archive.data).await?;

        info!(chart = %name, version = %version, url = ?entry.urls, "pushed chart");
        Ok(entry)
    }

    /// Upload an archive that is already indexed, leaving the index alone.
    ///
    /// This finishes a push that failed with [`SyncError::ArchiveTransfer`].
    /// The indexed entry must carry the archive's digest, so a different
    /// build of the same version is never uploaded behind the index's back.
    pub async fn upload_archive(
        &self,
        repo: &mut Repository,
        archive: ChartArchive,
    ) -> SyncResult<String> {
        let name = &archive.metadata.name;
        let version = &archive.metadata.version;

        let index = self.load_index(repo).await?;
        let entry = index
            .get(name, version)
            .ok_or_else(|| SyncError::ChartNotFound {
                name: name.clone(),
                version: Some(version.clone()),
            })?;
        if entry.digest.as_ref() != Some(&archive.digest) {
            return Err(SyncError::DigestMismatch {
                name: name.clone(),
                version: version.clone(),
            });
        }

        let path = resolve_reference(repo.base_url(), &archive.file_name)?;
        self.upload(&path, archive.data).await?;
        info!(chart = %name, version = %version, path = %path, "uploaded indexed chart");
        Ok(path)
    }

    async fn upload(&self, path: &str, data: Vec<u8>) -> SyncResult<()> {
        debug!(path, bytes = data.len(), "uploading chart");
        self.store
            .put(path, data, &Precondition::Any)
            .await
            .map_err(|source| SyncError::ArchiveTransfer {
                stage: Stage::Upload,
                path: path.to_string(),
                source,
            })
    }

    /// Remove one version of a chart, or all of them when `version` is
    /// `None`, then delete the archives. Returns the deleted storage paths.
    ///
    /// Deletion stops at the first failure; the index is already updated by
    /// then and the remaining archives are left in place.
    pub async fn remove_chart(
        &self,
        repo: &mut Repository,
        name: &str,
        version: Option<&str>,
        retry: bool,
    ) -> SyncResult<Vec<String>> {
        info!(chart = %name, version = ?version, "removing chart");

        let urls = self
            .update_index(repo, retry, |index| Ok(index.remove_version(name, version)?))
            .await?;

        let mut paths: Vec<String> = Vec::with_capacity(urls.len());
        for url in &urls {
            let path = archive_location(repo.base_url(), url)?;
            if !paths.contains(&path) {
                paths.push(path);
            }
        }

        for path in &paths {
            self.delete(path).await?;
        }

        info!(chart = %name, deleted = paths.len(), "removed chart");
        Ok(paths)
    }

    /// Delete the archive `<name>-<version>.tgz` of a version that is no
    /// longer indexed, leaving the index alone.
    ///
    /// This finishes a removal that failed with [`SyncError::ArchiveTransfer`].
    /// A version that is still indexed is refused with
    /// [`SyncError::StillIndexed`].
    pub async fn delete_archive(
        &self,
        repo: &mut Repository,
        name: &str,
        version: &str,
    ) -> SyncResult<String> {
        let index = self.load_index(repo).await?;
        if index.has(name, version) {
            return Err(SyncError::StillIndexed {
                name: name.to_string(),
                version: version.to_string(),
            });
        }

        let path = resolve_reference(repo.base_url(), &format!("{name}-{version}.tgz"))?;
        self.delete(&path).await?;
        info!(chart = %name, version = %version, path = %path, "deleted unindexed chart");
        Ok(path)
    }

    async fn delete(&self, path: &str) -> SyncResult<()> {
        debug!(path, "deleting chart");
        self.store
            .delete(path)
            .await
            .map_err(|source| SyncError::ArchiveTransfer {
                stage: Stage::Delete,
                path: path.to_string(),
                source,
            })
    }
}
