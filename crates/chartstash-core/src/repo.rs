//! Repository handles.

use chartstash_schema::INDEX_FILE_NAME;

use crate::error::{SyncError, SyncResult};
use crate::registry::RepositoryRegistry;
use crate::resolve::resolve_reference;
use crate::store::ChangeToken;

/// A chart repository rooted at a base URL.
///
/// A handle belongs to one synchronization session at a time: it carries the
/// change token of the index as last read through it.
#[derive(Debug, Clone)]
pub struct Repository {
    name: Option<String>,
    base_url: String,
    index_url: String,
    token: Option<ChangeToken>,
}

impl Repository {
    /// Open the repository rooted at `base_url`.
    pub fn new(base_url: &str) -> SyncResult<Self> {
        let index_url = resolve_reference(base_url, INDEX_FILE_NAME)?;
        let base_url = resolve_reference(base_url, "")?;
        Ok(Self {
            name: None,
            base_url: base_url.trim_end_matches('/').to_string(),
            index_url,
            token: None,
        })
    }

    /// Open a repository registered under `name`.
    pub fn from_registry(name: &str, registry: &RepositoryRegistry) -> SyncResult<Self> {
        let entry = registry
            .lookup(name)
            .ok_or_else(|| SyncError::RepoNotFound(name.to_string()))?;
        let mut repo = Self::new(&entry.url)?;
        repo.name = Some(name.to_string());
        Ok(repo)
    }

    /// Registered name, if opened through the registry.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the repository's `index.yaml`.
    pub fn index_url(&self) -> &str {
        &self.index_url
    }

    /// Token of the index as last loaded, `None` before the first load.
    pub fn token(&self) -> Option<&ChangeToken> {
        self.token.as_ref()
    }

    pub(crate) fn set_token(&mut self, token: Option<ChangeToken>) {
        self.token = token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_resolves_index() {
        let repo = Repository::new("bos://charts/stable/").unwrap();
        assert_eq!(repo.base_url(), "bos://charts/stable");
        assert_eq!(repo.index_url(), "bos://charts/stable/index.yaml");
        assert!(repo.name().is_none());
        assert!(repo.token().is_none());
    }

    #[test]
    fn test_new_bucket_root() {
        let repo = Repository::new("s3://charts").unwrap();
        assert_eq!(repo.base_url(), "s3://charts");
        assert_eq!(repo.index_url(), "s3://charts/index.yaml");
    }

    #[test]
    fn test_new_rejects_relative() {
        assert!(matches!(
            Repository::new("charts/stable"),
            Err(SyncError::Url(_))
        ));
    }

    #[test]
    fn test_from_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.yaml");
        std::fs::write(
            &path,
            "repositories:\n- name: stable\n  url: bos://charts/stable\n",
        )
        .unwrap();
        let registry = RepositoryRegistry::load(&path).unwrap();

        let repo = Repository::from_registry("stable", &registry).unwrap();
        assert_eq!(repo.name(), Some("stable"));
        assert_eq!(repo.index_url(), "bos://charts/stable/index.yaml");

        assert!(matches!(
            Repository::from_registry("incubator", &registry),
            Err(SyncError::RepoNotFound(name)) if name == "incubator"
        ));
    }
}
