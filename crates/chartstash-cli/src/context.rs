//! Process-wide settings and the clients built from them.

use anyhow::{Context as _, Result};
use chartstash_core::{
    IndexSync, ObjectStore, Repository, RepositoryRegistry, StoreConfig, SyncOptions,
};

use crate::Cli;

/// Everything the commands need to know about the environment, resolved once
/// from flags and environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub debug: bool,
    pub store: StoreConfig,
    pub sync: SyncOptions,
}

impl Settings {
    /// Merge command-line flags over `CHARTSTASH_*` environment variables.
    pub fn from_cli(cli: &Cli) -> Self {
        let mut store = StoreConfig::from_env();
        if let Some(endpoint) = &cli.endpoint {
            store.endpoint.clone_from(endpoint);
        }
        if let Some(region) = &cli.region {
            store.region.clone_from(region);
        }
        if cli.ak.is_some() {
            store.access_key.clone_from(&cli.ak);
        }
        if cli.sk.is_some() {
            store.secret_key.clone_from(&cli.sk);
        }

        Self {
            debug: cli.debug,
            store,
            sync: SyncOptions::default(),
        }
    }
}

/// Shared state for one command invocation.
#[derive(Debug)]
pub struct Context {
    pub settings: Settings,
    sync: IndexSync<ObjectStore>,
}

impl Context {
    pub fn new(settings: Settings) -> Self {
        let store = ObjectStore::new(settings.store.clone());
        Self {
            sync: IndexSync::with_options(store, settings.sync),
            settings,
        }
    }

    pub fn sync(&self) -> &IndexSync<ObjectStore> {
        &self.sync
    }

    /// Open `repo`, a base URL or the name of a registered repository.
    pub fn repository(&self, repo: &str) -> Result<Repository> {
        if repo.contains("://") {
            return Ok(Repository::new(repo)?);
        }

        let path = RepositoryRegistry::default_path()?;
        let registry = RepositoryRegistry::load(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Repository::from_registry(repo, &registry)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_flags_override_environment() {
        let cli = Cli::parse_from([
            "chartstash",
            "--endpoint",
            "http://127.0.0.1:9000",
            "--region",
            "us-east-1",
            "--ak",
            "ak",
            "--sk",
            "sk",
            "init",
            "s3://bucket/charts",
        ]);
        let settings = Settings::from_cli(&cli);

        assert_eq!(settings.store.endpoint, "http://127.0.0.1:9000");
        assert_eq!(settings.store.region, "us-east-1");
        assert_eq!(settings.store.access_key.as_deref(), Some("ak"));
        assert_eq!(settings.store.secret_key.as_deref(), Some("sk"));
    }

    #[test]
    fn test_repository_from_url() {
        let cli = Cli::parse_from(["chartstash", "init", "s3://bucket/charts"]);
        let ctx = Context::new(Settings::from_cli(&cli));

        let repo = ctx.repository("bos://bucket/charts").unwrap();
        assert_eq!(repo.index_url(), "bos://bucket/charts/index.yaml");
        assert!(repo.name().is_none());
    }
}
