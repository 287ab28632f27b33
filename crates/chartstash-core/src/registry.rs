//! Helm's local repository registry (`repositories.yaml`), read-only.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml_ng::Value;
use thiserror::Error;

/// Environment variable Helm uses to relocate the registry file.
pub const REPOSITORY_CONFIG_ENV: &str = "HELM_REPOSITORY_CONFIG";

/// Errors reading the registry file.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The file exists but could not be read.
    #[error("reading repository registry {}: {source}", path.display())]
    Io {
        /// Registry path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The file is not a valid registry document.
    #[error("parsing repository registry {}: {source}", path.display())]
    Parse {
        /// Registry path.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml_ng::Error,
    },

    /// Neither the env override nor a platform config dir is available.
    #[error("cannot locate the helm configuration directory")]
    NoConfigDir,
}

/// One registered repository.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RepositoryEntry {
    /// Name given to `helm repo add`
    pub name: String,
    /// Repository base URL
    pub url: String,
    /// Credentials, CA files and so on; not used here
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Parsed `repositories.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryRegistry {
    #[serde(default)]
    repositories: Vec<RepositoryEntry>,
}

impl RepositoryRegistry {
    /// Registry file location: `$HELM_REPOSITORY_CONFIG`, else
    /// `<config dir>/helm/repositories.yaml`.
    pub fn default_path() -> Result<PathBuf, RegistryError> {
        if let Some(path) = std::env::var_os(REPOSITORY_CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        dirs::config_dir()
            .map(|dir| dir.join("helm").join("repositories.yaml"))
            .ok_or(RegistryError::NoConfigDir)
    }

    /// Load the registry at `path`. A missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(RegistryError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&data).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the registry at [`Self::default_path`].
    pub fn load_default() -> Result<Self, RegistryError> {
        Self::load(&Self::default_path()?)
    }

    fn parse(data: &[u8]) -> Result<Self, serde_yaml_ng::Error> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_slice(data)
    }

    /// Find a repository by name.
    pub fn lookup(&self, name: &str) -> Option<&RepositoryEntry> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// All registered repositories, in file order.
    pub fn repositories(&self) -> &[RepositoryEntry] {
        &self.repositories
    }
}
