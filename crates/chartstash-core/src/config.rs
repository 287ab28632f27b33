//! Storage credentials and retry-loop bounds.

use std::time::Duration;

/// Default S3-compatible endpoint (Baidu BOS, Beijing).
pub const DEFAULT_ENDPOINT: &str = "https://s3.bj.bcebos.com";
/// Default region paired with [`DEFAULT_ENDPOINT`].
pub const DEFAULT_REGION: &str = "bj";

/// Connection settings for S3-compatible object storage.
#[derive(Clone, Default)]
pub struct StoreConfig {
    /// Endpoint URL
    pub endpoint: String,
    /// Signing region
    pub region: String,
    /// Access key id; anonymous when unset
    pub access_key: Option<String>,
    /// Secret access key
    pub secret_key: Option<String>,
    /// Never send `If-Match` / `If-None-Match`; rely on the pre-write check
    /// alone. For endpoints that reject conditional headers.
    pub emulate_conditions: bool,
}

// Keep secrets out of logs.
impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key.as_ref().map(|_| "***"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("emulate_conditions", &self.emulate_conditions)
            .finish()
    }
}

impl StoreConfig {
    /// Load from `CHARTSTASH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            endpoint: non_empty("CHARTSTASH_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            region: non_empty("CHARTSTASH_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key: non_empty("CHARTSTASH_ACCESS_KEY"),
            secret_key: non_empty("CHARTSTASH_SECRET_KEY"),
            emulate_conditions: non_empty("CHARTSTASH_EMULATE_CONDITIONS")
                .is_some_and(|v| matches!(v.as_str(), "1" | "true")),
        }
    }
}

/// Liveness bounds for the conflict-retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Maximum store attempts per operation, including the first
    pub max_attempts: u32,
    /// Bound on the whole loop, checked between attempts
    pub deadline: Option<Duration>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            deadline: Some(Duration::from_secs(60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = StoreConfig::from_lookup(|_| None);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.region, DEFAULT_REGION);
        assert!(config.access_key.is_none());
        assert!(!config.emulate_conditions);
    }

    #[test]
    fn test_reads_overrides() {
        let env: HashMap<&str, &str> = [
            ("CHARTSTASH_ENDPOINT", "http://localhost:9000"),
            ("CHARTSTASH_REGION", ""),
            ("CHARTSTASH_ACCESS_KEY", "ak"),
            ("CHARTSTASH_SECRET_KEY", "sk"),
            ("CHARTSTASH_EMULATE_CONDITIONS", "true"),
        ]
        .into_iter()
        .collect();
        let config = StoreConfig::from_lookup(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.endpoint, "http://localhost:9000");
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.access_key.as_deref(), Some("ak"));
        assert_eq!(config.secret_key.as_deref(), Some("sk"));
        assert!(config.emulate_conditions);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = StoreConfig {
            secret_key: Some("hunter2".into()),
            ..StoreConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
