//! Chart repository index definition and YAML serialization.
//!
//! The document is the Helm `index.yaml` format: a map from chart name to the
//! list of indexed versions of that chart. Keys this crate does not model are
//! carried through untouched so that rewriting an index produced by another
//! tool never drops information.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml_ng::Value;
use thiserror::Error;

use crate::INDEX_API_VERSION;
use crate::hash::Sha256Digest;
use crate::version::compare_versions;

/// Errors reading, writing or editing an index document.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The bytes are not a valid index document.
    #[error("unmarshal index: {0}")]
    Parse(#[source] serde_yaml_ng::Error),

    /// The index could not be serialized.
    #[error("marshal index: {0}")]
    Serialize(#[source] serde_yaml_ng::Error),

    /// No entry for this chart name.
    #[error("chart \"{0}\" not found")]
    ChartNotFound(String),

    /// The chart is indexed but not at this version.
    #[error("chart \"{name}\" has no version {version}")]
    VersionNotFound {
        /// Chart name.
        name: String,
        /// Requested version.
        version: String,
    },
}

/// Chart metadata as declared in the chart's own `Chart.yaml`.
///
/// Only identity fields are typed. Everything else (`appVersion`, `keywords`,
/// `maintainers`, ...) is kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart name (e.g. "nginx")
    pub name: String,

    /// Chart version (e.g. "1.2.3")
    pub version: String,

    /// Chart API version ("v1" or "v2")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// One-line chart description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Remaining `Chart.yaml` keys, not interpreted
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ChartMetadata {
    /// Create metadata carrying only a name and a version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }
}

/// One indexed (name, version) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartVersion {
    /// Metadata copied from the chart archive
    #[serde(flatten)]
    pub metadata: ChartMetadata,

    /// Download URLs (chartstash always writes exactly one)
    #[serde(default)]
    pub urls: Vec<String>,

    /// When this entry was indexed
    #[serde(default)]
    pub created: DateTime<FixedOffset>,

    /// Helm's soft-delete marker; never set by chartstash
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub removed: bool,

    /// SHA256 of the archive file, validated on load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Sha256Digest>,
}

impl ChartVersion {
    /// Build an entry for an archive downloadable from `url`.
    pub fn new(metadata: ChartMetadata, url: impl Into<String>, digest: Sha256Digest) -> Self {
        Self {
            metadata,
            urls: vec![url.into()],
            created: DateTime::<FixedOffset>::from(Utc::now()),
            removed: false,
            digest: Some(digest),
        }
    }

    /// Chart name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Chart version.
    pub fn version(&self) -> &str {
        &self.metadata.version
    }
}

fn default_api_version() -> String {
    INDEX_API_VERSION.to_string()
}

fn nullable_entries<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<ChartVersion>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// The chart repository index document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    /// Index format version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Chart name -> versions, kept sorted newest first
    #[serde(default, deserialize_with = "nullable_entries")]
    pub entries: BTreeMap<String, Vec<ChartVersion>>,

    /// Time of the last successful write
    #[serde(default)]
    pub generated: DateTime<Utc>,

    /// Top-level keys written by other tools
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for IndexFile {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexFile {
    /// Create a new empty index
    pub fn new() -> Self {
        Self {
            api_version: default_api_version(),
            entries: BTreeMap::new(),
            generated: Utc::now(),
            extra: BTreeMap::new(),
        }
    }

    /// Deserialize an index document.
    ///
    /// Empty (or whitespace-only) input is an empty index. The result is
    /// already in canonical order.
    pub fn parse(data: &[u8]) -> Result<Self, IndexError> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new());
        }

        let mut index: Self = serde_yaml_ng::from_slice(data).map_err(IndexError::Parse)?;
        index.sort_entries();
        Ok(index)
    }

    /// Serialize to YAML bytes.
    pub fn to_yaml(&self) -> Result<Vec<u8>, IndexError> {
        serde_yaml_ng::to_string(self)
            .map(String::into_bytes)
            .map_err(IndexError::Serialize)
    }

    /// True iff an entry with exactly this name and version exists.
    pub fn has(&self, name: &str, version: &str) -> bool {
        self.get(name, version).is_some()
    }

    /// Exact lookup of one version of a chart.
    pub fn get(&self, name: &str, version: &str) -> Option<&ChartVersion> {
        self.entries
            .get(name)?
            .iter()
            .find(|v| v.version() == version)
    }

    /// All indexed versions of a chart.
    pub fn versions(&self, name: &str) -> Option<&[ChartVersion]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Index an archive, replacing any existing entry with the same name and
    /// version, and return the new entry.
    ///
    /// The replaced entry's position is not preserved; [`Self::sort_entries`]
    /// restores canonical order.
    pub fn add_or_replace(
        &mut self,
        metadata: ChartMetadata,
        url: &str,
        digest: &Sha256Digest,
    ) -> &ChartVersion {
        let entry = ChartVersion::new(metadata, url, digest.clone());
        let versions = self.entries.entry(entry.name().to_string()).or_default();
        versions.retain(|v| v.version() != entry.version());
        versions.push(entry);
        &versions[versions.len() - 1]
    }

    /// Remove one version of a chart, or every version when `version` is
    /// `None`, returning the download URLs of the removed entries.
    ///
    /// The chart key is deleted once its last version is gone.
    pub fn remove_version(
        &mut self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Vec<String>, IndexError> {
        let versions = match self.entries.get_mut(name) {
            Some(versions) if !versions.is_empty() => versions,
            _ => return Err(IndexError::ChartNotFound(name.to_string())),
        };

        let removed = match version {
            None => std::mem::take(versions),
            Some(version) => {
                let pos = versions
                    .iter()
                    .position(|v| v.version() == version)
                    .ok_or_else(|| IndexError::VersionNotFound {
                        name: name.to_string(),
                        version: version.to_string(),
                    })?;
                vec![versions.remove(pos)]
            }
        };

        if versions.is_empty() {
            self.entries.remove(name);
        }

        Ok(removed.into_iter().flat_map(|v| v.urls).collect())
    }

    /// Re-establish canonical order: names ascending, versions newest first.
    pub fn sort_entries(&mut self) {
        for versions in self.entries.values_mut() {
            versions.sort_by(|a, b| compare_versions(b.version(), a.version()));
        }
    }

    /// Stamp the generation time.
    pub fn touch(&mut self) {
        self.generated = Utc::now();
    }

    /// Total number of indexed (name, version) pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// True when no version of any chart is indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(seed: &str) -> Sha256Digest {
        Sha256Digest::compute(seed.as_bytes())
    }

    fn add(index: &mut IndexFile, name: &str, version: &str) {
        index.add_or_replace(
            ChartMetadata::new(name, version),
            &format!("s3://charts/stable/{name}-{version}.tgz"),
            &digest(&format!("{name}{version}")),
        );
    }

    const HELM_INDEX: &str = r#"apiVersion: v1
entries:
  nginx:
  - apiVersion: v2
    appVersion: 1.25.3
    created: "2024-03-01T10:00:00.123456789+08:00"
    description: NGINX web server
    digest: 3f0a8a9b1c5e6f2d4b7a8c9d0e1f2a3b4c5d6e7f8a9b0c1d2e3f4a5b6c7d8e9f
    keywords:
    - web
    - proxy
    name: nginx
    urls:
    - https://charts.example.com/nginx-1.0.0.tgz
    version: 1.0.0
  - apiVersion: v2
    created: "2024-04-01T10:00:00Z"
    digest: 4f0a8a9b1c5e6f2d4b7a8c9d0e1f2a3b4c5d6e7f8a9b0c1d2e3f4a5b6c7d8e9f
    name: nginx
    urls:
    - https://charts.example.com/nginx-1.10.0.tgz
    version: 1.10.0
generated: "2024-04-01T10:00:00Z"
serverInfo:
  contextPath: /charts
"#;

    #[test]
    fn test_parse_helm_index() {
        let index = IndexFile::parse(HELM_INDEX.as_bytes()).unwrap();

        assert_eq!(index.api_version, "v1");
        assert_eq!(index.len(), 2);
        assert!(index.extra.contains_key("serverInfo"));

        // Sorted newest first on load
        let versions = index.versions("nginx").unwrap();
        assert_eq!(versions[0].version(), "1.10.0");
        assert_eq!(versions[1].version(), "1.0.0");

        let old = index.get("nginx", "1.0.0").unwrap();
        assert_eq!(old.metadata.description.as_deref(), Some("NGINX web server"));
        assert_eq!(old.metadata.api_version.as_deref(), Some("v2"));
        assert!(old.metadata.extra.contains_key("keywords"));
        assert!(old.metadata.extra.contains_key("appVersion"));
        assert!(!old.metadata.extra.contains_key("urls"));
        assert_eq!(old.urls, vec!["https://charts.example.com/nginx-1.0.0.tgz"]);
    }

    #[test]
    fn test_parse_empty_is_new_index() {
        let index = IndexFile::parse(b"").unwrap();
        assert!(index.is_empty());
        assert_eq!(index.api_version, INDEX_API_VERSION);

        let index = IndexFile::parse(b"  \n").unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_parse_null_entries() {
        let index = IndexFile::parse(b"apiVersion: v1\nentries:\ngenerated: \"2024-01-01T00:00:00Z\"\n")
            .unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(matches!(
            IndexFile::parse(b"entries: [not, a, map]"),
            Err(IndexError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_validates_digest() {
        let doc = "entries:\n  foo:\n  - name: foo\n    version: 1.0.0\n    digest: not-a-digest\n";
        assert!(matches!(
            IndexFile::parse(doc.as_bytes()),
            Err(IndexError::Parse(_))
        ));

        let doc = "entries:\n  foo:\n  - name: foo\n    version: 1.0.0\n";
        let index = IndexFile::parse(doc.as_bytes()).unwrap();
        assert!(index.get("foo", "1.0.0").unwrap().digest.is_none());
        let yaml = String::from_utf8(index.to_yaml().unwrap()).unwrap();
        assert!(!yaml.contains("digest"));
    }

    #[test]
    fn test_roundtrip_is_byte_stable() {
        let index = IndexFile::parse(HELM_INDEX.as_bytes()).unwrap();
        let first = index.to_yaml().unwrap();

        let reloaded = IndexFile::parse(&first).unwrap();
        let second = reloaded.to_yaml().unwrap();

        assert_eq!(reloaded, index);
        assert_eq!(first, second);
    }

    #[test]
    fn test_has_and_get() {
        let mut index = IndexFile::new();
        add(&mut index, "foo", "1.0.0");

        assert!(index.has("foo", "1.0.0"));
        assert!(!index.has("foo", "1.0.1"));
        assert!(!index.has("bar", "1.0.0"));
        assert!(index.get("bar", "1.0.0").is_none());

        let entry = index.get("foo", "1.0.0").unwrap();
        assert_eq!(entry.urls, vec!["s3://charts/stable/foo-1.0.0.tgz"]);
        assert_eq!(entry.digest, Some(digest("foo1.0.0")));
    }

    #[test]
    fn test_add_or_replace_replaces() {
        let mut index = IndexFile::new();
        add(&mut index, "foo", "1.0.0");
        add(&mut index, "foo", "1.1.0");

        index.add_or_replace(
            ChartMetadata::new("foo", "1.0.0"),
            "https://cdn.example.com/foo-1.0.0.tgz",
            &digest("rebuilt"),
        );

        assert_eq!(index.versions("foo").unwrap().len(), 2);
        let entry = index.get("foo", "1.0.0").unwrap();
        assert_eq!(entry.digest, Some(digest("rebuilt")));
        assert_eq!(entry.urls, vec!["https://cdn.example.com/foo-1.0.0.tgz"]);
    }

    #[test]
    fn test_remove_single_version() {
        let mut index = IndexFile::new();
        add(&mut index, "foo", "1.0.0");
        add(&mut index, "foo", "1.1.0");

        let urls = index.remove_version("foo", Some("1.0.0")).unwrap();

        assert_eq!(urls, vec!["s3://charts/stable/foo-1.0.0.tgz"]);
        assert!(!index.has("foo", "1.0.0"));
        assert!(index.has("foo", "1.1.0"));
    }

    #[test]
    fn test_remove_last_version_deletes_key() {
        let mut index = IndexFile::new();
        add(&mut index, "foo", "1.0.0");

        index.remove_version("foo", Some("1.0.0")).unwrap();
        assert!(!index.entries.contains_key("foo"));
    }

    #[test]
    fn test_remove_all_versions() {
        let mut index = IndexFile::new();
        add(&mut index, "foo", "1.0.0");
        add(&mut index, "foo", "1.1.0");
        add(&mut index, "bar", "0.1.0");

        let mut urls = index.remove_version("foo", None).unwrap();
        urls.sort();

        assert_eq!(
            urls,
            vec![
                "s3://charts/stable/foo-1.0.0.tgz",
                "s3://charts/stable/foo-1.1.0.tgz"
            ]
        );
        assert!(!index.entries.contains_key("foo"));
        assert!(index.has("bar", "0.1.0"));
    }

    #[test]
    fn test_remove_missing() {
        let mut index = IndexFile::new();
        add(&mut index, "foo", "1.0.0");

        assert!(matches!(
            index.remove_version("bar", None),
            Err(IndexError::ChartNotFound(name)) if name == "bar"
        ));
        assert!(matches!(
            index.remove_version("foo", Some("9.9.9")),
            Err(IndexError::VersionNotFound { .. })
        ));
        assert!(index.has("foo", "1.0.0"));
    }

    #[test]
    fn test_sort_entries() {
        let mut index = IndexFile::new();
        for v in ["1.9.0", "dev", "1.10.0", "0.1.0"] {
            add(&mut index, "foo", v);
        }
        add(&mut index, "abc", "1.0.0");

        index.sort_entries();

        let order: Vec<&str> = index
            .versions("foo")
            .unwrap()
            .iter()
            .map(ChartVersion::version)
            .collect();
        assert_eq!(order, vec!["1.10.0", "1.9.0", "0.1.0", "dev"]);

        let names: Vec<&String> = index.entries.keys().collect();
        assert_eq!(names, vec!["abc", "foo"]);
    }

    #[test]
    fn test_touch_updates_generated() {
        let mut index = IndexFile::parse(HELM_INDEX.as_bytes()).unwrap();
        let before = index.generated;
        index.touch();
        assert!(index.generated > before);
    }
}
