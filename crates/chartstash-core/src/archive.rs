//! Chart archive loading.
//!
//! A chart archive is a gzip-compressed tarball with a single top-level
//! directory that holds the chart's `Chart.yaml`.

use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use chartstash_schema::{ChartMetadata, Sha256Digest};
use flate2::read::GzDecoder;
use serde_yaml_ng::Value;
use thiserror::Error;

const CHART_FILE: &str = "Chart.yaml";

/// Errors reading a chart archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The archive file could not be read.
    #[error("reading {}: {source}", path.display())]
    Io {
        /// Archive path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The bytes are not a gzip-compressed tarball.
    #[error("not a gzipped tar archive: {0}")]
    Corrupt(#[source] io::Error),

    /// No `<dir>/Chart.yaml` entry.
    #[error("{CHART_FILE} file is missing from the chart archive")]
    MissingChartYaml,

    /// `Chart.yaml` lacks a required field (the field name).
    #[error("{CHART_FILE} has no {0}")]
    InvalidMetadata(&'static str),

    /// `Chart.yaml` is not valid YAML.
    #[error("parsing {CHART_FILE}: {0}")]
    Parse(#[source] serde_yaml_ng::Error),

    /// The path ends in `..` or is not valid UTF-8.
    #[error("chart path {} has no file name", .0.display())]
    NoFileName(PathBuf),
}

/// A chart archive read into memory.
#[derive(Debug, Clone)]
pub struct ChartArchive {
    /// Parsed `Chart.yaml`
    pub metadata: ChartMetadata,
    /// SHA256 of `data`
    pub digest: Sha256Digest,
    /// Archive file name, used as its name in the repository
    pub file_name: String,
    /// Raw archive bytes
    pub data: Vec<u8>,
}

impl ChartArchive {
    /// Read and parse the archive at `path`.
    pub async fn load(path: &Path) -> Result<Self, ArchiveError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ArchiveError::NoFileName(path.to_path_buf()))?
            .to_string();
        let data = tokio::fs::read(path).await.map_err(|source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(file_name, data)
    }

    /// Parse an archive already in memory.
    pub fn from_bytes(file_name: impl Into<String>, data: Vec<u8>) -> Result<Self, ArchiveError> {
        let metadata = read_metadata(data.as_slice())?;
        Ok(Self {
            metadata,
            digest: Sha256Digest::compute(&data),
            file_name: file_name.into(),
            data,
        })
    }
}

/// Extract the chart metadata from a gzipped tar stream.
pub fn read_metadata<R: Read>(reader: R) -> Result<ChartMetadata, ArchiveError> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    for entry in archive.entries().map_err(ArchiveError::Corrupt)? {
        let mut entry = entry.map_err(ArchiveError::Corrupt)?;
        let path = entry.path().map_err(ArchiveError::Corrupt)?;
        if !is_chart_file(&path) {
            continue;
        }

        let mut raw = Vec::new();
        entry.read_to_end(&mut raw).map_err(ArchiveError::Corrupt)?;
        return parse_chart_file(&raw);
    }
    Err(ArchiveError::MissingChartYaml)
}

/// Load a chart's metadata from the archive at `path`.
pub fn load_metadata(path: &Path) -> Result<ChartMetadata, ArchiveError> {
    let file = std::fs::File::open(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_metadata(io::BufReader::new(file))
}

/// SHA256 of the file at `path`.
pub fn digest_file(path: &Path) -> Result<Sha256Digest, ArchiveError> {
    Sha256Digest::compute_file(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// `<chart>/Chart.yaml`, never a subchart's.
fn is_chart_file(path: &Path) -> bool {
    let parts: Vec<_> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    matches!(parts.as_slice(), [Component::Normal(_), Component::Normal(file)] if *file == CHART_FILE)
}

fn parse_chart_file(raw: &[u8]) -> Result<ChartMetadata, ArchiveError> {
    let value: Value = serde_yaml_ng::from_slice(raw).map_err(ArchiveError::Parse)?;
    for field in ["name", "version"] {
        if value.get(field).and_then(Value::as_str).is_none_or(str::is_empty) {
            return Err(ArchiveError::InvalidMetadata(field));
        }
    }
    serde_yaml_ng::from_value(value).map_err(ArchiveError::Parse)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Build a gzipped chart tarball with the given files.
    pub(crate) fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    /// Build a minimal chart archive for `name`/`version`.
    pub(crate) fn chart(name: &str, version: &str) -> Vec<u8> {
        let chart_yaml = format!(
            "apiVersion: v2\nname: {name}\nversion: {version}\ndescription: A test chart\nappVersion: \"1.16\"\n"
        );
        let chart_path = format!("{name}/{CHART_FILE}");
        let values_path = format!("{name}/values.yaml");
        tarball(&[
            (chart_path.as_str(), chart_yaml.as_str()),
            (values_path.as_str(), "replicaCount: 1\n"),
        ])
    }

    #[test]
    fn test_reads_metadata() {
        let data = chart("nginx", "1.2.3");
        let archive = ChartArchive::from_bytes("nginx-1.2.3.tgz", data.clone()).unwrap();

        assert_eq!(archive.metadata.name, "nginx");
        assert_eq!(archive.metadata.version, "1.2.3");
        assert_eq!(archive.metadata.api_version.as_deref(), Some("v2"));
        assert_eq!(archive.metadata.extra["appVersion"], Value::from("1.16"));
        assert_eq!(archive.digest, Sha256Digest::compute(&data));
        assert_eq!(archive.file_name, "nginx-1.2.3.tgz");
    }

    #[test]
    fn test_ignores_subchart_metadata() {
        let data = tarball(&[
            ("app/charts/dep/Chart.yaml", "name: dep\nversion: 9.9.9\n"),
            ("./app/Chart.yaml", "name: app\nversion: 0.1.0\n"),
        ]);
        let metadata = read_metadata(data.as_slice()).unwrap();
        assert_eq!(metadata.name, "app");
    }

    #[test]
    fn test_missing_chart_yaml() {
        let data = tarball(&[("app/values.yaml", "a: 1\n")]);
        assert!(matches!(
            read_metadata(data.as_slice()),
            Err(ArchiveError::MissingChartYaml)
        ));
    }

    #[test]
    fn test_missing_version() {
        let data = tarball(&[("app/Chart.yaml", "name: app\n")]);
        assert!(matches!(
            read_metadata(data.as_slice()),
            Err(ArchiveError::InvalidMetadata("version"))
        ));
    }

    #[test]
    fn test_not_gzip() {
        assert!(matches!(
            read_metadata(&b"definitely not a tarball"[..]),
            Err(ArchiveError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redis-7.0.0.tgz");
        std::fs::write(&path, chart("redis", "7.0.0")).unwrap();

        let archive = ChartArchive::load(&path).await.unwrap();
        assert_eq!(archive.metadata.version, "7.0.0");
        assert_eq!(archive.digest, digest_file(&path).unwrap());
        assert_eq!(load_metadata(&path).unwrap(), archive.metadata);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = ChartArchive::load(Path::new("/nonexistent/foo-1.0.0.tgz"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
    }
}
