//! URL resolution for index and archive locations.
//!
//! All functions here are pure: the same inputs always produce the same URL.

use thiserror::Error;
use url::Url;

/// Host suffix of the public CDN that fronts every bucket.
pub const CDN_DOMAIN: &str = "cdn.bcebos.com";

/// Errors resolving repository URLs.
#[derive(Error, Debug)]
pub enum UrlError {
    /// Not an absolute URL.
    #[error("url parsing: {url}: {source}")]
    Parse {
        /// The rejected input.
        url: String,
        /// Underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// A public URL was requested for a base without a bucket host.
    #[error("url {0} has no host to derive a public url from")]
    MissingHost(String),
}

fn parse(raw: &str) -> Result<Url, UrlError> {
    Url::parse(raw).map_err(|source| UrlError::Parse {
        url: raw.to_string(),
        source,
    })
}

/// Lexically join two slash-separated paths, resolving `.` and `..` and
/// collapsing repeated separators. The result is always absolute.
pub fn join_path(base: &str, name: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(name.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Join `name` onto the path of `base`, keeping its scheme and host.
///
/// ```
/// use chartstash_core::resolve::resolve_reference;
///
/// let url = resolve_reference("s3://charts/stable", "index.yaml").unwrap();
/// assert_eq!(url, "s3://charts/stable/index.yaml");
/// ```
pub fn resolve_reference(base: &str, name: &str) -> Result<String, UrlError> {
    let mut url = parse(base)?;
    let path = join_path(url.path(), name);
    url.set_path(&path);
    Ok(url.to_string())
}

/// Base URL written into index entries for newly pushed archives.
///
/// - `public` with a non-empty override: the override, verbatim.
/// - `public` alone: `https://<bucket>.cdn.bcebos.com/<path>`.
/// - otherwise: `base` itself (normalized).
pub fn resolve_download_url(
    base: &str,
    public: bool,
    public_url: Option<&str>,
) -> Result<String, UrlError> {
    let url = parse(base)?;

    if !public {
        return Ok(url.to_string());
    }

    if let Some(public_url) = public_url.filter(|u| !u.is_empty()) {
        return Ok(public_url.to_string());
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| UrlError::MissingHost(base.to_string()))?;
    let path = url.path().trim_matches('/');
    if path.is_empty() {
        Ok(format!("https://{host}.{CDN_DOMAIN}"))
    } else {
        Ok(format!("https://{host}.{CDN_DOMAIN}/{path}"))
    }
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    url.split('/').next_back().unwrap_or("")
}

/// Storage location of the archive an index entry points at.
///
/// URLs already under `base` are storage paths themselves; anything else
/// (a public or CDN URL) is mapped back by file name. Either way the result
/// is in the escaped form [`resolve_reference`] produces, so it names the
/// same object the archive was uploaded to.
pub fn archive_location(base: &str, download_url: &str) -> Result<String, UrlError> {
    let prefix = format!("{}/", base.trim_end_matches('/'));
    if let Ok(url) = Url::parse(download_url) {
        let url = url.to_string();
        if url.starts_with(&prefix) {
            return Ok(url);
        }
    }
    resolve_reference(base, filename_from_url(download_url))
}
