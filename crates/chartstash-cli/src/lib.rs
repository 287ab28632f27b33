//! chartstash - Helm chart repositories in object storage
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Maintains a Helm chart repository (an `index.yaml` plus chart archives)
//! inside an S3-compatible bucket or a local directory.
//!
//! # Repositories
//!
//! A `<repo>` argument is either a base URL or the name of a repository
//! registered with `helm repo add`:
//!
//! ```text
//! s3://bucket/path     bos://bucket/path     file:///srv/charts     stable
//! ```
//!
//! # Concurrency
//!
//! Every index update is a conditional write against the index as it was
//! read. When another writer got there first the command fails with "index
//! is out-of-date" unless `--retry` is given, in which case it reloads the
//! index and tries again.

pub mod cmd;
pub mod context;
pub mod logging;

pub use context::{Context, Settings};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "chartstash")]
#[command(version = env!("CHARTSTASH_VERSION"))]
#[command(about = "Manage Helm chart repositories in object storage")]
pub struct Cli {
    /// Log every step of the index protocol
    #[arg(long, global = true, env = "CHARTSTASH_DEBUG")]
    pub debug: bool,

    /// Object storage endpoint [env: CHARTSTASH_ENDPOINT]
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Object storage region [env: CHARTSTASH_REGION]
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Access key [env: CHARTSTASH_ACCESS_KEY]
    #[arg(long, global = true)]
    pub ak: Option<String>,

    /// Secret key [env: CHARTSTASH_SECRET_KEY]
    #[arg(long, global = true)]
    pub sk: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize a repository with an empty index
    Init {
        /// Repository base URL, e.g. s3://bucket/charts
        repo: String,
    },
    /// Index a chart archive and upload it
    Push {
        /// Chart archive (.tgz)
        chart: PathBuf,
        /// Repository URL or registered name
        repo: String,
        /// Replace the chart if this version is already indexed
        #[arg(long, short = 'f')]
        force: bool,
        /// Reload and retry when the index changed concurrently
        #[arg(long)]
        retry: bool,
        /// Index the chart under its public (CDN) URL
        #[arg(long)]
        public: bool,
        /// Public base URL to use instead of the CDN address
        #[arg(long, requires = "public")]
        public_url: Option<String>,
        /// Only upload the archive of an already indexed version
        #[arg(long, conflicts_with_all = ["force", "retry", "public"])]
        upload_only: bool,
    },
    /// Remove a chart from the index and delete its archives
    Delete {
        /// Chart name
        name: String,
        /// Repository URL or registered name
        repo: String,
        /// Remove only this version (default: all versions)
        #[arg(long, short = 'v')]
        version: Option<String>,
        /// Reload and retry when the index changed concurrently
        #[arg(long)]
        retry: bool,
        /// Only delete the archive of a version no longer indexed
        #[arg(long, requires = "version", conflicts_with = "retry")]
        archive_only: bool,
    },
    /// Print a file from the repository on stdout
    ///
    /// Used by helm as a downloader plugin, which passes certificate, key
    /// and CA file arguments before the URL; only the URL is used.
    Pull {
        /// [cert key ca] url
        #[arg(required = true, num_args = 1..=4)]
        args: Vec<String>,
    },
}
