//! chartstash core
//!
//! Maintains Helm chart repositories kept in object storage: the index
//! synchronization engine and the collaborators it drives (blob stores,
//! chart archive loading, URL resolution and the local repository registry).

pub mod archive;
pub mod config;
pub mod error;
pub mod registry;
pub mod repo;
pub mod resolve;
pub mod store;
pub mod sync;

pub use archive::{ArchiveError, ChartArchive, digest_file, load_metadata};
pub use config::{StoreConfig, SyncOptions};
pub use error::{ErrorKind, Stage, SyncError, SyncResult};
pub use registry::{RegistryError, RepositoryEntry, RepositoryRegistry};
pub use repo::Repository;
pub use resolve::{UrlError, resolve_download_url, resolve_reference};
pub use store::{
    BlobStore, ChangeToken, MemoryStore, ObjectStore, Precondition, StoreError, fetch, split_path,
};
pub use sync::{IndexSync, PushOptions};
