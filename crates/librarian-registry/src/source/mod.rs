//! Config discovery.
//!
//! Configs come from one of two backing stores:
//! - a local directory tree, walked by [`DirectoryScanner`] through the
//!   [`ContentSource`] file-system abstraction;
//! - a remote catalog ([`RemoteCatalog`]) exposing `available.json` and
//!   `config.json`.

mod remote;
mod scan;

use std::path::Path;

use async_trait::async_trait;

use crate::error::{RegistryError, RegistryResult};

#[cfg(feature = "http")]
pub use remote::HttpCatalog;
pub use remote::{RemoteCatalog, parse_available};
pub use scan::{
    DEFAULT_EXCLUDED_DIRS, DEFAULT_MANIFEST_FILE, DirectoryScanner, PathStyle, ScanOptions,
    find_duplicates, scan_catalog,
};

/// What a path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// Anything else (sockets, dangling links, ...).
    Other,
}

/// The file-system primitives the scanner consumes.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Names of the entries directly inside `dir`.
    async fn list(&self, dir: &Path) -> RegistryResult<Vec<String>>;

    /// Classify `path`.
    async fn probe(&self, path: &Path) -> RegistryResult<NodeKind>;

    /// Read `path` as UTF-8 text.
    async fn read(&self, path: &Path) -> RegistryResult<String>;
}

/// [`ContentSource`] over the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsContentSource;

#[async_trait]
impl ContentSource for FsContentSource {
    async fn list(&self, dir: &Path) -> RegistryResult<Vec<String>> {
        let mut reader = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| RegistryError::io(dir, &e))?;
        let mut names = Vec::new();
        while let Some(item) = reader
            .next_entry()
            .await
            .map_err(|e| RegistryError::io(dir, &e))?
        {
            names.push(item.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn probe(&self, path: &Path) -> RegistryResult<NodeKind> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| RegistryError::io(path, &e))?;
        Ok(if metadata.is_file() {
            NodeKind::File
        } else if metadata.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::Other
        })
    }

    async fn read(&self, path: &Path) -> RegistryResult<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RegistryError::io(path, &e))
    }
}
