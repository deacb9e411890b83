#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! A declarative, lazily-loaded module registry.
//!
//! Entries (packages, modules, aliases, scripts and raw values) are described
//! by small JSON configs. Configs are discovered by scanning a directory tree
//! or fetched from a remote catalog, then turned into entries on demand and
//! loaded in dependency order, at most once each.
//!
//! # Example
//!
//! ```rust,no_run
//! use librarian_registry::{Library, LibraryOptions};
//!
//! # async fn run() -> librarian_registry::RegistryResult<()> {
//! let library = Library::new(LibraryOptions::local("./lib", 3))?;
//! let exports = library.load(&["lib.core.is:0.1.0"]).await?;
//! println!("{:?}", exports[0]);
//! println!("{:?}", library.root().keys());
//! # Ok(())
//! # }
//! ```
//!
//! # Layout
//!
//! - [`id`]: identifier grammar and decomposition
//! - [`config`]: config records and catalog documents
//! - [`source`]: directory scan and remote catalog
//! - [`registry`]: configs, entries and the type table
//! - [`entry`]: the entry variants and their constructors
//! - [`loader`]: the single-flight load protocol and unit loaders
//! - [`library`]: the bootstrapped root package with `get`/`load`

pub mod config;
pub mod entry;
pub mod error;
pub mod exports;
pub mod id;
mod integrate;
pub mod library;
pub mod loader;
pub mod registry;
pub mod source;

pub use config::{ConfigDocument, EntryConfig};
pub use entry::{Entry, EntryConstructor, EntryKind};
pub use error::{RegistryError, RegistryResult};
pub use exports::{Exports, Namespace, ScriptFn};
pub use id::{EntryId, TypeTag};
pub use library::{Discovery, Library, LibraryOptions};
pub use loader::{FileUnitLoader, FnUnitLoader, LoadOutcome, LoadState, UnitLoader};
#[cfg(feature = "http")]
pub use loader::HttpUnitLoader;
pub use registry::{Registry, RegistrySettings, WeakRegistry};
pub use source::{
    ContentSource, DirectoryScanner, FsContentSource, NodeKind, PathStyle, RemoteCatalog,
    ScanOptions,
};
#[cfg(feature = "http")]
pub use source::HttpCatalog;
