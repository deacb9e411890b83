//! Recursive directory scan for config documents.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use tracing::{debug, info, warn};

use super::{ContentSource, FsContentSource, NodeKind};
use crate::config::{CONTEXT_KEY, EntryConfig, GRAPH_KEY};
use crate::error::{RegistryError, RegistryResult};

/// The only file name read as a config document by default.
pub const DEFAULT_MANIFEST_FILE: &str = "config.json";

/// Directory names never descended into by default.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &["src"];

/// How `path` fields are rewritten while a document is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStyle {
    /// Join onto the document's directory (local loading).
    Resolved,
    /// Express relative to `root` with `/` separators (remote serving).
    RelativeUrl {
        /// The library root the URLs are relative to.
        root: PathBuf,
    },
}

/// Scan filters and parse options.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Expected `@context` tag; other documents are ignored.
    pub context: String,
    /// Accepted document file name.
    pub manifest_file: String,
    /// Directory names that are never descended into.
    pub excluded_dirs: Vec<String>,
    /// Skip dot-prefixed directories.
    pub skip_hidden: bool,
    /// Rewrite rule for `path` fields.
    pub path_style: PathStyle,
}

impl ScanOptions {
    /// Default filters for `context`.
    #[must_use]
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_owned(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|&d| d.to_owned()).collect(),
            skip_hidden: true,
            path_style: PathStyle::Resolved,
        }
    }

    /// Use `style` for `path` rewriting.
    #[must_use]
    pub fn with_path_style(mut self, style: PathStyle) -> Self {
        self.path_style = style;
        self
    }

    fn accepts_file(&self, name: &str) -> bool {
        name == self.manifest_file
    }

    fn accepts_dir(&self, name: &str) -> bool {
        if self.skip_hidden && name.starts_with('.') {
            return false;
        }
        !self.excluded_dirs.iter().any(|d| d == name)
    }
}

/// Walks a directory tree collecting valid configs.
#[derive(Clone)]
pub struct DirectoryScanner {
    source: Arc<dyn ContentSource>,
    options: ScanOptions,
}

impl DirectoryScanner {
    /// Scanner over `source`.
    pub fn new(source: Arc<dyn ContentSource>, options: ScanOptions) -> Self {
        Self { source, options }
    }

    /// Scanner over the local file system.
    #[must_use]
    pub fn local(options: ScanOptions) -> Self {
        Self::new(Arc::new(FsContentSource), options)
    }

    /// The scan options.
    #[must_use]
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// The same source with `options` instead.
    #[must_use]
    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Collect configs from `root` and up to `max_depth` levels of
    /// subdirectories. A negative depth yields nothing.
    ///
    /// Documents that fail to parse, carry another context, or contain
    /// invalid candidates are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Io`] if a directory cannot be listed or an
    /// accepted file cannot be read.
    pub async fn scan(&self, root: &Path, max_depth: i32) -> RegistryResult<Vec<EntryConfig>> {
        if max_depth < 0 {
            return Ok(Vec::new());
        }
        let configs = self.scan_dir(root.to_path_buf(), max_depth).await?;
        debug!(root = %root.display(), count = configs.len(), "Directory scan complete");
        Ok(configs)
    }

    fn scan_dir(&self, dir: PathBuf, depth: i32) -> BoxFuture<'_, RegistryResult<Vec<EntryConfig>>> {
        async move {
            let names = self.source.list(&dir).await?;
            let kinds = try_join_all(names.iter().map(|name| {
                let path = dir.join(name);
                async move { self.source.probe(&path).await }
            }))
            .await?;

            let mut files = Vec::new();
            let mut folders = Vec::new();
            for (name, kind) in names.iter().zip(kinds) {
                match kind {
                    NodeKind::File if self.options.accepts_file(name) => files.push(dir.join(name)),
                    NodeKind::Directory if depth > 0 && self.options.accepts_dir(name) => {
                        folders.push(dir.join(name));
                    },
                    _ => {},
                }
            }

            let contents = try_join_all(files.iter().map(|path| self.source.read(path))).await?;
            let mut configs = Vec::new();
            for (path, content) in files.iter().zip(contents) {
                configs.extend(self.parse_document(path, &dir, &content));
            }

            let nested = try_join_all(
                folders
                    .into_iter()
                    .map(|folder| self.scan_dir(folder, depth.saturating_sub(1))),
            )
            .await?;
            configs.extend(nested.into_iter().flatten());
            Ok(configs)
        }
        .boxed()
    }

    fn parse_document(&self, path: &Path, dir: &Path, content: &str) -> Vec<EntryConfig> {
        let mut document: serde_json::Value = match serde_json::from_str(content) {
            Ok(document) => document,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unparseable config document");
                return Vec::new();
            },
        };
        rewrite_paths(&mut document, dir, &self.options.path_style);

        let Some(object) = document.as_object_mut() else {
            debug!(path = %path.display(), "Skipping non-object config document");
            return Vec::new();
        };
        let context = object.remove(CONTEXT_KEY);
        if context.as_ref().and_then(serde_json::Value::as_str) != Some(self.options.context.as_str()) {
            debug!(path = %path.display(), context = ?context, "Skipping document with foreign context");
            return Vec::new();
        }

        let candidates = match object.remove(GRAPH_KEY) {
            Some(serde_json::Value::Array(graph)) => graph,
            Some(other) => {
                // A non-array `@graph` is an ordinary payload field.
                object.insert(GRAPH_KEY.to_owned(), other);
                vec![document]
            },
            None => vec![document],
        };

        let mut configs = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(config) = EntryConfig::from_candidate(candidate) {
                configs.push(config);
            } else {
                warn!(path = %path.display(), "Skipping invalid config candidate");
            }
        }
        configs
    }
}

impl std::fmt::Debug for DirectoryScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryScanner")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Rewrite every string field named `path`, at any depth.
fn rewrite_paths(value: &mut serde_json::Value, dir: &Path, style: &PathStyle) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                match field {
                    serde_json::Value::String(raw) if key == "path" => {
                        *raw = rewrite_path(raw, dir, style);
                    },
                    other => rewrite_paths(other, dir, style),
                }
            }
        },
        serde_json::Value::Array(items) => {
            for item in items {
                rewrite_paths(item, dir, style);
            }
        },
        _ => {},
    }
}

fn rewrite_path(raw: &str, dir: &Path, style: &PathStyle) -> String {
    let joined = normalize(&dir.join(raw));
    match style {
        PathStyle::Resolved => joined.to_string_lossy().into_owned(),
        PathStyle::RelativeUrl { root } => {
            let relative = joined.strip_prefix(normalize(root)).unwrap_or(&joined);
            relative
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/")
        },
    }
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            },
            other => out.push(other),
        }
    }
    out
}

/// IDs declared by more than one config, sorted.
#[must_use]
pub fn find_duplicates(configs: &[EntryConfig]) -> Vec<String> {
    let mut seen: BTreeMap<&str, bool> = BTreeMap::new();
    for config in configs {
        seen.entry(config.id.as_str())
            .and_modify(|dup| *dup = true)
            .or_insert(false);
    }
    seen.into_iter()
        .filter_map(|(id, dup)| dup.then(|| id.to_owned()))
        .collect()
}

/// Scan `root` and reject the whole pass if any ID is declared twice.
///
/// # Errors
///
/// Returns [`RegistryError::CorruptedCatalog`] naming the repeated IDs, or
/// any error from [`DirectoryScanner::scan`].
pub async fn scan_catalog(
    scanner: &DirectoryScanner,
    root: &Path,
    max_depth: i32,
) -> RegistryResult<Vec<EntryConfig>> {
    let configs = scanner.scan(root, max_depth).await?;
    let duplicates = find_duplicates(&configs);
    if !duplicates.is_empty() {
        warn!(root = %root.display(), duplicates = ?duplicates, "Catalog contains duplicate ids");
        return Err(RegistryError::CorruptedCatalog(duplicates));
    }
    info!(root = %root.display(), count = configs.len(), "Discovered configs");
    Ok(configs)
}
