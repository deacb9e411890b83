//! Conversion from `librarian_config::Config` to registry and telemetry
//! types.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use librarian_config::Config;
use librarian_registry::{
    DirectoryScanner, Discovery, FileUnitLoader, HttpCatalog, HttpUnitLoader, LibraryOptions,
    PathStyle, ScanOptions,
};
use librarian_telemetry::{LogConfig, LogFormat};

/// Command-line overrides applied on top of the loaded configuration.
#[derive(Debug, Default, Clone)]
pub(crate) struct Overrides {
    /// Scan this directory instead of the configured one. Forces local
    /// discovery even when a remote catalog is configured.
    pub(crate) dir: Option<PathBuf>,
    /// Scan depth override.
    pub(crate) depth: Option<u32>,
}

pub(crate) fn to_log_config(config: &Config) -> LogConfig {
    let format = config
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or_default();
    config
        .logging
        .directives
        .iter()
        .fold(
            LogConfig::new(config.logging.level.clone()).with_format(format),
            |lc, directive| lc.with_directive(directive.clone()),
        )
}

/// Build library options from the configuration. `base` resolves a relative
/// catalog directory.
pub(crate) fn to_library_options(
    config: &Config,
    base: &Path,
    overrides: &Overrides,
) -> Result<LibraryOptions> {
    let root_key = config.library.root_key.clone();

    if overrides.dir.is_none()
        && let Some(raw) = &config.remote.base_url
    {
        let mut base_url = url::Url::parse(raw)
            .with_context(|| format!("invalid remote.base_url '{raw}'"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let unit_loader = HttpUnitLoader::new(&base_url, &root_key)?;
        let catalog = HttpCatalog::new(base_url, config.remote.context.clone());
        return Ok(LibraryOptions {
            root_key,
            context: config.remote.context.clone(),
            unit_loader: Arc::new(unit_loader),
            discovery: Discovery::Remote(Arc::new(catalog)),
        });
    }

    let directory = overrides
        .dir
        .clone()
        .unwrap_or_else(|| config.catalog_dir(base));
    let depth = overrides.depth.unwrap_or(config.library.search_depth);
    let depth = i32::try_from(depth).context("scan depth out of range")?;

    let scan = ScanOptions {
        context: config.library.context.clone(),
        manifest_file: config.library.manifest_file.clone(),
        excluded_dirs: config.library.excluded_dirs.clone(),
        skip_hidden: true,
        path_style: PathStyle::Resolved,
    };

    Ok(LibraryOptions {
        root_key,
        context: config.library.context.clone(),
        unit_loader: Arc::new(FileUnitLoader),
        discovery: Discovery::Local {
            directory,
            depth,
            scanner: DirectoryScanner::local(scan),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_options_follow_config() {
        let mut config = Config::default();
        config.library.root_key = "app".to_owned();
        config.library.excluded_dirs = vec!["dist".to_owned()];

        let options = to_library_options(&config, Path::new("/work"), &Overrides::default()).unwrap();
        assert_eq!(options.root_key, "app");
        let Discovery::Local {
            directory,
            depth,
            scanner,
        } = options.discovery
        else {
            panic!("expected local discovery");
        };
        assert_eq!(directory, PathBuf::from("/work/lib"));
        assert_eq!(depth, 3);
        assert_eq!(scanner.options().excluded_dirs, vec!["dist"]);
    }

    #[test]
    fn test_overrides_win() {
        let mut config = Config::default();
        config.remote.base_url = Some("http://localhost:9000".to_owned());
        let overrides = Overrides {
            dir: Some(PathBuf::from("/elsewhere")),
            depth: Some(1),
        };

        let options = to_library_options(&config, Path::new("/work"), &overrides).unwrap();
        let Discovery::Local {
            directory, depth, ..
        } = options.discovery
        else {
            panic!("expected local discovery");
        };
        assert_eq!(directory, PathBuf::from("/elsewhere"));
        assert_eq!(depth, 1);
    }

    #[test]
    fn test_remote_options() {
        let mut config = Config::default();
        config.remote.base_url = Some("http://localhost:9000/catalog".to_owned());

        let options = to_library_options(&config, Path::new("/work"), &Overrides::default()).unwrap();
        assert_eq!(options.context, "Web-Library");
        assert!(matches!(options.discovery, Discovery::Remote(_)));
    }

    #[test]
    fn test_log_config_conversion() {
        let mut config = Config::default();
        config.logging.level = "debug".to_owned();
        config.logging.format = "json".to_owned();
        config.logging.directives = vec!["librarian_registry=trace".to_owned()];

        let lc = to_log_config(&config);
        assert_eq!(lc.level, "debug");
        assert_eq!(lc.format, LogFormat::Json);
        assert_eq!(lc.directives, vec!["librarian_registry=trace"]);
    }
}
