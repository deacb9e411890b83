//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Deepest directory scan allowed.
pub const MAX_SEARCH_DEPTH: u32 = 32;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_library(config)?;
    validate_remote(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

/// A single registry ID segment: a letter followed by word characters.
fn is_segment(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_library(config: &Config) -> ConfigResult<()> {
    let lib = &config.library;

    if !is_segment(&lib.root_key) {
        return Err(invalid(
            "library.root_key",
            format!(
                "'{}' is not a single identifier segment (letter followed by letters, digits or '_')",
                lib.root_key
            ),
        ));
    }

    if lib.context.trim().is_empty() {
        return Err(invalid("library.context", "context must not be empty"));
    }

    if lib.search_depth > MAX_SEARCH_DEPTH {
        return Err(invalid(
            "library.search_depth",
            format!("search_depth must be between 0 and {MAX_SEARCH_DEPTH}"),
        ));
    }

    if lib.manifest_file.is_empty() || lib.manifest_file.contains(['/', '\\']) {
        return Err(invalid(
            "library.manifest_file",
            format!("'{}' must be a bare file name", lib.manifest_file),
        ));
    }

    if let Some(dir) = lib.excluded_dirs.iter().find(|d| d.contains(['/', '\\'])) {
        return Err(invalid(
            "library.excluded_dirs",
            format!("'{dir}' must be a bare directory name"),
        ));
    }

    Ok(())
}

fn validate_remote(config: &Config) -> ConfigResult<()> {
    let remote = &config.remote;

    if let Some(url) = &remote.base_url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        return Err(invalid(
            "remote.base_url",
            format!("'{url}' must be an http:// or https:// URL"),
        ));
    }

    if remote.context.trim().is_empty() {
        return Err(invalid("remote.context", "context must not be empty"));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_root_key_must_be_one_segment() {
        for bad in ["", "lib.core", "1lib", "lib:1.0.0", "my-lib"] {
            let mut config = Config::default();
            config.library.root_key = bad.to_owned();
            assert_eq!(field_of(validate(&config)), "library.root_key", "{bad}");
        }
    }

    #[test]
    fn test_search_depth_bound() {
        let mut config = Config::default();
        config.library.search_depth = MAX_SEARCH_DEPTH;
        assert!(validate(&config).is_ok());
        config.library.search_depth = MAX_SEARCH_DEPTH.saturating_add(1);
        assert_eq!(field_of(validate(&config)), "library.search_depth");
    }

    #[test]
    fn test_manifest_file_is_bare_name() {
        let mut config = Config::default();
        config.library.manifest_file = "meta/config.json".to_owned();
        assert_eq!(field_of(validate(&config)), "library.manifest_file");
    }

    #[test]
    fn test_base_url_scheme() {
        let mut config = Config::default();
        config.remote.base_url = Some("ftp://example.com".to_owned());
        assert_eq!(field_of(validate(&config)), "remote.base_url");
        config.remote.base_url = Some("https://example.com/catalog".to_owned());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_logging_values() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_owned();
        assert_eq!(field_of(validate(&config)), "logging.level");

        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert_eq!(field_of(validate(&config)), "logging.format");
    }

    #[test]
    fn test_empty_context_rejected() {
        let mut config = Config::default();
        config.library.context = "  ".to_owned();
        assert_eq!(field_of(validate(&config)), "library.context");
    }
}
