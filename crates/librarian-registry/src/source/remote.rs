//! Remote catalog access.
//!
//! A remote library publishes two documents:
//! - `available.json`: every known ID;
//! - `config.json?id=a&id=a.b`: the requested configs in request order, with
//!   `null` for unknown IDs.

use async_trait::async_trait;

use crate::config::ConfigDocument;
use crate::error::{RegistryError, RegistryResult};

/// The remote counterpart of the directory scan.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Every ID the remote library knows.
    async fn available(&self) -> RegistryResult<Vec<String>>;

    /// The configs for `ids`.
    async fn configs(&self, ids: &[String]) -> RegistryResult<ConfigDocument>;
}

/// Parse an `available.json` body.
///
/// Accepts a plain ID array, or an object whose `context` member holds the
/// array.
///
/// # Errors
///
/// Returns [`RegistryError::Parse`] for any other shape.
pub fn parse_available(body: &serde_json::Value, context: &str) -> RegistryResult<Vec<String>> {
    let items = match body {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => match map.get(context) {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(RegistryError::Parse {
                    source_name: "available.json".to_owned(),
                    message: format!("no id list for context {context}"),
                });
            },
        },
        _ => {
            return Err(RegistryError::Parse {
                source_name: "available.json".to_owned(),
                message: "unexpected answer for available request".to_owned(),
            });
        },
    };
    Ok(items
        .iter()
        .filter_map(serde_json::Value::as_str)
        .map(str::to_owned)
        .collect())
}

/// [`RemoteCatalog`] over HTTP.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: reqwest::Client,
    base: url::Url,
    context: String,
}

#[cfg(feature = "http")]
impl HttpCatalog {
    /// Catalog served under `base` for library `context`.
    #[must_use]
    pub fn new(base: url::Url, context: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
            context: context.into(),
        }
    }

    fn endpoint(&self, name: &str) -> RegistryResult<url::Url> {
        self.base
            .join(name)
            .map_err(|e| RegistryError::Transport(format!("{name}: {e}")))
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl RemoteCatalog for HttpCatalog {
    async fn available(&self) -> RegistryResult<Vec<String>> {
        let url = self.endpoint("available.json")?;
        tracing::debug!(url = %url, "Fetching available ids");
        let body: serde_json::Value = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RegistryError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;
        parse_available(&body, &self.context)
    }

    async fn configs(&self, ids: &[String]) -> RegistryResult<ConfigDocument> {
        let url = self.endpoint("config.json")?;
        tracing::debug!(url = %url, ids = ?ids, "Fetching configs");
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("id", id.as_str())).collect();
        self.client
            .get(url)
            .query(&query)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RegistryError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| RegistryError::Parse {
                source_name: "config.json".to_owned(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_available_array() {
        let ids = parse_available(&json!(["lib", "lib.core", 3]), "Library").unwrap();
        assert_eq!(ids, vec!["lib", "lib.core"]);
    }

    #[test]
    fn test_parse_available_keyed_by_context() {
        let body = json!({"Web-Library": ["lib", "lib.web"]});
        let ids = parse_available(&body, "Web-Library").unwrap();
        assert_eq!(ids, vec!["lib", "lib.web"]);
        assert!(parse_available(&body, "Library").is_err());
        assert!(parse_available(&json!("nope"), "Library").is_err());
    }
}
