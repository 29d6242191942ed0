use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by stores and the discovery engine.
///
/// Cloneable so the same failure can sit inside a `SearchResult` and be
/// rendered by the consumer more than once.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("verification of store {store} failed: {reason}")]
    Verification { store: String, reason: String },

    #[error("search in store {store} failed: {reason}")]
    Search { store: String, reason: String },

    #[error("kubeconfig not found for path {path}")]
    NotFound { path: String },

    #[error("failed to fetch kubeconfig for path {path}: {reason}")]
    Fetch { path: String, reason: String },

    #[error("internal fault in store {store}: {reason}")]
    InternalFault { store: String, reason: String },

    #[error("search in store {store} did not finish within {after:?}")]
    Timeout { store: String, after: Duration },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store kind {0} is not supported in this build")]
    Unsupported(String),

    #[error("request to {url} failed with status {status}")]
    Api { url: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(Arc<reqwest::Error>),

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl StoreError {
    pub fn verification(store: &str, reason: impl ToString) -> Self {
        StoreError::Verification {
            store: store.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn search(store: &str, reason: impl ToString) -> Self {
        StoreError::Search {
            store: store.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        StoreError::NotFound {
            path: path.to_string(),
        }
    }

    pub fn fetch(path: &str, reason: impl ToString) -> Self {
        StoreError::Fetch {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Http(Arc::new(e))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(Arc::new(e))
    }
}

impl From<serde_yaml::Error> for StoreError {
    fn from(e: serde_yaml::Error) -> Self {
        StoreError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Config(e.to_string())
    }
}
