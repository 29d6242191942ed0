// types.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Backend-specific metadata attached to a discovered path, handed back on fetch.
pub type Tags = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Filesystem,
    Vault,
    Rancher,
    #[serde(rename = "digitalocean")]
    DigitalOcean,
    Akamai,
    Gardener,
    Gke,
    Eks,
    Azure,
    Ovh,
    Scaleway,
    Exoscale,
    Capi,
}

impl StoreKind {
    pub const ALL: [StoreKind; 13] = [
        StoreKind::Filesystem,
        StoreKind::Vault,
        StoreKind::Rancher,
        StoreKind::DigitalOcean,
        StoreKind::Akamai,
        StoreKind::Gardener,
        StoreKind::Gke,
        StoreKind::Eks,
        StoreKind::Azure,
        StoreKind::Ovh,
        StoreKind::Scaleway,
        StoreKind::Exoscale,
        StoreKind::Capi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Filesystem => "filesystem",
            StoreKind::Vault => "vault",
            StoreKind::Rancher => "rancher",
            StoreKind::DigitalOcean => "digitalocean",
            StoreKind::Akamai => "akamai",
            StoreKind::Gardener => "gardener",
            StoreKind::Gke => "gke",
            StoreKind::Eks => "eks",
            StoreKind::Azure => "azure",
            StoreKind::Ovh => "ovh",
            StoreKind::Scaleway => "scaleway",
            StoreKind::Exoscale => "exoscale",
            StoreKind::Capi => "capi",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| StoreError::Config(format!("unknown store kind: {}", s)))
    }
}

/// Display ID of a store: `<kind>.<id>` or `<kind>.default`.
pub fn store_id(kind: StoreKind, id: Option<&str>) -> String {
    match id {
        Some(id) if !id.is_empty() => format!("{}.{}", kind, id),
        _ => format!("{}.default", kind),
    }
}

/// One path discovered in one store.
///
/// The path alone (plus `tags`) is enough for the owning store to later
/// retrieve the kubeconfig bytes. `error` is set when discovery failed,
/// in which case the path may be empty.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// ID of the producing store, stamped by the sink on emission.
    pub store_id: String,
    pub kubeconfig_path: String,
    pub tags: Tags,
    pub error: Option<StoreError>,
}

impl SearchResult {
    pub fn found(path: impl Into<String>) -> Self {
        Self {
            store_id: String::new(),
            kubeconfig_path: path.into(),
            tags: Tags::new(),
            error: None,
        }
    }

    pub fn with_tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    pub fn failed(error: StoreError) -> Self {
        Self {
            store_id: String::new(),
            kubeconfig_path: String::new(),
            tags: Tags::new(),
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
