// config/types.rs
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

use crate::error::{Result, StoreError};
use crate::types::{store_id, StoreKind};

pub const DEFAULT_KUBECONFIG_NAME: &str = "config";

/// Top-level switch configuration listing every kubeconfig store to search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchConfig {
    #[serde(default)]
    pub kind: Option<String>,
    /// Default file name pattern for filesystem stores.
    #[serde(default)]
    pub kubeconfig_name: Option<String>,
    #[serde(default)]
    pub kubeconfig_stores: Vec<KubeconfigStoreConfig>,
}

/// Settings shared by every store kind plus the kind-specific `config` blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeconfigStoreConfig {
    pub kind: StoreKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub kubeconfig_name: Option<String>,
    #[serde(default = "default_true")]
    pub show_prefix: bool,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub config: Option<serde_yaml::Value>,
}

fn default_true() -> bool {
    true
}

impl KubeconfigStoreConfig {
    pub fn new(kind: StoreKind) -> Self {
        Self {
            kind,
            id: None,
            paths: Vec::new(),
            kubeconfig_name: None,
            show_prefix: true,
            required: true,
            config: None,
        }
    }

    pub fn store_id(&self) -> String {
        store_id(self.kind, self.id.as_deref())
    }

    /// Deserializes the kind-specific `config` section, defaulting when absent.
    pub fn kind_config<T>(&self) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match &self.config {
            None | Some(serde_yaml::Value::Null) => Ok(T::default()),
            Some(value) => serde_yaml::from_value(value.clone()).map_err(|e| {
                StoreError::Config(format!("invalid config for store {}: {}", self.store_id(), e))
            }),
        }
    }
}

impl SwitchConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let expanded = expand_path(path)?;
        let config_str = fs::read_to_string(&expanded)?;
        let is_json = expanded
            .extension()
            .map(|ext| ext == "json")
            .unwrap_or(false);
        let config: SwitchConfig = if is_json {
            serde_json::from_str(&config_str)?
        } else {
            serde_yaml::from_str(&config_str)?
        };
        config.validate()?;
        Ok(config)
    }

    /// `~/.kube/switch-config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".kube").join("switch-config.yaml"))
    }

    pub fn kubeconfig_name(&self) -> &str {
        self.kubeconfig_name
            .as_deref()
            .unwrap_or(DEFAULT_KUBECONFIG_NAME)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kubeconfig_stores.is_empty() {
            return Err(StoreError::Config(
                "no kubeconfig stores configured".to_string(),
            ));
        }
        for store in &self.kubeconfig_stores {
            if store.kind == StoreKind::Filesystem && store.paths.is_empty() {
                return Err(StoreError::Config(format!(
                    "store {} needs at least one path",
                    store.store_id()
                )));
            }
        }
        Ok(())
    }
}

/// Expands `~` and environment variables in a configured path.
pub fn expand_path(path: &str) -> Result<PathBuf> {
    shellexpand::full(path)
        .map(|expanded| Path::new(expanded.as_ref()).to_path_buf())
        .map_err(|e| StoreError::Config(format!("cannot expand path {}: {}", path, e)))
}

/// Reads the first set environment variable among `names`.
pub fn env_fallback(value: &Option<String>, names: &[&str]) -> Option<String> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .or_else(|| {
            names
                .iter()
                .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
        })
}

/// Parses an API base address and strips the trailing slash.
pub fn parse_api_address(store: &str, address: &str) -> Result<String> {
    let parsed = url::Url::parse(address).map_err(|e| {
        StoreError::Config(format!("store {}: invalid API address {}: {}", store, address, e))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(StoreError::Config(format!(
            "store {}: API address must be http(s), got {}",
            store, address
        )));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
kind: SwitchConfig
kubeconfigName: "*.yaml"
kubeconfigStores:
  - kind: filesystem
    paths: ["~/.kube"]
  - kind: vault
    id: team
    showPrefix: false
    required: false
    paths: ["kubeconfigs"]
    config:
      vaultAPIAddress: "http://127.0.0.1:8200"
      vaultEngineVersion: v2
"#;

    #[test]
    fn loads_yaml_with_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("switch-config.yaml");
        fs::write(&path, YAML).unwrap();

        let config = SwitchConfig::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.kubeconfig_name(), "*.yaml");
        assert_eq!(config.kubeconfig_stores.len(), 2);

        let fs_store = &config.kubeconfig_stores[0];
        assert_eq!(fs_store.store_id(), "filesystem.default");
        assert!(fs_store.show_prefix);
        assert!(fs_store.required);

        let vault = &config.kubeconfig_stores[1];
        assert_eq!(vault.store_id(), "vault.team");
        assert!(!vault.show_prefix);
        assert!(!vault.required);
    }

    #[test]
    fn loads_json_by_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("switch-config.json");
        fs::write(
            &path,
            r#"{"kubeconfigStores":[{"kind":"filesystem","paths":["/tmp"]}]}"#,
        )
        .unwrap();

        let config = SwitchConfig::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.kubeconfig_name(), DEFAULT_KUBECONFIG_NAME);
    }

    #[test]
    fn rejects_filesystem_store_without_paths() {
        let config = SwitchConfig {
            kind: None,
            kubeconfig_name: None,
            kubeconfig_stores: vec![KubeconfigStoreConfig::new(StoreKind::Filesystem)],
        };
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));
    }

    #[test]
    fn api_address_is_normalized() {
        assert_eq!(
            parse_api_address("rancher.default", "https://rancher.example.com/").unwrap(),
            "https://rancher.example.com"
        );
        assert!(parse_api_address("rancher.default", "ftp://x").is_err());
        assert!(parse_api_address("rancher.default", "not a url").is_err());
    }

    #[test]
    fn explicit_value_wins_over_environment() {
        assert_eq!(
            env_fallback(&Some("abc".to_string()), &["PATH"]),
            Some("abc".to_string())
        );
        assert_eq!(
            env_fallback(&None, &["KUBESWITCH_TEST_SURELY_UNSET_VAR"]),
            None
        );
    }
}
