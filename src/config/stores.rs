// config/stores.rs
use serde::{Deserialize, Serialize};

/// `config` section of a vault store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfigVault {
    #[serde(rename = "vaultAPIAddress", default)]
    pub vault_api_address: Option<String>,
    #[serde(default)]
    pub vault_token: Option<String>,
    /// `v1` or `v2` KV engine.
    #[serde(default)]
    pub vault_engine_version: Option<String>,
    /// Secret field holding the kubeconfig.
    #[serde(default)]
    pub vault_key_kubeconfig: Option<String>,
}

/// `config` section of a rancher store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfigRancher {
    /// e.g. `https://rancher.example.com/v3`
    #[serde(rename = "rancherAPIAddress", default)]
    pub rancher_api_address: Option<String>,
    #[serde(default)]
    pub rancher_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfigDigitalOcean {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub api_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfigAkamai {
    #[serde(default)]
    pub linode_token: Option<String>,
    #[serde(default)]
    pub api_address: Option<String>,
    /// Only clusters in this region are discovered.
    #[serde(default)]
    pub region: Option<String>,
}
