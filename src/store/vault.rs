// src/store/vault.rs
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::http::ApiClient;
use super::{non_empty, KubeconfigStore, SearchSink};
use crate::config::{env_fallback, parse_api_address, KubeconfigStoreConfig, StoreConfigVault};
use crate::error::{Result, StoreError};
use crate::types::{store_id, StoreKind, Tags};
use crate::utils::logging::{Logger, StoreLogger};

const DEFAULT_KUBECONFIG_KEY: &str = "config";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineVersion {
    V1,
    V2,
}

#[derive(Deserialize)]
struct ListResponse {
    data: ListKeys,
}

#[derive(Deserialize)]
struct ListKeys {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct SecretResponse {
    data: serde_json::Map<String, Value>,
}

/// Kubeconfigs kept as secrets in a Vault KV engine.
///
/// Every leaf secret below a configured path is one kubeconfig; the
/// kubeconfig itself lives in the `vaultKeyKubeconfig` field.
pub struct VaultStore {
    logger: StoreLogger,
    config: KubeconfigStoreConfig,
    client: ApiClient,
    engine: EngineVersion,
    kubeconfig_key: String,
}

impl VaultStore {
    pub fn new(config: KubeconfigStoreConfig, logger: StoreLogger) -> Result<Self> {
        let id = config.store_id();
        let vault: StoreConfigVault = config.kind_config()?;

        let address = env_fallback(&vault.vault_api_address, &["VAULT_ADDR"]).ok_or_else(|| {
            StoreError::Config(format!(
                "store {}: vaultAPIAddress is not set and VAULT_ADDR is empty",
                id
            ))
        })?;
        let address = parse_api_address(&id, &address)?;
        let token = env_fallback(&vault.vault_token, &["VAULT_TOKEN"])
            .or_else(read_token_file)
            .ok_or_else(|| {
                StoreError::Config(format!(
                    "store {}: no vault token in config, VAULT_TOKEN or ~/.vault-token",
                    id
                ))
            })?;

        let engine = match vault.vault_engine_version.as_deref() {
            None | Some("v1") => EngineVersion::V1,
            Some("v2") => EngineVersion::V2,
            Some(other) => {
                return Err(StoreError::Config(format!(
                    "store {}: unknown vault engine version {}",
                    id, other
                )))
            }
        };

        Ok(Self {
            client: ApiClient::with_header(&address, "X-Vault-Token", &token)?,
            engine,
            kubeconfig_key: vault
                .vault_key_kubeconfig
                .unwrap_or_else(|| DEFAULT_KUBECONFIG_KEY.to_string()),
            logger,
            config,
        })
    }

    fn list_url(&self, path: &str) -> String {
        match self.engine {
            EngineVersion::V1 => format!("v1/{}?list=true", trim(path)),
            EngineVersion::V2 => {
                let (mount, rest) = split_mount(path);
                format!("v1/{}/metadata/{}?list=true", mount, rest)
            }
        }
    }

    fn read_url(&self, path: &str) -> String {
        match self.engine {
            EngineVersion::V1 => format!("v1/{}", trim(path)),
            EngineVersion::V2 => {
                let (mount, rest) = split_mount(path);
                format!("v1/{}/data/{}", mount, rest)
            }
        }
    }

    /// Keys directly below `path`; `None` when the path does not exist.
    async fn list(&self, path: &str) -> Result<Option<Vec<String>>> {
        let listed: Option<ListResponse> = self.client.get_json(&self.list_url(path)).await?;
        Ok(listed.map(|response| response.data.keys))
    }

    fn extract_kubeconfig(&self, path: &str, secret: SecretResponse) -> Result<Vec<u8>> {
        let fields = match self.engine {
            EngineVersion::V1 => Some(&secret.data),
            EngineVersion::V2 => secret.data.get("data").and_then(Value::as_object),
        };
        let value = fields
            .and_then(|fields| fields.get(&self.kubeconfig_key))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StoreError::fetch(
                    path,
                    format!("secret has no string field {:?}", self.kubeconfig_key),
                )
            })?;
        non_empty(path, value.as_bytes().to_vec())
    }
}

fn trim(path: &str) -> &str {
    path.trim_matches('/')
}

/// `secret/team/dev` -> (`secret`, `team/dev`)
fn split_mount(path: &str) -> (&str, &str) {
    let path = trim(path);
    match path.split_once('/') {
        Some((mount, rest)) => (mount, rest),
        None => (path, ""),
    }
}

fn read_token_file() -> Option<String> {
    let path = dirs::home_dir()?.join(".vault-token");
    std::fs::read_to_string(path)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl KubeconfigStore for VaultStore {
    fn id(&self) -> String {
        store_id(StoreKind::Vault, self.config.id.as_deref())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Vault
    }

    /// Parent secret path segment, e.g. `team` for `secret/team/dev`.
    fn context_prefix(&self, path: &str) -> String {
        if !self.config.show_prefix {
            return String::new();
        }
        let segments: Vec<&str> = trim(path).split('/').collect();
        match segments.len() {
            0 | 1 => String::new(),
            n => segments[n - 2].to_string(),
        }
    }

    async fn verify_kubeconfig_paths(&self) -> Result<()> {
        if self.config.paths.is_empty() {
            return Err(StoreError::verification(&self.id(), "no vault paths configured"));
        }
        for path in &self.config.paths {
            match self.list(path).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    return Err(StoreError::verification(
                        &self.id(),
                        format!("vault path {} does not exist", path),
                    ))
                }
                Err(e) => return Err(StoreError::verification(&self.id(), e)),
            }
        }
        Ok(())
    }

    async fn start_search(&self, sink: SearchSink) {
        for root in &self.config.paths {
            let mut pending = vec![trim(root).to_string()];

            while let Some(current) = pending.pop() {
                self.logger.debug_log(&format!("Listing {}", current));
                let keys = match self.list(&current).await {
                    Ok(Some(keys)) => keys,
                    Ok(None) => continue,
                    Err(e) => {
                        self.logger.log(&format!("Failed to list {}: {}", current, e));
                        sink.emit_error(StoreError::search(
                            &self.id(),
                            format!("listing {}: {}", current, e),
                        ))
                        .await;
                        continue;
                    }
                };

                for key in keys {
                    let child = format!("{}/{}", current, key.trim_end_matches('/'));
                    if key.ends_with('/') {
                        pending.push(child);
                    } else if !sink.emit_path(child).await {
                        return;
                    }
                }
            }
        }
    }

    async fn kubeconfig_for_path(&self, path: &str, _tags: &Tags) -> Result<Vec<u8>> {
        let secret: Option<SecretResponse> = self
            .client
            .get_json(&self.read_url(path))
            .await
            .map_err(|e| StoreError::fetch(path, e))?;
        match secret {
            Some(secret) => self.extract_kubeconfig(path, secret),
            None => Err(StoreError::not_found(path)),
        }
    }

    fn logger(&self) -> &StoreLogger {
        &self.logger
    }

    fn store_config(&self) -> &KubeconfigStoreConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::collect_search;
    use crate::store::http::fake::FakeApi;
    use crate::utils::logging::NoopLogger;
    use std::sync::Arc;

    fn store_at(address: &str, engine: &str, paths: Vec<&str>) -> VaultStore {
        let mut config = KubeconfigStoreConfig::new(StoreKind::Vault);
        config.paths = paths.into_iter().map(str::to_string).collect();
        config.config = Some(
            serde_yaml::from_str(&format!(
                "vaultAPIAddress: {}\nvaultToken: root\nvaultEngineVersion: {}",
                address, engine
            ))
            .unwrap(),
        );
        VaultStore::new(config, StoreLogger::new("vault.default", Arc::new(NoopLogger))).unwrap()
    }

    fn store_with(engine: &str, paths: Vec<&str>) -> VaultStore {
        store_at("http://127.0.0.1:1", engine, paths)
    }

    #[test]
    fn urls_follow_engine_layout() {
        let v1 = store_with("v1", vec!["kubeconfigs"]);
        assert_eq!(v1.list_url("/kubeconfigs/team/"), "v1/kubeconfigs/team?list=true");
        assert_eq!(v1.read_url("kubeconfigs/team/dev"), "v1/kubeconfigs/team/dev");

        let v2 = store_with("v2", vec!["secret"]);
        assert_eq!(v2.list_url("secret/team"), "v1/secret/metadata/team?list=true");
        assert_eq!(v2.list_url("secret"), "v1/secret/metadata/?list=true");
        assert_eq!(v2.read_url("secret/team/dev"), "v1/secret/data/team/dev");
    }

    #[test]
    fn kubeconfig_field_is_read_per_engine() {
        let v1 = store_with("v1", vec!["kc"]);
        let secret: SecretResponse =
            serde_json::from_str(r#"{"data":{"config":"apiVersion: v1"}}"#).unwrap();
        assert_eq!(v1.extract_kubeconfig("kc/a", secret).unwrap(), b"apiVersion: v1");

        let v2 = store_with("v2", vec!["secret"]);
        let secret: SecretResponse =
            serde_json::from_str(r#"{"data":{"data":{"config":"apiVersion: v1"},"metadata":{}}}"#)
                .unwrap();
        assert_eq!(v2.extract_kubeconfig("secret/a", secret).unwrap(), b"apiVersion: v1");

        let secret: SecretResponse = serde_json::from_str(r#"{"data":{"other":"x"}}"#).unwrap();
        assert!(matches!(
            v1.extract_kubeconfig("kc/a", secret),
            Err(StoreError::Fetch { .. })
        ));

        let secret: SecretResponse = serde_json::from_str(r#"{"data":{"config":""}}"#).unwrap();
        assert!(v1.extract_kubeconfig("kc/a", secret).unwrap_err().is_not_found());
    }

    #[test]
    fn prefix_is_parent_segment() {
        let store = store_with("v1", vec!["kc"]);
        assert_eq!(store.context_prefix("kc/team/dev"), "team");
        assert_eq!(store.context_prefix("kc/team/dev"), store.context_prefix("kc/team/dev"));
        assert_eq!(store.context_prefix("dev"), "");
        assert_eq!(store.id(), "vault.default");
    }

    #[test]
    fn unknown_engine_version_is_rejected() {
        let mut config = KubeconfigStoreConfig::new(StoreKind::Vault);
        config.config = Some(
            serde_yaml::from_str(
                "vaultAPIAddress: http://127.0.0.1:1\nvaultToken: root\nvaultEngineVersion: v3",
            )
            .unwrap(),
        );
        let result = VaultStore::new(config, StoreLogger::new("vault.default", Arc::new(NoopLogger)));
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[tokio::test]
    async fn verification_needs_paths() {
        let store = store_with("v1", vec![]);
        assert!(matches!(
            store.verify_kubeconfig_paths().await,
            Err(StoreError::Verification { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_vault_fails_verification() {
        let store = store_with("v1", vec!["kc"]);
        assert!(matches!(
            store.verify_kubeconfig_paths().await,
            Err(StoreError::Verification { .. })
        ));
    }

    #[tokio::test]
    async fn failed_sub_listing_is_reported_next_to_found_paths() {
        let api = FakeApi::serve(vec![
            (
                "GET /v1/kc?list=true",
                200,
                r#"{"data":{"keys":["dev","sub/"]}}"#.to_string(),
            ),
            ("GET /v1/kc/sub?list=true", 503, "{}".to_string()),
            (
                "GET /v1/kc/dev",
                200,
                r#"{"data":{"config":"apiVersion: v1"}}"#.to_string(),
            ),
        ])
        .await;
        let store = store_at(&api.url(""), "v1", vec!["kc"]);
        store.verify_kubeconfig_paths().await.unwrap();

        let results = collect_search(&store).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].kubeconfig_path, "kc/dev");
        assert!(results[0].error.is_none());
        match &results[1].error {
            Some(StoreError::Search { store, reason }) => {
                assert_eq!(store, "vault.default");
                assert!(reason.contains("kc/sub"));
                assert!(reason.contains("503"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let tags = Tags::new();
        assert_eq!(
            store.kubeconfig_for_path("kc/dev", &tags).await.unwrap(),
            b"apiVersion: v1"
        );
        assert!(store
            .kubeconfig_for_path("kc/gone", &tags)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn kv2_search_recurses_through_metadata() {
        let api = FakeApi::serve(vec![
            (
                "GET /v1/secret/metadata/team?list=true",
                200,
                r#"{"data":{"keys":["eu/","us"]}}"#.to_string(),
            ),
            (
                "GET /v1/secret/metadata/team/eu?list=true",
                200,
                r#"{"data":{"keys":["prod"]}}"#.to_string(),
            ),
        ])
        .await;
        let store = store_at(&api.url(""), "v2", vec!["secret/team"]);

        let mut paths: Vec<String> = collect_search(&store)
            .await
            .into_iter()
            .map(|r| {
                assert!(r.error.is_none());
                r.kubeconfig_path
            })
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["secret/team/eu/prod", "secret/team/us"]);
    }

    #[tokio::test]
    async fn missing_root_fails_verification() {
        let api = FakeApi::serve(vec![]).await;
        let store = store_at(&api.url(""), "v1", vec!["nothing"]);
        assert!(matches!(
            store.verify_kubeconfig_paths().await,
            Err(StoreError::Verification { .. })
        ));
    }
}
