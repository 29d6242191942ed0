// src/store/rancher.rs
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use super::cache::DiscoveryCache;
use super::http::ApiClient;
use super::{non_empty, KubeconfigStore, Previewer, SearchSink};
use crate::config::{env_fallback, parse_api_address, KubeconfigStoreConfig, StoreConfigRancher};
use crate::error::{Result, StoreError};
use crate::types::{store_id, SearchResult, StoreKind, Tags};
use crate::utils::logging::{Logger, StoreLogger};

pub const TAG_CLUSTER_ID: &str = "clusterID";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RancherCluster {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub version: Option<RancherVersion>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RancherVersion {
    #[serde(default)]
    pub git_version: Option<String>,
}

#[derive(Deserialize)]
struct ClusterCollection {
    #[serde(default)]
    data: Vec<RancherCluster>,
}

#[derive(Deserialize)]
struct GeneratedKubeconfig {
    config: String,
}

/// Downstream clusters managed by a Rancher server (`/v3` management API).
pub struct RancherStore {
    logger: StoreLogger,
    config: KubeconfigStoreConfig,
    client: ApiClient,
    // cluster name -> cluster, filled during search
    discovered: DiscoveryCache<RancherCluster>,
}

impl RancherStore {
    pub fn new(config: KubeconfigStoreConfig, logger: StoreLogger) -> Result<Self> {
        let id = config.store_id();
        let rancher: StoreConfigRancher = config.kind_config()?;
        let address = rancher.rancher_api_address.ok_or_else(|| {
            StoreError::Config(format!("store {}: rancherAPIAddress is required", id))
        })?;
        let address = parse_api_address(&id, &address)?;
        let token = env_fallback(&rancher.rancher_token, &["RANCHER_TOKEN"]).ok_or_else(|| {
            StoreError::Config(format!(
                "store {}: rancherToken is not set and RANCHER_TOKEN is empty",
                id
            ))
        })?;

        Ok(Self {
            client: ApiClient::with_bearer(&address, &token)?,
            discovered: DiscoveryCache::new(),
            logger,
            config,
        })
    }

    /// Cached cluster, or a point lookup by ID or name on a miss.
    async fn resolve_cluster(&self, path: &str, tags: &Tags) -> Result<RancherCluster> {
        if let Some(cluster) = self.discovered.get(path) {
            return Ok(cluster);
        }

        let looked_up = match tags.get(TAG_CLUSTER_ID) {
            Some(id) => {
                self.client
                    .get_json::<RancherCluster>(&format!("clusters/{}", id))
                    .await?
            }
            None => self
                .client
                .get_json::<ClusterCollection>(&format!(
                    "clusters?name={}",
                    url::form_urlencoded::byte_serialize(path.as_bytes()).collect::<String>()
                ))
                .await?
                .and_then(|collection| collection.data.into_iter().find(|c| c.name == path)),
        };

        match looked_up {
            Some(cluster) => Ok(self.discovered.insert_if_absent(path, cluster)),
            None => Err(StoreError::not_found(path)),
        }
    }
}

fn render_preview(cluster: &RancherCluster) -> String {
    let version = cluster
        .version
        .as_ref()
        .and_then(|v| v.git_version.as_deref())
        .unwrap_or("unknown");
    format!(
        "Rancher cluster {} ({})\n  State: {}\n  Provider: {}\n  Kubernetes: {}",
        cluster.name,
        cluster.id,
        cluster.state.as_deref().unwrap_or("unknown"),
        cluster.provider.as_deref().unwrap_or("unknown"),
        version
    )
}

#[async_trait]
impl KubeconfigStore for RancherStore {
    fn id(&self) -> String {
        store_id(StoreKind::Rancher, self.config.id.as_deref())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Rancher
    }

    fn context_prefix(&self, path: &str) -> String {
        if !self.config.show_prefix {
            return String::new();
        }
        format!("rancher-{}", path)
    }

    async fn verify_kubeconfig_paths(&self) -> Result<()> {
        // the API root answers 401 for a bad token
        self.client
            .get_json::<serde_json::Value>("")
            .await
            .map_err(|e| StoreError::verification(&self.id(), e))?
            .ok_or_else(|| {
                StoreError::verification(
                    &self.id(),
                    format!("no rancher API at {}", self.client.base_url()),
                )
            })?;
        Ok(())
    }

    async fn start_search(&self, sink: SearchSink) {
        let clusters = match self.client.get_json::<ClusterCollection>("clusters").await {
            Ok(Some(collection)) => collection.data,
            Ok(None) => Vec::new(),
            Err(e) => {
                sink.emit_error(StoreError::search(&self.id(), e)).await;
                return;
            }
        };
        self.logger
            .debug_log(&format!("Discovered {} clusters", clusters.len()));

        for cluster in clusters {
            let result = SearchResult::found(cluster.name.clone())
                .with_tag(TAG_CLUSTER_ID, cluster.id.clone());
            self.discovered.insert(cluster.name.clone(), cluster);
            if !sink.emit(result).await {
                return;
            }
        }
    }

    async fn kubeconfig_for_path(&self, path: &str, tags: &Tags) -> Result<Vec<u8>> {
        let cluster = self.resolve_cluster(path, tags).await?;
        let generated: GeneratedKubeconfig = self
            .client
            .json(
                Method::POST,
                &format!("clusters/{}?action=generateKubeconfig", cluster.id),
            )
            .await
            .map_err(|e| StoreError::fetch(path, e))?
            .ok_or_else(|| StoreError::not_found(path))?;
        non_empty(path, generated.config.into_bytes())
    }

    fn logger(&self) -> &StoreLogger {
        &self.logger
    }

    fn store_config(&self) -> &KubeconfigStoreConfig {
        &self.config
    }

    fn as_previewer(&self) -> Option<&dyn Previewer> {
        Some(self)
    }
}

#[async_trait]
impl Previewer for RancherStore {
    async fn search_preview(&self, path: &str, tags: &Tags) -> Result<String> {
        let cluster = self.resolve_cluster(path, tags).await?;
        Ok(render_preview(&cluster))
    }
}
