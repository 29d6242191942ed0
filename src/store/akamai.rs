// src/store/akamai.rs
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

use super::cache::DiscoveryCache;
use super::http::ApiClient;
use super::{non_empty, KubeconfigStore, Previewer, SearchSink};
use crate::config::{env_fallback, parse_api_address, KubeconfigStoreConfig, StoreConfigAkamai};
use crate::error::{Result, StoreError};
use crate::types::{store_id, SearchResult, StoreKind, Tags};
use crate::utils::logging::{Logger, StoreLogger};

const DEFAULT_API_ADDRESS: &str = "https://api.linode.com";
const PAGE_SIZE: usize = 500;
pub const TAG_CLUSTER_ID: &str = "clusterID";

#[derive(Debug, Clone, Deserialize)]
pub struct LkeCluster {
    pub id: u64,
    pub label: String,
    pub region: String,
    #[serde(default)]
    pub k8s_version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub control_plane: Option<ControlPlane>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlPlane {
    #[serde(default)]
    pub high_availability: bool,
}

#[derive(Deserialize)]
struct ClusterPage {
    #[serde(default)]
    data: Vec<LkeCluster>,
    #[serde(default)]
    page: usize,
    #[serde(default)]
    pages: usize,
}

#[derive(Deserialize)]
struct EncodedKubeconfig {
    kubeconfig: String,
}

fn cluster_path(cluster: &LkeCluster) -> String {
    format!("{}/{}", cluster.region, cluster.label)
}

/// Linode Kubernetes Engine clusters of one Akamai account.
pub struct AkamaiStore {
    logger: StoreLogger,
    config: KubeconfigStoreConfig,
    client: ApiClient,
    region: Option<String>,
    discovered: DiscoveryCache<LkeCluster>,
}

impl AkamaiStore {
    pub fn new(config: KubeconfigStoreConfig, logger: StoreLogger) -> Result<Self> {
        let id = config.store_id();
        let akamai: StoreConfigAkamai = config.kind_config()?;
        let token = env_fallback(&akamai.linode_token, &["LINODE_TOKEN"]).ok_or_else(|| {
            StoreError::Config(format!(
                "store {}: linodeToken is not set and LINODE_TOKEN is empty",
                id
            ))
        })?;
        let address = parse_api_address(
            &id,
            akamai.api_address.as_deref().unwrap_or(DEFAULT_API_ADDRESS),
        )?;

        Ok(Self {
            client: ApiClient::with_bearer(&address, &token)?,
            region: akamai.region.filter(|r| !r.is_empty()),
            discovered: DiscoveryCache::new(),
            logger,
            config,
        })
    }

    fn in_scope(&self, cluster: &LkeCluster) -> bool {
        self.region
            .as_deref()
            .map_or(true, |region| cluster.region == region)
    }

    /// Paths are `<region>/<label>`, so scope is known without a lookup.
    fn path_in_scope(&self, path: &str) -> bool {
        match (self.region.as_deref(), path.split_once('/')) {
            (Some(region), Some((path_region, _))) => path_region == region,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    async fn list_page(&self, page: usize) -> Result<ClusterPage> {
        let listed: Option<ClusterPage> = self
            .client
            .get_json(&format!(
                "v4/lke/clusters?page={}&page_size={}",
                page, PAGE_SIZE
            ))
            .await?;
        Ok(listed.unwrap_or(ClusterPage {
            data: Vec::new(),
            page,
            pages: 0,
        }))
    }

    async fn lookup(&self, path: &str, tags: &Tags) -> Result<Option<LkeCluster>> {
        if let Some(id) = tags.get(TAG_CLUSTER_ID) {
            let cluster: Option<LkeCluster> =
                self.client.get_json(&format!("v4/lke/clusters/{}", id)).await?;
            return Ok(cluster.filter(|c| self.in_scope(c)));
        }

        let mut page = 1;
        loop {
            let listed = self.list_page(page).await?;
            if let Some(found) = listed
                .data
                .into_iter()
                .find(|c| self.in_scope(c) && cluster_path(c) == path)
            {
                return Ok(Some(found));
            }
            if listed.page >= listed.pages {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn resolve_cluster(&self, path: &str, tags: &Tags) -> Result<LkeCluster> {
        if !self.path_in_scope(path) {
            return Err(StoreError::not_found(path));
        }
        if let Some(cluster) = self.discovered.get(path) {
            return Ok(cluster);
        }
        match self.lookup(path, tags).await? {
            Some(cluster) => Ok(self.discovered.insert_if_absent(path, cluster)),
            None => Err(StoreError::not_found(path)),
        }
    }
}

fn decode_kubeconfig(path: &str, encoded: &str) -> Result<Vec<u8>> {
    let decoded = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| StoreError::fetch(path, format!("kubeconfig is not valid base64: {}", e)))?;
    non_empty(path, decoded)
}

fn render_preview(cluster: &LkeCluster) -> String {
    let ha = cluster
        .control_plane
        .as_ref()
        .map(|cp| if cp.high_availability { "yes" } else { "no" })
        .unwrap_or("unknown");
    format!(
        "LKE cluster {} ({})\n  Region: {}\n  Status: {}\n  Kubernetes: {}\n  HA control plane: {}",
        cluster.label,
        cluster.id,
        cluster.region,
        cluster.status.as_deref().unwrap_or("unknown"),
        cluster.k8s_version.as_deref().unwrap_or("unknown"),
        ha
    )
}

#[async_trait]
impl KubeconfigStore for AkamaiStore {
    fn id(&self) -> String {
        store_id(StoreKind::Akamai, self.config.id.as_deref())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Akamai
    }

    fn context_prefix(&self, path: &str) -> String {
        if !self.config.show_prefix {
            return String::new();
        }
        let label = path.rsplit('/').next().unwrap_or(path);
        format!("lke-{}", label)
    }

    async fn verify_kubeconfig_paths(&self) -> Result<()> {
        let profile: Option<serde_json::Value> = self
            .client
            .get_json("v4/profile")
            .await
            .map_err(|e| StoreError::verification(&self.id(), e))?;
        profile
            .map(|_| ())
            .ok_or_else(|| StoreError::verification(&self.id(), "profile endpoint not found"))
    }

    async fn start_search(&self, sink: SearchSink) {
        let mut page = 1;
        loop {
            let listed = match self.list_page(page).await {
                Ok(listed) => listed,
                Err(e) => {
                    sink.emit_error(StoreError::search(
                        &self.id(),
                        format!("listing page {}: {}", page, e),
                    ))
                    .await;
                    return;
                }
            };

            for cluster in listed.data {
                if !self.in_scope(&cluster) {
                    continue;
                }
                let path = cluster_path(&cluster);
                let result = SearchResult::found(path.clone())
                    .with_tag(TAG_CLUSTER_ID, cluster.id.to_string());
                self.discovered.insert(path, cluster);
                if !sink.emit(result).await {
                    return;
                }
            }

            if listed.page >= listed.pages {
                break;
            }
            page += 1;
        }
        self.logger
            .debug_log(&format!("Discovered {} clusters", self.discovered.len()));
    }

    async fn kubeconfig_for_path(&self, path: &str, tags: &Tags) -> Result<Vec<u8>> {
        if !self.path_in_scope(path) {
            return Err(StoreError::not_found(path));
        }
        let cluster_id = match tags.get(TAG_CLUSTER_ID) {
            Some(id) => id.clone(),
            None => self.resolve_cluster(path, tags).await?.id.to_string(),
        };
        let encoded: EncodedKubeconfig = self
            .client
            .get_json(&format!("v4/lke/clusters/{}/kubeconfig", cluster_id))
            .await
            .map_err(|e| StoreError::fetch(path, e))?
            .ok_or_else(|| StoreError::not_found(path))?;
        decode_kubeconfig(path, &encoded.kubeconfig)
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
impl Previewer for AkamaiStore {
    async fn search_preview(&self, path: &str, tags: &Tags) -> Result<String> {
        let cluster = self.resolve_cluster(path, tags).await?;
        Ok(render_preview(&cluster))
    }
}
