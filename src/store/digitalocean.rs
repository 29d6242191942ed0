// src/store/digitalocean.rs
use async_trait::async_trait;
use serde::Deserialize;

use super::cache::DiscoveryCache;
use super::http::ApiClient;
use super::{non_empty, KubeconfigStore, Previewer, SearchSink};
use crate::config::{
    env_fallback, parse_api_address, KubeconfigStoreConfig, StoreConfigDigitalOcean,
};
use crate::error::{Result, StoreError};
use crate::types::{store_id, SearchResult, StoreKind, Tags};
use crate::utils::logging::{Logger, StoreLogger};

const DEFAULT_API_ADDRESS: &str = "https://api.digitalocean.com";
const PAGE_SIZE: usize = 200;
pub const TAG_CLUSTER_ID: &str = "clusterID";

#[derive(Debug, Clone, Deserialize)]
pub struct DoksCluster {
    pub id: String,
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: Option<DoksStatus>,
    #[serde(default)]
    pub node_pools: Vec<DoksNodePool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoksStatus {
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoksNodePool {
    pub name: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub count: u32,
}

#[derive(Deserialize)]
struct ClusterPage {
    #[serde(default)]
    kubernetes_clusters: Vec<DoksCluster>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Deserialize)]
struct Links {
    #[serde(default)]
    pages: Option<Pages>,
}

#[derive(Deserialize)]
struct Pages {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct SingleCluster {
    kubernetes_cluster: DoksCluster,
}

/// `<region>/<cluster name>`
fn cluster_path(cluster: &DoksCluster) -> String {
    format!("{}/{}", cluster.region, cluster.name)
}

/// DigitalOcean Kubernetes (DOKS) clusters of one account.
pub struct DigitalOceanStore {
    logger: StoreLogger,
    config: KubeconfigStoreConfig,
    client: ApiClient,
    // `<region>/<name>` -> cluster. A preview for an uncached path can write
    // here while the search task is still filling it.
    discovered: DiscoveryCache<DoksCluster>,
}

impl DigitalOceanStore {
    pub fn new(config: KubeconfigStoreConfig, logger: StoreLogger) -> Result<Self> {
        let id = config.store_id();
        let doks: StoreConfigDigitalOcean = config.kind_config()?;
        let token = env_fallback(&doks.token, &["DIGITALOCEAN_ACCESS_TOKEN"]).ok_or_else(|| {
            StoreError::Config(format!(
                "store {}: token is not set and DIGITALOCEAN_ACCESS_TOKEN is empty",
                id
            ))
        })?;
        let address = parse_api_address(
            &id,
            doks.api_address.as_deref().unwrap_or(DEFAULT_API_ADDRESS),
        )?;

        Ok(Self {
            client: ApiClient::with_bearer(&address, &token)?,
            discovered: DiscoveryCache::new(),
            logger,
            config,
        })
    }

    async fn list_page(&self, page: usize) -> Result<(Vec<DoksCluster>, bool)> {
        let listed: Option<ClusterPage> = self
            .client
            .get_json(&format!(
                "v2/kubernetes/clusters?page={}&per_page={}",
                page, PAGE_SIZE
            ))
            .await?;
        Ok(match listed {
            Some(listed) => {
                let has_next = listed
                    .links
                    .and_then(|links| links.pages)
                    .and_then(|pages| pages.next)
                    .is_some();
                (listed.kubernetes_clusters, has_next)
            }
            None => (Vec::new(), false),
        })
    }

    async fn lookup(&self, path: &str, tags: &Tags) -> Result<Option<DoksCluster>> {
        if let Some(id) = tags.get(TAG_CLUSTER_ID) {
            let single: Option<SingleCluster> = self
                .client
                .get_json(&format!("v2/kubernetes/clusters/{}", id))
                .await?;
            return Ok(single.map(|single| single.kubernetes_cluster));
        }

        // no ID to go by: page through until the path shows up
        let mut page = 1;
        loop {
            let (clusters, has_next) = self.list_page(page).await?;
            if let Some(found) = clusters.into_iter().find(|c| cluster_path(c) == path) {
                return Ok(Some(found));
            }
            if !has_next {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn resolve_cluster(&self, path: &str, tags: &Tags) -> Result<DoksCluster> {
        if let Some(cluster) = self.discovered.get(path) {
            return Ok(cluster);
        }
        match self.lookup(path, tags).await? {
            Some(cluster) => Ok(self.discovered.insert_if_absent(path, cluster)),
            None => Err(StoreError::not_found(path)),
        }
    }
}

fn render_preview(cluster: &DoksCluster) -> String {
    let mut preview = format!(
        "DigitalOcean cluster {}\n  Region: {}\n  Status: {}\n  Version: {}",
        cluster.name,
        cluster.region,
        cluster
            .status
            .as_ref()
            .and_then(|s| s.state.as_deref())
            .unwrap_or("unknown"),
        cluster.version.as_deref().unwrap_or("unknown"),
    );
    if cluster.node_pools.is_empty() {
        preview.push_str("\n  Node pools: none");
    }
    for pool in &cluster.node_pools {
        preview.push_str(&format!(
            "\n  Node pool {}: {} x {}",
            pool.name,
            pool.count,
            pool.size.as_deref().unwrap_or("unknown")
        ));
    }
    preview
}

#[async_trait]
impl KubeconfigStore for DigitalOceanStore {
    fn id(&self) -> String {
        store_id(StoreKind::DigitalOcean, self.config.id.as_deref())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::DigitalOcean
    }

    fn context_prefix(&self, path: &str) -> String {
        if !self.config.show_prefix {
            return String::new();
        }
        format!("do-{}", path.replace('/', "-"))
    }

    async fn verify_kubeconfig_paths(&self) -> Result<()> {
        let account: Option<serde_json::Value> = self
            .client
            .get_json("v2/account")
            .await
            .map_err(|e| StoreError::verification(&self.id(), e))?;
        if account.is_none() {
            return Err(StoreError::verification(
                &self.id(),
                "account endpoint not found",
            ));
        }
        Ok(())
    }

    async fn start_search(&self, sink: SearchSink) {
        let mut page = 1;
        loop {
            let (clusters, has_next) = match self.list_page(page).await {
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

            for cluster in clusters {
                let path = cluster_path(&cluster);
                let result =
                    SearchResult::found(path.clone()).with_tag(TAG_CLUSTER_ID, cluster.id.clone());
                self.discovered.insert(path, cluster);
                if !sink.emit(result).await {
                    return;
                }
            }

            if !has_next {
                break;
            }
            page += 1;
        }
        self.logger
            .debug_log(&format!("Discovered {} clusters", self.discovered.len()));
    }

    async fn kubeconfig_for_path(&self, path: &str, tags: &Tags) -> Result<Vec<u8>> {
        let cluster_id = match tags.get(TAG_CLUSTER_ID) {
            Some(id) => id.clone(),
            None => self.resolve_cluster(path, tags).await?.id,
        };
        let kubeconfig = self
            .client
            .get_text(&format!("v2/kubernetes/clusters/{}/kubeconfig", cluster_id))
            .await
            .map_err(|e| StoreError::fetch(path, e))?
            .ok_or_else(|| StoreError::not_found(path))?;
        non_empty(path, kubeconfig.into_bytes())
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
impl Previewer for DigitalOceanStore {
    async fn search_preview(&self, path: &str, tags: &Tags) -> Result<String> {
        let cluster = self.resolve_cluster(path, tags).await?;
        Ok(render_preview(&cluster))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::collect_search;
    use crate::store::http::fake::FakeApi;
    use crate::utils::logging::NoopLogger;
    use std::sync::Arc;

    const CLUSTER: &str = r#"{
        "id": "bd5f5959-5e1e-4205-a714-a914373942af",
        "name": "prod",
        "region": "fra1",
        "version": "1.29.1-do.0",
        "status": {"state": "running"},
        "node_pools": [{"name": "workers", "size": "s-2vcpu-4gb", "count": 3}]
    }"#;

    fn store_at(address: &str) -> DigitalOceanStore {
        let mut config = KubeconfigStoreConfig::new(StoreKind::DigitalOcean);
        config.config = Some(
            serde_yaml::from_str(&format!("token: dop_v1_test\napiAddress: {}", address))
                .unwrap(),
        );
        DigitalOceanStore::new(
            config,
            StoreLogger::new("digitalocean.default", Arc::new(NoopLogger)),
        )
        .unwrap()
    }

    fn store() -> DigitalOceanStore {
        store_at("http://127.0.0.1:1")
    }

    async fn two_page_api() -> FakeApi {
        FakeApi::serve(vec![
            (
                "GET /v2/kubernetes/clusters?page=1&per_page=200",
                200,
                r#"{"kubernetes_clusters":[{"id":"a1","name":"prod","region":"fra1"}],
                    "links":{"pages":{"next":"https://api.digitalocean.com/v2/kubernetes/clusters?page=2"}}}"#
                    .to_string(),
            ),
            (
                "GET /v2/kubernetes/clusters?page=2&per_page=200",
                200,
                r#"{"kubernetes_clusters":[{"id":"b2","name":"dev","region":"ams3"}],"links":{}}"#
                    .to_string(),
            ),
            (
                "GET /v2/kubernetes/clusters/b2/kubeconfig",
                200,
                "apiVersion: v1\nkind: Config\n".to_string(),
            ),
        ])
        .await
    }

    #[test]
    fn paths_and_prefixes() {
        let cluster: DoksCluster = serde_json::from_str(CLUSTER).unwrap();
        assert_eq!(cluster_path(&cluster), "fra1/prod");

        let store = store();
        assert_eq!(store.context_prefix("fra1/prod"), "do-fra1-prod");
        assert_eq!(store.context_prefix("fra1/prod"), store.context_prefix("fra1/prod"));
        assert_eq!(store.id(), "digitalocean.default");
    }

    #[test]
    fn page_links_decide_pagination() {
        let page: ClusterPage = serde_json::from_str(
            r#"{"kubernetes_clusters": [], "links": {"pages": {"next": "https://api/v2?page=2"}}}"#,
        )
        .unwrap();
        assert!(page.links.and_then(|l| l.pages).and_then(|p| p.next).is_some());

        let last: ClusterPage = serde_json::from_str(r#"{"kubernetes_clusters": []}"#).unwrap();
        assert!(last.links.is_none());
    }

    #[tokio::test]
    async fn preview_uses_cached_cluster() {
        let store = store();
        store
            .discovered
            .insert("fra1/prod", serde_json::from_str(CLUSTER).unwrap());

        let preview = store
            .search_preview("fra1/prod", &Tags::new())
            .await
            .unwrap();
        assert!(preview.contains("Status: running"));
        assert!(preview.contains("Node pool workers: 3 x s-2vcpu-4gb"));
    }

    #[test]
    fn preview_without_status_or_pools() {
        let cluster: DoksCluster =
            serde_json::from_str(r#"{"id":"1","name":"bare","region":"ams3"}"#).unwrap();
        let preview = render_preview(&cluster);
        assert!(preview.contains("Status: unknown"));
        assert!(preview.contains("Node pools: none"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cache_readers_see_search_writes() {
        let store = Arc::new(store());
        let template: DoksCluster = serde_json::from_str(CLUSTER).unwrap();
        let mut tasks = tokio::task::JoinSet::new();

        for n in 0..50 {
            let store = Arc::clone(&store);
            let mut cluster = template.clone();
            tasks.spawn(async move {
                cluster.name = format!("c{}", n);
                let path = cluster_path(&cluster);
                store.discovered.insert(path.clone(), cluster);
                store.search_preview(&path, &Tags::new()).await
            });
        }

        while let Some(result) = tasks.join_next().await {
            let preview = result.expect("Task should not panic").unwrap();
            assert!(preview.contains("Region: fra1"));
        }
        assert_eq!(store.discovered.len(), 50);
    }

    #[tokio::test]
    async fn search_walks_every_page() {
        let api = two_page_api().await;
        let store = store_at(&api.url(""));

        let results = collect_search(&store).await;
        let found: Vec<(&str, &str)> = results
            .iter()
            .map(|r| {
                assert!(r.error.is_none());
                (r.kubeconfig_path.as_str(), r.tags[TAG_CLUSTER_ID].as_str())
            })
            .collect();
        assert_eq!(found, vec![("fra1/prod", "a1"), ("ams3/dev", "b2")]);
        assert_eq!(store.discovered.len(), 2);

        let kubeconfig = store
            .kubeconfig_for_path("ams3/dev", &results[1].tags)
            .await
            .unwrap();
        assert_eq!(kubeconfig, b"apiVersion: v1\nkind: Config\n");
    }

    #[tokio::test]
    async fn tagged_fetch_goes_straight_to_the_cluster() {
        let api = two_page_api().await;
        let store = store_at(&api.url(""));
        let tags: Tags = [(TAG_CLUSTER_ID.to_string(), "b2".to_string())].into();

        store.kubeconfig_for_path("ams3/dev", &tags).await.unwrap();
        assert_eq!(api.hits(), vec!["GET /v2/kubernetes/clusters/b2/kubeconfig"]);
        assert!(store.discovered.is_empty());
    }

    #[tokio::test]
    async fn deleted_cluster_is_not_found() {
        let api = two_page_api().await;
        let store = store_at(&api.url(""));
        let tags: Tags = [(TAG_CLUSTER_ID.to_string(), "gone".to_string())].into();

        let err = store.kubeconfig_for_path("fra1/gone", &tags).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn untagged_preview_pages_until_found_then_caches() {
        let api = two_page_api().await;
        let store = store_at(&api.url(""));

        let preview = store.search_preview("ams3/dev", &Tags::new()).await.unwrap();
        assert!(preview.contains("DigitalOcean cluster dev"));
        assert_eq!(api.hits().len(), 2);

        store.search_preview("ams3/dev", &Tags::new()).await.unwrap();
        assert_eq!(api.hits().len(), 2);
        assert!(store
            .search_preview("lon1/none", &Tags::new())
            .await
            .unwrap_err()
            .is_not_found());
    }
}
