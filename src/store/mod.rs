// src/store/mod.rs
mod akamai;
mod cache;
mod digitalocean;
mod filesystem;
mod http;
mod rancher;
mod vault;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{KubeconfigStoreConfig, SwitchConfig};
use crate::error::{Result, StoreError};
use crate::types::{SearchResult, StoreKind, Tags};
use crate::utils::logging::{Logger, StoreLogger};

pub use akamai::AkamaiStore;
pub use cache::DiscoveryCache;
pub use digitalocean::DigitalOceanStore;
pub use filesystem::FilesystemStore;
pub use rancher::RancherStore;
pub use vault::VaultStore;

/// Append-only handle to the shared result stream.
///
/// Stores emit into it during `start_search`; the discovery engine owns the
/// stream's lifetime and closes it once every search has returned.
#[derive(Clone)]
pub struct SearchSink {
    sender: mpsc::Sender<SearchResult>,
    store_id: String,
}

impl SearchSink {
    pub fn new(sender: mpsc::Sender<SearchResult>, store_id: &str) -> Self {
        Self {
            sender,
            store_id: store_id.to_string(),
        }
    }

    /// Returns `false` once the consumer has gone away.
    pub async fn emit(&self, mut result: SearchResult) -> bool {
        result.store_id = self.store_id.clone();
        self.sender.send(result).await.is_ok()
    }

    pub async fn emit_path(&self, path: impl Into<String>) -> bool {
        self.emit(SearchResult::found(path)).await
    }

    pub async fn emit_error(&self, error: StoreError) -> bool {
        self.emit(SearchResult::failed(error)).await
    }
}

/// Contract every kubeconfig backend implements.
#[async_trait]
pub trait KubeconfigStore: Send + Sync {
    /// `<kind>.<id>` or `<kind>.default`. Never performs I/O.
    fn id(&self) -> String;

    fn kind(&self) -> StoreKind;

    /// Prefix shown in front of the context names of a search result.
    /// Pure: the same path always yields the same prefix.
    fn context_prefix(&self, path: &str) -> String;

    /// Checks preconditions (search roots exist, credentials are usable).
    /// Called once before `start_search`; a failure excludes this store only.
    async fn verify_kubeconfig_paths(&self) -> Result<()>;

    /// Enumerates kubeconfig paths into `sink`. Partial failures are emitted
    /// as error results. Returns after the last emission.
    async fn start_search(&self, sink: SearchSink);

    /// Raw kubeconfig bytes for a previously discovered path.
    /// Fails with `StoreError::NotFound` when the path no longer resolves.
    async fn kubeconfig_for_path(&self, path: &str, tags: &Tags) -> Result<Vec<u8>>;

    fn logger(&self) -> &StoreLogger;

    fn store_config(&self) -> &KubeconfigStoreConfig;

    /// Optional preview capability.
    fn as_previewer(&self) -> Option<&dyn Previewer> {
        None
    }
}

/// Optional capability: a short human-readable summary shown before fetching.
#[async_trait]
pub trait Previewer: Send + Sync {
    async fn search_preview(&self, path: &str, tags: &Tags) -> Result<String>;
}

/// Fails with `NotFound` instead of handing out an empty kubeconfig.
pub(crate) fn non_empty(path: &str, bytes: Vec<u8>) -> Result<Vec<u8>> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(StoreError::not_found(path));
    }
    Ok(bytes)
}

/// Builds the store for one configured entry.
pub fn build_store(
    config: &KubeconfigStoreConfig,
    switch_config: &SwitchConfig,
    logger: Arc<dyn Logger>,
) -> Result<Arc<dyn KubeconfigStore>> {
    let store_logger = StoreLogger::new(&config.store_id(), logger);
    let store: Arc<dyn KubeconfigStore> = match config.kind {
        StoreKind::Filesystem => Arc::new(FilesystemStore::new(
            config.clone(),
            switch_config.kubeconfig_name(),
            store_logger,
        )),
        StoreKind::Vault => Arc::new(VaultStore::new(config.clone(), store_logger)?),
        StoreKind::Rancher => Arc::new(RancherStore::new(config.clone(), store_logger)?),
        StoreKind::DigitalOcean => {
            Arc::new(DigitalOceanStore::new(config.clone(), store_logger)?)
        }
        StoreKind::Akamai => Arc::new(AkamaiStore::new(config.clone(), store_logger)?),
        other => return Err(StoreError::Unsupported(other.to_string())),
    };
    Ok(store)
}

/// Builds every configured store. Stores that cannot be constructed are
/// returned as errors next to the ones that can.
pub fn build_stores(
    switch_config: &SwitchConfig,
    logger: Arc<dyn Logger>,
) -> (Vec<Arc<dyn KubeconfigStore>>, Vec<StoreError>) {
    let mut stores = Vec::new();
    let mut errors = Vec::new();
    for config in &switch_config.kubeconfig_stores {
        match build_store(config, switch_config, Arc::clone(&logger)) {
            Ok(store) => stores.push(store),
            Err(e) => {
                logger.log(&format!("Skipping store {}: {}", config.store_id(), e));
                errors.push(e);
            }
        }
    }
    (stores, errors)
}

pub fn find_store<'a>(
    stores: &'a [Arc<dyn KubeconfigStore>],
    id: &str,
) -> Option<&'a Arc<dyn KubeconfigStore>> {
    stores.iter().find(|store| store.id() == id)
}

/// Runs one store's search to completion and returns what it emitted.
#[cfg(test)]
pub(crate) async fn collect_search(store: &dyn KubeconfigStore) -> Vec<SearchResult> {
    let (tx, mut rx) = mpsc::channel(16);
    let search = store.start_search(SearchSink::new(tx, &store.id()));
    let drain = async {
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    };
    let ((), results) = tokio::join!(search, drain);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::logging::NoopLogger;

    fn switch_config(stores: Vec<KubeconfigStoreConfig>) -> SwitchConfig {
        SwitchConfig {
            kind: None,
            kubeconfig_name: None,
            kubeconfig_stores: stores,
        }
    }

    #[test]
    fn unsupported_kinds_are_reported_not_built() {
        let mut fs = KubeconfigStoreConfig::new(StoreKind::Filesystem);
        fs.paths = vec!["/tmp".to_string()];
        let config = switch_config(vec![fs, KubeconfigStoreConfig::new(StoreKind::Gke)]);

        let (stores, errors) = build_stores(&config, Arc::new(NoopLogger));
        assert_eq!(stores.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], StoreError::Unsupported(_)));
        assert!(find_store(&stores, "filesystem.default").is_some());
        assert!(find_store(&stores, "gke.default").is_none());
    }

    #[test]
    fn built_store_ids_are_stable() {
        let mut fs = KubeconfigStoreConfig::new(StoreKind::Filesystem);
        fs.id = Some("home".to_string());
        fs.paths = vec!["/tmp".to_string()];
        let config = switch_config(vec![fs.clone()]);

        let store = build_store(&fs, &config, Arc::new(NoopLogger)).unwrap();
        assert_eq!(store.id(), "filesystem.home");
        assert_eq!(store.id(), store.id());
        assert_eq!(store.kind(), StoreKind::Filesystem);
        assert!(store.as_previewer().is_none());
    }

    #[test]
    fn whitespace_only_kubeconfig_is_not_found() {
        assert!(non_empty("a", b" \n".to_vec()).unwrap_err().is_not_found());
        assert_eq!(non_empty("a", b"apiVersion: v1".to_vec()).unwrap().len(), 14);
    }
}
