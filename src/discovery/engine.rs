// src/discovery/engine.rs
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

use crate::error::{Result, StoreError};
use crate::store::{KubeconfigStore, SearchSink};
use crate::types::SearchResult;
use crate::utils::logging::Logger;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub channel_capacity: usize,
    /// Per-store deadline for `start_search`; `None` waits indefinitely.
    pub search_timeout: Option<Duration>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            search_timeout: None,
        }
    }
}

/// Merged results of every store. `recv` returns `None` once all searches
/// have finished.
pub struct DiscoveryStream {
    receiver: mpsc::Receiver<SearchResult>,
}

impl DiscoveryStream {
    pub async fn recv(&mut self) -> Option<SearchResult> {
        self.receiver.recv().await
    }

    /// Drains the stream until every search has finished.
    pub async fn collect(mut self) -> Vec<SearchResult> {
        let mut results = Vec::new();
        while let Some(result) = self.receiver.recv().await {
            results.push(result);
        }
        results
    }
}

/// Verifies and searches every store concurrently.
///
/// Must be called from within a tokio runtime. Stores are verified one after
/// another; each store that passes starts searching right away in its own
/// task. A store that fails verification contributes a single error result
/// (or only a log line when it is not `required`). The stream is closed
/// after the last search task has returned.
pub fn start_discovery(
    stores: Vec<Arc<dyn KubeconfigStore>>,
    options: DiscoveryOptions,
    logger: Arc<dyn Logger>,
) -> DiscoveryStream {
    let (sender, receiver) = mpsc::channel(options.channel_capacity.max(1));
    tokio::spawn(run_discovery(stores, options, sender, logger));
    DiscoveryStream { receiver }
}

async fn run_discovery(
    stores: Vec<Arc<dyn KubeconfigStore>>,
    options: DiscoveryOptions,
    sender: mpsc::Sender<SearchResult>,
    logger: Arc<dyn Logger>,
) {
    let mut searches = JoinSet::new();

    for store in stores {
        let store_id = store.id();
        match verify(Arc::clone(&store)).await {
            Ok(()) => {
                logger.debug_log(&format!("Starting search in store {}", store_id));
                searches.spawn(supervise_search(
                    store,
                    SearchSink::new(sender.clone(), &store_id),
                    options.search_timeout,
                    Arc::clone(&logger),
                ));
            }
            Err(e) if store.store_config().required => {
                logger.log(&format!("Skipping store {}: {}", store_id, e));
                let _ = SearchSink::new(sender.clone(), &store_id).emit_error(e).await;
            }
            Err(e) => {
                logger.debug_log(&format!("Skipping optional store {}: {}", store_id, e));
            }
        }
    }

    while let Some(joined) = searches.join_next().await {
        if let Err(e) = joined {
            logger.log(&format!("Search supervisor failed: {}", e));
        }
    }
    // last sender goes away here, which ends the consumer's stream
    drop(sender);
}

/// Runs verification in its own task so a panic in it stays contained.
async fn verify(store: Arc<dyn KubeconfigStore>) -> Result<()> {
    let store_id = store.id();
    match tokio::spawn(async move { store.verify_kubeconfig_paths().await }).await {
        Ok(verified) => verified,
        Err(e) => Err(StoreError::verification(&store_id, fault_reason(e))),
    }
}

async fn supervise_search(
    store: Arc<dyn KubeconfigStore>,
    sink: SearchSink,
    timeout: Option<Duration>,
    logger: Arc<dyn Logger>,
) {
    let store_id = store.id();
    let task_sink = sink.clone();
    let mut search = tokio::spawn(async move { store.start_search(task_sink).await });

    let joined = match timeout {
        None => (&mut search).await,
        Some(limit) => match tokio::time::timeout(limit, &mut search).await {
            Ok(joined) => joined,
            Err(_) => {
                search.abort();
                logger.log(&format!(
                    "Search in store {} timed out after {:?}",
                    store_id, limit
                ));
                sink.emit_error(StoreError::Timeout {
                    store: store_id,
                    after: limit,
                })
                .await;
                return;
            }
        },
    };

    match joined {
        Ok(()) => logger.debug_log(&format!("Search in store {} finished", store_id)),
        Err(e) => {
            let reason = fault_reason(e);
            logger.log(&format!("Search in store {} failed: {}", store_id, reason));
            sink.emit_error(StoreError::InternalFault {
                store: store_id,
                reason,
            })
            .await;
        }
    }
}

fn fault_reason(error: JoinError) -> String {
    if error.is_panic() {
        panic_message(error.into_panic())
    } else {
        "task was cancelled".to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
