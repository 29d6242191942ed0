// src/store/filesystem.rs
use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use super::{non_empty, KubeconfigStore, SearchSink};
use crate::config::{expand_path, KubeconfigStoreConfig};
use crate::error::{Result, StoreError};
use crate::types::{store_id, StoreKind, Tags};
use crate::utils::logging::{Logger, StoreLogger};

#[derive(Debug, Clone, Default)]
struct SearchRoots {
    directories: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

/// Kubeconfig files on the local filesystem.
///
/// Configured paths are either kubeconfig files (emitted as-is) or
/// directories, walked recursively for files matching the kubeconfig name
/// pattern.
pub struct FilesystemStore {
    logger: StoreLogger,
    config: KubeconfigStoreConfig,
    kubeconfig_name: String,
    roots: RwLock<Option<SearchRoots>>,
}

impl FilesystemStore {
    pub fn new(config: KubeconfigStoreConfig, default_name: &str, logger: StoreLogger) -> Self {
        let kubeconfig_name = config
            .kubeconfig_name
            .clone()
            .unwrap_or_else(|| default_name.to_string());
        Self {
            logger,
            config,
            kubeconfig_name,
            roots: RwLock::new(None),
        }
    }

    fn resolve_roots(&self) -> Result<SearchRoots> {
        let mut roots = SearchRoots::default();
        for configured in &self.config.paths {
            let path = expand_path(configured)?;
            if path.is_dir() {
                roots.directories.push(path);
            } else if path.is_file() {
                roots.files.push(path);
            } else {
                return Err(StoreError::verification(
                    &self.id(),
                    format!("path does not exist: {}", path.display()),
                ));
            }
        }
        if roots.directories.is_empty() && roots.files.is_empty() {
            return Err(StoreError::verification(&self.id(), "no search paths configured"));
        }
        Ok(roots)
    }

    fn verified_roots(&self) -> Option<SearchRoots> {
        self.roots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn pattern_for(&self, directory: &Path) -> String {
        format!(
            "{}/**/{}",
            glob::Pattern::escape(&directory.to_string_lossy()),
            self.kubeconfig_name
        )
    }
}

/// Walks `pattern`, splitting hits from unreadable entries.
fn walk(pattern: &str) -> std::result::Result<(Vec<PathBuf>, Vec<String>), glob::PatternError> {
    let mut found = Vec::new();
    let mut failures = Vec::new();
    for entry in glob::glob(pattern)? {
        match entry {
            Ok(path) if path.is_file() => found.push(path),
            Ok(_) => {}
            Err(e) => failures.push(e.to_string()),
        }
    }
    Ok((found, failures))
}

#[async_trait]
impl KubeconfigStore for FilesystemStore {
    fn id(&self) -> String {
        store_id(StoreKind::Filesystem, self.config.id.as_deref())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Filesystem
    }

    /// Name of the directory holding the kubeconfig.
    fn context_prefix(&self, path: &str) -> String {
        if !self.config.show_prefix {
            return String::new();
        }
        Path::new(path)
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    async fn verify_kubeconfig_paths(&self) -> Result<()> {
        let roots = self.resolve_roots()?;
        self.logger.debug_log(&format!(
            "Verified {} directories and {} files",
            roots.directories.len(),
            roots.files.len()
        ));
        *self.roots.write().unwrap_or_else(PoisonError::into_inner) = Some(roots);
        Ok(())
    }

    async fn start_search(&self, sink: SearchSink) {
        let roots = match self.verified_roots() {
            Some(roots) => roots,
            None => match self.resolve_roots() {
                Ok(roots) => roots,
                Err(e) => {
                    sink.emit_error(e).await;
                    return;
                }
            },
        };

        // a configured file may also sit under a configured directory
        let mut emitted: HashSet<PathBuf> = HashSet::new();
        for file in &roots.files {
            if emitted.insert(file.clone()) && !sink.emit_path(file.to_string_lossy()).await {
                return;
            }
        }

        for directory in roots.directories {
            let pattern = self.pattern_for(&directory);
            self.logger
                .debug_log(&format!("Searching for kubeconfigs with pattern: {}", pattern));

            let walked = tokio::task::spawn_blocking(move || walk(&pattern)).await;
            let (found, failures) = match walked {
                Ok(Ok(walked)) => walked,
                Ok(Err(e)) => {
                    sink.emit_error(StoreError::search(
                        &self.id(),
                        format!("invalid kubeconfig name pattern: {}", e),
                    ))
                    .await;
                    return;
                }
                Err(e) => {
                    sink.emit_error(StoreError::search(&self.id(), e)).await;
                    continue;
                }
            };

            for failure in failures {
                self.logger.log(&format!("Unreadable entry: {}", failure));
                sink.emit_error(StoreError::search(&self.id(), failure)).await;
            }
            for path in found {
                if !emitted.insert(path.clone()) {
                    continue;
                }
                if !sink.emit_path(path.to_string_lossy()).await {
                    return;
                }
            }
        }
    }

    async fn kubeconfig_for_path(&self, path: &str, _tags: &Tags) -> Result<Vec<u8>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => non_empty(path, bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::not_found(path)),
            Err(e) => Err(StoreError::fetch(path, e)),
        }
    }

    fn logger(&self) -> &StoreLogger {
        &self.logger
    }

    fn store_config(&self) -> &KubeconfigStoreConfig {
        &self.config
    }
}
