// src/main.rs
use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use kubeswitch_stores::config::SwitchConfig;
use kubeswitch_stores::discovery::{start_discovery, DiscoveryOptions};
use kubeswitch_stores::error::{Result, StoreError};
use kubeswitch_stores::store::{build_stores, find_store};
use kubeswitch_stores::types::Tags;
use kubeswitch_stores::utils::logging::{FileLogger, Logger, MultiLogger, StderrLogger};

#[derive(Parser)]
#[command(author, version, about = "Discover kubeconfigs across filesystem, vault and cloud stores", long_about = None)]
pub struct Args {
    /// Switch config file (YAML, or JSON by extension)
    #[arg(short, long)]
    pub config: Option<String>,
    #[arg(short, long)]
    pub debug: bool,
    #[arg(long)]
    pub log_file: Option<String>,
    /// Per-store search deadline
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Store ID (e.g. `vault.default`) for --fetch / --preview
    #[arg(long)]
    pub store: Option<String>,
    /// Print the kubeconfig for this path
    #[arg(long, requires = "store", conflicts_with = "preview")]
    pub fetch: Option<String>,
    /// Print the preview for this path
    #[arg(long, requires = "store")]
    pub preview: Option<String>,
}

fn build_logger(args: &Args) -> Result<Arc<dyn Logger>> {
    let mut logger = MultiLogger::new().with(StderrLogger::new(args.debug));
    if let Some(log_file) = &args.log_file {
        logger = logger.with(FileLogger::new(log_file, args.debug)?);
    }
    Ok(Arc::new(logger))
}

fn config_path(args: &Args) -> Result<String> {
    match &args.config {
        Some(path) => Ok(path.clone()),
        None => SwitchConfig::default_path()
            .map(|path| path.to_string_lossy().into_owned())
            .ok_or_else(|| StoreError::Config("cannot determine home directory".to_string())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let logger = build_logger(&args)?;

    let switch_config = SwitchConfig::load_from_file(&config_path(&args)?)?;
    let (stores, build_errors) = build_stores(&switch_config, Arc::clone(&logger));
    for e in &build_errors {
        eprintln!("Error: {}", e);
    }

    if let Some(store_id) = &args.store {
        let store = find_store(&stores, store_id)
            .ok_or_else(|| StoreError::Config(format!("no store with ID {}", store_id)))?;
        let tags = Tags::new();

        if let Some(path) = &args.fetch {
            let kubeconfig = store.kubeconfig_for_path(path, &tags).await?;
            io::stdout().write_all(&kubeconfig)?;
        } else if let Some(path) = &args.preview {
            let previewer = store.as_previewer().ok_or_else(|| {
                StoreError::Unsupported(format!("previews for {}", store.kind()))
            })?;
            println!("{}", previewer.search_preview(path, &tags).await?);
        } else {
            return Err(StoreError::Config(
                "--store needs --fetch or --preview".to_string(),
            ));
        }
        return Ok(());
    }

    let options = DiscoveryOptions {
        search_timeout: args.timeout_secs.map(Duration::from_secs),
        ..DiscoveryOptions::default()
    };
    let mut results = start_discovery(stores.clone(), options, Arc::clone(&logger));

    let mut found = 0;
    let mut failed = 0;
    while let Some(result) = results.recv().await {
        if let Some(e) = &result.error {
            failed += 1;
            eprintln!("Error: {}", e);
            continue;
        }
        found += 1;
        let prefix = find_store(&stores, &result.store_id)
            .map(|store| store.context_prefix(&result.kubeconfig_path))
            .unwrap_or_default();
        println!("{}\t{}\t{}", result.store_id, prefix, result.kubeconfig_path);
    }

    logger.debug_log(&format!(
        "Discovery complete. Kubeconfigs found: {}, errors: {}",
        found, failed
    ));
    Ok(())
}
