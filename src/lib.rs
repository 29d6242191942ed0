//! Kubeconfig store abstraction and concurrent discovery.
//!
//! Every backend (filesystem, vault, managed Kubernetes APIs) implements
//! [`store::KubeconfigStore`]. [`discovery::start_discovery`] verifies and
//! searches all of them at once and merges their results into one stream.

pub mod config;
pub mod discovery;
pub mod error;
pub mod store;
pub mod types;
pub mod utils;
