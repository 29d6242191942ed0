mod stores;
mod types;

pub use stores::{StoreConfigAkamai, StoreConfigDigitalOcean, StoreConfigRancher, StoreConfigVault};
pub use types::{
    env_fallback, expand_path, parse_api_address, KubeconfigStoreConfig, SwitchConfig,
    DEFAULT_KUBECONFIG_NAME,
};
