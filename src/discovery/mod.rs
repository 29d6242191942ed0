mod engine;

pub use engine::{start_discovery, DiscoveryOptions, DiscoveryStream};
