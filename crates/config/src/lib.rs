//! Configuration schema and file discovery for the bridge and its peers.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{discover_and_load, load_config, load_or_discover},
    schema::{AuthConfig, BridgeConfig, PeerConfig, RealtimeConfig, ServerConfig},
};
