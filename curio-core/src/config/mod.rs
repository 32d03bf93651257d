//! Configuration types for the Curio order core.
//!
//! These types represent the validated runtime configuration used by the
//! engine and its processors. Loading and parsing the config file is handled
//! by the server crate.

mod config_store;
mod gateway;
mod marketplace;

pub use config_store::{ConfigStore, ConfigWatcher};
pub use gateway::GatewayConfig;
pub use marketplace::MarketplacePolicy;
