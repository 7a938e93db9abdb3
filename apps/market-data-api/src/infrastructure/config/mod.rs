//! Configuration Module
//!
//! Configuration loading for the market data API.

mod settings;

pub use settings::{
    ApiConfig, BroadcastSettings, ConfigError, DatabaseSettings, ExportSettings, MIN_BROADCAST_INTERVAL,
    ServerSettings,
};
