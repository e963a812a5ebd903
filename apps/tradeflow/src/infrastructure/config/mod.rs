//! Configuration Module
//!
//! JSON configuration for the relay, with environment overrides.

mod settings;

pub use settings::{
    BinanceSettings, ChannelSettings, CoinbaseSettings, ConfigError, Credentials,
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_SUBSCRIBE_TIMEOUT_SECS, MetricsSettings, PipelineConfig,
    SinkSettings, SourcesSettings,
};
