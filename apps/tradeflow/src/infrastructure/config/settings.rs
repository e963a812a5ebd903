//! Pipeline Configuration Settings
//!
//! Configuration types for the relay, loaded from a JSON file and then
//! adjusted by environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::symbol::SymbolMapping;
use crate::domain::trade::CanonicalSymbol;
use crate::infrastructure::exchange::{binance, coinbase};

/// Default capacity of every trade channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default time to wait for a subscription acknowledgment.
pub const DEFAULT_SUBSCRIBE_TIMEOUT_SECS: u64 = 10;

/// Exchange API credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    auth_key: String,
    #[serde(default)]
    secret_key: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(auth_key: String, secret_key: String) -> Self {
        Self {
            auth_key,
            secret_key,
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn auth_key(&self) -> &str {
        &self.auth_key
    }

    /// Get the API secret.
    #[must_use]
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Whether no key is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.auth_key.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_key", &"[REDACTED]")
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Which exchanges and symbols to stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesSettings {
    /// Enabled exchange identifiers.
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Canonical symbols to subscribe on every enabled exchange.
    #[serde(default)]
    pub symbols: Vec<CanonicalSymbol>,
}

/// One configured sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkSettings {
    /// Sink kind (`stdout`, `file`).
    pub kind: String,
    /// Output path for `file` sinks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl SinkSettings {
    /// Settings for a sink of `kind` with no path.
    #[must_use]
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            path: None,
        }
    }
}

/// Binance connector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinanceSettings {
    /// API credentials (unused by public trade streams).
    #[serde(flatten)]
    pub credentials: Credentials,
    /// Exchange → canonical symbol table.
    #[serde(default)]
    pub mappings: SymbolMapping,
    /// Raw stream endpoint.
    #[serde(default = "default_binance_endpoint")]
    pub endpoint: String,
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            mappings: SymbolMapping::default(),
            endpoint: default_binance_endpoint(),
        }
    }
}

fn default_binance_endpoint() -> String {
    binance::DEFAULT_ENDPOINT.to_string()
}

/// Coinbase connector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseSettings {
    /// Exchange → canonical symbol table.
    #[serde(default)]
    pub mappings: SymbolMapping,
    /// Feed endpoint.
    #[serde(default = "default_coinbase_endpoint")]
    pub endpoint: String,
    /// Seconds to wait for the subscription acknowledgment.
    #[serde(default = "default_subscribe_timeout_secs")]
    pub subscribe_timeout_secs: u64,
}

impl Default for CoinbaseSettings {
    fn default() -> Self {
        Self {
            mappings: SymbolMapping::default(),
            endpoint: default_coinbase_endpoint(),
            subscribe_timeout_secs: DEFAULT_SUBSCRIBE_TIMEOUT_SECS,
        }
    }
}

fn default_coinbase_endpoint() -> String {
    coinbase::DEFAULT_ENDPOINT.to_string()
}

const fn default_subscribe_timeout_secs() -> u64 {
    DEFAULT_SUBSCRIBE_TIMEOUT_SECS
}

/// Channel settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Capacity of the ingestion channel and of each per-sink channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

const fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Prometheus HTTP port (0 = disabled).
    #[serde(default)]
    pub port: u16,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Exchanges and symbols.
    #[serde(default)]
    pub sources: SourcesSettings,
    /// Sinks, in start order.
    #[serde(default)]
    pub sinks: Vec<SinkSettings>,
    /// Binance settings.
    #[serde(default)]
    pub binance: BinanceSettings,
    /// Coinbase settings.
    #[serde(default)]
    pub coinbase: CoinbaseSettings,
    /// Channel settings.
    #[serde(default)]
    pub pipeline: ChannelSettings,
    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl PipelineConfig {
    /// Load, override from the environment and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_json(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration document without validating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid configuration JSON,
    /// including symbol tables with duplicate canonical values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// - `BINANCE_API_KEY` / `BINANCE_API_SECRET`: Binance credentials
    /// - `TRADEFLOW_CHANNEL_CAPACITY`: channel capacity
    /// - `TRADEFLOW_METRICS_PORT`: metrics port
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let key = lookup("BINANCE_API_KEY");
        let secret = lookup("BINANCE_API_SECRET");
        if key.is_some() || secret.is_some() {
            self.binance.credentials = Credentials::new(
                key.unwrap_or_else(|| self.binance.credentials.auth_key().to_owned()),
                secret.unwrap_or_else(|| self.binance.credentials.secret_key().to_owned()),
            );
        }

        self.pipeline.channel_capacity = parse_override(
            &lookup,
            "TRADEFLOW_CHANNEL_CAPACITY",
            self.pipeline.channel_capacity,
        );
        self.metrics.port = parse_override(&lookup, "TRADEFLOW_METRICS_PORT", self.metrics.port);
    }

    /// Check the configuration is usable.
    ///
    /// Names are not resolved here; unknown exchanges and sink kinds are
    /// rejected when the pipeline starts.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.enabled.is_empty() {
            return Err(ConfigError::Missing("sources.enabled"));
        }
        if self.sources.symbols.is_empty() {
            return Err(ConfigError::Missing("sources.symbols"));
        }
        if self.sinks.is_empty() {
            return Err(ConfigError::Missing("sinks"));
        }
        if self.pipeline.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.channel_capacity must be greater than zero".to_string(),
            ));
        }
        if let Some(index) = self
            .sinks
            .iter()
            .position(|sink| sink.kind == "file" && sink.path.is_none())
        {
            return Err(ConfigError::Invalid(format!(
                "sinks[{index}]: file sink requires a path"
            )));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A required section is missing or empty.
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    current: T,
) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"{
        "sources": { "enabled": ["binance", "coinbase"], "symbols": ["BTC/USD", "ETH/USD"] },
        "sinks": [ { "kind": "stdout" }, { "kind": "file", "path": "trades.jsonl" } ],
        "binance": { "auth_key": "key", "secret_key": "secret", "mappings": { "BTCUSDT": "BTC/USD" } },
        "coinbase": { "mappings": { "BTC-USD": "BTC/USD" } },
        "pipeline": { "channel_capacity": 64 },
        "metrics": { "port": 9100 }
    }"#;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn parses_full_document() {
        let config = PipelineConfig::from_json(FULL).unwrap();

        assert_eq!(config.sources.enabled, vec!["binance", "coinbase"]);
        assert_eq!(config.sinks.len(), 2);
        assert_eq!(config.sinks[1].path.as_deref(), Some(Path::new("trades.jsonl")));
        assert_eq!(config.binance.credentials.auth_key(), "key");
        assert_eq!(config.binance.mappings.to_exchange("BTC/USD"), "BTCUSDT");
        assert_eq!(config.binance.endpoint, binance::DEFAULT_ENDPOINT);
        assert_eq!(config.coinbase.mappings.to_canonical("BTC-USD"), "BTC/USD");
        assert_eq!(config.coinbase.subscribe_timeout_secs, DEFAULT_SUBSCRIBE_TIMEOUT_SECS);
        assert_eq!(config.pipeline.channel_capacity, 64);
        assert_eq!(config.metrics.port, 9100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"sources":{"enabled":["coinbase"],"symbols":["BTC-USD"]},"sinks":[{"kind":"stdout"}]}"#,
        )
        .unwrap();

        assert!(config.binance.mappings.is_empty());
        assert_eq!(config.coinbase.endpoint, coinbase::DEFAULT_ENDPOINT);
        assert_eq!(config.pipeline.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.metrics.port, 0);
        assert!(config.binance.credentials.is_empty());
    }

    #[test]
    fn duplicate_mapping_fails_parse() {
        let err = PipelineConfig::from_json(
            r#"{"coinbase":{"mappings":{"BTC-USD":"BTC/USD","BTC-USDC":"BTC/USD"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides() {
        let mut config = PipelineConfig::from_json(FULL).unwrap();
        config.apply_overrides(lookup(&[
            ("BINANCE_API_SECRET", "from-env"),
            ("TRADEFLOW_CHANNEL_CAPACITY", "2048"),
            ("TRADEFLOW_METRICS_PORT", "not-a-port"),
        ]));

        assert_eq!(config.binance.credentials.auth_key(), "key");
        assert_eq!(config.binance.credentials.secret_key(), "from-env");
        assert_eq!(config.pipeline.channel_capacity, 2048);
        assert_eq!(config.metrics.port, 9100);
    }

    #[test]
    fn validation_rejects_incomplete_config() {
        let mut config = PipelineConfig::from_json(FULL).unwrap();
        config.sources.symbols.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("sources.symbols"))));

        let mut config = PipelineConfig::from_json(FULL).unwrap();
        config.sinks.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("sinks"))));

        let mut config = PipelineConfig::from_json(FULL).unwrap();
        config.pipeline.channel_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PipelineConfig::from_json(FULL).unwrap();
        config.sinks[1].path = None;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sinks[1]"), "{err}");

        assert!(matches!(
            PipelineConfig::default().validate(),
            Err(ConfigError::Missing("sources.enabled"))
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, FULL).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.sources.symbols, vec!["BTC/USD", "ETH/USD"]);

        let err = PipelineConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn credentials_debug_redacts() {
        let credentials = Credentials::new("key".to_string(), "secret".to_string());
        let debug = format!("{credentials:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret\""));
        assert!(!debug.contains("\"key\""));
    }
}
