//! Connector and Sink Registry
//!
//! Maps exchange identifiers and sink kinds to factories. The builtin
//! registry is built once on first use and read-only afterward; tests and
//! embedders build their own with [`Registry::with_connector`] and
//! [`Registry::with_sink`].

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use crate::application::ports::{Connector, ErrorReporter, Sink};
use crate::infrastructure::config::{ConfigError, PipelineConfig, SinkSettings};
use crate::infrastructure::exchange::{BinanceConnector, CoinbaseConnector, binance, coinbase};
use crate::infrastructure::sink::{FileSink, StdoutSink};

/// Builds a connector from the pipeline configuration.
pub type ConnectorFactory = Arc<
    dyn Fn(&PipelineConfig, ErrorReporter) -> Result<Arc<dyn Connector>, ConfigError> + Send + Sync,
>;

/// Builds a sink from the pipeline configuration and its own settings.
pub type SinkFactory = Arc<
    dyn Fn(&PipelineConfig, &SinkSettings) -> Result<Arc<dyn Sink>, ConfigError> + Send + Sync,
>;

static BUILTIN: LazyLock<Registry> = LazyLock::new(|| {
    Registry::new()
        .with_connector(binance::EXCHANGE, |config, reporter| {
            let connector: Arc<dyn Connector> =
                Arc::new(BinanceConnector::new(config.binance.clone(), reporter));
            Ok(connector)
        })
        .with_connector(coinbase::EXCHANGE, |config, reporter| {
            let connector: Arc<dyn Connector> =
                Arc::new(CoinbaseConnector::new(config.coinbase.clone(), reporter));
            Ok(connector)
        })
        .with_sink("stdout", |_, _| {
            let sink: Arc<dyn Sink> = Arc::new(StdoutSink::stdout());
            Ok(sink)
        })
        .with_sink("file", |_, settings| {
            let path = settings
                .path
                .as_deref()
                .ok_or_else(|| ConfigError::Invalid("file sink requires a path".to_string()))?;
            let file = FileSink::open(path).map_err(|e| {
                ConfigError::Invalid(format!("cannot open {}: {e}", path.display()))
            })?;
            let sink: Arc<dyn Sink> = Arc::new(file);
            Ok(sink)
        })
});

/// Name → factory tables for connectors and sinks.
#[derive(Clone, Default)]
pub struct Registry {
    connectors: BTreeMap<String, ConnectorFactory>,
    sinks: BTreeMap<String, SinkFactory>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry of builtin exchanges (`binance`, `coinbase`) and sinks
    /// (`stdout`, `file`).
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    /// Register a connector factory under `exchange`.
    #[must_use]
    pub fn with_connector<F>(mut self, exchange: &str, factory: F) -> Self
    where
        F: Fn(&PipelineConfig, ErrorReporter) -> Result<Arc<dyn Connector>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.connectors.insert(exchange.to_owned(), Arc::new(factory));
        self
    }

    /// Register a sink factory under `kind`.
    #[must_use]
    pub fn with_sink<F>(mut self, kind: &str, factory: F) -> Self
    where
        F: Fn(&PipelineConfig, &SinkSettings) -> Result<Arc<dyn Sink>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.sinks.insert(kind.to_owned(), Arc::new(factory));
        self
    }

    /// Connector factory for `exchange`.
    #[must_use]
    pub fn connector(&self, exchange: &str) -> Option<&ConnectorFactory> {
        self.connectors.get(exchange)
    }

    /// Sink factory for `kind`.
    #[must_use]
    pub fn sink(&self, kind: &str) -> Option<&SinkFactory> {
        self.sinks.get(kind)
    }

    /// Registered exchange identifiers, sorted.
    #[must_use]
    pub fn exchanges(&self) -> Vec<&str> {
        self.connectors.keys().map(String::as_str).collect()
    }

    /// Registered sink kinds, sorted.
    #[must_use]
    pub fn sink_kinds(&self) -> Vec<&str> {
        self.sinks.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("exchanges", &self.exchanges())
            .field("sinks", &self.sink_kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::exchange::MockConnector;

    #[test]
    fn builtin_names() {
        let registry = Registry::builtin();
        assert_eq!(registry.exchanges(), vec!["binance", "coinbase"]);
        assert_eq!(registry.sink_kinds(), vec!["file", "stdout"]);
        assert!(registry.connector("kraken").is_none());
        assert!(registry.sink("kafka").is_none());
    }

    #[test]
    fn builtin_factories_build() {
        let registry = Registry::builtin();
        let config = PipelineConfig::default();

        let factory = registry.connector("coinbase").unwrap();
        let connector = factory(&config, ErrorReporter::log_only()).unwrap();
        assert_eq!(connector.exchange(), "coinbase");

        let factory = registry.sink("stdout").unwrap();
        let sink = factory(&config, &SinkSettings::of_kind("stdout")).unwrap();
        assert_eq!(sink.kind(), "stdout");
    }

    #[test]
    fn file_factory_requires_openable_path() {
        let registry = Registry::builtin();
        let config = PipelineConfig::default();
        let factory = registry.sink("file").unwrap();

        assert!(factory(&config, &SinkSettings::of_kind("file")).is_err());

        let dir = tempfile::tempdir().unwrap();
        let settings = SinkSettings {
            kind: "file".to_string(),
            path: Some(dir.path().join("nested").join("out.jsonl")),
        };
        assert!(matches!(factory(&config, &settings), Err(ConfigError::Invalid(_))));

        let settings = SinkSettings {
            kind: "file".to_string(),
            path: Some(dir.path().join("out.jsonl")),
        };
        assert_eq!(factory(&config, &settings).unwrap().kind(), "file");
    }

    #[test]
    fn custom_registration() {
        let registry = Registry::new().with_connector("mock", |_, reporter| {
            let connector: Arc<dyn Connector> = Arc::new(MockConnector::new("mock", reporter));
            Ok(connector)
        });

        assert_eq!(registry.exchanges(), vec!["mock"]);
        assert!(registry.sink_kinds().is_empty());
        assert!(format!("{registry:?}").contains("mock"));
    }
}
