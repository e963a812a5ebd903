//! Pipeline Orchestration
//!
//! Wires the configured connectors into one ingestion channel, connects
//! that channel (directly, or through a [`FanOut`] when there is more than
//! one sink) to the configured sinks, and drives ordered startup and
//! shutdown.
//!
//! # Startup
//!
//! 1. Resolve every exchange and sink name (unknown names fail here)
//! 2. Construct and start sinks, with the fan-out if needed
//! 3. Construct and start connectors
//!
//! A connector that fails to start tears down everything already running.
//!
//! # Shutdown
//!
//! Connectors first, then the ingestion channel, then the fan-out, then the
//! sinks. Each step waits for the previous one, so every trade a connector
//! enqueued reaches the sinks.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::fanout::FanOut;
use super::registry::Registry;
use crate::application::ports::{
    Connector, ConnectorError, ErrorReporter, FeedError, FeedErrorReceiver, Sink, SinkError,
    TradeSender,
};
use crate::infrastructure::config::{ConfigError, PipelineConfig};
use crate::infrastructure::metrics;

/// Pipeline error.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An enabled exchange has no registered connector.
    #[error("unknown exchange {name:?} (known: {known})")]
    UnknownExchange {
        /// Configured name.
        name: String,
        /// Registered names.
        known: String,
    },

    /// A configured sink kind has no registered factory.
    #[error("unknown sink kind {name:?} (known: {known})")]
    UnknownSink {
        /// Configured kind.
        name: String,
        /// Registered kinds.
        known: String,
    },

    /// A sink failed to start.
    #[error("failed to start {kind} sink: {source}")]
    SinkStart {
        /// Sink kind.
        kind: String,
        /// Underlying error.
        #[source]
        source: SinkError,
    },

    /// A connector failed to start.
    #[error("failed to start {exchange} connector: {source}")]
    ConnectorStart {
        /// Exchange identifier.
        exchange: String,
        /// Underlying error.
        #[source]
        source: ConnectorError,
    },

    /// One or more components failed to shut down cleanly.
    #[error("shutdown completed with {} error(s): {}", .0.len(), .0.join("; "))]
    Shutdown(Vec<String>),
}

/// A running pipeline.
pub struct Pipeline {
    connectors: Vec<Arc<dyn Connector>>,
    sinks: Vec<Arc<dyn Sink>>,
    ingest: Option<TradeSender>,
    fanout: Option<FanOut>,
    monitor_stop: CancellationToken,
    monitor: Option<JoinHandle<u64>>,
}

impl Pipeline {
    /// Start every configured sink and connector.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a name is unknown,
    /// or a component fails to start. Nothing is left running on error.
    pub async fn start(config: &PipelineConfig, registry: &Registry) -> Result<Self, PipelineError> {
        config.validate()?;

        let connector_factories = config
            .sources
            .enabled
            .iter()
            .map(|name| {
                registry
                    .connector(name)
                    .ok_or_else(|| PipelineError::UnknownExchange {
                        name: name.clone(),
                        known: registry.exchanges().join(", "),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sink_factories = config
            .sinks
            .iter()
            .map(|settings| {
                registry
                    .sink(&settings.kind)
                    .map(|factory| (factory, settings))
                    .ok_or_else(|| PipelineError::UnknownSink {
                        name: settings.kind.clone(),
                        known: registry.sink_kinds().join(", "),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sinks = sink_factories
            .into_iter()
            .map(|(factory, settings)| factory(config, settings))
            .collect::<Result<Vec<_>, _>>()?;

        let (reporter, feed_errors) = ErrorReporter::channel();

        let capacity = config.pipeline.channel_capacity;
        let (ingest, ingest_rx) = mpsc::channel(capacity);
        let (fanout, inputs) = if sinks.len() > 1 {
            let (fanout, inputs) = FanOut::spawn(ingest_rx, sinks.len(), capacity);
            (Some(fanout), inputs)
        } else {
            (None, vec![ingest_rx])
        };

        let monitor_stop = CancellationToken::new();
        let monitor = tokio::spawn(monitor_feed_errors(feed_errors, monitor_stop.clone()));

        let mut pipeline = Self {
            connectors: Vec::with_capacity(connector_factories.len()),
            sinks: Vec::with_capacity(sinks.len()),
            ingest: Some(ingest),
            fanout,
            monitor_stop,
            monitor: Some(monitor),
        };

        for (sink, input) in sinks.into_iter().zip(inputs) {
            if let Err(source) = sink.write_trades(input).await {
                let kind = sink.kind().to_owned();
                pipeline.abort().await;
                return Err(PipelineError::SinkStart { kind, source });
            }
            tracing::info!(sink = sink.kind(), "Sink started");
            pipeline.sinks.push(sink);
        }
        metrics::set_sinks_active(pipeline.sinks.len());

        let connectors = match connector_factories
            .into_iter()
            .map(|factory| factory(config, reporter.clone()))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(connectors) => connectors,
            Err(e) => {
                pipeline.abort().await;
                return Err(e.into());
            }
        };
        drop(reporter);

        for connector in connectors {
            let Some(ingest) = pipeline.ingest.clone() else {
                break;
            };
            if let Err(source) = connector
                .consume_trades(ingest, &config.sources.symbols)
                .await
            {
                let exchange = connector.exchange().to_owned();
                tracing::error!(exchange = %exchange, error = %source, "Connector failed to start");
                pipeline.abort().await;
                return Err(PipelineError::ConnectorStart { exchange, source });
            }
            tracing::info!(exchange = connector.exchange(), "Connector started");
            pipeline.connectors.push(connector);
        }
        metrics::set_connectors_active(pipeline.connectors.len());

        tracing::info!(
            connectors = pipeline.connectors.len(),
            sinks = pipeline.sinks.len(),
            fanout = pipeline.fanout.is_some(),
            "Pipeline started"
        );
        Ok(pipeline)
    }

    /// Number of running connectors.
    #[must_use]
    pub fn connector_count(&self) -> usize {
        self.connectors.len()
    }

    /// Number of running sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Whether a fan-out task sits between the connectors and the sinks.
    #[must_use]
    pub const fn is_fanned_out(&self) -> bool {
        self.fanout.is_some()
    }

    /// Shut everything down in order.
    ///
    /// Every component is shut down even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Shutdown`] listing every failure.
    pub async fn shutdown(mut self) -> Result<(), PipelineError> {
        let failures = self.teardown().await;
        if failures.is_empty() {
            tracing::info!("Pipeline stopped");
            Ok(())
        } else {
            Err(PipelineError::Shutdown(failures))
        }
    }

    async fn abort(&mut self) {
        for failure in self.teardown().await {
            tracing::error!(error = %failure, "Teardown after failed start");
        }
    }

    async fn teardown(&mut self) -> Vec<String> {
        let mut failures = Vec::new();

        for connector in self.connectors.drain(..) {
            match connector.close().await {
                Ok(()) => tracing::info!(exchange = connector.exchange(), "Connector closed"),
                Err(e) => {
                    tracing::error!(exchange = connector.exchange(), error = %e, "Connector close failed");
                    failures.push(e.to_string());
                }
            }
        }
        metrics::set_connectors_active(0);

        // Closing the ingestion channel lets the fan-out (or the single
        // sink) drain and finish.
        self.ingest = None;

        if let Some(fanout) = self.fanout.take() {
            match fanout.join().await {
                Ok(relayed) => tracing::debug!(relayed, "Fan-out joined"),
                Err(e) => failures.push(format!("fan-out: {e}")),
            }
        }

        for sink in self.sinks.drain(..) {
            match sink.close().await {
                Ok(()) => tracing::info!(sink = sink.kind(), "Sink closed"),
                Err(e) => {
                    tracing::error!(sink = sink.kind(), error = %e, "Sink close failed");
                    failures.push(e.to_string());
                }
            }
        }
        metrics::set_sinks_active(0);

        self.monitor_stop.cancel();
        if let Some(monitor) = self.monitor.take() {
            match monitor.await {
                Ok(reported) => tracing::debug!(reported, "Feed error monitor stopped"),
                Err(e) => failures.push(format!("feed error monitor: {e}")),
            }
        }

        failures
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("connectors", &self.connectors.len())
            .field("sinks", &self.sinks.len())
            .field("fanout", &self.fanout.is_some())
            .finish_non_exhaustive()
    }
}

/// Log and count feed errors until every reporter is gone or `stop` fires.
async fn monitor_feed_errors(mut errors: FeedErrorReceiver, stop: CancellationToken) -> u64 {
    let mut reported = 0;

    loop {
        let error = tokio::select! {
            error = errors.recv() => error,
            () = stop.cancelled() => {
                while let Ok(error) = errors.try_recv() {
                    log_feed_error(&error);
                    reported += 1;
                }
                break;
            }
        };

        let Some(error) = error else {
            break;
        };
        log_feed_error(&error);
        reported += 1;
    }

    reported
}

fn log_feed_error(error: &FeedError) {
    tracing::warn!(
        exchange = %error.exchange,
        kind = error.kind.label(),
        "{}",
        error.kind
    );
    metrics::record_feed_error(error);
}
