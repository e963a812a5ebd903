//! Application Services
//!
//! Services that wire connectors to sinks and drive their lifecycle.
//!
//! - `FanOut`: multicasts the ingestion stream to every sink
//! - `Registry`: resolves exchange and sink names to factories
//! - `Pipeline`: coordinated startup and shutdown

mod fanout;
mod pipeline;
mod registry;

pub use fanout::FanOut;
pub use pipeline::{Pipeline, PipelineError};
pub use registry::{ConnectorFactory, Registry, SinkFactory};
