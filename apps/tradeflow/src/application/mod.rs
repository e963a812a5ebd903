//! Application Layer - Ports and pipeline services.
//!
//! This layer contains the connector and sink contracts and the services
//! that wire connectors to sinks and coordinate startup and shutdown.

/// Port interfaces for exchange connectors, sinks and feed errors.
pub mod ports;

/// Fan-out, registry and pipeline orchestration.
pub mod services;
