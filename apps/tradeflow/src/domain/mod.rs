//! Domain Layer - Canonical trade model and symbol translation.
//!
//! This layer contains the data contract shared by every connector and
//! every sink. Nothing here performs I/O; all types are plain Rust with
//! serialization support.

/// Canonical trade record and trade side.
pub mod trade;

/// Bidirectional exchange/canonical symbol translation.
pub mod symbol;
