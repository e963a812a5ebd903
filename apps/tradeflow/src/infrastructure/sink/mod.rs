//! Trade Sinks
//!
//! Adapters implementing [`Sink`](crate::application::ports::Sink).
//!
//! - `stdout`: newline-delimited JSON on standard output
//! - `file`: the same lines appended to a file
//!
//! Both are [`WriterSink`] over a different writer.

mod writer;

pub use writer::{FileSink, StdoutSink, WriterSink};
