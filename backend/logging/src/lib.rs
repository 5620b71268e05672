//! Structured logging for VoxRank.
//!
//! Wraps `tracing` with environment-based level control, a console layer,
//! and daily-rolling NDJSON files.

pub mod logger;

pub use logger::init_logger;
