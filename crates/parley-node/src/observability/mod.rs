//! # Observability Module
//!
//! Structured logging for the node. Logs go to stderr so that stdout stays
//! free for chat output.

mod logging;

pub use logging::{init_logging, LogFormat};
