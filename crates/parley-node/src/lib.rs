//! Parley node library.
//!
//! Configuration loading, logging setup and the line-oriented console
//! transport used by the `parley-node` binary.

pub mod config;
pub mod console;
pub mod observability;
