//! # Configuration
//!
//! Client configuration: where the chat service lives, how long to wait for
//! a connection, and the default log level.

pub mod client;

pub use client::{ClientConfig, ConfigError, default_config_path};
