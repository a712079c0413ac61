//! Core functionality for Conduit.
//!
//! This crate provides the configuration, logging and error types shared
//! by the checksum codec, the stream segments and the demo node.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, DemoConfig, SegmentConfig, TransportConfig};
pub use error::{CoreError, Result};
