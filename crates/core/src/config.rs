//! Configuration management for Conduit.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default bound on a segment's error channel.
pub const DEFAULT_ERROR_BUFFER: usize = 16;

/// Default capacity of every internal data channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Default checksum function for the integrity transport.
pub const DEFAULT_CHECKSUM_FUNCTION: &str = "sha2-256";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub segment: SegmentConfig,
    pub transport: TransportConfig,
    pub demo: DemoConfig,
}

/// Settings shared by every segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Capacity of the shared error channel.
    pub error_buffer: usize,
    /// Halt every member channel on the first redirected error.
    pub halt_on_error: bool,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            error_buffer: DEFAULT_ERROR_BUFFER,
            halt_on_error: false,
        }
    }
}

/// Settings for the integrity transport segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Checksum function name or code, validated when the transport is built.
    pub checksum_function: String,
    /// Capacity of each internal stage channel.
    pub channel_capacity: usize,
    /// Segment settings for the transport; falls back to the top-level
    /// `[segment]` table when absent.
    pub segment: Option<SegmentConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            checksum_function: DEFAULT_CHECKSUM_FUNCTION.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            segment: None,
        }
    }
}

/// Settings for the demo node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Probability that a wire record gets its last byte zeroed.
    pub corrupt_probability: f64,
    pub json_logs: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            corrupt_probability: 0.1,
            json_logs: false,
        }
    }
}

impl SegmentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.error_buffer == 0 {
            return Err(CoreError::InvalidConfig(
                "segment.error_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(CoreError::InvalidConfig(
                "transport.channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.checksum_function.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "transport.checksum_function must not be empty".to_string(),
            ));
        }
        match &self.segment {
            Some(segment) => segment.validate(),
            None => Ok(()),
        }
    }

    /// Segment settings in effect for the transport.
    pub fn segment_config(&self) -> SegmentConfig {
        self.segment.clone().unwrap_or_default()
    }
}

impl Config {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| CoreError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    /// Transport settings with the top-level segment table applied when the
    /// transport does not carry its own.
    pub fn transport_config(&self) -> TransportConfig {
        let mut transport = self.transport.clone();
        if transport.segment.is_none() {
            transport.segment = Some(self.segment.clone());
        }
        transport
    }

    pub fn validate(&self) -> Result<()> {
        self.segment.validate()?;
        self.transport.validate()?;
        if !(0.0..=1.0).contains(&self.demo.corrupt_probability) {
            return Err(CoreError::InvalidConfig(format!(
                "demo.corrupt_probability must be within [0, 1], got {}",
                self.demo.corrupt_probability
            )));
        }
        Ok(())
    }
}
