// Soilnet - LoRa command link for soil sensor and irrigation nodes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for radios, links and the satellite node
//!
//! Both nodes must be built from the same [`RadioConfig`]: a frame only
//! reaches the other side when frequency and sync key agree.

use crate::error::ConfigError;
use std::time::Duration;
use xxhash_rust::xxh32::xxh32;

/// Carrier frequency used by both nodes (MHz)
pub const DEFAULT_FREQUENCY_MHZ: f32 = 915.0;

/// Shared key loaded into both radios.
///
/// Only keeps unrelated devices on the same frequency from being decoded.
/// It is not a secret.
pub const DEFAULT_SYNC_KEY: [u8; 16] = [
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
    0x02,
];

/// Largest payload the RFM69 accepts with encryption enabled
pub const RFM69_MAX_PAYLOAD: usize = 60;

/// SPI pin assignment for the radio module (BCM numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    /// Chip select
    pub chip_select: u8,
    /// Reset line
    pub reset: u8,
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            chip_select: 22,
            reset: 27,
        }
    }
}

/// Radio-level configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RadioConfig {
    /// Carrier frequency in MHz
    pub frequency_mhz: f32,
    /// Shared key configured identically on both ends
    pub sync_key: [u8; 16],
    /// Pin mapping of the radio module
    pub pins: PinMap,
    /// Maximum frame length in bytes
    pub max_frame_len: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_mhz: DEFAULT_FREQUENCY_MHZ,
            sync_key: DEFAULT_SYNC_KEY,
            pins: PinMap::default(),
            max_frame_len: RFM69_MAX_PAYLOAD,
        }
    }
}

impl RadioConfig {
    /// Create a configuration on a specific frequency
    pub fn on_frequency(frequency_mhz: f32) -> Self {
        Self {
            frequency_mhz,
            ..Default::default()
        }
    }

    /// Create a configuration with a specific sync key
    pub fn with_key(sync_key: [u8; 16]) -> Self {
        Self {
            sync_key,
            ..Default::default()
        }
    }

    /// Hash of the sync key, used to tell apart radios sharing a frequency
    pub fn key_fingerprint(&self) -> u32 {
        xxh32(&self.sync_key, 0)
    }

    /// Frequency rounded to whole kHz, for equality checks
    pub fn frequency_khz(&self) -> u32 {
        (self.frequency_mhz * 1000.0).round() as u32
    }

    /// Check the configuration against RFM69 limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(290.0..=1020.0).contains(&self.frequency_mhz) {
            return Err(ConfigError::InvalidValue {
                field: "frequency_mhz",
                reason: format!("{} MHz is outside 290-1020 MHz", self.frequency_mhz),
            });
        }
        if self.max_frame_len == 0 || self.max_frame_len > RFM69_MAX_PAYLOAD {
            return Err(ConfigError::InvalidValue {
                field: "max_frame_len",
                reason: format!("must be within 1..={}", RFM69_MAX_PAYLOAD),
            });
        }
        Ok(())
    }
}

/// Request/response settings of a [`Link`](crate::link::Link)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// How long each attempt waits for a reply
    pub per_attempt_timeout: Duration,
    /// Number of sends before giving up
    pub max_attempts: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            per_attempt_timeout: Duration::from_secs(2),
            max_attempts: 5,
        }
    }
}

impl LinkConfig {
    /// Create a configuration with custom timeout and attempt budget
    pub fn new(per_attempt_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            per_attempt_timeout,
            max_attempts,
        }
    }

    /// Upper bound on the time a single request can block
    pub fn latency_bound(&self) -> Duration {
        self.per_attempt_timeout * self.max_attempts
    }

    /// Check that a request can make progress
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.per_attempt_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "per_attempt_timeout",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Pump calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpConfig {
    /// Measured flow rate at 5V (ml/min)
    pub flow_rate_ml_per_min: f64,
    /// GPIO pin driving the pump
    pub control_pin: u8,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            flow_rate_ml_per_min: 130.0,
            control_pin: 20,
        }
    }
}

impl PumpConfig {
    /// Create a configuration with a calibrated flow rate
    pub fn with_flow_rate(flow_rate_ml_per_min: f64) -> Self {
        Self {
            flow_rate_ml_per_min,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.flow_rate_ml_per_min.is_finite() || self.flow_rate_ml_per_min <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "flow_rate_ml_per_min",
                reason: format!("{} is not a positive rate", self.flow_rate_ml_per_min),
            });
        }
        Ok(())
    }
}

/// Satellite node configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SatelliteConfig {
    /// Pause before each reply so the master is already listening
    pub reply_delay: Duration,
    /// Pump calibration
    pub pump: PumpConfig,
}

impl Default for SatelliteConfig {
    fn default() -> Self {
        Self {
            reply_delay: Duration::from_millis(500),
            pump: PumpConfig::default(),
        }
    }
}

impl SatelliteConfig {
    /// Create a configuration with a custom reply delay
    pub fn with_reply_delay(reply_delay: Duration) -> Self {
        Self {
            reply_delay,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pump.validate()
    }
}
