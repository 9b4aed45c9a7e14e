// Soilnet - LoRa command link for soil sensor and irrigation nodes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Soilnet
//!
//! A receive timeout is not an error: transports report it as `Ok(None)`.
//! Everything in [`TransportError`] is a fault the process cannot recover from.

use thiserror::Error;

/// Result type alias for Soilnet operations
pub type Result<T> = std::result::Result<T, SoilnetError>;

/// Main error type for Soilnet operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SoilnetError {
    /// Radio/transport fault
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by a transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The other end of the channel is gone
    #[error("Disconnected: {reason}")]
    Disconnected { reason: String },

    /// The radio itself is not responding
    #[error("Radio hardware fault: {reason}")]
    Hardware { reason: String },

    /// Frame exceeds the radio payload limit
    #[error("Frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },
}

/// Errors while decoding commands and replies
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Frame bytes are not valid UTF-8
    #[error("Frame is not valid UTF-8")]
    NotUtf8,

    /// No `|` separator between verb and argument
    #[error("Missing delimiter in frame {frame:?}")]
    MissingDelimiter { frame: String },

    /// Verb is not in the recognized set
    #[error("Unknown verb: {0:?}")]
    UnknownVerb(String),

    /// Argument does not fit the verb
    #[error("Invalid argument {argument:?} for {verb}")]
    InvalidArgument { verb: &'static str, argument: String },

    /// Reply does not match what the command expects
    #[error("Unexpected reply: expected {expected}, got {got:?}")]
    UnexpectedReply { expected: &'static str, got: String },
}

/// Configuration validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A field is out of its valid range
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Soil sensor faults
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    /// I2C read failed
    #[error("Sensor bus error: {reason}")]
    Bus { reason: String },
}

/// Pump driver faults
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PumpError {
    /// The control pin could not be driven
    #[error("Pump switch error on pin {pin}: {reason}")]
    Switch { pin: u8, reason: String },

    /// Volume needs an on-time the timer cannot represent
    #[error("Cannot run pump for {seconds}s to dispense {volume_ml} ml")]
    RunTime { volume_ml: u32, seconds: f64 },
}
