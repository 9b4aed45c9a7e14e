// Soilnet - LoRa command link for soil sensor and irrigation nodes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Soilnet - LoRa command link for soil sensing and irrigation
//!
//! A master node polls a battery-powered satellite in the field over a
//! half-duplex sub-GHz radio. The satellite reads a soil probe and drives a
//! water pump on request.
//!
//! ## Key Features
//!
//! - **Text commands**: `verb|argument` frames small enough for one radio packet
//! - **Bounded retries**: resend on silence, give up after a fixed budget
//! - **Graceful degradation**: the master serves its last good reading when the
//!   satellite is out of reach
//! - **Swappable radios**: everything runs over a [`Transport`] trait
//!
//! ## Quick Start
//!
//! ```rust
//! use soilnet::{Command, Link, Master, MemoryTransport};
//!
//! // Script the satellite's replies
//! let mut radio = MemoryTransport::new();
//! radio.push_incoming("OK");
//! radio.push_incoming("21.46");
//!
//! let mut master = Master::new(Link::new(radio));
//! assert!(master.ping().unwrap());
//!
//! let temperature = master.read_temperature().unwrap();
//! assert!(temperature.success);
//! assert_eq!(temperature.value, 21.5);
//!
//! // What went over the air
//! let sent = master.link().transport().sent();
//! assert_eq!(sent[0], Command::ping().encode());
//! ```
//!
//! ## Modules
//!
//! - [`transport`]: Radio transport abstraction and test transports
//! - [`radio`]: Simulated radio pair with frequency and key filtering
//! - [`protocol`]: Command verbs and frame format
//! - [`link`]: Send/wait/retry state machine
//! - [`controller`]: Master node with cached fallbacks
//! - [`dispatcher`]: Satellite command dispatch
//! - [`sensor`]: Soil probe interface
//! - [`pump`]: Flow-rate pump driver
//! - [`range_test`]: Field range testing
//! - [`metrics`]: Link statistics

// Modules
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod link;
pub mod metrics;
pub mod protocol;
pub mod pump;
pub mod radio;
pub mod sensor;
pub mod transport;

// Re-exports for convenient access
pub use config::{LinkConfig, PinMap, PumpConfig, RadioConfig, SatelliteConfig};
pub use controller::{CachedReading, IrrigationReport, Master, Reading, VolumeForecast};
pub use dispatcher::{DispatchTable, DispatcherState, Handler, Outcome, Response, Satellite};
pub use error::{
    ConfigError, ProtocolError, PumpError, Result, SensorError, SoilnetError, TransportError,
};
pub use link::{Exchange, Link, LinkState};
pub use metrics::LinkMetrics;
pub use protocol::{Command, Verb, READING_UNAVAILABLE};
pub use pump::{FlowRatePump, Pump, PumpSwitch, Sleeper, ThreadSleeper};
pub use radio::SimRadio;
pub use range_test::{survey, Beacon, RangeReport};
pub use sensor::{FixedSoilSensor, SoilSensor};
pub use transport::{Frame, LossyTransport, MemoryTransport, Transport, TransportMetrics};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pump::{MemorySwitch, RecordingSleeper};
    use std::time::Duration;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_satellite_reply_feeds_master() {
        // Run the satellite against the master's outbound frames
        let pump = FlowRatePump::new(
            MemorySwitch::default(),
            RecordingSleeper::default(),
            PumpConfig::default(),
        )
        .unwrap();
        let mut satellite = Satellite::new(
            Link::new(MemoryTransport::new()),
            FixedSoilSensor::new(19.04, 733),
            pump,
            SatelliteConfig::with_reply_delay(Duration::ZERO),
        )
        .unwrap();

        for command in [Command::get_temp(), Command::get_humidity()] {
            satellite.handle_frame(&command.encode()).unwrap();
        }

        let mut radio = MemoryTransport::new();
        for reply in satellite.link().transport().sent() {
            radio.push_incoming(reply.clone());
        }
        let mut master = Master::new(Link::new(radio));

        let temperature = master.read_temperature().unwrap();
        let humidity = master.read_humidity().unwrap();
        assert!(temperature.success && humidity.success);
        assert_eq!(temperature.value, 19.0);
        assert_eq!(humidity.value, 733);
    }
}
