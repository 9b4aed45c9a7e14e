// Soilnet - LoRa command link for soil sensor and irrigation nodes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Satellite-side command dispatch
//!
//! The satellite listens forever, decodes each frame, looks the verb up in a
//! [`DispatchTable`] and replies exactly once. A frame that cannot be decoded
//! or handled gets no reply at all: silence is the only error the master
//! ever sees, and its retry logic treats it like a lost frame.
//!
//! ```text
//! LISTENING -> DECODING -> DISPATCHING -> REPLYING -> LISTENING
//! ```
//!
//! `pump_control` is acknowledged before the pump runs so the master's
//! exchange resolves promptly. While the pump runs nothing else is served.
//!
//! A reply the radio refuses (too large for one frame) is dropped the same
//! way, and the satellite goes back to listening.

use crate::config::SatelliteConfig;
use crate::error::{ProtocolError, Result, SoilnetError, TransportError};
use crate::link::Link;
use crate::protocol::{self, Command, Verb, READING_UNAVAILABLE, REPLY_OK};
use crate::pump::{Pump, Sleeper, ThreadSleeper};
use crate::sensor::SoilSensor;
use crate::transport::Transport;
use log::{debug, error, info};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// What a handler wants sent back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Send a reply and go back to listening
    Reply(String),
    /// Send a reply, then run the pump
    ReplyThenDispense { reply: String, volume_ml: u32 },
}

/// Command handler: reads the sensor if it needs to and decides the reply
pub type Handler = fn(&mut dyn SoilSensor, &str) -> std::result::Result<Response, ProtocolError>;

/// Immutable verb → handler mapping
#[derive(Clone)]
pub struct DispatchTable {
    handlers: BTreeMap<Verb, Handler>,
}

impl DispatchTable {
    /// Table with a handler for every recognized verb
    pub fn standard() -> Self {
        let mut handlers: BTreeMap<Verb, Handler> = BTreeMap::new();
        handlers.insert(Verb::Ping, handle_ping);
        handlers.insert(Verb::GetTemp, handle_get_temp);
        handlers.insert(Verb::GetHumidity, handle_get_humidity);
        handlers.insert(Verb::PumpControl, handle_pump_control);
        Self { handlers }
    }

    /// Table with only the given handlers
    pub fn from_handlers(handlers: impl IntoIterator<Item = (Verb, Handler)>) -> Self {
        Self {
            handlers: handlers.into_iter().collect(),
        }
    }

    pub fn lookup(&self, verb: Verb) -> Option<Handler> {
        self.handlers.get(&verb).copied()
    }

    pub fn verbs(&self) -> impl Iterator<Item = Verb> + '_ {
        self.handlers.keys().copied()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.verbs()).finish()
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn handle_ping(_: &mut dyn SoilSensor, _: &str) -> std::result::Result<Response, ProtocolError> {
    Ok(Response::Reply(REPLY_OK.to_string()))
}

fn handle_get_temp(
    sensor: &mut dyn SoilSensor,
    _: &str,
) -> std::result::Result<Response, ProtocolError> {
    let reply = match sensor.temperature() {
        Ok(celsius) => {
            debug!("Temp: {}", celsius);
            protocol::encode_temperature(celsius)
        }
        Err(e) => {
            error!("Could not get temp: {}", e);
            READING_UNAVAILABLE.to_string()
        }
    };
    Ok(Response::Reply(reply))
}

fn handle_get_humidity(
    sensor: &mut dyn SoilSensor,
    _: &str,
) -> std::result::Result<Response, ProtocolError> {
    let reply = match sensor.moisture() {
        Ok(moisture) => {
            debug!("Humidity: {}", moisture);
            protocol::encode_humidity(moisture)
        }
        Err(e) => {
            error!("Could not get humidity: {}", e);
            READING_UNAVAILABLE.to_string()
        }
    };
    Ok(Response::Reply(reply))
}

fn handle_pump_control(
    _: &mut dyn SoilSensor,
    argument: &str,
) -> std::result::Result<Response, ProtocolError> {
    let volume_ml = protocol::parse_volume(argument)?;
    Ok(Response::ReplyThenDispense {
        reply: REPLY_OK.to_string(),
        volume_ml,
    })
}

/// Where the dispatcher is in handling a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatcherState {
    #[default]
    Listening,
    Decoding,
    Dispatching,
    Replying,
}

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Reply sent
    Replied { verb: Verb, reply: String },
    /// Acknowledged, then the pump ran (`duration` is `None` if the pump faulted)
    Dispensed {
        volume_ml: u32,
        duration: Option<Duration>,
    },
    /// Dropped without a reply
    Rejected(ProtocolError),
    /// Handled, but the radio refused the reply
    Unsent { verb: Verb, reason: TransportError },
}

/// Satellite node: sensor, pump and the link to the master
#[derive(Debug)]
pub struct Satellite<T, S, P, C = ThreadSleeper> {
    link: Link<T>,
    sensor: S,
    pump: P,
    table: DispatchTable,
    config: SatelliteConfig,
    state: DispatcherState,
    /// Waits out the reply delay
    sleeper: C,
}

impl<T: Transport, S: SoilSensor, P: Pump> Satellite<T, S, P> {
    /// Create a satellite with the standard dispatch table
    pub fn new(link: Link<T>, sensor: S, pump: P, config: SatelliteConfig) -> Result<Self> {
        Self::with_table(link, sensor, pump, config, DispatchTable::standard())
    }

    pub fn with_table(
        link: Link<T>,
        sensor: S,
        pump: P,
        config: SatelliteConfig,
        table: DispatchTable,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            link,
            sensor,
            pump,
            table,
            config,
            state: DispatcherState::Listening,
            sleeper: ThreadSleeper,
        })
    }
}

impl<T: Transport, S: SoilSensor, P: Pump, C: Sleeper> Satellite<T, S, P, C> {
    /// Use `sleeper` for the reply delay
    pub fn with_sleeper<D: Sleeper>(self, sleeper: D) -> Satellite<T, S, P, D> {
        Satellite {
            link: self.link,
            sensor: self.sensor,
            pump: self.pump,
            table: self.table,
            config: self.config,
            state: self.state,
            sleeper,
        }
    }

    /// Decode, dispatch and answer one frame.
    ///
    /// Only transport faults are returned as errors; everything else is
    /// reported through [`Outcome`].
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<Outcome> {
        let outcome = self.dispatch(frame);
        self.state = DispatcherState::Listening;
        outcome
    }

    fn dispatch(&mut self, frame: &[u8]) -> Result<Outcome> {
        self.state = DispatcherState::Decoding;
        let command = match Command::decode(frame) {
            Ok(command) => command,
            Err(e) => return Ok(self.reject(frame, e)),
        };
        debug!("Decoded command: {}", command);

        self.state = DispatcherState::Dispatching;
        let Some(handler) = self.table.lookup(command.verb()) else {
            let e = ProtocolError::UnknownVerb(command.verb().to_string());
            return Ok(self.reject(frame, e));
        };
        let response = match handler(&mut self.sensor, command.argument()) {
            Ok(response) => response,
            Err(e) => return Ok(self.reject(frame, e)),
        };

        self.state = DispatcherState::Replying;
        // Give the master time to switch from sending to listening
        if !self.config.reply_delay.is_zero() {
            self.sleeper.sleep(self.config.reply_delay);
        }

        let verb = command.verb();
        match response {
            Response::Reply(reply) => {
                if let Some(unsent) = self.send_reply(verb, &reply)? {
                    return Ok(unsent);
                }
                Ok(Outcome::Replied { verb, reply })
            }
            Response::ReplyThenDispense { reply, volume_ml } => {
                // No acknowledgment, no water: the master will resend
                if let Some(unsent) = self.send_reply(verb, &reply)? {
                    return Ok(unsent);
                }
                info!("Dispensing {} ml.", volume_ml);
                let duration = match self.pump.dispense(volume_ml) {
                    Ok(duration) => Some(duration),
                    Err(e) => {
                        error!("Pump failed: {}", e);
                        None
                    }
                };
                Ok(Outcome::Dispensed {
                    volume_ml,
                    duration,
                })
            }
        }
    }

    /// Send a reply. Returns the outcome to report if the radio refused it;
    /// other transport faults are fatal.
    fn send_reply(&mut self, verb: Verb, reply: &str) -> Result<Option<Outcome>> {
        match self.link.send(reply.as_bytes()) {
            Ok(()) => Ok(None),
            Err(SoilnetError::Transport(reason @ TransportError::FrameTooLarge { .. })) => {
                error!("Dropping reply to {}: {}", verb, reason);
                Ok(Some(Outcome::Unsent { verb, reason }))
            }
            Err(e) => Err(e),
        }
    }

    fn reject(&self, frame: &[u8], reason: ProtocolError) -> Outcome {
        error!(
            "Dropping frame {:?}: {}",
            String::from_utf8_lossy(frame),
            reason
        );
        Outcome::Rejected(reason)
    }

    /// Wait for the next frame and handle it
    pub fn poll(&mut self) -> Result<Outcome> {
        self.state = DispatcherState::Listening;
        let frame = self.link.listen()?;
        self.handle_frame(&frame)
    }

    /// Serve commands until the transport fails
    pub fn serve(&mut self) -> Result<()> {
        info!(
            "Satellite listening for {}",
            self.table
                .verbs()
                .map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        loop {
            self.poll()?;
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn link(&self) -> &Link<T> {
        &self.link
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn pump(&self) -> &P {
        &self.pump
    }

    pub fn sleeper(&self) -> &C {
        &self.sleeper
    }
}
