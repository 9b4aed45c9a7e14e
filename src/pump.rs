// Soilnet - LoRa command link for soil sensor and irrigation nodes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Water pump driver
//!
//! The pump has no flow sensor. A volume is turned into an on-time using the
//! calibrated flow rate:
//!
//! ```text
//! duration_s = volume_ml * 60 / flow_rate_ml_per_min
//! ```
//!
//! The switch is held on for that long with one blocking sleep.

use crate::config::PumpConfig;
use crate::error::{ConfigError, PumpError};
use log::info;
use std::time::Duration;

/// Digital output driving the pump
pub trait PumpSwitch {
    /// Drive GPIO `pin` high (`on`) or low
    fn set_running(&mut self, pin: u8, on: bool) -> Result<(), PumpError>;
}

/// Blocking delay source
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Something that can dispense water
pub trait Pump {
    /// Dispense `volume_ml`, returning how long the pump ran
    fn dispense(&mut self, volume_ml: u32) -> Result<Duration, PumpError>;
}

/// Real-time sleeper
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Sleeper that returns immediately and remembers what it was asked
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    pub sleeps: Vec<Duration>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }
}

/// In-memory switch recording every transition
#[derive(Debug, Clone, Default)]
pub struct MemorySwitch {
    pub running: bool,
    pub transitions: Vec<bool>,
    /// Pin of the last transition
    pub pin: Option<u8>,
    /// Fail every transition when set
    pub fault: Option<String>,
}

impl PumpSwitch for MemorySwitch {
    fn set_running(&mut self, pin: u8, on: bool) -> Result<(), PumpError> {
        if let Some(reason) = &self.fault {
            return Err(PumpError::Switch {
                pin,
                reason: reason.clone(),
            });
        }
        self.pin = Some(pin);
        self.running = on;
        self.transitions.push(on);
        Ok(())
    }
}

/// Pump driven for a duration derived from its flow rate
#[derive(Debug)]
pub struct FlowRatePump<S, C = ThreadSleeper> {
    switch: S,
    sleeper: C,
    config: PumpConfig,
}

impl<S: PumpSwitch, C: Sleeper> FlowRatePump<S, C> {
    pub fn new(switch: S, sleeper: C, config: PumpConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            switch,
            sleeper,
            config,
        })
    }

    /// On-time needed to dispense `volume_ml`
    pub fn run_duration(&self, volume_ml: u32) -> Result<Duration, PumpError> {
        let seconds = f64::from(volume_ml) * 60.0 / self.config.flow_rate_ml_per_min;
        Duration::try_from_secs_f64(seconds).map_err(|_| PumpError::RunTime {
            volume_ml,
            seconds,
        })
    }

    pub fn config(&self) -> &PumpConfig {
        &self.config
    }

    pub fn switch(&self) -> &S {
        &self.switch
    }

    pub fn sleeper(&self) -> &C {
        &self.sleeper
    }
}

impl<S: PumpSwitch, C: Sleeper> Pump for FlowRatePump<S, C> {
    fn dispense(&mut self, volume_ml: u32) -> Result<Duration, PumpError> {
        let duration = self.run_duration(volume_ml)?;
        let pin = self.config.control_pin;

        self.switch.set_running(pin, true)?;
        info!("Starting pump for {:.1}s ({} ml)", duration.as_secs_f64(), volume_ml);
        self.sleeper.sleep(duration);
        self.switch.set_running(pin, false)?;
        info!("Stopping pump");

        Ok(duration)
    }
}
