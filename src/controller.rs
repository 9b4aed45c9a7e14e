// Soilnet - LoRa command link for soil sensor and irrigation nodes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Gateway-side controller
//!
//! [`Master`] turns the satellite's commands into typed calls. Reads never
//! fail because of the radio: when an exchange is exhausted (or the reply is
//! garbage) the last good value is returned with `success = false`. Only
//! transport faults surface as errors.
//!
//! # Example
//!
//! ```rust
//! use soilnet::{Link, Master, MemoryTransport};
//!
//! let mut transport = MemoryTransport::new();
//! transport.push_incoming("21.46");
//!
//! let mut master = Master::new(Link::new(transport));
//! let reading = master.read_temperature().unwrap();
//! assert!(reading.success);
//! assert_eq!(reading.value, 21.5);
//!
//! // Nothing else scripted: every attempt times out, cached value comes back
//! let reading = master.read_temperature().unwrap();
//! assert!(!reading.success);
//! assert_eq!(reading.value, 21.5);
//! ```

use crate::error::{ProtocolError, Result};
use crate::link::Link;
use crate::protocol::{self, Command};
use crate::transport::{Frame, Transport};
use log::{info, warn};
use std::time::{Duration, Instant};

/// A value as served to upstream callers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading<T> {
    /// Best available value
    pub value: T,
    /// Whether `value` came from the satellite just now
    pub success: bool,
}

impl<T> Reading<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            success: true,
        }
    }

    pub fn cached(value: T) -> Self {
        Self {
            value,
            success: false,
        }
    }
}

/// Last successfully decoded value of a metric
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CachedReading<T> {
    value: T,
    updated_at: Option<Instant>,
}

impl<T: Copy> CachedReading<T> {
    pub fn value(&self) -> T {
        self.value
    }

    /// Check if a value was ever received
    pub fn is_primed(&self) -> bool {
        self.updated_at.is_some()
    }

    /// Time since the last update
    pub fn age(&self) -> Option<Duration> {
        self.updated_at.map(|t| t.elapsed())
    }

    fn update(&mut self, value: T) {
        self.value = value;
        self.updated_at = Some(Instant::now());
    }
}

/// Source of the daily watering volume
pub trait VolumeForecast {
    /// Predicted volume in ml, or `None` when the forecast is unavailable
    fn predicted_volume_ml(&mut self) -> Option<u32>;
}

impl<F: FnMut() -> Option<u32>> VolumeForecast for F {
    fn predicted_volume_ml(&mut self) -> Option<u32> {
        self()
    }
}

/// What happened during [`Master::irrigate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrrigationReport {
    /// Volume requested from the satellite
    pub volume_ml: u32,
    /// `false` when the previous volume was reused
    pub from_forecast: bool,
    /// Whether the satellite acknowledged the command
    pub acknowledged: bool,
}

/// Gateway controller for one satellite
#[derive(Debug)]
pub struct Master<T> {
    link: Link<T>,
    temperature: CachedReading<f64>,
    humidity: CachedReading<i64>,
    watering: CachedReading<u32>,
}

impl<T: Transport> Master<T> {
    /// Create a controller with empty caches
    pub fn new(link: Link<T>) -> Self {
        Self {
            link,
            temperature: CachedReading::default(),
            humidity: CachedReading::default(),
            watering: CachedReading::default(),
        }
    }

    /// Create a controller, check the satellite is alive and prime the caches
    pub fn connect(link: Link<T>) -> Result<Self> {
        let mut master = Self::new(link);
        let alive = master.ping()?;
        info!("Satellite is {}", if alive { "up" } else { "not responding" });

        master.read_temperature()?;
        master.read_humidity()?;
        Ok(master)
    }

    fn request(&mut self, command: Command) -> Result<Option<Frame>> {
        Ok(self.link.request(&command)?.into_reply())
    }

    /// Liveness check
    pub fn ping(&mut self) -> Result<bool> {
        Ok(match self.request(Command::ping())? {
            Some(reply) => acknowledged(&reply),
            None => false,
        })
    }

    /// Soil temperature (°C, one decimal)
    pub fn read_temperature(&mut self) -> Result<Reading<f64>> {
        let reply = self.request(Command::get_temp())?;
        let reading = resolve(reply, protocol::decode_temperature, &mut self.temperature);
        info!("Got temp from satellite: {:?}", reading);
        Ok(reading)
    }

    /// Soil moisture (raw integer count)
    pub fn read_humidity(&mut self) -> Result<Reading<i64>> {
        let reply = self.request(Command::get_humidity())?;
        let reading = resolve(reply, protocol::decode_humidity, &mut self.humidity);
        info!("Got humidity from satellite: {:?}", reading);
        Ok(reading)
    }

    /// Ask the satellite to dispense `volume_ml`.
    ///
    /// Returns whether the command was acknowledged. There is no fallback:
    /// without an acknowledgment nothing is assumed to have been dispensed.
    pub fn dispense(&mut self, volume_ml: u32) -> Result<bool> {
        let acked = match self.request(Command::pump_control(volume_ml))? {
            Some(reply) => acknowledged(&reply),
            None => false,
        };
        if acked {
            info!("Satellite dispensing {} ml", volume_ml);
            self.watering.update(volume_ml);
        } else {
            warn!("Dispense of {} ml not acknowledged", volume_ml);
        }
        Ok(acked)
    }

    /// Water with the forecast volume, or repeat the last volume if there is
    /// no forecast.
    ///
    /// A forecast becomes the remembered volume even if the satellite never
    /// acknowledges it, so a later day without a forecast repeats the plan.
    pub fn irrigate<F: VolumeForecast + ?Sized>(
        &mut self,
        forecast: &mut F,
    ) -> Result<IrrigationReport> {
        let (volume_ml, from_forecast) = match forecast.predicted_volume_ml() {
            Some(volume) => {
                self.watering.update(volume);
                (volume, true)
            }
            None => {
                warn!(
                    "No forecast, reusing previous volume of {} ml",
                    self.watering.value()
                );
                (self.watering.value(), false)
            }
        };

        let acknowledged = self.dispense(volume_ml)?;
        Ok(IrrigationReport {
            volume_ml,
            from_forecast,
            acknowledged,
        })
    }

    pub fn cached_temperature(&self) -> &CachedReading<f64> {
        &self.temperature
    }

    pub fn cached_humidity(&self) -> &CachedReading<i64> {
        &self.humidity
    }

    /// Last forecast volume, or last volume the satellite acknowledged
    pub fn last_watering(&self) -> &CachedReading<u32> {
        &self.watering
    }

    pub fn link(&self) -> &Link<T> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut Link<T> {
        &mut self.link
    }
}

fn acknowledged(reply: &[u8]) -> bool {
    match protocol::decode_ok(reply) {
        Ok(()) => true,
        Err(e) => {
            warn!("{}", e);
            false
        }
    }
}

/// Decode a reply into a fresh reading, or fall back to the cache
fn resolve<V: Copy>(
    reply: Option<Frame>,
    decode: fn(&[u8]) -> std::result::Result<V, ProtocolError>,
    cache: &mut CachedReading<V>,
) -> Reading<V> {
    match reply.map(|frame| decode(&frame)) {
        Some(Ok(value)) => {
            cache.update(value);
            Reading::fresh(value)
        }
        Some(Err(e)) => {
            warn!("Discarding reply: {}", e);
            Reading::cached(cache.value())
        }
        None => Reading::cached(cache.value()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::transport::MemoryTransport;
    use approx::assert_relative_eq;

    fn master_with(script: &[Option<&str>]) -> Master<MemoryTransport> {
        let mut transport = MemoryTransport::new();
        for entry in script {
            match entry {
                Some(frame) => transport.push_incoming(*frame),
                None => transport.push_silence(),
            }
        }
        Master::new(Link::new(transport))
    }

    fn sent(master: &Master<MemoryTransport>) -> Vec<String> {
        master
            .link()
            .transport()
            .sent()
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect()
    }

    #[test]
    fn test_ping() {
        let mut master = master_with(&[Some("OK")]);
        assert!(master.ping().unwrap());
        assert_eq!(sent(&master), vec!["ping|"]);

        // Exhausted
        assert!(!master.ping().unwrap());
    }

    #[test]
    fn test_read_temperature_updates_cache() {
        let mut master = master_with(&[Some("21.46")]);
        let reading = master.read_temperature().unwrap();

        assert!(reading.success);
        assert_relative_eq!(reading.value, 21.5);
        assert!(master.cached_temperature().is_primed());
        assert_relative_eq!(master.cached_temperature().value(), 21.5);
    }

    #[test]
    fn test_read_falls_back_to_cache_when_exhausted() {
        let mut master = master_with(&[Some("19.0"), Some("512")]);
        master.read_temperature().unwrap();
        master.read_humidity().unwrap();

        let temperature = master.read_temperature().unwrap();
        let humidity = master.read_humidity().unwrap();

        assert_eq!(temperature, Reading::cached(19.0));
        assert_eq!(humidity, Reading::cached(512));
        // 1 + 5 sends per metric
        assert_eq!(sent(&master).len(), 12);
    }

    #[test]
    fn test_read_before_priming_returns_zero() {
        let mut master = master_with(&[]);
        let reading = master.read_humidity().unwrap();
        assert_eq!(reading, Reading::cached(0));
        assert!(!master.cached_humidity().is_primed());
    }

    #[test]
    fn test_undecodable_reply_uses_cache() {
        let mut master = master_with(&[Some("512"), Some("OK")]);
        master.read_humidity().unwrap();

        let reading = master.read_humidity().unwrap();
        assert_eq!(reading, Reading::cached(512));
    }

    #[test]
    fn test_zero_is_a_valid_reading() {
        let mut master = master_with(&[Some("0.0")]);
        let reading = master.read_temperature().unwrap();
        assert!(reading.success);
        assert_eq!(reading.value, 0.0);
    }

    #[test]
    fn test_dispense_acknowledged() {
        let mut master = master_with(&[None, Some("OK")]);
        assert!(master.dispense(260).unwrap());
        assert_eq!(sent(&master), vec!["pump_control|260", "pump_control|260"]);
        assert_eq!(master.last_watering().value(), 260);
    }

    #[test]
    fn test_dispense_failure_has_no_fallback() {
        let mut master = master_with(&[]);
        assert!(!master.dispense(100).unwrap());
        assert!(!master.last_watering().is_primed());

        let mut master = master_with(&[Some("42")]);
        assert!(!master.dispense(100).unwrap());
    }

    #[test]
    fn test_irrigate_with_forecast() {
        let mut master = master_with(&[Some("OK")]);
        let mut forecast = || Some(180u32);

        let report = master.irrigate(&mut forecast).unwrap();
        assert_eq!(
            report,
            IrrigationReport {
                volume_ml: 180,
                from_forecast: true,
                acknowledged: true,
            }
        );
    }

    #[test]
    fn test_irrigate_reuses_last_volume() {
        let mut master = master_with(&[Some("OK"), Some("OK")]);
        master.dispense(220).unwrap();

        let mut forecast = || None::<u32>;
        let report = master.irrigate(&mut forecast).unwrap();
        assert_eq!(report.volume_ml, 220);
        assert!(!report.from_forecast);
        assert!(report.acknowledged);
    }

    #[test]
    fn test_connect_primes_caches() {
        let transport = {
            let mut t = MemoryTransport::new();
            t.push_incoming("OK");
            t.push_incoming("17.33");
            t.push_incoming("433");
            t
        };
        let master = Master::connect(Link::new(transport)).unwrap();

        assert_relative_eq!(master.cached_temperature().value(), 17.3);
        assert_eq!(master.cached_humidity().value(), 433);
        assert_eq!(sent(&master), vec!["ping|", "get_temp|", "get_humidity|"]);
    }

    #[test]
    fn test_latency_bound_respected() {
        let config = LinkConfig::new(Duration::from_millis(20), 5);
        let mut master = Master::new(Link::with_config(MemoryTransport::new(), config).unwrap());
        master.read_temperature().unwrap();

        let waits = master.link().transport().waits();
        let total: Duration = waits.iter().flatten().sum();
        assert!(total <= config.latency_bound());
    }

    #[test]
    fn test_unacknowledged_forecast_still_remembered() {
        let mut master = master_with(&[]);
        let report = master.irrigate(&mut || Some(180u32)).unwrap();
        assert!(!report.acknowledged);
        assert_eq!(master.last_watering().value(), 180);

        let report = master.irrigate(&mut || None::<u32>).unwrap();
        assert_eq!(report.volume_ml, 180);
        assert!(!report.from_forecast);
        assert_eq!(sent(&master).len(), 10);
    }
}
