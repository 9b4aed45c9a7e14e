// Soilnet - LoRa command link for soil sensor and irrigation nodes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! In-process radio simulation
//!
//! [`pair`] returns two [`SimRadio`] endpoints connected through channels.
//! Receives block for real, so a master and a satellite can run on separate
//! threads exactly as they would on two boards. A frame is only delivered
//! when both radios share frequency and sync key; anything else on the air
//! is discarded while the receiver keeps waiting.

use crate::config::RadioConfig;
use crate::error::{Result, TransportError};
use crate::transport::{Frame, Transport, TransportMetrics};
use log::{debug, trace};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// Default signal strength reported by a simulated radio (dBm)
pub const DEFAULT_RSSI: i16 = -60;

/// A frame as it travels over the air
#[derive(Debug, Clone)]
struct Emission {
    frequency_khz: u32,
    key_fingerprint: u32,
    payload: Frame,
}

/// One end of a simulated radio channel
#[derive(Debug)]
pub struct SimRadio {
    config: RadioConfig,
    frequency_khz: u32,
    key_fingerprint: u32,
    tx: Sender<Emission>,
    rx: Receiver<Emission>,
    /// Signal strength stamped on every received frame
    rssi: i16,
    last_rssi: Option<i16>,
    metrics: TransportMetrics,
}

/// Create two radios that hear each other's transmissions
pub fn pair(a: RadioConfig, b: RadioConfig) -> (SimRadio, SimRadio) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();
    (SimRadio::new(a, a_tx, a_rx), SimRadio::new(b, b_tx, b_rx))
}

impl SimRadio {
    fn new(config: RadioConfig, tx: Sender<Emission>, rx: Receiver<Emission>) -> Self {
        debug!(
            "Radio up at {} MHz (CS pin {}, RST pin {})",
            config.frequency_mhz, config.pins.chip_select, config.pins.reset
        );
        Self {
            frequency_khz: config.frequency_khz(),
            key_fingerprint: config.key_fingerprint(),
            config,
            tx,
            rx,
            rssi: DEFAULT_RSSI,
            last_rssi: None,
            metrics: TransportMetrics::default(),
        }
    }

    /// Set the signal strength reported for received frames
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    /// Get the radio configuration
    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    fn accepts(&self, emission: &Emission) -> bool {
        emission.frequency_khz == self.frequency_khz
            && emission.key_fingerprint == self.key_fingerprint
    }

    fn deliver(&mut self, payload: Frame) -> Option<Frame> {
        self.metrics.frames_received += 1;
        self.metrics.bytes_received += payload.len() as u64;
        self.last_rssi = Some(self.rssi);
        self.metrics.last_rssi = Some(self.rssi);
        debug!("Got frame: {:?}", String::from_utf8_lossy(&payload));
        Some(payload)
    }

    fn receive_until(&mut self, deadline: Instant) -> Result<Option<Frame>> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(emission) if self.accepts(&emission) => {
                    return Ok(self.deliver(emission.payload));
                }
                Ok(_) => trace!("Ignoring frame from a foreign radio"),
                Err(RecvTimeoutError::Timeout) => {
                    self.metrics.receive_timeouts += 1;
                    return Ok(None);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Nobody left to transmit: the rest of the window is silence
                    std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    self.metrics.receive_timeouts += 1;
                    return Ok(None);
                }
            }
        }
    }

    fn receive_forever(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.rx.recv() {
                Ok(emission) if self.accepts(&emission) => {
                    return Ok(self.deliver(emission.payload));
                }
                Ok(_) => trace!("Ignoring frame from a foreign radio"),
                Err(_) => {
                    return Err(TransportError::Disconnected {
                        reason: "peer radio dropped".to_string(),
                    }
                    .into())
                }
            }
        }
    }
}

impl Transport for SimRadio {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() > self.config.max_frame_len {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: self.config.max_frame_len,
            }
            .into());
        }

        debug!("Sending frame: {:?}", String::from_utf8_lossy(frame));
        self.metrics.frames_sent += 1;
        self.metrics.bytes_sent += frame.len() as u64;

        let emission = Emission {
            frequency_khz: self.frequency_khz,
            key_fingerprint: self.key_fingerprint,
            payload: frame.to_vec(),
        };
        // A transmission nobody hears is still a successful transmission
        if self.tx.send(emission).is_err() {
            trace!("No radio listening");
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>> {
        match timeout {
            Some(timeout) => self.receive_until(Instant::now() + timeout),
            None => self.receive_forever(),
        }
    }

    fn rssi(&self) -> Option<i16> {
        self.last_rssi
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SoilnetError;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn test_pair_delivers_frames() {
        let (mut master, mut satellite) = pair(RadioConfig::default(), RadioConfig::default());

        master.send(b"ping|").unwrap();
        let frame = satellite.receive(Some(SHORT)).unwrap();
        assert_eq!(frame, Some(b"ping|".to_vec()));

        satellite.send(b"OK").unwrap();
        assert_eq!(master.receive(None).unwrap(), Some(b"OK".to_vec()));
    }

    #[test]
    fn test_receive_times_out() {
        let (mut master, _satellite) = pair(RadioConfig::default(), RadioConfig::default());

        let start = Instant::now();
        assert_eq!(master.receive(Some(SHORT)).unwrap(), None);
        assert!(start.elapsed() >= SHORT);
        assert_eq!(master.metrics().receive_timeouts, 1);
    }

    #[test]
    fn test_foreign_key_is_filtered() {
        let (mut master, mut satellite) =
            pair(RadioConfig::default(), RadioConfig::with_key([0x42; 16]));

        master.send(b"ping|").unwrap();
        assert_eq!(satellite.receive(Some(SHORT)).unwrap(), None);
    }

    #[test]
    fn test_foreign_frequency_is_filtered() {
        let (mut master, mut satellite) =
            pair(RadioConfig::default(), RadioConfig::on_frequency(868.0));

        master.send(b"ping|").unwrap();
        assert_eq!(satellite.receive(Some(SHORT)).unwrap(), None);
    }

    #[test]
    fn test_rssi_reported_after_receive() {
        let (mut master, satellite) = pair(RadioConfig::default(), RadioConfig::default());
        let mut satellite = satellite.with_rssi(-87);

        assert_eq!(satellite.rssi(), None);
        master.send(b"ping|").unwrap();
        satellite.receive(Some(SHORT)).unwrap();
        assert_eq!(satellite.rssi(), Some(-87));
        assert_eq!(satellite.metrics().last_rssi, Some(-87));
    }

    #[test]
    fn test_send_without_listener_succeeds() {
        let (mut master, satellite) = pair(RadioConfig::default(), RadioConfig::default());
        drop(satellite);
        assert!(master.send(b"ping|").is_ok());
    }

    #[test]
    fn test_unbounded_receive_reports_dropped_peer() {
        let (master, mut satellite) = pair(RadioConfig::default(), RadioConfig::default());
        drop(master);

        let result = satellite.receive(None);
        assert!(matches!(
            result,
            Err(SoilnetError::Transport(TransportError::Disconnected { .. }))
        ));
    }

    #[test]
    fn test_receive_across_threads() {
        let (mut master, mut satellite) = pair(RadioConfig::default(), RadioConfig::default());

        let handle = thread::spawn(move || {
            let frame = satellite.receive(None).unwrap().unwrap();
            satellite.send(&frame).unwrap();
        });

        master.send(b"echo|").unwrap();
        let echoed = master.receive(Some(Duration::from_secs(2))).unwrap();
        assert_eq!(echoed, Some(b"echo|".to_vec()));
        handle.join().unwrap();
    }
}
