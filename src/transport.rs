// Soilnet - LoRa command link for soil sensor and irrigation nodes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Transport abstraction module
//!
//! A [`Transport`] is one end of a half-duplex radio channel. Sending is
//! fire-and-forget and receiving waits for at most one frame. There is no
//! acknowledgment or retry at this level; see [`Link`](crate::link::Link).

use crate::config::RFM69_MAX_PAYLOAD;
use crate::error::{Result, TransportError};
use std::collections::VecDeque;
use std::time::Duration;

/// One discrete unit delivered by the radio driver
pub type Frame = Vec<u8>;

/// Statistics about transport usage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportMetrics {
    /// Total frames handed to the radio
    pub frames_sent: u64,
    /// Total frames received
    pub frames_received: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Receives that ended without a frame
    pub receive_timeouts: u64,
    /// Frames lost on the way out
    pub frames_dropped: u64,
    /// Signal strength of the last received frame (dBm)
    pub last_rssi: Option<i16>,
}

impl TransportMetrics {
    fn record_sent(&mut self, len: usize) {
        self.frames_sent += 1;
        self.bytes_sent += len as u64;
    }

    fn record_received(&mut self, len: usize) {
        self.frames_received += 1;
        self.bytes_received += len as u64;
    }
}

/// Trait for radio transports
pub trait Transport {
    /// Put a frame on the air. Returns once the frame is handed off; there is
    /// no delivery confirmation.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Wait for one frame.
    ///
    /// `None` as timeout waits indefinitely. `Ok(None)` means nothing arrived
    /// in time.
    fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>>;

    /// Signal strength of the last received frame, if the radio reports it
    fn rssi(&self) -> Option<i16> {
        None
    }

    /// Get transport metrics
    fn metrics(&self) -> TransportMetrics;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send(frame)
    }

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>> {
        (**self).receive(timeout)
    }

    fn rssi(&self) -> Option<i16> {
        (**self).rssi()
    }

    fn metrics(&self) -> TransportMetrics {
        (**self).metrics()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send(frame)
    }

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>> {
        (**self).receive(timeout)
    }

    fn rssi(&self) -> Option<i16> {
        (**self).rssi()
    }

    fn metrics(&self) -> TransportMetrics {
        (**self).metrics()
    }
}

/// A scripted in-memory transport for testing
///
/// Inbound traffic is a script of receive results: a frame, or a silence slot
/// that makes the next receive time out. Every outbound frame and every
/// requested timeout is recorded.
#[derive(Debug)]
pub struct MemoryTransport {
    /// Scripted receive results
    inbox: VecDeque<Option<Frame>>,
    /// Frames sent, in order
    outbox: Vec<Frame>,
    /// Timeout passed to each receive call
    waits: Vec<Option<Duration>>,
    /// Maximum frame size
    max_frame_len: usize,
    /// Metrics
    metrics: TransportMetrics,
}

impl MemoryTransport {
    /// Create a new memory transport
    pub fn new() -> Self {
        Self::with_max_frame_len(RFM69_MAX_PAYLOAD)
    }

    /// Create with custom frame size limit
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            inbox: VecDeque::new(),
            outbox: Vec::new(),
            waits: Vec::new(),
            max_frame_len,
            metrics: TransportMetrics::default(),
        }
    }

    /// Queue a frame for a future receive
    pub fn push_incoming(&mut self, frame: impl Into<Frame>) {
        self.inbox.push_back(Some(frame.into()));
    }

    /// Queue a receive that times out
    pub fn push_silence(&mut self) {
        self.inbox.push_back(None);
    }

    /// Queue `count` receives that time out
    pub fn push_silences(&mut self, count: usize) {
        for _ in 0..count {
            self.push_silence();
        }
    }

    /// Frames sent so far
    pub fn sent(&self) -> &[Frame] {
        &self.outbox
    }

    /// Take and clear the sent frames
    pub fn take_sent(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.outbox)
    }

    /// Timeouts requested by each receive call so far
    pub fn waits(&self) -> &[Option<Duration>] {
        &self.waits
    }

    /// Number of scripted receive results not yet consumed
    pub fn pending_incoming(&self) -> usize {
        self.inbox.len()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() > self.max_frame_len {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_len,
            }
            .into());
        }

        self.metrics.record_sent(frame.len());
        self.outbox.push(frame.to_vec());
        Ok(())
    }

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>> {
        self.waits.push(timeout);

        match self.inbox.pop_front() {
            Some(Some(frame)) => {
                self.metrics.record_received(frame.len());
                Ok(Some(frame))
            }
            Some(None) => {
                self.metrics.receive_timeouts += 1;
                Ok(None)
            }
            // An unbounded wait on an exhausted script would never return
            None if timeout.is_none() => Err(TransportError::Disconnected {
                reason: "script exhausted".to_string(),
            }
            .into()),
            None => {
                self.metrics.receive_timeouts += 1;
                Ok(None)
            }
        }
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.clone()
    }
}

/// Transport wrapper that simulates packet loss on the way out
#[derive(Debug)]
pub struct LossyTransport<T> {
    inner: T,
    loss_rate: f32,
    rng_state: u64,
    dropped: u64,
}

impl<T: Transport> LossyTransport<T> {
    /// Wrap a transport with a given loss rate (0.0-1.0)
    pub fn new(inner: T, loss_rate: f32) -> Self {
        Self::with_seed(inner, loss_rate, 12345)
    }

    /// Wrap a transport with an explicit PRNG seed
    pub fn with_seed(inner: T, loss_rate: f32, seed: u64) -> Self {
        Self {
            inner,
            loss_rate: loss_rate.clamp(0.0, 1.0),
            rng_state: seed,
            dropped: 0,
        }
    }

    /// Get the wrapped transport
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Get the wrapped transport mutably
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwrap the transport
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Simple PRNG for deterministic testing
    fn next_random(&mut self) -> f32 {
        self.rng_state = self.rng_state.wrapping_mul(1103515245).wrapping_add(12345);
        ((self.rng_state >> 16) & 0x7fff) as f32 / 32767.0
    }
}

impl<T: Transport> Transport for LossyTransport<T> {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        if self.loss_rate >= 1.0 || self.next_random() < self.loss_rate {
            log::debug!("Frame lost in transit ({} bytes)", frame.len());
            self.dropped += 1;
            return Ok(());
        }
        self.inner.send(frame)
    }

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>> {
        self.inner.receive(timeout)
    }

    fn rssi(&self) -> Option<i16> {
        self.inner.rssi()
    }

    fn metrics(&self) -> TransportMetrics {
        let mut metrics = self.inner.metrics();
        metrics.frames_dropped += self.dropped;
        metrics
    }
}
