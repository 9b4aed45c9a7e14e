// Soilnet - LoRa command link for soil sensor and irrigation nodes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Request/response over an unreliable transport
//!
//! An exchange sends a command, waits one timeout for any frame, and resends
//! the same command until a frame arrives or the attempt budget is spent:
//!
//! ```text
//! IDLE -> SENDING -> WAITING -> RESOLVED
//!            ^          |
//!            +- RETRY <-+  (timeout, attempts left)
//! ```
//!
//! Retries are sent immediately with no backoff. The first frame received is
//! returned as the reply; the protocol has no way to tell it apart from a
//! late reply to an earlier exchange.

use crate::config::LinkConfig;
use crate::error::Result;
use crate::metrics::LinkMetrics;
use crate::protocol::Command;
use crate::transport::{Frame, Transport};
use log::{debug, warn};
use std::time::{Duration, Instant};

/// Where the link is in its current exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No exchange started yet
    #[default]
    Idle,
    /// Handing the command to the transport
    Sending,
    /// Waiting for a reply
    Waiting,
    /// Attempt timed out, about to resend
    Retry,
    /// Exchange finished, with or without a reply
    Resolved,
}

/// Result of one request/attempt/reply cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    /// Command that was sent
    pub command: Command,
    /// Number of sends performed
    pub attempts: u32,
    /// First frame received, if any
    pub reply: Option<Frame>,
    /// Time from first send to resolution
    pub elapsed: Duration,
}

impl Exchange {
    /// Check if the exchange got a reply
    pub fn is_answered(&self) -> bool {
        self.reply.is_some()
    }

    /// Consume the exchange, keeping only the reply
    pub fn into_reply(self) -> Option<Frame> {
        self.reply
    }
}

/// Request/response endpoint over a [`Transport`]
#[derive(Debug)]
pub struct Link<T> {
    transport: T,
    config: LinkConfig,
    state: LinkState,
    metrics: LinkMetrics,
}

impl<T: Transport> Link<T> {
    /// Create a link with the default timeout and attempt budget
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: LinkConfig::default(),
            state: LinkState::Idle,
            metrics: LinkMetrics::new(),
        }
    }

    /// Create a link with a custom configuration
    pub fn with_config(transport: T, config: LinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new(transport)
        })
    }

    /// Send `command` and wait for a reply, retrying on silence.
    ///
    /// Performs at most `max_attempts` sends and stops at the first frame
    /// received. Blocks for at most `per_attempt_timeout * max_attempts`.
    pub fn exchange(
        &mut self,
        command: &Command,
        per_attempt_timeout: Duration,
        max_attempts: u32,
    ) -> Result<Exchange> {
        LinkConfig::new(per_attempt_timeout, max_attempts).validate()?;

        let started = Instant::now();
        let result = self.run_attempts(command, per_attempt_timeout, max_attempts);
        let (attempts, reply) = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state = LinkState::Idle;
                return Err(e);
            }
        };
        self.state = LinkState::Resolved;

        let exchange = Exchange {
            command: command.clone(),
            attempts,
            reply,
            elapsed: started.elapsed(),
        };
        if !exchange.is_answered() {
            warn!(
                "No response to {} after {} attempts",
                command, exchange.attempts
            );
        }
        self.metrics.record(&exchange);
        Ok(exchange)
    }

    fn run_attempts(
        &mut self,
        command: &Command,
        per_attempt_timeout: Duration,
        max_attempts: u32,
    ) -> Result<(u32, Option<Frame>)> {
        let frame = command.encode();
        let mut attempts = 0;

        loop {
            self.state = LinkState::Sending;
            debug!("Attempt {}/{}: {}", attempts + 1, max_attempts, command);
            self.transport.send(&frame)?;
            attempts += 1;

            self.state = LinkState::Waiting;
            if let Some(reply) = self.transport.receive(Some(per_attempt_timeout))? {
                debug!("Reply after {} attempt(s): {:?}", attempts, String::from_utf8_lossy(&reply));
                return Ok((attempts, Some(reply)));
            }

            if attempts >= max_attempts {
                return Ok((attempts, None));
            }
            self.state = LinkState::Retry;
        }
    }

    /// [`exchange`](Self::exchange) reduced to its reply
    pub fn send_and_wait(
        &mut self,
        command: &Command,
        per_attempt_timeout: Duration,
        max_attempts: u32,
    ) -> Result<Option<Frame>> {
        self.exchange(command, per_attempt_timeout, max_attempts)
            .map(Exchange::into_reply)
    }

    /// Run an exchange with the configured timeout and attempt budget
    pub fn request(&mut self, command: &Command) -> Result<Exchange> {
        let LinkConfig {
            per_attempt_timeout,
            max_attempts,
        } = self.config;
        self.exchange(command, per_attempt_timeout, max_attempts)
    }

    /// Send a single frame without waiting for anything
    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.transport.send(frame)
    }

    /// Block until a frame arrives
    pub fn listen(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.transport.receive(None)? {
                return Ok(frame);
            }
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn metrics(&self) -> &LinkMetrics {
        &self.metrics
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the underlying transport
    pub fn into_inner(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SoilnetError, TransportError};
    use crate::transport::{MemoryTransport, TransportMetrics};

    const TIMEOUT: Duration = Duration::from_secs(2);

    /// Transport whose radio dies on the first send
    struct DeadRadio;

    impl Transport for DeadRadio {
        fn send(&mut self, _frame: &[u8]) -> Result<()> {
            Err(TransportError::Hardware {
                reason: "no SPI response".to_string(),
            }
            .into())
        }

        fn receive(&mut self, _timeout: Option<Duration>) -> Result<Option<Frame>> {
            Ok(None)
        }

        fn metrics(&self) -> TransportMetrics {
            TransportMetrics::default()
        }
    }

    #[test]
    fn test_reply_on_first_attempt() {
        let mut transport = MemoryTransport::new();
        transport.push_incoming("OK");
        let mut link = Link::new(&mut transport);

        let exchange = link.exchange(&Command::ping(), TIMEOUT, 5).unwrap();
        assert_eq!(exchange.attempts, 1);
        assert_eq!(exchange.reply, Some(b"OK".to_vec()));
        assert_eq!(link.state(), LinkState::Resolved);
        drop(link);

        assert_eq!(transport.sent(), &[b"ping|".to_vec()]);
    }

    #[test]
    fn test_reply_on_fourth_attempt() {
        let mut transport = MemoryTransport::new();
        transport.push_silences(3);
        transport.push_incoming("21.5");
        transport.push_incoming("late");
        let mut link = Link::new(&mut transport);

        let reply = link.send_and_wait(&Command::get_temp(), TIMEOUT, 5).unwrap();
        assert_eq!(reply, Some(b"21.5".to_vec()));
        drop(link);

        // Same command resent each time, nothing read past the reply
        assert_eq!(transport.sent().len(), 4);
        assert!(transport.sent().iter().all(|f| f == b"get_temp|"));
        assert_eq!(transport.waits().len(), 4);
        assert_eq!(transport.pending_incoming(), 1);
    }

    #[test]
    fn test_exhaustion_sends_max_attempts() {
        let mut transport = MemoryTransport::new();
        let mut link = Link::new(&mut transport);

        let exchange = link.exchange(&Command::get_humidity(), TIMEOUT, 5).unwrap();
        assert_eq!(exchange.attempts, 5);
        assert_eq!(exchange.reply, None);
        assert_eq!(link.state(), LinkState::Resolved);
        assert_eq!(link.metrics().exhausted, 1);
        drop(link);

        assert_eq!(transport.sent().len(), 5);
        assert!(transport.waits().iter().all(|w| *w == Some(TIMEOUT)));
    }

    #[test]
    fn test_single_attempt_budget() {
        let mut transport = MemoryTransport::new();
        transport.push_silence();
        transport.push_incoming("OK");
        let mut link = Link::new(&mut transport);

        assert_eq!(link.send_and_wait(&Command::ping(), TIMEOUT, 1).unwrap(), None);
        drop(link);
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut link = Link::new(MemoryTransport::new());
        let result = link.exchange(&Command::ping(), TIMEOUT, 0);
        assert!(matches!(result, Err(SoilnetError::Config(_))));
        assert!(link.transport().sent().is_empty());
    }

    #[test]
    fn test_stray_frame_accepted_as_reply() {
        let mut transport = MemoryTransport::new();
        transport.push_incoming("OK");
        let mut link = Link::new(&mut transport);

        // An "OK" left over from a ping resolves a temperature request
        let reply = link.send_and_wait(&Command::get_temp(), TIMEOUT, 5).unwrap();
        assert_eq!(reply, Some(b"OK".to_vec()));
    }

    #[test]
    fn test_request_uses_config() {
        let config = LinkConfig::new(Duration::from_millis(250), 3);
        let mut link = Link::with_config(MemoryTransport::new(), config).unwrap();

        let exchange = link.request(&Command::ping()).unwrap();
        assert_eq!(exchange.attempts, 3);
        assert!(link
            .transport()
            .waits()
            .iter()
            .all(|w| *w == Some(Duration::from_millis(250))));
    }

    #[test]
    fn test_with_config_validates() {
        let config = LinkConfig::new(Duration::ZERO, 5);
        assert!(Link::with_config(MemoryTransport::new(), config).is_err());
    }

    #[test]
    fn test_hardware_fault_propagates() {
        let mut link = Link::new(DeadRadio);
        let result = link.request(&Command::ping());
        assert!(matches!(
            result,
            Err(SoilnetError::Transport(TransportError::Hardware { .. }))
        ));
        assert_eq!(link.state(), LinkState::Idle);
        assert_eq!(link.metrics().exchanges, 0);
    }

    #[test]
    fn test_listen_skips_silence() {
        let mut transport = MemoryTransport::new();
        transport.push_silences(2);
        transport.push_incoming("ping|");
        let mut link = Link::new(transport);

        assert_eq!(link.listen().unwrap(), b"ping|".to_vec());
        assert!(link.transport().waits().iter().all(|w| w.is_none()));
    }

    #[test]
    fn test_metrics_accumulate() {
        let mut transport = MemoryTransport::new();
        transport.push_silence();
        transport.push_incoming("OK");
        let mut link = Link::new(&mut transport);

        link.request(&Command::ping()).unwrap();
        link.request(&Command::ping()).unwrap();

        let metrics = link.metrics();
        assert_eq!(metrics.exchanges, 2);
        assert_eq!(metrics.replies, 1);
        assert_eq!(metrics.attempts, 7);
        assert_eq!(metrics.retries, 5);
    }
}
