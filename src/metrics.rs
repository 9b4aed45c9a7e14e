// Soilnet - LoRa command link for soil sensor and irrigation nodes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Link statistics
//!
//! Counts exchanges, attempts and outcomes so the reliability of the radio
//! path can be judged from the gateway side.

use crate::link::Exchange;
use std::time::Duration;

/// Request/response statistics collected by a [`Link`](crate::link::Link)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkMetrics {
    /// Exchanges started
    pub exchanges: u64,
    /// Exchanges resolved with a reply
    pub replies: u64,
    /// Exchanges that ran out of attempts
    pub exhausted: u64,
    /// Total sends across all exchanges
    pub attempts: u64,
    /// Sends beyond the first of each exchange
    pub retries: u64,
    /// Time spent waiting in exchanges
    pub total_elapsed: Duration,
}

impl LinkMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolved exchange
    pub fn record(&mut self, exchange: &Exchange) {
        self.exchanges += 1;
        self.attempts += u64::from(exchange.attempts);
        self.retries += u64::from(exchange.attempts.saturating_sub(1));
        self.total_elapsed += exchange.elapsed;
        if exchange.reply.is_some() {
            self.replies += 1;
        } else {
            self.exhausted += 1;
        }
    }

    /// Fraction of exchanges that got a reply (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.exchanges == 0 {
            return 0.0;
        }
        self.replies as f64 / self.exchanges as f64
    }

    /// Mean number of sends per exchange
    pub fn average_attempts(&self) -> f64 {
        if self.exchanges == 0 {
            return 0.0;
        }
        self.attempts as f64 / self.exchanges as f64
    }

    /// Reset all counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
