// Soilnet Sim - Master/satellite session simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! JSON summaries printed at the end of a run.

use serde::Serialize;
use soilnet::{IrrigationReport, LinkMetrics, RangeReport, Reading, TransportMetrics};

/// One polling round as seen by the master
#[derive(Debug, Serialize)]
pub struct RoundSummary {
    pub round: u32,
    pub alive: bool,
    pub temperature: ReadingSummary<f64>,
    pub humidity: ReadingSummary<i64>,
    pub irrigation: Option<IrrigationSummary>,
}

#[derive(Debug, Serialize)]
pub struct ReadingSummary<T> {
    pub value: T,
    pub fresh: bool,
}

impl<T> From<Reading<T>> for ReadingSummary<T> {
    fn from(reading: Reading<T>) -> Self {
        Self {
            value: reading.value,
            fresh: reading.success,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IrrigationSummary {
    pub volume_ml: u32,
    pub from_forecast: bool,
    pub acknowledged: bool,
}

impl From<IrrigationReport> for IrrigationSummary {
    fn from(report: IrrigationReport) -> Self {
        Self {
            volume_ml: report.volume_ml,
            from_forecast: report.from_forecast,
            acknowledged: report.acknowledged,
        }
    }
}

/// Link statistics for the whole session
#[derive(Debug, Serialize)]
pub struct LinkSummary {
    pub exchanges: u64,
    pub replies: u64,
    pub exhausted: u64,
    pub retries: u64,
    pub success_rate: f64,
    pub average_attempts: f64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub frames_received: u64,
}

impl LinkSummary {
    pub fn new(link: &LinkMetrics, transport: &TransportMetrics) -> Self {
        Self {
            exchanges: link.exchanges,
            replies: link.replies,
            exhausted: link.exhausted,
            retries: link.retries,
            success_rate: link.success_rate(),
            average_attempts: link.average_attempts(),
            frames_sent: transport.frames_sent,
            frames_dropped: transport.frames_dropped,
            frames_received: transport.frames_received,
        }
    }
}

/// Output of `soilnet-sim session`
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub rounds: Vec<RoundSummary>,
    pub link: LinkSummary,
    pub pump_runs: usize,
    pub pump_seconds: f64,
}

/// Output of `soilnet-sim range`
#[derive(Debug, Serialize)]
pub struct RangeSummary {
    pub sent: u64,
    pub received: usize,
    pub delivery_ratio: f64,
    pub rssi_min: Option<i16>,
    pub rssi_max: Option<i16>,
    pub rssi_average: Option<f64>,
}

impl RangeSummary {
    pub fn new(sent: u64, report: &RangeReport) -> Self {
        Self {
            sent,
            received: report.received(),
            delivery_ratio: report.delivery_ratio(sent),
            rssi_min: report.rssi_min,
            rssi_max: report.rssi_max,
            rssi_average: report.average_rssi(),
        }
    }
}
