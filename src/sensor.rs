// Soilnet - LoRa command link for soil sensor and irrigation nodes
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Soil probe interface

use crate::error::SensorError;

/// Capacitive soil probe (temperature + moisture)
pub trait SoilSensor {
    /// Soil temperature in °C
    fn temperature(&mut self) -> Result<f64, SensorError>;

    /// Raw capacitive moisture count
    fn moisture(&mut self) -> Result<i64, SensorError>;
}

impl<S: SoilSensor + ?Sized> SoilSensor for &mut S {
    fn temperature(&mut self) -> Result<f64, SensorError> {
        (**self).temperature()
    }

    fn moisture(&mut self) -> Result<i64, SensorError> {
        (**self).moisture()
    }
}

/// Sensor returning fixed readings; `None` simulates a bus fault
#[derive(Debug, Clone, Default)]
pub struct FixedSoilSensor {
    pub temperature: Option<f64>,
    pub moisture: Option<i64>,
    reads: u64,
}

impl FixedSoilSensor {
    pub fn new(temperature: f64, moisture: i64) -> Self {
        Self {
            temperature: Some(temperature),
            moisture: Some(moisture),
            reads: 0,
        }
    }

    /// A probe that fails every read
    pub fn faulty() -> Self {
        Self::default()
    }

    /// Number of reads served so far
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl SoilSensor for FixedSoilSensor {
    fn temperature(&mut self) -> Result<f64, SensorError> {
        self.reads += 1;
        self.temperature.ok_or_else(|| SensorError::Bus {
            reason: "no response at 0x36".to_string(),
        })
    }

    fn moisture(&mut self) -> Result<i64, SensorError> {
        self.reads += 1;
        self.moisture.ok_or_else(|| SensorError::Bus {
            reason: "no response at 0x36".to_string(),
        })
    }
}
