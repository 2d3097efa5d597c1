//! Readings, phases, and per-reading voltage analysis.
//!
//! A [`Reading`] is one sample from the meter gateway: a timestamp plus the
//! instantaneous voltage on each of the three phases. [`analyze_reading`]
//! classifies a reading against the configured envelope without touching any
//! state; the stateful event detection lives in [`crate::anomaly`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Thresholds;

/// One of the three conductors of a three-phase supply.
///
/// Used as a direct index into fixed-size `[T; 3]` tables throughout the
/// pipeline, so the discriminant order is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Phase L1.
    L1,
    /// Phase L2.
    L2,
    /// Phase L3.
    L3,
}

impl Phase {
    /// All phases in wire order.
    pub const ALL: [Phase; 3] = [Phase::L1, Phase::L2, Phase::L3];

    /// Zero-based slot index for `[T; 3]` tables.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical label, e.g. `"L1"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::L1 => "L1",
            Phase::L2 => "L2",
            Phase::L3 => "L3",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ();

    /// Parses `"L1"`/`"l1"` style labels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L1" => Ok(Phase::L1),
            "L2" => Ok(Phase::L2),
            "L3" => Ok(Phase::L3),
            _ => Err(()),
        }
    }
}

/// A single three-phase voltage sample.
///
/// Timestamps are Unix milliseconds (UTC) and are assumed monotonically
/// non-decreasing within one ingest stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Sample timestamp in Unix milliseconds.
    pub ts_ms: i64,
    /// Instantaneous voltage on L1, in volts.
    pub v1: f64,
    /// Instantaneous voltage on L2, in volts.
    pub v2: f64,
    /// Instantaneous voltage on L3, in volts.
    pub v3: f64,
}

impl Reading {
    /// Creates a reading.
    #[must_use]
    pub fn new(ts_ms: i64, v1: f64, v2: f64, v3: f64) -> Self {
        Self { ts_ms, v1, v2, v3 }
    }

    /// Returns the voltage of the given phase.
    #[inline]
    #[must_use]
    pub fn voltage(&self, phase: Phase) -> f64 {
        match phase {
            Phase::L1 => self.v1,
            Phase::L2 => self.v2,
            Phase::L3 => self.v3,
        }
    }
}

/// Classification of a single phase voltage against the envelope.
///
/// Pure derivation from one reading; it carries the envelope it was judged
/// against so consumers never need a second lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseAnalysis {
    /// Which phase this analysis describes.
    pub phase: Phase,
    /// The observed voltage in volts.
    pub voltage: f64,
    /// Nominal voltage the deviation is relative to.
    pub nominal: f64,
    /// Lower envelope edge.
    pub min: f64,
    /// Upper envelope edge.
    pub max: f64,
    /// `voltage - nominal`, in volts.
    pub deviation: f64,
    /// Whether the voltage lies inside the envelope (inclusive).
    pub in_bounds: bool,
    /// Whether the voltage counts as loss of supply.
    pub is_zero: bool,
}

/// Analyzes a single phase voltage.
#[must_use]
pub fn analyze(voltage: f64, phase: Phase, thresholds: &Thresholds) -> PhaseAnalysis {
    PhaseAnalysis {
        phase,
        voltage,
        nominal: thresholds.nominal_voltage,
        min: thresholds.voltage_min,
        max: thresholds.voltage_max,
        deviation: voltage - thresholds.nominal_voltage,
        in_bounds: thresholds.in_bounds(voltage),
        is_zero: thresholds.is_zero(voltage),
    }
}

/// Analyzes all three phases of a reading, in phase order L1, L2, L3.
#[must_use]
pub fn analyze_reading(reading: &Reading, thresholds: &Thresholds) -> [PhaseAnalysis; 3] {
    Phase::ALL.map(|phase| analyze(reading.voltage(phase), phase, thresholds))
}
