//! Per-phase anomaly detection state machines.
//!
//! The tracker keeps two orthogonal machines per phase:
//!
//! - **Interruption**: entered when the phase voltage drops below the zero
//!   threshold, left on the first energized reading. The anomaly is emitted
//!   once, on recovery, classified short or long by the 180-second rule.
//! - **Deviation**: entered when the voltage is outside the envelope but
//!   still energized. A deviation episode emits twice: an opening event with
//!   no end time and a closing event carrying the observed extremes.
//!   Consumers de-duplicate the pair by `(phase, started_at)`.
//!
//! Within one reading the interruption machine runs first; the deviation
//! machine only sees energized voltages. A phase that collapses to zero
//! mid-deviation hands the episode over to the interruption machine silently.
//!
//! Phase state lives in a fixed `[PhaseState; 3]` indexed by [`Phase`], so
//! the hot path performs no hashing and no allocation until an event fires.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Thresholds;
use crate::reading::{Phase, Reading};

/// Classification of an emitted anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    /// Supply loss longer than the long-interruption limit.
    LongInterruption,
    /// Supply loss within the long-interruption limit.
    ShortInterruption,
    /// Voltage outside the envelope while energized.
    VoltageDeviation,
}

impl AnomalyKind {
    /// Canonical wire token, e.g. `"LONG_INTERRUPTION"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AnomalyKind::LongInterruption => "LONG_INTERRUPTION",
            AnomalyKind::ShortInterruption => "SHORT_INTERRUPTION",
            AnomalyKind::VoltageDeviation => "VOLTAGE_DEVIATION",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LONG_INTERRUPTION" => Ok(AnomalyKind::LongInterruption),
            "SHORT_INTERRUPTION" => Ok(AnomalyKind::ShortInterruption),
            "VOLTAGE_DEVIATION" => Ok(AnomalyKind::VoltageDeviation),
            _ => Err(()),
        }
    }
}

/// Severity of an emitted anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Degraded but tolerable supply quality.
    Warning,
    /// Regulatory-relevant supply failure.
    Critical,
}

/// An emitted anomaly event.
///
/// Interruptions always arrive closed (`ended_at` set, `v_min` zero, `v_max`
/// the recovery voltage). Deviations arrive twice: open (`ended_at`,
/// `duration_s` unset) and closed (extremes over the whole episode).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Episode start, Unix milliseconds.
    pub started_at: i64,
    /// Episode end, Unix milliseconds; `None` on deviation-open events.
    pub ended_at: Option<i64>,
    /// Affected phase.
    pub phase: Phase,
    /// Event classification.
    pub kind: AnomalyKind,
    /// Event severity.
    pub severity: Severity,
    /// Lowest voltage observed during the episode.
    pub v_min: Option<f64>,
    /// Highest voltage observed during the episode.
    pub v_max: Option<f64>,
    /// Episode length in whole seconds; `None` on deviation-open events.
    pub duration_s: Option<i64>,
}

/// Interruption sub-machine state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum InterruptionState {
    /// Phase is energized.
    #[default]
    Idle,
    /// Phase has been below the zero threshold since `started_at`.
    Active { started_at: i64 },
}

/// Deviation sub-machine state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum DeviationState {
    /// Voltage inside the envelope (or episode handed to interruption).
    #[default]
    Idle,
    /// Voltage outside the envelope since `started_at`; extremes tracked.
    Active {
        started_at: i64,
        v_min: f64,
        v_max: f64,
    },
}

/// Both sub-machines of one phase.
#[derive(Debug, Clone, Copy, Default)]
struct PhaseState {
    interruption: InterruptionState,
    deviation: DeviationState,
}

/// Ongoing (not yet emitted) episode reported by [`AnomalyTracker::active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveAnomaly {
    /// Affected phase.
    pub phase: Phase,
    /// Which sub-machine is active.
    #[serde(rename = "type")]
    pub kind: ActiveKind,
    /// Episode start, Unix milliseconds.
    pub started_at: i64,
}

/// Which sub-machine an active episode belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveKind {
    /// Ongoing supply loss.
    Interruption,
    /// Ongoing out-of-envelope deviation.
    Deviation,
}

/// Stateful per-phase anomaly detector.
#[derive(Debug)]
pub struct AnomalyTracker {
    thresholds: Thresholds,
    phases: [PhaseState; 3],
}

impl AnomalyTracker {
    /// Creates a tracker with every sub-machine idle.
    #[must_use]
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            phases: [PhaseState::default(); 3],
        }
    }

    /// Feeds one reading through all three phases, in phase order.
    ///
    /// Returns the anomalies this reading triggered; the vector is empty for
    /// the overwhelming majority of readings.
    pub fn observe(&mut self, reading: &Reading) -> Vec<Anomaly> {
        let mut emitted = Vec::new();
        for phase in Phase::ALL {
            self.observe_phase(phase, reading.voltage(phase), reading.ts_ms, &mut emitted);
        }
        emitted
    }

    /// Runs both sub-machines of one phase for a single sample.
    fn observe_phase(&mut self, phase: Phase, voltage: f64, ts_ms: i64, out: &mut Vec<Anomaly>) {
        let state = &mut self.phases[phase.index()];

        if self.thresholds.is_zero(voltage) {
            if state.interruption == InterruptionState::Idle {
                state.interruption = InterruptionState::Active { started_at: ts_ms };
            }
            // The interruption machine owns the episode from here on.
            state.deviation = DeviationState::Idle;
            return;
        }

        // Energized: close an ongoing interruption before deviation logic so
        // the recovery reading itself can still open a deviation.
        if let InterruptionState::Active { started_at } = state.interruption {
            state.interruption = InterruptionState::Idle;
            out.push(close_interruption(
                &self.thresholds,
                phase,
                started_at,
                ts_ms,
                voltage,
            ));
        }

        let out_of_bounds = !self.thresholds.in_bounds(voltage);
        match (state.deviation, out_of_bounds) {
            (DeviationState::Idle, true) => {
                state.deviation = DeviationState::Active {
                    started_at: ts_ms,
                    v_min: voltage,
                    v_max: voltage,
                };
                out.push(Anomaly {
                    started_at: ts_ms,
                    ended_at: None,
                    phase,
                    kind: AnomalyKind::VoltageDeviation,
                    severity: Severity::Warning,
                    v_min: Some(voltage),
                    v_max: Some(voltage),
                    duration_s: None,
                });
            }
            (
                DeviationState::Active {
                    started_at,
                    v_min,
                    v_max,
                },
                true,
            ) => {
                state.deviation = DeviationState::Active {
                    started_at,
                    v_min: v_min.min(voltage),
                    v_max: v_max.max(voltage),
                };
            }
            (
                DeviationState::Active {
                    started_at,
                    v_min,
                    v_max,
                },
                false,
            ) => {
                out.push(Anomaly {
                    started_at,
                    ended_at: Some(ts_ms),
                    phase,
                    kind: AnomalyKind::VoltageDeviation,
                    severity: Severity::Warning,
                    v_min: Some(v_min),
                    v_max: Some(v_max),
                    duration_s: Some((ts_ms - started_at) / 1_000),
                });
                state.deviation = DeviationState::Idle;
            }
            (DeviationState::Idle, false) => {}
        }
    }

    /// Lists every sub-machine currently mid-episode.
    #[must_use]
    pub fn active(&self) -> Vec<ActiveAnomaly> {
        let mut active = Vec::new();
        for phase in Phase::ALL {
            let state = &self.phases[phase.index()];
            if let InterruptionState::Active { started_at } = state.interruption {
                active.push(ActiveAnomaly {
                    phase,
                    kind: ActiveKind::Interruption,
                    started_at,
                });
            }
            if let DeviationState::Active { started_at, .. } = state.deviation {
                active.push(ActiveAnomaly {
                    phase,
                    kind: ActiveKind::Deviation,
                    started_at,
                });
            }
        }
        active
    }

    /// Returns every sub-machine to idle without emitting anything.
    pub fn reset(&mut self) {
        self.phases = [PhaseState::default(); 3];
    }
}

/// Builds the recovery anomaly for an interruption episode.
fn close_interruption(
    thresholds: &Thresholds,
    phase: Phase,
    started_at: i64,
    ended_at: i64,
    recovery_voltage: f64,
) -> Anomaly {
    let duration_ms = ended_at - started_at;
    let long = duration_ms > thresholds.long_interruption_seconds * 1_000;

    let (kind, severity) = if long {
        (AnomalyKind::LongInterruption, Severity::Critical)
    } else {
        (AnomalyKind::ShortInterruption, Severity::Warning)
    };

    Anomaly {
        started_at,
        ended_at: Some(ended_at),
        phase,
        kind,
        severity,
        v_min: Some(0.0),
        v_max: Some(recovery_voltage),
        duration_s: Some(duration_ms / 1_000),
    }
}
