//! # voltwatch
//!
//! In-memory voltage supply-quality analytics engine.
//!
//! voltwatch is a Rust library that turns a stream of three-phase voltage
//! readings from a smart-meter gateway into regulatory supply-quality
//! artifacts: per-reading envelope analysis, interruption and deviation
//! events with exact boundaries, fixed 10-minute RMS windows, and weekly
//! compliance verdicts against the ESO 95 % rule.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Bounded memory — readings, windows, and anomalies live in fixed-size
//!   rings that evict their eldest entries, so the process never grows no
//!   matter how long it runs
//! - Order-sensitive event detection with boundary-exact thresholds
//!   (inclusive [220, 240] V envelope, strict 180 s interruption rule)
//! - Synchronous, allocation-light push path; no background threads
//! - Injected time source, so weekly boundaries are deterministic in tests
//!
//! ## Quick Start
//!
//! ```rust
//! use voltwatch::{Reading, StateStore, Thresholds};
//!
//! let mut store = StateStore::new(Thresholds::default());
//!
//! // Feed readings as they arrive from the meter (timestamps in Unix ms).
//! let outcome = store.push(Reading::new(1_700_000_000_000, 231.2, 229.8, 230.4))?;
//! assert!(outcome.anomalies.is_empty());
//!
//! // Query state back at any point.
//! let latest = store.latest().expect("just pushed");
//! let stats = store.stats();
//! assert_eq!(stats.total_readings, 1);
//! # Ok::<(), voltwatch::VoltError>(())
//! ```
//!
//! ## Architecture
//!
//! A reading enters [`StateStore::push`], which appends it to the reading
//! ring, runs the per-phase [`anomaly`] state machines, and feeds the
//! [`window`] aggregator; completed windows and emitted events land in their
//! own rings. The [`facade`] module serves read queries over the store for
//! an HTTP layer to expose.
//!
//! ## Modules
//!
//! - [`config`] — threshold constants (envelope, windows, compliance)
//! - [`reading`] — readings, phases, pure per-reading analysis
//! - [`ring`] — bounded evict-oldest ring buffer
//! - [`window`] — fixed 10-minute RMS aggregation
//! - [`anomaly`] — interruption/deviation state machines
//! - [`compliance`] — weekly 95 % evaluation
//! - [`store`] — the coordinating state store
//! - [`facade`] — query parsing, defaults, response envelopes
//! - [`error`] — error types

pub mod anomaly;
pub mod compliance;
pub mod config;
pub mod error;
pub mod facade;
pub mod reading;
pub mod ring;
pub mod store;
pub mod window;

// Re-export primary API types at crate root for convenience.
pub use anomaly::{ActiveAnomaly, Anomaly, AnomalyKind, AnomalyTracker, Severity};
pub use compliance::WeeklyCompliance;
pub use config::Thresholds;
pub use error::{QueryError, RecordError, Result, VoltError};
pub use reading::{Phase, PhaseAnalysis, Reading};
pub use store::{AnomalyFilter, PushOutcome, StateStore, StoreStats};
pub use window::{RmsAggregator, RmsWindow};
