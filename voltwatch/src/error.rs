//! Error types for the voltwatch analytics engine.

use thiserror::Error;

/// The main error type for all voltwatch operations.
#[derive(Error, Debug)]
pub enum VoltError {
    /// Error on the ingest path.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// Validation failure on the query path.
    #[error("query error: {0}")]
    Query(#[from] QueryError),
}

/// Errors that can occur while ingesting a reading (write path).
#[derive(Error, Debug)]
pub enum RecordError {
    /// A phase voltage is NaN or infinite.
    #[error("non-finite voltage {value} on {phase}")]
    NonFiniteVoltage {
        /// The phase label carrying the bad sample.
        phase: &'static str,
        /// The offending value.
        value: f64,
    },

    /// The reading timestamp is not a positive Unix-millisecond instant.
    #[error("invalid timestamp {timestamp_ms}")]
    InvalidTimestamp {
        /// The invalid timestamp.
        timestamp_ms: i64,
    },
}

/// Validation errors raised by the query facade (read path).
///
/// Each variant maps to a short wire token; the HTTP layer turns `NoData`
/// into 503 and everything else into 400. Queries never mutate state, so
/// none of these leave anything to clean up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// `from` is not strictly before `to`.
    #[error("invalid time range: from >= to")]
    InvalidRange,

    /// No reading has been ingested yet.
    #[error("no readings ingested yet")]
    NoData,

    /// Unknown anomaly type token.
    #[error("unknown anomaly type: {given}")]
    InvalidType {
        /// The rejected input.
        given: String,
    },

    /// Unknown phase label.
    #[error("unknown phase: {given}")]
    InvalidPhase {
        /// The rejected input.
        given: String,
    },

    /// Unknown history interval.
    #[error("unknown interval: {given}")]
    InvalidInterval {
        /// The rejected input.
        given: String,
    },
}

impl QueryError {
    /// Short machine-readable token for error envelopes.
    #[must_use]
    pub fn token(&self) -> &'static str {
        match self {
            QueryError::InvalidRange => "INVALID_RANGE",
            QueryError::NoData => "NO_DATA",
            QueryError::InvalidType { .. } => "INVALID_TYPE",
            QueryError::InvalidPhase { .. } => "INVALID_PHASE",
            QueryError::InvalidInterval { .. } => "INVALID_INTERVAL",
        }
    }
}

/// Type alias for `Result<T, VoltError>`.
pub type Result<T> = std::result::Result<T, VoltError>;
