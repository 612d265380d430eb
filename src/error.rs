//! Closed error taxonomy for the analysis engine (spec §7).

use thiserror::Error;

/// Every error the engine's public API can surface.
///
/// Variants map 1:1 onto the error kinds listed in spec §7 so that an
/// `AnalysisResult.error_message` can be built directly from `{self}`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("time period is invalid: {0}")]
    InvalidPeriod(String),

    #[error("time period would expand to more than {max} buckets")]
    PeriodTooGranular { max: u32 },

    #[error("filter is invalid: {0}")]
    InvalidFilter(String),

    #[error("schedule spec is invalid: {0}")]
    InvalidScheduleSpec(String),

    #[error("insufficient data: fewer than two non-empty buckets")]
    InsufficientData,

    #[error("freight record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("result cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("an equivalent analysis is already in progress")]
    InProgressElsewhere,

    #[error("analysis was cancelled")]
    Cancelled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("name already in use: {0}")]
    NameConflict(String),

    #[error("in use: {0}")]
    InUse(String),

    #[error("result is not cancellable in its current state")]
    NotCancellable,

    #[error("caller does not own this lease")]
    NotOwner,

    #[error("internal error: {0}")]
    Internal(String),
}

/// How the orchestrator should react to an error (spec §4.5, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// User input error: short-circuit before any I/O, never retried.
    Fatal,
    /// Collaborator I/O error: retried with backoff, surfaced only on exhaustion.
    Retryable,
    /// Concurrency/cancellation signal: informational, not a failure.
    Transient,
}

impl AnalysisError {
    pub fn disposition(&self) -> ErrorDisposition {
        use AnalysisError::*;
        match self {
            InvalidPeriod(_)
            | PeriodTooGranular { .. }
            | InvalidFilter(_)
            | InvalidScheduleSpec(_)
            | InsufficientData
            | NotFound(_)
            | NameConflict(_)
            | InUse(_)
            | NotCancellable
            | NotOwner
            | Internal(_) => ErrorDisposition::Fatal,
            StoreUnavailable(_) | CacheUnavailable(_) => ErrorDisposition::Retryable,
            InProgressElsewhere | Cancelled => ErrorDisposition::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.disposition() == ErrorDisposition::Retryable
    }
}

impl From<rusqlite::Error> for AnalysisError {
    fn from(e: rusqlite::Error) -> Self {
        AnalysisError::Internal(format!("sqlite: {e}"))
    }
}

impl From<clickhouse::error::Error> for AnalysisError {
    fn from(e: clickhouse::error::Error) -> Self {
        AnalysisError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(e: serde_json::Error) -> Self {
        AnalysisError::Internal(format!("json: {e}"))
    }
}

/// Result alias for fallible engine operations. Named `EngineResult` to avoid
/// colliding with the domain model's `AnalysisResult` (the computed outcome).
pub type EngineResult<T> = std::result::Result<T, AnalysisError>;
