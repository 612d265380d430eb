//! `AnalysisRequest` / `AnalysisResult` and the computed payload shape
//! (spec §3, §4.10).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::filter::{AnalysisFilters, OutputFormat};

/// Logical inputs to an analysis (spec §3). Not persisted directly — its
/// canonicalized form and fingerprint are what get stored on the
/// `AnalysisResult` row.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub time_period_id: String,
    pub filters: AnalysisFilters,
    pub output_format: OutputFormat,
    pub include_visualization: bool,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "PENDING",
            AnalysisStatus::Processing => "PROCESSING",
            AnalysisStatus::Completed => "COMPLETED",
            AnalysisStatus::Failed => "FAILED",
            AnalysisStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AnalysisStatus::Pending),
            "PROCESSING" => Some(AnalysisStatus::Processing),
            "COMPLETED" => Some(AnalysisStatus::Completed),
            "FAILED" => Some(AnalysisStatus::Failed),
            "CANCELLED" => Some(AnalysisStatus::Cancelled),
            _ => None,
        }
    }

    /// spec §4.5: transitions are monotonic; no transition out of a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisStatus::Completed | AnalysisStatus::Failed | AnalysisStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "INCREASING",
            TrendDirection::Decreasing => "DECREASING",
            TrendDirection::Stable => "STABLE",
        }
    }
}

/// `percentage_change` per spec §4.4: either a decimal value, or one of the
/// two sentinels for a zero-valued start bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum PercentageChange {
    Value(Decimal),
    NewPrice,
    NewDiscount,
}

/// Outcome of running the movement calculator (C4) over one partition's
/// bucket series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementSummary {
    pub start_value: Decimal,
    pub end_value: Decimal,
    pub absolute_change: Decimal,
    pub percentage_change: PercentageChange,
    pub trend_direction: TrendDirection,
    /// Per-bucket deltas, index k holds the delta between bucket k-1 and k
    /// (spec §4.4: "for each bucket k>=1").
    pub bucket_deltas: Vec<BucketDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketDelta {
    pub bucket_index: usize,
    pub absolute_change: Decimal,
    pub percentage_change: PercentageChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
    pub record_count: u64,
    pub mean: Option<Decimal>,
    pub median: Option<Decimal>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub stddev: Option<Decimal>,
}

impl BucketStats {
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }
}

/// Whether C4 could compute a movement summary for a partition (spec §4.4:
/// fewer than two non-empty buckets is `INSUFFICIENT_DATA`, which is fatal
/// for the *request* as a whole — but in a multi-partition result only the
/// afflicted partition fails, so this is modeled per-partition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MovementOutcome {
    Computed(MovementSummary),
    InsufficientData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionResult {
    pub currency_code: String,
    /// `None` when modes were collapsed (spec §4.3 `collapse_modes`).
    pub transport_mode: Option<String>,
    pub buckets: Vec<BucketStats>,
    pub movement: MovementOutcome,
}

/// The structured contents of `AnalysisResult.results` (spec §3: "opaque
/// structured payload"). Fixed shape per DESIGN.md's Open Question
/// resolution #5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub partitions: Vec<PartitionResult>,
    pub mixed_currencies: bool,
    pub mixed_modes: bool,
    pub weighted_aggregate: Option<MovementSummary>,
}

/// The computed outcome of an analysis (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub time_period_id: String,
    pub parameters: serde_json::Value,
    pub status: AnalysisStatus,
    pub start_value: Option<Decimal>,
    pub end_value: Option<Decimal>,
    pub absolute_change: Option<Decimal>,
    pub percentage_change: Option<PercentageChange>,
    pub trend_direction: Option<TrendDirection>,
    pub currency_code: Option<String>,
    pub output_format: OutputFormat,
    pub results: Option<AnalysisPayload>,
    pub error_message: Option<String>,
    pub calculated_at: Option<DateTime<Utc>>,
    pub is_cached: bool,
    pub cache_expires_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub fingerprint: String,
}

impl AnalysisResult {
    /// spec §3 invariant: COMPLETED implies the core numeric fields and
    /// `results` are all present.
    pub fn check_completed_invariant(&self) -> bool {
        if self.status != AnalysisStatus::Completed {
            return true;
        }
        self.start_value.is_some()
            && self.end_value.is_some()
            && self.percentage_change.is_some()
            && self.trend_direction.is_some()
            && self.results.is_some()
    }

    /// spec §3 invariant: FAILED implies `error_message` is present.
    pub fn check_failed_invariant(&self) -> bool {
        self.status != AnalysisStatus::Failed || self.error_message.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_follow_state_machine() {
        assert!(AnalysisStatus::Pending.can_transition_to(AnalysisStatus::Processing));
        assert!(AnalysisStatus::Processing.can_transition_to(AnalysisStatus::Completed));
        assert!(AnalysisStatus::Processing.can_transition_to(AnalysisStatus::Failed));
        assert!(!AnalysisStatus::Pending.can_transition_to(AnalysisStatus::Completed));
        assert!(!AnalysisStatus::Completed.can_transition_to(AnalysisStatus::Processing));
        assert!(!AnalysisStatus::Failed.can_transition_to(AnalysisStatus::Pending));
    }

    #[test]
    fn terminal_states_never_transition() {
        for terminal in [
            AnalysisStatus::Completed,
            AnalysisStatus::Failed,
            AnalysisStatus::Cancelled,
        ] {
            for next in [
                AnalysisStatus::Pending,
                AnalysisStatus::Processing,
                AnalysisStatus::Completed,
                AnalysisStatus::Failed,
                AnalysisStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }
}
