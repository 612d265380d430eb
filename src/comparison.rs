//! C7 — Comparison Service (spec §4.7): runs the orchestrator over two time
//! periods with the same filters and reports the delta between them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, EngineResult};
use crate::models::analysis::{AnalysisRequest, AnalysisResult, BucketStats, PercentageChange};
use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub base_result_id: String,
    pub comparison_result_id: String,
    pub base_end_value: Option<Decimal>,
    pub comparison_end_value: Option<Decimal>,
    pub delta: Option<Decimal>,
    pub relative_delta: Option<PercentageChange>,
    /// spec §4.7: per-bucket comparison, aligned by ordinal position
    /// (k-th base bucket vs k-th comparison bucket).
    pub bucket_deltas: Vec<BucketComparisonDelta>,
    /// spec §4.7: set when the two periods expanded to a different number
    /// of buckets and the shorter series was right-padded to align them.
    pub length_mismatch: bool,
}

/// One ordinal bucket position compared across both legs (spec §4.7). Either
/// side is `None` when that leg's series ran out first (the right-padding
/// case), in which case no delta can be computed for that position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketComparisonDelta {
    pub bucket_index: usize,
    pub base_value: Option<Decimal>,
    pub comparison_value: Option<Decimal>,
    pub absolute_change: Option<Decimal>,
    pub percentage_change: Option<PercentageChange>,
}

/// spec §4.7: `compare(base_period, comparison_period, filters)`. Both legs
/// share `filters`; only `time_period_id` differs between the two requests.
/// Both legs run concurrently so a failure on either side is always
/// observed, per §4.7's "if either underlying analysis FAILED" contract.
pub async fn compare(
    orchestrator: &Orchestrator,
    base_request: AnalysisRequest,
    comparison_request: AnalysisRequest,
) -> EngineResult<ComparisonReport> {
    let (base, comparison) = tokio::join!(
        orchestrator.analyze(base_request),
        orchestrator.analyze(comparison_request),
    );

    aggregate_failure(
        base.as_ref().map(|_| ()).map_err(AnalysisError::clone),
        comparison.as_ref().map(|_| ()).map_err(AnalysisError::clone),
    )?;

    Ok(build_report(base.unwrap().result, comparison.unwrap().result))
}

/// spec §4.7: the representative bucket series for a leg is its first
/// partition's — a comparison over a mixed-currency/mode result already
/// carries `mixed_currencies`/`mixed_modes` flags upstream, so the first
/// partition stands in for "the" series the way the orchestrator's
/// single-partition top-level summary does.
fn leg_buckets(result: &AnalysisResult) -> &[BucketStats] {
    result
        .results
        .as_ref()
        .and_then(|payload| payload.partitions.first())
        .map(|partition| partition.buckets.as_slice())
        .unwrap_or(&[])
}

fn bucket_deltas(base: &[BucketStats], comparison: &[BucketStats]) -> Vec<BucketComparisonDelta> {
    let len = base.len().max(comparison.len());
    (0..len)
        .map(|i| {
            let base_value = base.get(i).and_then(|b| b.mean);
            let comparison_value = comparison.get(i).and_then(|b| b.mean);
            let (absolute_change, percentage_change) = match (base_value, comparison_value) {
                (Some(b), Some(c)) => (Some(b - c), Some(relative_delta(b, c))),
                _ => (None, None),
            };
            BucketComparisonDelta {
                bucket_index: i,
                base_value,
                comparison_value,
                absolute_change,
                percentage_change,
            }
        })
        .collect()
}

fn build_report(base: AnalysisResult, comparison: AnalysisResult) -> ComparisonReport {
    let base_buckets = leg_buckets(&base);
    let comparison_buckets = leg_buckets(&comparison);
    let length_mismatch = base_buckets.len() != comparison_buckets.len();
    let bucket_deltas = bucket_deltas(base_buckets, comparison_buckets);

    let delta = match (base.end_value, comparison.end_value) {
        (Some(b), Some(c)) => Some(b - c),
        _ => None,
    };
    let relative_delta = match (base.end_value, comparison.end_value) {
        (Some(b), Some(c)) => Some(relative_delta(b, c)),
        _ => None,
    };

    ComparisonReport {
        base_result_id: base.id,
        comparison_result_id: comparison.id,
        base_end_value: base.end_value,
        comparison_end_value: comparison.end_value,
        delta,
        relative_delta,
        bucket_deltas,
        length_mismatch,
    }
}

/// spec §4.7: "relative delta using the same division policy as §4.4" —
/// `comparison_end_value` plays the role of the start value.
fn relative_delta(base_end: Decimal, comparison_end: Decimal) -> PercentageChange {
    if comparison_end.is_zero() {
        return match base_end.cmp(&comparison_end) {
            std::cmp::Ordering::Greater => PercentageChange::NewPrice,
            std::cmp::Ordering::Less => PercentageChange::NewDiscount,
            std::cmp::Ordering::Equal => PercentageChange::Value(Decimal::ZERO),
        };
    }
    let ratio = (base_end - comparison_end) / comparison_end * Decimal::ONE_HUNDRED;
    PercentageChange::Value(ratio.round_dp_with_strategy(6, rust_decimal::RoundingStrategy::MidpointNearestEven))
}

/// Propagates whichever leg failed, per spec §4.7: "if either underlying
/// analysis FAILED, the comparison fails with the aggregated error."
pub fn aggregate_failure(base: EngineResult<()>, comparison: EngineResult<()>) -> EngineResult<()> {
    match (base, comparison) {
        (Err(b), Err(c)) => Err(AnalysisError::Internal(format!("both legs failed: {b}; {c}"))),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}
