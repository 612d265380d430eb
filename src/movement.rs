//! C4 — Movement Calculator (spec §4.4): turns a partition's per-bucket
//! statistics into a start/end comparison, trend classification, and
//! per-bucket deltas.

use rust_decimal::Decimal;

use crate::aggregation::PartitionBuckets;
use crate::models::analysis::{BucketDelta, BucketStats, MovementOutcome, MovementSummary, PercentageChange, TrendDirection};

/// Compute the movement summary for one partition's bucket series.
///
/// Only buckets with `record_count > 0` anchor the start/end values (spec
/// §4.4: empty buckets carry no observation). Fewer than two non-empty
/// buckets yields `InsufficientData`.
pub fn compute(buckets: &[BucketStats], trend_threshold_percent: f64) -> MovementOutcome {
    let non_empty: Vec<(usize, &BucketStats)> = buckets
        .iter()
        .enumerate()
        .filter(|(_, b)| !b.is_empty())
        .collect();

    if non_empty.len() < 2 {
        return MovementOutcome::InsufficientData;
    }

    let (_, first) = non_empty[0];
    let (_, last) = non_empty[non_empty.len() - 1];
    let start_value = first.mean.expect("non-empty bucket always has a mean");
    let end_value = last.mean.expect("non-empty bucket always has a mean");

    let absolute_change = end_value - start_value;
    let percentage_change = change_ratio(start_value, end_value);
    let trend_direction = classify(&percentage_change, trend_threshold_percent);

    let mut bucket_deltas = Vec::new();
    for window in non_empty.windows(2) {
        let (_, prev) = window[0];
        let (idx, cur) = window[1];
        let prev_value = prev.mean.expect("non-empty");
        let cur_value = cur.mean.expect("non-empty");
        bucket_deltas.push(BucketDelta {
            bucket_index: idx,
            absolute_change: cur_value - prev_value,
            percentage_change: change_ratio(prev_value, cur_value),
        });
    }

    MovementOutcome::Computed(MovementSummary {
        start_value,
        end_value,
        absolute_change,
        percentage_change,
        trend_direction,
        bucket_deltas,
    })
}

/// Weighted combination across partitions (spec §4.4: "multi-partition
/// weighted aggregate"), weighting each partition's bucket mean by its
/// record count, then running the same movement computation over the
/// combined series.
pub fn weighted_aggregate(partitions: &[PartitionBuckets], trend_threshold_percent: f64) -> MovementOutcome {
    let Some(bucket_count) = partitions.first().map(|p| p.buckets.len()) else {
        return MovementOutcome::InsufficientData;
    };

    let mut combined = Vec::with_capacity(bucket_count);
    for i in 0..bucket_count {
        let mut weighted_sum = Decimal::ZERO;
        let mut total_count: u64 = 0;
        let mut bucket_start = None;
        let mut bucket_end = None;
        for p in partitions {
            let b = &p.buckets[i];
            bucket_start.get_or_insert(b.bucket_start);
            bucket_end.get_or_insert(b.bucket_end);
            if let Some(mean) = b.mean {
                weighted_sum += mean * Decimal::from(b.record_count);
                total_count += b.record_count;
            }
        }
        combined.push(BucketStats {
            bucket_start: bucket_start.expect("at least one partition"),
            bucket_end: bucket_end.expect("at least one partition"),
            record_count: total_count,
            mean: (total_count > 0).then(|| weighted_sum / Decimal::from(total_count)),
            median: None,
            min: None,
            max: None,
            stddev: None,
        });
    }

    compute(&combined, trend_threshold_percent)
}

/// spec §4.4: `(end - start) / start`, with `NEW_PRICE`/`NEW_DISCOUNT`
/// sentinels when `start == 0` (division is undefined).
fn change_ratio(start: Decimal, end: Decimal) -> PercentageChange {
    if start.is_zero() {
        return match end.cmp(&start) {
            std::cmp::Ordering::Greater => PercentageChange::NewPrice,
            std::cmp::Ordering::Less => PercentageChange::NewDiscount,
            std::cmp::Ordering::Equal => PercentageChange::Value(Decimal::ZERO),
        };
    }
    let ratio = (end - start) / start * Decimal::ONE_HUNDRED;
    PercentageChange::Value(ratio.round_dp_with_strategy(6, rust_decimal::RoundingStrategy::MidpointNearestEven))
}

fn classify(change: &PercentageChange, threshold_percent: f64) -> TrendDirection {
    let threshold = Decimal::try_from(threshold_percent).unwrap_or(Decimal::ONE);
    match change {
        PercentageChange::NewPrice => TrendDirection::Increasing,
        PercentageChange::NewDiscount => TrendDirection::Decreasing,
        PercentageChange::Value(v) => {
            if *v > threshold {
                TrendDirection::Increasing
            } else if *v < -threshold {
                TrendDirection::Decreasing
            } else {
                TrendDirection::Stable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bucket(day: u32, count: u64, mean: &str) -> BucketStats {
        let d = Utc.with_ymd_and_hms(2023, 1, day, 0, 0, 0).unwrap();
        BucketStats {
            bucket_start: d,
            bucket_end: d + chrono::Duration::days(1),
            record_count: count,
            mean: (count > 0).then(|| mean.parse().unwrap()),
            median: None,
            min: None,
            max: None,
            stddev: None,
        }
    }

    #[test]
    fn fewer_than_two_non_empty_buckets_is_insufficient_data() {
        let buckets = vec![bucket(1, 1, "100.00"), bucket(2, 0, "0")];
        assert!(matches!(compute(&buckets, 1.0), MovementOutcome::InsufficientData));
    }

    #[test]
    fn monotonic_increase_classified_as_increasing() {
        let buckets = vec![bucket(1, 1, "100.00"), bucket(2, 1, "110.00")];
        let MovementOutcome::Computed(summary) = compute(&buckets, 1.0) else {
            panic!("expected computed");
        };
        assert_eq!(summary.trend_direction, TrendDirection::Increasing);
        assert_eq!(summary.percentage_change, PercentageChange::Value("10.000000".parse().unwrap()));
    }

    #[test]
    fn within_threshold_is_stable() {
        let buckets = vec![bucket(1, 1, "100.00"), bucket(2, 1, "100.50")];
        let MovementOutcome::Computed(summary) = compute(&buckets, 1.0) else {
            panic!("expected computed");
        };
        assert_eq!(summary.trend_direction, TrendDirection::Stable);
    }

    #[test]
    fn zero_start_with_positive_end_is_new_price() {
        let buckets = vec![bucket(1, 1, "0.00"), bucket(2, 1, "50.00")];
        let MovementOutcome::Computed(summary) = compute(&buckets, 1.0) else {
            panic!("expected computed");
        };
        assert_eq!(summary.percentage_change, PercentageChange::NewPrice);
        assert_eq!(summary.trend_direction, TrendDirection::Increasing);
    }

    #[test]
    fn zero_start_with_zero_end_yields_stable_zero_value() {
        let buckets = vec![bucket(1, 1, "0.00"), bucket(2, 1, "0.00")];
        let MovementOutcome::Computed(summary) = compute(&buckets, 1.0) else {
            panic!("expected computed");
        };
        assert_eq!(summary.percentage_change, PercentageChange::Value(Decimal::ZERO));
    }

    #[test]
    fn empty_interior_buckets_are_skipped_for_deltas() {
        let buckets = vec![bucket(1, 1, "100.00"), bucket(2, 0, "0"), bucket(3, 1, "120.00")];
        let MovementOutcome::Computed(summary) = compute(&buckets, 1.0) else {
            panic!("expected computed");
        };
        assert_eq!(summary.bucket_deltas.len(), 1);
        assert_eq!(summary.bucket_deltas[0].bucket_index, 2);
    }
}
