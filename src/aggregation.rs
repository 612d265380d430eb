//! C3 — Aggregation Engine (spec §4.3): partitions a freight record stream
//! by currency/mode and computes per-bucket statistics.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::{AnalysisError, EngineResult};
use crate::models::analysis::BucketStats;
use crate::models::filter::AnalysisFilters;
use crate::models::freight_record::FreightRecord;
use crate::time_period::Bucket;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartitionKey {
    pub currency_code: String,
    /// `None` when modes were collapsed (spec §4.3 `collapse_modes`).
    pub transport_mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PartitionBuckets {
    pub key: PartitionKey,
    pub buckets: Vec<BucketStats>,
}

#[derive(Debug, Clone)]
pub struct AggregationOutcome {
    pub partitions: Vec<PartitionBuckets>,
    pub mixed_currencies: bool,
    pub mixed_modes: bool,
}

/// Consume `records` once, assigning each into its bucket and partition, then
/// reduce every cell to a `BucketStats`. `buckets` must be the non-empty,
/// ascending, non-overlapping sequence produced by `time_period::expand`.
///
/// Records outside `[buckets[0].start, buckets.last().end)` or failing the
/// filters are dropped silently — filtering has already narrowed the stream
/// to the caller's intent by the time it reaches this function.
pub fn aggregate(
    records: impl Iterator<Item = FreightRecord>,
    buckets: &[Bucket],
    filters: &AnalysisFilters,
) -> EngineResult<AggregationOutcome> {
    if buckets.is_empty() {
        return Err(AnalysisError::Internal(
            "aggregate called with no buckets".into(),
        ));
    }

    let mut cells: BTreeMap<PartitionKey, Vec<Vec<Decimal>>> = BTreeMap::new();
    let mut currencies_seen = std::collections::BTreeSet::new();
    let mut modes_seen = std::collections::BTreeSet::new();

    for record in records {
        if !passes_filters(&record, filters) {
            continue;
        }
        let Some(bucket_idx) = bucket_index_of(buckets, record.record_date) else {
            continue;
        };

        currencies_seen.insert(record.currency_code.clone());
        modes_seen.insert(record.transport_mode.as_str());

        let key = PartitionKey {
            currency_code: record.currency_code.clone(),
            transport_mode: if filters.collapse_modes {
                None
            } else {
                Some(record.transport_mode.as_str().to_string())
            },
        };

        let cell = cells
            .entry(key)
            .or_insert_with(|| vec![Vec::new(); buckets.len()]);
        cell[bucket_idx].push(record.freight_charge);
    }

    let partitions = cells
        .into_iter()
        .map(|(key, cell)| {
            let stats = cell
                .into_iter()
                .enumerate()
                .map(|(i, values)| bucket_stats(buckets[i], &values))
                .collect();
            PartitionBuckets { key, buckets: stats }
        })
        .collect();

    Ok(AggregationOutcome {
        partitions,
        mixed_currencies: currencies_seen.len() > 1,
        mixed_modes: modes_seen.len() > 1,
    })
}

fn passes_filters(record: &FreightRecord, filters: &AnalysisFilters) -> bool {
    if !filters.origin_ids.is_empty() && !filters.origin_ids.contains(&record.origin_id) {
        return false;
    }
    if !filters.destination_ids.is_empty()
        && !filters.destination_ids.contains(&record.destination_id)
    {
        return false;
    }
    if !filters.carrier_ids.is_empty() && !filters.carrier_ids.contains(&record.carrier_id) {
        return false;
    }
    if !filters.transport_modes.is_empty()
        && !filters
            .transport_modes
            .iter()
            .any(|m| m == record.transport_mode.as_str())
    {
        return false;
    }
    if let Some(code) = &filters.currency_code {
        if !code.eq_ignore_ascii_case(&record.currency_code) {
            return false;
        }
    }
    true
}

/// Binary search for the bucket whose half-open range contains `at`.
fn bucket_index_of(buckets: &[Bucket], at: chrono::DateTime<chrono::Utc>) -> Option<usize> {
    if at < buckets[0].start || at >= buckets[buckets.len() - 1].end {
        return None;
    }
    let idx = buckets.partition_point(|b| b.end <= at);
    (idx < buckets.len() && buckets[idx].start <= at && at < buckets[idx].end).then_some(idx)
}

fn bucket_stats(bucket: Bucket, values: &[Decimal]) -> BucketStats {
    if values.is_empty() {
        return BucketStats {
            bucket_start: bucket.start,
            bucket_end: bucket.end,
            record_count: 0,
            mean: None,
            median: None,
            min: None,
            max: None,
            stddev: None,
        };
    }

    let count = values.len();
    let sum: Decimal = values.iter().sum();
    let mean = round6(sum / Decimal::from(count));

    let mut sorted = values.to_vec();
    sorted.sort();
    let median = if count % 2 == 1 {
        sorted[count / 2]
    } else {
        round6((sorted[count / 2 - 1] + sorted[count / 2]) / Decimal::from(2))
    };

    let min = *sorted.first().unwrap();
    let max = *sorted.last().unwrap();

    let stddev = if count == 1 {
        Decimal::ZERO
    } else {
        let variance: Decimal = values
            .iter()
            .map(|v| {
                let d = v - mean;
                d * d
            })
            .sum::<Decimal>()
            / Decimal::from(count);
        decimal_sqrt(variance)
    };

    BucketStats {
        bucket_start: bucket.start,
        bucket_end: bucket.end,
        record_count: count as u64,
        mean: Some(mean),
        median: Some(median),
        min: Some(min),
        max: Some(max),
        stddev: Some(round6(stddev)),
    }
}

fn round6(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(6, rust_decimal::RoundingStrategy::MidpointNearestEven)
}

/// `rust_decimal` has no native `sqrt`; round-trip through `f64` at the
/// precision the result is rounded to anyway (6 decimal places).
fn decimal_sqrt(d: Decimal) -> Decimal {
    let f = d.to_f64().unwrap_or(0.0).max(0.0).sqrt();
    Decimal::try_from(f).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::freight_record::{DataQualityFlag, TransportMode};
    use chrono::{TimeZone, Utc};

    fn rec(date: chrono::DateTime<chrono::Utc>, charge: &str, currency: &str, mode: TransportMode) -> FreightRecord {
        FreightRecord {
            id: uuid::Uuid::new_v4().to_string(),
            record_date: date,
            origin_id: "LAX".into(),
            destination_id: "SHA".into(),
            carrier_id: "MAERSK".into(),
            transport_mode: mode,
            freight_charge: charge.parse().unwrap(),
            currency_code: currency.into(),
            service_level: None,
            additional_charges: Default::default(),
            source_system: "test".into(),
            data_quality_flag: DataQualityFlag::Verified,
        }
    }

    fn buckets() -> Vec<Bucket> {
        let d = |day: u32| Utc.with_ymd_and_hms(2023, 1, day, 0, 0, 0).unwrap();
        vec![
            Bucket { start: d(1), end: d(2) },
            Bucket { start: d(2), end: d(3) },
            Bucket { start: d(3), end: d(4) },
        ]
    }

    #[test]
    fn assigns_records_to_correct_bucket_and_computes_stats() {
        let b = buckets();
        let d = |day: u32| Utc.with_ymd_and_hms(2023, 1, day, 6, 0, 0).unwrap();
        let records = vec![
            rec(d(1), "100.00", "USD", TransportMode::Ocean),
            rec(d(1), "200.00", "USD", TransportMode::Ocean),
            rec(d(2), "150.00", "USD", TransportMode::Ocean),
        ];
        let out = aggregate(records.into_iter(), &b, &AnalysisFilters::default()).unwrap();
        assert_eq!(out.partitions.len(), 1);
        let p = &out.partitions[0];
        assert_eq!(p.buckets[0].record_count, 2);
        assert_eq!(p.buckets[0].mean, Some("150.00".parse().unwrap()));
        assert_eq!(p.buckets[1].record_count, 1);
        assert_eq!(p.buckets[2].record_count, 0);
        assert!(p.buckets[2].is_empty());
    }

    #[test]
    fn partitions_by_currency_and_mode_separately() {
        let b = buckets();
        let d = Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap();
        let records = vec![
            rec(d, "100.00", "USD", TransportMode::Ocean),
            rec(d, "100.00", "EUR", TransportMode::Air),
        ];
        let out = aggregate(records.into_iter(), &b, &AnalysisFilters::default()).unwrap();
        assert_eq!(out.partitions.len(), 2);
        assert!(out.mixed_currencies);
        assert!(out.mixed_modes);
    }

    #[test]
    fn collapse_modes_merges_into_one_partition_per_currency() {
        let b = buckets();
        let d = Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap();
        let filters = AnalysisFilters {
            collapse_modes: true,
            ..Default::default()
        };
        let records = vec![
            rec(d, "100.00", "USD", TransportMode::Ocean),
            rec(d, "200.00", "USD", TransportMode::Air),
        ];
        let out = aggregate(records.into_iter(), &b, &filters).unwrap();
        assert_eq!(out.partitions.len(), 1);
        assert_eq!(out.partitions[0].key.transport_mode, None);
        assert_eq!(out.partitions[0].buckets[0].record_count, 2);
    }

    #[test]
    fn currency_filter_excludes_other_currencies() {
        let b = buckets();
        let d = Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap();
        let filters = AnalysisFilters {
            currency_code: Some("USD".into()),
            ..Default::default()
        };
        let records = vec![
            rec(d, "100.00", "USD", TransportMode::Ocean),
            rec(d, "100.00", "EUR", TransportMode::Ocean),
        ];
        let out = aggregate(records.into_iter(), &b, &filters).unwrap();
        assert_eq!(out.partitions.len(), 1);
        assert_eq!(out.partitions[0].key.currency_code, "USD");
    }

    #[test]
    fn records_outside_window_are_dropped() {
        let b = buckets();
        let records = vec![rec(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            "100.00",
            "USD",
            TransportMode::Ocean,
        )];
        let out = aggregate(records.into_iter(), &b, &AnalysisFilters::default()).unwrap();
        assert!(out.partitions.is_empty());
    }
}
