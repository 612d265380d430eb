//! End-to-end pipeline tests over the boundary scenarios: expand a time
//! period, aggregate a synthetic record stream, then run the movement
//! calculator over the result — the same sequence the orchestrator drives,
//! minus the store/cache/registry plumbing.

use chrono::{TimeZone, Utc};

use freight_movement_engine::aggregation::aggregate;
use freight_movement_engine::models::analysis::{MovementOutcome, PercentageChange, TrendDirection};
use freight_movement_engine::models::filter::AnalysisFilters;
use freight_movement_engine::models::freight_record::{DataQualityFlag, FreightRecord, TransportMode};
use freight_movement_engine::models::time_period::{Granularity, TimePeriod};
use freight_movement_engine::movement;
use freight_movement_engine::time_period::expand;

fn ymd(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn record(date: chrono::DateTime<Utc>, charge: &str, currency: &str) -> FreightRecord {
    FreightRecord {
        id: uuid::Uuid::new_v4().to_string(),
        record_date: date,
        origin_id: "LAX".into(),
        destination_id: "SHA".into(),
        carrier_id: "MAERSK".into(),
        transport_mode: TransportMode::Ocean,
        freight_charge: charge.parse().unwrap(),
        currency_code: currency.into(),
        service_level: None,
        additional_charges: Default::default(),
        source_system: "test".into(),
        data_quality_flag: DataQualityFlag::Verified,
    }
}

/// Scenario 1: seven days of a constant 1000 USD price yields a flat result.
#[test]
fn trivial_stable_week() {
    let period = TimePeriod {
        id: "tp1".into(),
        name: "week one".into(),
        start_date: ymd(2023, 1, 1),
        end_date: ymd(2023, 1, 8),
        granularity: Granularity::Daily,
        custom_interval_days: None,
        created_by: "u1".into(),
    };
    let buckets = expand(&period, 10_000).unwrap();
    assert_eq!(buckets.len(), 7);

    let records: Vec<FreightRecord> = (0..7)
        .map(|day| record(ymd(2023, 1, 1 + day) + chrono::Duration::hours(12), "1000.00", "USD"))
        .collect();

    let outcome = aggregate(records.into_iter(), &buckets, &AnalysisFilters::default()).unwrap();
    assert_eq!(outcome.partitions.len(), 1);
    let partition = &outcome.partitions[0];
    assert!(partition.buckets.iter().all(|b| b.record_count == 1));

    let MovementOutcome::Computed(summary) = movement::compute(&partition.buckets, 1.0) else {
        panic!("expected a computed movement summary");
    };
    assert_eq!(summary.start_value, "1000.00".parse().unwrap());
    assert_eq!(summary.end_value, "1000.00".parse().unwrap());
    assert_eq!(summary.absolute_change, rust_decimal::Decimal::ZERO);
    assert_eq!(summary.percentage_change, PercentageChange::Value(rust_decimal::Decimal::ZERO));
    assert_eq!(summary.trend_direction, TrendDirection::Stable);
}

/// Scenario 2: three monthly buckets each up 10% on the last yields a 21%
/// overall increase (1000 -> 1100 -> 1210) classified as INCREASING.
#[test]
fn monotonic_monthly_increase() {
    let period = TimePeriod {
        id: "tp2".into(),
        name: "q1".into(),
        start_date: ymd(2023, 1, 1),
        end_date: ymd(2023, 3, 31),
        granularity: Granularity::Monthly,
        custom_interval_days: None,
        created_by: "u1".into(),
    };
    let buckets = expand(&period, 10_000).unwrap();
    assert_eq!(buckets.len(), 3);

    let means = ["1000.00", "1100.00", "1210.00"];
    let records: Vec<FreightRecord> = buckets
        .iter()
        .zip(means.iter())
        .map(|(b, mean)| record(b.start + chrono::Duration::hours(1), mean, "USD"))
        .collect();

    let outcome = aggregate(records.into_iter(), &buckets, &AnalysisFilters::default()).unwrap();
    let partition = &outcome.partitions[0];

    let MovementOutcome::Computed(summary) = movement::compute(&partition.buckets, 1.0) else {
        panic!("expected a computed movement summary");
    };
    assert_eq!(summary.start_value, "1000.00".parse().unwrap());
    assert_eq!(summary.end_value, "1210.00".parse().unwrap());
    assert_eq!(summary.absolute_change, "210.00".parse().unwrap());
    assert_eq!(summary.percentage_change, PercentageChange::Value("21.000000".parse().unwrap()));
    assert_eq!(summary.trend_direction, TrendDirection::Increasing);
}

/// Scenario 5: a custom 5-day interval over a 14-day window truncates the
/// final bucket, and the movement calculator still spans the full series.
#[test]
fn custom_interval_with_truncated_last_bucket() {
    let period = TimePeriod {
        id: "tp5".into(),
        name: "custom".into(),
        start_date: ymd(2023, 1, 1),
        end_date: ymd(2023, 1, 15),
        granularity: Granularity::Custom,
        custom_interval_days: Some(5),
        created_by: "u1".into(),
    };
    let buckets = expand(&period, 10_000).unwrap();
    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[2].start, ymd(2023, 1, 11));
    assert_eq!(buckets[2].end, ymd(2023, 1, 15));

    let records = vec![
        record(ymd(2023, 1, 1) + chrono::Duration::hours(1), "500.00", "USD"),
        record(ymd(2023, 1, 6) + chrono::Duration::hours(1), "550.00", "USD"),
        record(ymd(2023, 1, 11) + chrono::Duration::hours(1), "600.00", "USD"),
    ];
    let outcome = aggregate(records.into_iter(), &buckets, &AnalysisFilters::default()).unwrap();
    let partition = &outcome.partitions[0];
    assert!(partition.buckets.iter().all(|b| b.record_count == 1));

    let MovementOutcome::Computed(summary) = movement::compute(&partition.buckets, 1.0) else {
        panic!("expected a computed movement summary");
    };
    assert_eq!(summary.start_value, "500.00".parse().unwrap());
    assert_eq!(summary.end_value, "600.00".parse().unwrap());
}

/// Scenario 4: mixed-currency records with no currency filter split into
/// independent partitions, each with its own movement summary.
#[test]
fn mixed_currency_partitions_move_independently() {
    let period = TimePeriod {
        id: "tp4".into(),
        name: "mixed".into(),
        start_date: ymd(2023, 1, 1),
        end_date: ymd(2023, 1, 3),
        granularity: Granularity::Daily,
        custom_interval_days: None,
        created_by: "u1".into(),
    };
    let buckets = expand(&period, 10_000).unwrap();

    let records = vec![
        record(ymd(2023, 1, 1) + chrono::Duration::hours(1), "100.00", "USD"),
        record(ymd(2023, 1, 2) + chrono::Duration::hours(1), "110.00", "USD"),
        record(ymd(2023, 1, 1) + chrono::Duration::hours(1), "200.00", "EUR"),
        record(ymd(2023, 1, 2) + chrono::Duration::hours(1), "190.00", "EUR"),
    ];
    let outcome = aggregate(records.into_iter(), &buckets, &AnalysisFilters::default()).unwrap();
    assert_eq!(outcome.partitions.len(), 2);
    assert!(outcome.mixed_currencies);

    for partition in &outcome.partitions {
        let MovementOutcome::Computed(summary) = movement::compute(&partition.buckets, 1.0) else {
            panic!("expected a computed movement summary for {}", partition.key.currency_code);
        };
        match partition.key.currency_code.as_str() {
            "USD" => assert_eq!(summary.trend_direction, TrendDirection::Increasing),
            "EUR" => assert_eq!(summary.trend_direction, TrendDirection::Decreasing),
            other => panic!("unexpected currency partition: {other}"),
        }
    }
}
