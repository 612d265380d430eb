//! C1 — Freight Record Store (spec §4.1): a streaming, read-only view over
//! `freight_records` in ClickHouse.
//!
//! Grounded on the teacher's query-building style (`query_builder.rs`):
//! hand-assembled SQL with manual value escaping, rather than bound
//! parameters, plus the `#[derive(clickhouse::Row)]` + `.fetch::<T>()`
//! cursor pattern used throughout `handlers/query.rs` and `anomaly_engine.rs`.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clickhouse::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{AnalysisError, EngineResult};
use crate::models::filter::AnalysisFilters;
use crate::models::freight_record::{DataQualityFlag, FreightRecord, TransportMode};

#[derive(Debug, Clone, clickhouse::Row, Deserialize)]
struct FreightRecordRow {
    id: String,
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    record_date: DateTime<Utc>,
    origin_id: String,
    destination_id: String,
    carrier_id: String,
    transport_mode: String,
    freight_charge: String,
    currency_code: String,
    service_level: String,
    additional_charges: String,
    source_system: String,
    data_quality_flag: String,
}

fn row_to_record(row: FreightRecordRow) -> Option<FreightRecord> {
    let transport_mode = TransportMode::parse(&row.transport_mode).or_else(|| {
        tracing::warn!(record_id = %row.id, mode = %row.transport_mode, "dropping record with unrecognized transport_mode");
        None
    })?;
    let data_quality_flag = match row.data_quality_flag.as_str() {
        "VERIFIED" => DataQualityFlag::Verified,
        "ESTIMATED" => DataQualityFlag::Estimated,
        "FLAGGED" => DataQualityFlag::Flagged,
        other => {
            tracing::warn!(record_id = %row.id, flag = %other, "dropping record with unrecognized data_quality_flag");
            return None;
        }
    };
    let freight_charge = match Decimal::from_str(&row.freight_charge) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(record_id = %row.id, error = %e, "dropping record with unparseable freight_charge");
            return None;
        }
    };
    let additional_charges: BTreeMap<String, Decimal> = if row.additional_charges.is_empty() {
        BTreeMap::new()
    } else {
        match serde_json::from_str(&row.additional_charges) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(record_id = %row.id, error = %e, "dropping record with unparseable additional_charges");
                return None;
            }
        }
    };

    Some(FreightRecord {
        id: row.id,
        record_date: row.record_date,
        origin_id: row.origin_id,
        destination_id: row.destination_id,
        carrier_id: row.carrier_id,
        transport_mode,
        freight_charge,
        currency_code: row.currency_code,
        service_level: (!row.service_level.is_empty()).then_some(row.service_level),
        additional_charges,
        source_system: row.source_system,
        data_quality_flag,
    })
}

/// A bounded-size window onto the result of one `query` call. Each
/// `next_batch` call advances the underlying ClickHouse cursor by at most
/// `batch_size` rows, giving callers a checkpoint to observe cancellation
/// between batches (spec §5).
pub struct RecordCursor {
    inner: clickhouse::query::RowCursor<FreightRecordRow>,
    batch_size: usize,
}

impl RecordCursor {
    /// Returns an empty `Vec` exactly when the cursor is exhausted.
    pub async fn next_batch(&mut self) -> EngineResult<Vec<FreightRecord>> {
        let mut batch = Vec::with_capacity(self.batch_size);
        for _ in 0..self.batch_size {
            match self.inner.next().await {
                Ok(Some(row)) => {
                    if let Some(record) = row_to_record(row) {
                        batch.push(record);
                    }
                }
                Ok(None) => break,
                Err(e) => return Err(AnalysisError::StoreUnavailable(e.to_string())),
            }
        }
        Ok(batch)
    }
}

pub struct RecordStore {
    client: Client,
    batch_size: usize,
}

impl RecordStore {
    pub fn new(client: Client, batch_size: usize) -> Self {
        Self { client, batch_size }
    }

    /// spec §4.1: fetch all non-deleted records in `[start, end]` matching
    /// every supplied filter, ordered by `record_date` then `id` ascending.
    pub fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &AnalysisFilters,
    ) -> EngineResult<RecordCursor> {
        let sql = build_query(start, end, filters)?;
        let inner = self
            .client
            .query(&sql)
            .fetch::<FreightRecordRow>()
            .map_err(|e| AnalysisError::StoreUnavailable(e.to_string()))?;
        Ok(RecordCursor { inner, batch_size: self.batch_size })
    }
}

fn build_query(start: DateTime<Utc>, end: DateTime<Utc>, filters: &AnalysisFilters) -> EngineResult<String> {
    let mut conditions = vec![
        "deleted_at IS NULL".to_string(),
        format!(
            "record_date >= parseDateTimeBestEffort('{}')",
            start.to_rfc3339()
        ),
        format!(
            "record_date <= parseDateTimeBestEffort('{}')",
            end.to_rfc3339()
        ),
    ];

    push_in_clause(&mut conditions, "origin_id", &filters.origin_ids)?;
    push_in_clause(&mut conditions, "destination_id", &filters.destination_ids)?;
    push_in_clause(&mut conditions, "carrier_id", &filters.carrier_ids)?;
    push_in_clause(&mut conditions, "transport_mode", &filters.transport_modes)?;

    if let Some(code) = &filters.currency_code {
        conditions.push(format!("currency_code = '{}'", escape(code)));
    }

    Ok(format!(
        "SELECT id, record_date, origin_id, destination_id, carrier_id, transport_mode, \
         toString(freight_charge) AS freight_charge, currency_code, service_level, \
         additional_charges, source_system, data_quality_flag \
         FROM freight_records WHERE {} ORDER BY record_date ASC, id ASC",
        conditions.join(" AND ")
    ))
}

fn push_in_clause(conditions: &mut Vec<String>, column: &str, values: &[String]) -> EngineResult<()> {
    if values.is_empty() {
        return Ok(());
    }
    for v in values {
        if v.is_empty() {
            return Err(AnalysisError::InvalidFilter(format!(
                "{column} filter contains an empty value"
            )));
        }
    }
    let list = values
        .iter()
        .map(|v| format!("'{}'", escape(v)))
        .collect::<Vec<_>>()
        .join(", ");
    conditions.push(format!("{column} IN ({list})"));
    Ok(())
}

fn escape(s: &str) -> String {
    s.replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn query_rejects_empty_filter_value() {
        let filters = AnalysisFilters {
            origin_ids: vec![String::new()],
            ..Default::default()
        };
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        assert!(matches!(
            build_query(start, end, &filters),
            Err(AnalysisError::InvalidFilter(_))
        ));
    }

    #[test]
    fn query_includes_all_supplied_filters() {
        let filters = AnalysisFilters {
            origin_ids: vec!["LAX".into()],
            currency_code: Some("USD".into()),
            ..Default::default()
        };
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let sql = build_query(start, end, &filters).unwrap();
        assert!(sql.contains("origin_id IN ('LAX')"));
        assert!(sql.contains("currency_code = 'USD'"));
        assert!(sql.contains("ORDER BY record_date ASC, id ASC"));
    }

    #[test]
    fn query_escapes_single_quotes() {
        let filters = AnalysisFilters {
            origin_ids: vec!["O'Hare".into()],
            ..Default::default()
        };
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let sql = build_query(start, end, &filters).unwrap();
        assert!(sql.contains("O\\'Hare"));
    }
}
