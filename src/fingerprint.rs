//! Fingerprint canonicalization (spec §4.6): a byte-stable hash over the
//! canonicalized inputs of an `AnalysisRequest`, used as the cache key.
//!
//! `serde_json::Map` in this crate is backed by a `BTreeMap` (the
//! `preserve_order` feature is not enabled), so object keys serialize in
//! lexicographic order automatically — satisfying the "keys sorted
//! lexicographically" rule without extra bookkeeping.

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use crate::models::analysis::AnalysisRequest;
use crate::models::filter::OutputFormat;
use crate::models::time_period::TimePeriod;

/// Bumped whenever the canonicalization rules below change in a way that
/// would alter the fingerprint for equivalent inputs.
const SCHEMA_VERSION: u8 = 1;

/// Build the canonical JSON document for a request (spec §4.6). `period` is
/// the resolved `TimePeriod` snapshot, not just its id, per spec §4.5 step 2
/// ("hash(parameters || time_period snapshot || output_format)").
pub fn canonicalize(request: &AnalysisRequest, period: &TimePeriod) -> Value {
    let mut filters = request.filters.clone();
    filters.canonicalize();

    let mut doc = Map::new();
    doc.insert("time_period_id".into(), json!(request.time_period_id));
    doc.insert(
        "period_start".into(),
        json!(period.start_date.to_rfc3339()),
    );
    doc.insert("period_end".into(), json!(period.end_date.to_rfc3339()));
    doc.insert(
        "granularity".into(),
        json!(period.granularity.as_str()),
    );
    if let Some(days) = period.custom_interval_days {
        doc.insert("custom_interval_days".into(), json!(days));
    }

    if !filters.origin_ids.is_empty() {
        doc.insert("origin_ids".into(), json!(filters.origin_ids));
    }
    if !filters.destination_ids.is_empty() {
        doc.insert("destination_ids".into(), json!(filters.destination_ids));
    }
    if !filters.carrier_ids.is_empty() {
        doc.insert("carrier_ids".into(), json!(filters.carrier_ids));
    }
    if !filters.transport_modes.is_empty() {
        doc.insert("transport_modes".into(), json!(filters.transport_modes));
    }
    if let Some(code) = &filters.currency_code {
        doc.insert("currency_code".into(), json!(code.to_ascii_uppercase()));
    }
    // `collapse_modes` default is `false` — default elision per spec §4.6.
    if filters.collapse_modes {
        doc.insert("collapse_modes".into(), json!(true));
    }
    if filters.include_weighted_aggregate {
        doc.insert("include_weighted_aggregate".into(), json!(true));
    }

    // `output_format` default is JSON — elided when equal to the default.
    if request.output_format != OutputFormat::Json {
        doc.insert(
            "output_format".into(),
            json!(request.output_format.as_str()),
        );
    }
    // `include_visualization` default is `false`.
    if request.include_visualization {
        doc.insert("include_visualization".into(), json!(true));
    }

    Value::Object(doc)
}

/// SHA-256 over the schema-version byte followed by the canonical JSON
/// document's compact serialization. Returns the lowercase hex digest.
pub fn fingerprint(request: &AnalysisRequest, period: &TimePeriod) -> String {
    let doc = canonicalize(request, period);
    let bytes = serde_json::to_vec(&doc).expect("canonical document is always serializable");

    let mut hasher = Sha256::new();
    hasher.update([SCHEMA_VERSION]);
    hasher.update(&bytes);
    let digest = hasher.finalize();
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").unwrap();
    }
    s
}
