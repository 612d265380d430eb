//! Typed analysis filters (spec §9 redesign flag: replace the dynamic
//! configuration dictionaries with a typed struct with optional fields,
//! refusing unknown keys at the boundary).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisFilters {
    #[serde(default)]
    pub origin_ids: Vec<String>,
    #[serde(default)]
    pub destination_ids: Vec<String>,
    #[serde(default)]
    pub carrier_ids: Vec<String>,
    #[serde(default)]
    pub transport_modes: Vec<String>,
    #[serde(default)]
    pub currency_code: Option<String>,
    /// When multiple transport modes are present and unfiltered, the
    /// aggregation engine partitions by mode unless this is set (spec §4.3).
    #[serde(default)]
    pub collapse_modes: bool,
    /// When set, §4.4's multi-partition weighted aggregate is computed.
    #[serde(default)]
    pub include_weighted_aggregate: bool,
}

impl AnalysisFilters {
    /// Canonicalize in place per spec §4.6: sort id arrays ascending, dedup,
    /// uppercase enum-like values.
    pub fn canonicalize(&mut self) {
        for v in [
            &mut self.origin_ids,
            &mut self.destination_ids,
            &mut self.carrier_ids,
        ] {
            v.sort();
            v.dedup();
        }
        for m in self.transport_modes.iter_mut() {
            *m = m.to_ascii_uppercase();
        }
        self.transport_modes.sort();
        self.transport_modes.dedup();
        if let Some(c) = self.currency_code.as_mut() {
            *c = c.to_ascii_uppercase();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Json,
    Csv,
    Text,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "JSON",
            OutputFormat::Csv => "CSV",
            OutputFormat::Text => "TEXT",
        }
    }
}
