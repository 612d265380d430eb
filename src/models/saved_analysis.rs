//! `SavedAnalysis` (spec §3): a named reusable analysis configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::analysis::AnalysisRequest;
use super::filter::{AnalysisFilters, OutputFormat};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAnalysis {
    pub id: String,
    pub name: String,
    pub description: String,
    pub time_period_id: Option<String>,
    pub filters: AnalysisFilters,
    pub output_format: OutputFormat,
    pub include_visualization: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_by: String,
}

impl SavedAnalysis {
    /// Produces a fresh `AnalysisRequest` on demand (spec §3).
    pub fn to_request(&self, time_period_id: String) -> AnalysisRequest {
        AnalysisRequest {
            time_period_id,
            filters: self.filters.clone(),
            output_format: self.output_format,
            include_visualization: self.include_visualization,
            user_id: self.created_by.clone(),
        }
    }
}
