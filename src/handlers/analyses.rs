//! Analysis lifecycle (spec §4.5, §6): run, fetch, cancel, and compare.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::comparison;
use crate::models::analysis::AnalysisRequest;
use crate::models::filter::{AnalysisFilters, OutputFormat};
use crate::AppState;

use super::map_err;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub time_period_id: String,
    #[serde(default)]
    pub filters: AnalysisFilters,
    #[serde(default = "default_output_format")]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub include_visualization: bool,
    pub user_id: String,
}

fn default_output_format() -> OutputFormat {
    OutputFormat::Json
}

impl From<AnalyzeRequest> for AnalysisRequest {
    fn from(r: AnalyzeRequest) -> Self {
        AnalysisRequest {
            time_period_id: r.time_period_id,
            filters: r.filters,
            output_format: r.output_format,
            include_visualization: r.include_visualization,
            user_id: r.user_id,
        }
    }
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let outcome = state.orchestrator.analyze(req.into()).await.map_err(map_err)?;
    Ok((StatusCode::OK, Json(outcome.result)))
}

pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let result = state
        .registry
        .get_analysis_result(&id)
        .map_err(map_err)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("analysis result not found: {id}")))?;
    Ok(Json(result))
}

pub async fn cancel_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.orchestrator.cancel(&id).map_err(map_err)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub base_time_period_id: String,
    pub comparison_time_period_id: String,
    #[serde(default)]
    pub filters: AnalysisFilters,
    #[serde(default = "default_output_format")]
    pub output_format: OutputFormat,
    pub user_id: String,
}

pub async fn compare(
    State(state): State<AppState>,
    Json(req): Json<CompareRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let base_request = AnalysisRequest {
        time_period_id: req.base_time_period_id,
        filters: req.filters.clone(),
        output_format: req.output_format,
        include_visualization: false,
        user_id: req.user_id.clone(),
    };
    let comparison_request = AnalysisRequest {
        time_period_id: req.comparison_time_period_id,
        filters: req.filters,
        output_format: req.output_format,
        include_visualization: false,
        user_id: req.user_id,
    };
    let report = comparison::compare(&state.orchestrator, base_request, comparison_request)
        .await
        .map_err(map_err)?;
    Ok(Json(report))
}
