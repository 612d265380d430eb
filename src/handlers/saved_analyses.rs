//! Saved analysis CRUD (spec §3, §6): reusable named analysis configurations.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::models::filter::{AnalysisFilters, OutputFormat};
use crate::models::saved_analysis::SavedAnalysis;
use crate::AppState;

use super::map_err;

#[derive(Debug, Deserialize)]
pub struct CreateSavedAnalysisRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub time_period_id: Option<String>,
    #[serde(default)]
    pub filters: AnalysisFilters,
    pub output_format: OutputFormat,
    #[serde(default)]
    pub include_visualization: bool,
    pub created_by: String,
}

pub async fn create_saved_analysis(
    State(state): State<AppState>,
    Json(req): Json<CreateSavedAnalysisRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let saved = SavedAnalysis {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name,
        description: req.description,
        time_period_id: req.time_period_id,
        filters: req.filters,
        output_format: req.output_format,
        include_visualization: req.include_visualization,
        last_run_at: None,
        created_by: req.created_by,
    };
    state.registry.create_saved_analysis(&saved).map_err(map_err)?;
    Ok((StatusCode::CREATED, Json(saved)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub created_by: String,
}

pub async fn list_saved_analyses(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let items = state.registry.list_saved_analyses(&q.created_by).map_err(map_err)?;
    Ok(Json(serde_json::json!({ "saved_analyses": items })))
}

pub async fn get_saved_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let saved = state
        .registry
        .get_saved_analysis(&id)
        .map_err(map_err)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("saved analysis not found: {id}")))?;
    Ok(Json(saved))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSavedAnalysisRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub time_period_id: Option<String>,
    #[serde(default)]
    pub filters: AnalysisFilters,
    pub output_format: OutputFormat,
    #[serde(default)]
    pub include_visualization: bool,
}

pub async fn update_saved_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateSavedAnalysisRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut saved = state
        .registry
        .get_saved_analysis(&id)
        .map_err(map_err)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("saved analysis not found: {id}")))?;

    saved.name = req.name;
    saved.description = req.description;
    saved.time_period_id = req.time_period_id;
    saved.filters = req.filters;
    saved.output_format = req.output_format;
    saved.include_visualization = req.include_visualization;

    state.registry.update_saved_analysis(&saved).map_err(map_err)?;
    Ok(Json(saved))
}

pub async fn delete_saved_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.registry.delete_saved_analysis(&id).map_err(map_err)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn run_saved_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let saved = state
        .registry
        .get_saved_analysis(&id)
        .map_err(map_err)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("saved analysis not found: {id}")))?;
    let time_period_id = saved
        .time_period_id
        .clone()
        .ok_or_else(|| (StatusCode::UNPROCESSABLE_ENTITY, "saved analysis has no time_period_id".to_string()))?;

    let request = saved.to_request(time_period_id);
    let outcome = state.orchestrator.analyze(request).await.map_err(map_err)?;
    state
        .registry
        .update_last_run_at(&saved.id, outcome.result.calculated_at.unwrap_or_else(chrono::Utc::now))
        .map_err(map_err)?;
    Ok(Json(outcome.result))
}
