//! Schedule CRUD (spec §3, §4.8, §6): recurrence wrappers around saved analyses.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::models::schedule::{AnalysisSchedule, ScheduleKind};
use crate::scheduler::compute_next;
use crate::AppState;

use super::map_err;

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub name: String,
    pub saved_analysis_id: String,
    pub schedule_kind: String,
    #[serde(default)]
    pub schedule_spec: String,
    pub created_by: String,
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let schedule_kind = ScheduleKind::parse(&req.schedule_kind)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("unknown schedule_kind: {}", req.schedule_kind)))?;

    state
        .registry
        .get_saved_analysis(&req.saved_analysis_id)
        .map_err(map_err)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("saved analysis not found: {}", req.saved_analysis_id)))?;

    let now = chrono::Utc::now();
    let next_run_at = compute_next(schedule_kind, &req.schedule_spec, now).map_err(map_err)?;

    let schedule = AnalysisSchedule {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name,
        saved_analysis_id: req.saved_analysis_id,
        schedule_kind,
        schedule_spec: req.schedule_spec,
        is_active: true,
        last_run_at: None,
        next_run_at: Some(next_run_at),
        created_by: req.created_by,
    };
    schedule.validate().map_err(map_err)?;
    state.registry.create_schedule(&schedule).map_err(map_err)?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub created_by: String,
}

pub async fn list_schedules(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let items = state.registry.list_schedules(&q.created_by).map_err(map_err)?;
    Ok(Json(serde_json::json!({ "schedules": items })))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let schedule = state
        .registry
        .get_schedule(&id)
        .map_err(map_err)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("schedule not found: {id}")))?;
    Ok(Json(schedule))
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    pub name: String,
    pub schedule_kind: String,
    #[serde(default)]
    pub schedule_spec: String,
    pub is_active: bool,
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut schedule = state
        .registry
        .get_schedule(&id)
        .map_err(map_err)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("schedule not found: {id}")))?;

    let schedule_kind = ScheduleKind::parse(&req.schedule_kind)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("unknown schedule_kind: {}", req.schedule_kind)))?;

    schedule.name = req.name;
    schedule.schedule_kind = schedule_kind;
    schedule.schedule_spec = req.schedule_spec;
    schedule.is_active = req.is_active;
    schedule.next_run_at =
        Some(compute_next(schedule_kind, &schedule.schedule_spec, chrono::Utc::now()).map_err(map_err)?);
    schedule.validate().map_err(map_err)?;

    state.registry.update_schedule(&schedule).map_err(map_err)?;
    Ok(Json(schedule))
}

pub async fn deactivate_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.registry.deactivate_schedule(&id).map_err(map_err)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.registry.delete_schedule(&id).map_err(map_err)?;
    Ok(StatusCode::NO_CONTENT)
}
