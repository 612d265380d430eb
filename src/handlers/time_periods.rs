//! Time period CRUD (spec §3, §6): the windows analyses run over.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::time_period::{Granularity, TimePeriod};
use crate::AppState;

use super::map_err;

#[derive(Debug, Deserialize)]
pub struct CreateTimePeriodRequest {
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub granularity: String,
    pub custom_interval_days: Option<u32>,
    pub created_by: String,
}

pub async fn create_time_period(
    State(state): State<AppState>,
    Json(req): Json<CreateTimePeriodRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let granularity = Granularity::parse(&req.granularity)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("unknown granularity: {}", req.granularity)))?;

    let period = TimePeriod {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name,
        start_date: req.start_date,
        end_date: req.end_date,
        granularity,
        custom_interval_days: req.custom_interval_days,
        created_by: req.created_by,
    };
    period.validate().map_err(map_err)?;
    state.registry.create_time_period(&period).map_err(map_err)?;
    Ok((StatusCode::CREATED, Json(period)))
}

pub async fn get_time_period(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let period = state
        .registry
        .get_time_period(&id)
        .map_err(map_err)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("time period not found: {id}")))?;
    Ok(Json(period))
}
