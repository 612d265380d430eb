pub mod analyses;
pub mod health;
pub mod saved_analyses;
pub mod schedules;
pub mod time_periods;

use axum::http::StatusCode;

use crate::error::AnalysisError;

/// Maps the closed error taxonomy (spec §7) onto HTTP status codes.
pub fn map_err(e: AnalysisError) -> (StatusCode, String) {
    use AnalysisError::*;
    let status = match &e {
        InvalidPeriod(_) | PeriodTooGranular { .. } | InvalidFilter(_) | InvalidScheduleSpec(_) => {
            StatusCode::BAD_REQUEST
        }
        InsufficientData => StatusCode::UNPROCESSABLE_ENTITY,
        NotFound(_) => StatusCode::NOT_FOUND,
        NameConflict(_) => StatusCode::CONFLICT,
        InUse(_) => StatusCode::CONFLICT,
        NotCancellable => StatusCode::CONFLICT,
        NotOwner => StatusCode::CONFLICT,
        InProgressElsewhere => StatusCode::ACCEPTED,
        Cancelled => StatusCode::OK,
        StoreUnavailable(_) | CacheUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}
