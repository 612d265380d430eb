//! `AnalysisSchedule` (spec §3): a recurrence wrapper around a `SavedAnalysis`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleKind {
    Daily,
    Weekly,
    Monthly,
    Cron,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Daily => "DAILY",
            ScheduleKind::Weekly => "WEEKLY",
            ScheduleKind::Monthly => "MONTHLY",
            ScheduleKind::Cron => "CRON",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DAILY" => Some(ScheduleKind::Daily),
            "WEEKLY" => Some(ScheduleKind::Weekly),
            "MONTHLY" => Some(ScheduleKind::Monthly),
            "CRON" => Some(ScheduleKind::Cron),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSchedule {
    pub id: String,
    pub name: String,
    pub saved_analysis_id: String,
    pub schedule_kind: ScheduleKind,
    /// Meaning depends on `schedule_kind` — ignored for DAILY/WEEKLY/MONTHLY,
    /// a five-field crontab expression for CRON (spec §3, §4.8).
    pub schedule_spec: String,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_by: String,
}

impl AnalysisSchedule {
    /// spec §3 invariant: `next_run_at` strictly after `last_run_at` when both set.
    pub fn validate(&self) -> Result<(), crate::error::AnalysisError> {
        if let (Some(last), Some(next)) = (self.last_run_at, self.next_run_at) {
            if next <= last {
                return Err(crate::error::AnalysisError::InvalidScheduleSpec(
                    "next_run_at must be strictly after last_run_at".to_string(),
                ));
            }
        }
        Ok(())
    }
}
