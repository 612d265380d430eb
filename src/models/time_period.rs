//! `TimePeriod` (spec §3): a user-defined analysis window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Custom,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "DAILY",
            Granularity::Weekly => "WEEKLY",
            Granularity::Monthly => "MONTHLY",
            Granularity::Quarterly => "QUARTERLY",
            Granularity::Custom => "CUSTOM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Some(Granularity::Daily),
            "WEEKLY" => Some(Granularity::Weekly),
            "MONTHLY" => Some(Granularity::Monthly),
            "QUARTERLY" => Some(Granularity::Quarterly),
            "CUSTOM" => Some(Granularity::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimePeriod {
    pub id: String,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub granularity: Granularity,
    pub custom_interval_days: Option<u32>,
    pub created_by: String,
}

impl TimePeriod {
    /// spec §3 invariants: `start_date < end_date`; `custom_interval_days`
    /// set iff granularity is CUSTOM; the window spans at least one interval.
    pub fn validate(&self) -> Result<(), crate::error::AnalysisError> {
        use crate::error::AnalysisError;

        if self.start_date >= self.end_date {
            return Err(AnalysisError::InvalidPeriod(
                "start_date must be before end_date".to_string(),
            ));
        }
        match self.granularity {
            Granularity::Custom => {
                let days = self.custom_interval_days.ok_or_else(|| {
                    AnalysisError::InvalidPeriod(
                        "custom_interval_days is required when granularity is CUSTOM".to_string(),
                    )
                })?;
                if days == 0 {
                    return Err(AnalysisError::InvalidPeriod(
                        "custom_interval_days must be positive".to_string(),
                    ));
                }
                let span = self.end_date - self.start_date;
                if span < chrono::Duration::days(days as i64) {
                    return Err(AnalysisError::InvalidPeriod(
                        "window is shorter than one custom interval".to_string(),
                    ));
                }
            }
            _ => {
                if self.custom_interval_days.is_some() {
                    return Err(AnalysisError::InvalidPeriod(
                        "custom_interval_days may only be set when granularity is CUSTOM"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}
