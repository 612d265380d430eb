//! C8 — Schedule Executor (spec §4.8): a poll loop over due
//! `AnalysisSchedule` rows, dispatching each to a bounded worker pool.
//!
//! Grounded on the teacher's `alert_engine.rs`/`slo_engine.rs` background
//! engines: `tokio::spawn` an interval loop, fetch due rows, evaluate each.
//! The bounded worker pool (`tokio::sync::Semaphore`) is new — the teacher's
//! engines evaluate due rows sequentially in the same task; spec §4.8
//! explicitly calls for backpressure instead.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cron::Schedule as CronSchedule;
use tokio::sync::Semaphore;

use crate::clock::Clock;
use crate::db::RegistryDb;
use crate::error::{AnalysisError, EngineResult};
use crate::models::analysis::AnalysisRequest;
use crate::models::schedule::{AnalysisSchedule, ScheduleKind};
use crate::orchestrator::Orchestrator;
use crate::time_period::add_calendar_months;

pub struct ScheduleExecutor {
    registry: Arc<RegistryDb>,
    orchestrator: Arc<Orchestrator>,
    clock: Arc<dyn Clock>,
    worker_pool_size: usize,
}

impl ScheduleExecutor {
    pub fn new(
        registry: Arc<RegistryDb>,
        orchestrator: Arc<Orchestrator>,
        clock: Arc<dyn Clock>,
        worker_pool_size: usize,
    ) -> Self {
        Self { registry, orchestrator, clock, worker_pool_size }
    }

    /// Spawns the poll loop on the current Tokio runtime (spec §4.8: "a
    /// long-running loop that every `T_poll` queries due schedules").
    pub fn spawn(self: Arc<Self>, poll_interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }

    /// One pass over due schedules, dispatching each to the bounded pool
    /// without blocking on completion (spec §4.8 step 3).
    pub async fn poll_once(self: &Arc<Self>) {
        let now = self.clock.now_utc();
        let due = match self.registry.due_schedules(now) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "failed to list due schedules");
                return;
            }
        };
        if due.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.worker_pool_size));
        for schedule in due {
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                // Backpressure: leave `next_run_at` untouched so the schedule
                // is picked up again on the next poll (spec §4.8 step 3).
                Err(_) => {
                    tracing::debug!(schedule_id = %schedule.id, "worker pool full, deferring schedule");
                    continue;
                }
            };
            let executor = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                executor.run_due_schedule(schedule).await;
            });
        }
    }

    /// spec §4.8 steps 1, 2, 4 (step 3's dispatch already happened in the
    /// caller; this runs inside the acquired worker-pool slot).
    async fn run_due_schedule(&self, mut schedule: AnalysisSchedule) {
        let saved = match self.registry.get_saved_analysis(&schedule.saved_analysis_id) {
            Ok(Some(saved)) => saved,
            Ok(None) => {
                tracing::error!(
                    schedule_id = %schedule.id,
                    saved_analysis_id = %schedule.saved_analysis_id,
                    "saved analysis missing, skipping schedule run"
                );
                return;
            }
            Err(e) => {
                tracing::error!(schedule_id = %schedule.id, error = %e, "failed to load saved analysis");
                return;
            }
        };

        let Some(time_period_id) = saved.time_period_id.clone() else {
            tracing::error!(schedule_id = %schedule.id, "saved analysis has no time_period_id, skipping");
            return;
        };
        let request: AnalysisRequest = AnalysisRequest {
            time_period_id,
            filters: saved.filters.clone(),
            output_format: saved.output_format,
            include_visualization: saved.include_visualization,
            user_id: schedule.created_by.clone(),
        };

        let now = self.clock.now_utc();
        match self.orchestrator.analyze(request).await {
            Ok(_) => {
                if let Err(e) = self.registry.update_last_run_at(&saved.id, now) {
                    tracing::error!(saved_analysis_id = %saved.id, error = %e, "failed to update last_run_at");
                }
            }
            Err(e) => {
                tracing::warn!(schedule_id = %schedule.id, error = %e, "scheduled analysis run failed");
            }
        }

        schedule.last_run_at = Some(now);
        match compute_next(schedule.schedule_kind, &schedule.schedule_spec, now) {
            Ok(next) => {
                schedule.next_run_at = Some(next);
                if let Err(e) = self.registry.update_schedule(&schedule) {
                    tracing::error!(schedule_id = %schedule.id, error = %e, "failed to persist schedule run");
                }
            }
            Err(e) => {
                tracing::error!(schedule_id = %schedule.id, error = %e, "compute_next failed, deactivating schedule");
                if let Err(e2) = self.registry.deactivate_schedule(&schedule.id) {
                    tracing::error!(schedule_id = %schedule.id, error = %e2, "failed to deactivate schedule");
                }
            }
        }
    }
}

/// spec §4.8's `compute_next` contract, keyed by `schedule_kind`.
pub fn compute_next(kind: ScheduleKind, spec: &str, last_run_at: DateTime<Utc>) -> EngineResult<DateTime<Utc>> {
    match kind {
        ScheduleKind::Daily => Ok(last_run_at + ChronoDuration::hours(24)),
        ScheduleKind::Weekly => Ok(last_run_at + ChronoDuration::days(7)),
        ScheduleKind::Monthly => Ok(add_calendar_months(last_run_at, 1)),
        ScheduleKind::Cron => {
            // `schedule_spec` is the standard five-field crontab form (spec
            // §4.8); the `cron` crate additionally requires a leading
            // seconds field, which a schedule fired at minute granularity
            // always pins to zero.
            let with_seconds = format!("0 {spec}");
            let schedule = CronSchedule::from_str(&with_seconds)
                .map_err(|e| AnalysisError::InvalidScheduleSpec(format!("bad cron expression: {e}")))?;
            schedule
                .after(&last_run_at)
                .next()
                .ok_or_else(|| AnalysisError::InvalidScheduleSpec("cron expression has no future occurrence".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn daily_advances_24_hours() {
        let next = compute_next(ScheduleKind::Daily, "", ymd(2023, 1, 1)).unwrap();
        assert_eq!(next, ymd(2023, 1, 2));
    }

    #[test]
    fn daily_advances_24_hours_from_an_arbitrary_time_of_day() {
        let last_run_at = Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap();
        let next = compute_next(ScheduleKind::Daily, "ignored", last_run_at).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2023, 1, 2, 10, 0, 0).unwrap());
    }

    #[test]
    fn cron_hourly_fires_on_the_next_hour_boundary() {
        let last_run_at = Utc.with_ymd_and_hms(2023, 1, 1, 10, 15, 0).unwrap();
        let next = compute_next(ScheduleKind::Cron, "0 * * * *", last_run_at).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2023, 1, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn weekly_advances_7_days() {
        let next = compute_next(ScheduleKind::Weekly, "", ymd(2023, 1, 1)).unwrap();
        assert_eq!(next, ymd(2023, 1, 8));
    }

    #[test]
    fn monthly_clamps_day_of_month() {
        let next = compute_next(ScheduleKind::Monthly, "", ymd(2023, 1, 31)).unwrap();
        assert_eq!(next, ymd(2023, 2, 28));
    }

    #[test]
    fn cron_finds_next_matching_instant() {
        // Every day at 03:00.
        let next = compute_next(ScheduleKind::Cron, "0 3 * * *", ymd(2023, 1, 1)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2023, 1, 1, 3, 0, 0).unwrap());
    }

    #[test]
    fn invalid_cron_spec_is_rejected() {
        let result = compute_next(ScheduleKind::Cron, "not a cron expr", ymd(2023, 1, 1));
        assert!(matches!(result, Err(AnalysisError::InvalidScheduleSpec(_))));
    }
}
