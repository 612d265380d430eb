//! C9 — Saved-Analysis Registry, plus persistence for time periods and
//! analysis results (spec §4.9, §6 "persisted state layout").
//!
//! Grounded on the teacher's `ConfigDb`: a `Mutex<Connection>` over SQLite,
//! idempotent `CREATE TABLE IF NOT EXISTS` migrations run at `open()`, and
//! one method per operation using `rusqlite::params!` + `query_map`.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{AnalysisError, EngineResult};
use crate::models::analysis::{AnalysisResult, AnalysisStatus, PercentageChange, TrendDirection};
use crate::models::filter::{AnalysisFilters, OutputFormat};
use crate::models::schedule::{AnalysisSchedule, ScheduleKind};
use crate::models::saved_analysis::SavedAnalysis;
use crate::models::time_period::{Granularity, TimePeriod};

pub struct RegistryDb {
    conn: Mutex<Connection>,
}

impl RegistryDb {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self { conn: Mutex::new(conn) };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn: Mutex::new(conn) };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn run_migrations(&self) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS time_periods (
                id                   TEXT PRIMARY KEY,
                name                 TEXT NOT NULL,
                start_date           TEXT NOT NULL,
                end_date             TEXT NOT NULL,
                granularity          TEXT NOT NULL,
                custom_interval_days INTEGER,
                created_by           TEXT NOT NULL,
                created_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );

            CREATE TABLE IF NOT EXISTS analysis_results (
                id                TEXT PRIMARY KEY,
                time_period_id    TEXT NOT NULL,
                parameters        TEXT NOT NULL,
                status            TEXT NOT NULL,
                start_value       TEXT,
                end_value         TEXT,
                absolute_change   TEXT,
                percentage_change TEXT,
                trend_direction   TEXT,
                currency_code     TEXT,
                output_format     TEXT NOT NULL,
                results           TEXT,
                error_message     TEXT,
                calculated_at     TEXT,
                is_cached         INTEGER NOT NULL DEFAULT 0,
                cache_expires_at  TEXT,
                created_by        TEXT NOT NULL,
                fingerprint       TEXT NOT NULL,
                created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                updated_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );
            CREATE INDEX IF NOT EXISTS idx_analysis_results_fingerprint ON analysis_results(fingerprint, status);

            CREATE TABLE IF NOT EXISTS saved_analyses (
                id                    TEXT PRIMARY KEY,
                name                  TEXT NOT NULL,
                description           TEXT NOT NULL DEFAULT '',
                time_period_id        TEXT,
                filters               TEXT NOT NULL,
                output_format         TEXT NOT NULL,
                include_visualization INTEGER NOT NULL DEFAULT 0,
                last_run_at           TEXT,
                created_by            TEXT NOT NULL,
                created_at            TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                UNIQUE(name, created_by)
            );

            CREATE TABLE IF NOT EXISTS analysis_schedules (
                id                TEXT PRIMARY KEY,
                name              TEXT NOT NULL,
                saved_analysis_id TEXT NOT NULL REFERENCES saved_analyses(id),
                schedule_kind     TEXT NOT NULL,
                schedule_spec     TEXT NOT NULL,
                is_active         INTEGER NOT NULL DEFAULT 1,
                last_run_at       TEXT,
                next_run_at       TEXT,
                created_by        TEXT NOT NULL,
                created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );
            CREATE INDEX IF NOT EXISTS idx_schedules_due ON analysis_schedules(is_active, next_run_at);
            ",
        )?;
        Ok(())
    }

    // ── Time periods ──

    pub fn create_time_period(&self, tp: &TimePeriod) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO time_periods (id, name, start_date, end_date, granularity, custom_interval_days, created_by) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                tp.id,
                tp.name,
                tp.start_date.to_rfc3339(),
                tp.end_date.to_rfc3339(),
                tp.granularity.as_str(),
                tp.custom_interval_days,
                tp.created_by,
            ],
        )?;
        Ok(())
    }

    pub fn get_time_period(&self, id: &str) -> EngineResult<Option<TimePeriod>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, start_date, end_date, granularity, custom_interval_days, created_by \
             FROM time_periods WHERE id = ?1",
        )?;
        stmt.query_row(params![id], row_to_time_period).optional().map_err(Into::into)
    }

    // ── Analysis results ──

    pub fn create_analysis_result(&self, r: &AnalysisResult) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO analysis_results \
             (id, time_period_id, parameters, status, start_value, end_value, absolute_change, \
              percentage_change, trend_direction, currency_code, output_format, results, \
              error_message, calculated_at, is_cached, cache_expires_at, created_by, fingerprint) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                r.id,
                r.time_period_id,
                r.parameters.to_string(),
                r.status.as_str(),
                r.start_value.map(|d| d.to_string()),
                r.end_value.map(|d| d.to_string()),
                r.absolute_change.map(|d| d.to_string()),
                r.percentage_change.map(|p| serde_json::to_string(&p).unwrap()),
                r.trend_direction.map(|t| t.as_str()),
                r.currency_code,
                r.output_format.as_str(),
                r.results.as_ref().map(|p| serde_json::to_string(p).unwrap()),
                r.error_message,
                r.calculated_at.map(|d| d.to_rfc3339()),
                r.is_cached as i64,
                r.cache_expires_at.map(|d| d.to_rfc3339()),
                r.created_by,
                r.fingerprint,
            ],
        )?;
        Ok(())
    }

    pub fn update_analysis_result(&self, r: &AnalysisResult) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE analysis_results SET \
             status = ?2, start_value = ?3, end_value = ?4, absolute_change = ?5, \
             percentage_change = ?6, trend_direction = ?7, currency_code = ?8, results = ?9, \
             error_message = ?10, calculated_at = ?11, is_cached = ?12, cache_expires_at = ?13, \
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') \
             WHERE id = ?1",
            params![
                r.id,
                r.status.as_str(),
                r.start_value.map(|d| d.to_string()),
                r.end_value.map(|d| d.to_string()),
                r.absolute_change.map(|d| d.to_string()),
                r.percentage_change.map(|p| serde_json::to_string(&p).unwrap()),
                r.trend_direction.map(|t| t.as_str()),
                r.currency_code,
                r.results.as_ref().map(|p| serde_json::to_string(p).unwrap()),
                r.error_message,
                r.calculated_at.map(|d| d.to_rfc3339()),
                r.is_cached as i64,
                r.cache_expires_at.map(|d| d.to_rfc3339()),
            ],
        )?;
        if count == 0 {
            return Err(AnalysisError::NotFound(format!("analysis_result {}", r.id)));
        }
        Ok(())
    }

    pub fn get_analysis_result(&self, id: &str) -> EngineResult<Option<AnalysisResult>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{ANALYSIS_RESULT_SELECT} WHERE id = ?1"))?;
        stmt.query_row(params![id], row_to_analysis_result)
            .optional()
            .map_err(Into::into)
    }

    /// Restart-time cache rehydration (spec §6: "index on `(fingerprint,
    /// status)`... recommended for cache hydration on restart"): the newest
    /// unexpired COMPLETED row for a fingerprint.
    pub fn find_ready_by_fingerprint(&self, fingerprint: &str, now: DateTime<Utc>) -> EngineResult<Option<AnalysisResult>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{ANALYSIS_RESULT_SELECT} WHERE fingerprint = ?1 AND status = 'COMPLETED' \
             AND cache_expires_at > ?2 ORDER BY calculated_at DESC LIMIT 1"
        ))?;
        stmt.query_row(params![fingerprint, now.to_rfc3339()], row_to_analysis_result)
            .optional()
            .map_err(Into::into)
    }

    // ── Saved analyses ──

    pub fn create_saved_analysis(&self, s: &SavedAnalysis) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO saved_analyses (id, name, description, time_period_id, filters, output_format, include_visualization, last_run_at, created_by) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                s.id,
                s.name,
                s.description,
                s.time_period_id,
                serde_json::to_string(&s.filters)?,
                s.output_format.as_str(),
                s.include_visualization as i64,
                s.last_run_at.map(|d| d.to_rfc3339()),
                s.created_by,
            ],
        )
        .map_err(|e| map_unique_violation(e, &s.name))?;
        Ok(())
    }

    pub fn get_saved_analysis(&self, id: &str) -> EngineResult<Option<SavedAnalysis>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{SAVED_ANALYSIS_SELECT} WHERE id = ?1"))?;
        stmt.query_row(params![id], row_to_saved_analysis)
            .optional()
            .map_err(Into::into)
    }

    pub fn list_saved_analyses(&self, created_by: &str) -> EngineResult<Vec<SavedAnalysis>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SAVED_ANALYSIS_SELECT} WHERE created_by = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![created_by], row_to_saved_analysis)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_saved_analysis(&self, s: &SavedAnalysis) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .execute(
                "UPDATE saved_analyses SET name = ?2, description = ?3, time_period_id = ?4, \
                 filters = ?5, output_format = ?6, include_visualization = ?7 WHERE id = ?1",
                params![
                    s.id,
                    s.name,
                    s.description,
                    s.time_period_id,
                    serde_json::to_string(&s.filters)?,
                    s.output_format.as_str(),
                    s.include_visualization as i64,
                ],
            )
            .map_err(|e| map_unique_violation(e, &s.name))?;
        if count == 0 {
            return Err(AnalysisError::NotFound(format!("saved_analysis {}", s.id)));
        }
        Ok(())
    }

    pub fn update_last_run_at(&self, id: &str, at: DateTime<Utc>) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE saved_analyses SET last_run_at = ?2 WHERE id = ?1",
            params![id, at.to_rfc3339()],
        )?;
        if count == 0 {
            return Err(AnalysisError::NotFound(format!("saved_analysis {id}")));
        }
        Ok(())
    }

    /// spec §4.9: refuse deletion while any schedule still references this
    /// saved analysis.
    pub fn delete_saved_analysis(&self, id: &str) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        let in_use: i64 = conn.query_row(
            "SELECT COUNT(*) FROM analysis_schedules WHERE saved_analysis_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if in_use > 0 {
            return Err(AnalysisError::InUse(format!(
                "saved_analysis {id} has {in_use} active schedule(s)"
            )));
        }
        let count = conn.execute("DELETE FROM saved_analyses WHERE id = ?1", params![id])?;
        if count == 0 {
            return Err(AnalysisError::NotFound(format!("saved_analysis {id}")));
        }
        Ok(())
    }

    // ── Schedules ──

    pub fn create_schedule(&self, s: &AnalysisSchedule) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO analysis_schedules (id, name, saved_analysis_id, schedule_kind, schedule_spec, is_active, last_run_at, next_run_at, created_by) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                s.id,
                s.name,
                s.saved_analysis_id,
                s.schedule_kind.as_str(),
                s.schedule_spec,
                s.is_active as i64,
                s.last_run_at.map(|d| d.to_rfc3339()),
                s.next_run_at.map(|d| d.to_rfc3339()),
                s.created_by,
            ],
        )?;
        Ok(())
    }

    pub fn get_schedule(&self, id: &str) -> EngineResult<Option<AnalysisSchedule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{SCHEDULE_SELECT} WHERE id = ?1"))?;
        stmt.query_row(params![id], row_to_schedule).optional().map_err(Into::into)
    }

    pub fn list_schedules(&self, created_by: &str) -> EngineResult<Vec<AnalysisSchedule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SCHEDULE_SELECT} WHERE created_by = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![created_by], row_to_schedule)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// spec §4.8: rows `is_active AND next_run_at <= now`, ordered by `next_run_at`.
    pub fn due_schedules(&self, now: DateTime<Utc>) -> EngineResult<Vec<AnalysisSchedule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SCHEDULE_SELECT} WHERE is_active = 1 AND next_run_at <= ?1 ORDER BY next_run_at ASC"
        ))?;
        let rows = stmt
            .query_map(params![now.to_rfc3339()], row_to_schedule)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_schedule(&self, s: &AnalysisSchedule) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE analysis_schedules SET name = ?2, schedule_kind = ?3, schedule_spec = ?4, \
             is_active = ?5, last_run_at = ?6, next_run_at = ?7 WHERE id = ?1",
            params![
                s.id,
                s.name,
                s.schedule_kind.as_str(),
                s.schedule_spec,
                s.is_active as i64,
                s.last_run_at.map(|d| d.to_rfc3339()),
                s.next_run_at.map(|d| d.to_rfc3339()),
            ],
        )?;
        if count == 0 {
            return Err(AnalysisError::NotFound(format!("analysis_schedule {}", s.id)));
        }
        Ok(())
    }

    pub fn deactivate_schedule(&self, id: &str) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE analysis_schedules SET is_active = 0 WHERE id = ?1",
            params![id],
        )?;
        if count == 0 {
            return Err(AnalysisError::NotFound(format!("analysis_schedule {id}")));
        }
        Ok(())
    }

    pub fn delete_schedule(&self, id: &str) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM analysis_schedules WHERE id = ?1", params![id])?;
        if count == 0 {
            return Err(AnalysisError::NotFound(format!("analysis_schedule {id}")));
        }
        Ok(())
    }
}

fn map_unique_violation(e: rusqlite::Error, name: &str) -> AnalysisError {
    if let rusqlite::Error::SqliteFailure(ref f, _) = e {
        if f.code == rusqlite::ErrorCode::ConstraintViolation {
            return AnalysisError::NameConflict(name.to_string());
        }
    }
    AnalysisError::from(e)
}

fn row_to_time_period(row: &rusqlite::Row) -> rusqlite::Result<TimePeriod> {
    let granularity: String = row.get(4)?;
    Ok(TimePeriod {
        id: row.get(0)?,
        name: row.get(1)?,
        start_date: parse_dt(row.get::<_, String>(2)?),
        end_date: parse_dt(row.get::<_, String>(3)?),
        granularity: Granularity::parse(&granularity).unwrap_or(Granularity::Daily),
        custom_interval_days: row.get(5)?,
        created_by: row.get(6)?,
    })
}

const ANALYSIS_RESULT_SELECT: &str = "SELECT id, time_period_id, parameters, status, start_value, end_value, \
     absolute_change, percentage_change, trend_direction, currency_code, output_format, results, \
     error_message, calculated_at, is_cached, cache_expires_at, created_by, fingerprint FROM analysis_results";

fn row_to_analysis_result(row: &rusqlite::Row) -> rusqlite::Result<AnalysisResult> {
    let status: String = row.get(3)?;
    let output_format: String = row.get(10)?;
    let percentage_change: Option<String> = row.get(7)?;
    let trend_direction: Option<String> = row.get(8)?;
    let results: Option<String> = row.get(11)?;
    Ok(AnalysisResult {
        id: row.get(0)?,
        time_period_id: row.get(1)?,
        parameters: serde_json::from_str(&row.get::<_, String>(2)?).unwrap_or(serde_json::Value::Null),
        status: AnalysisStatus::parse(&status).unwrap_or(AnalysisStatus::Failed),
        start_value: row.get::<_, Option<String>>(4)?.map(|s| s.parse().unwrap_or_default()),
        end_value: row.get::<_, Option<String>>(5)?.map(|s| s.parse().unwrap_or_default()),
        absolute_change: row.get::<_, Option<String>>(6)?.map(|s| s.parse().unwrap_or_default()),
        percentage_change: percentage_change.and_then(|s| serde_json::from_str::<PercentageChange>(&s).ok()),
        trend_direction: trend_direction.and_then(|s| parse_trend(&s)),
        currency_code: row.get(9)?,
        output_format: parse_output_format(&output_format),
        results: results.and_then(|s| serde_json::from_str(&s).ok()),
        error_message: row.get(12)?,
        calculated_at: row.get::<_, Option<String>>(13)?.map(parse_dt),
        is_cached: row.get::<_, i64>(14)? != 0,
        cache_expires_at: row.get::<_, Option<String>>(15)?.map(parse_dt),
        created_by: row.get(16)?,
        fingerprint: row.get(17)?,
    })
}

const SAVED_ANALYSIS_SELECT: &str = "SELECT id, name, description, time_period_id, filters, output_format, \
     include_visualization, last_run_at, created_by FROM saved_analyses";

fn row_to_saved_analysis(row: &rusqlite::Row) -> rusqlite::Result<SavedAnalysis> {
    let filters: String = row.get(4)?;
    let output_format: String = row.get(5)?;
    Ok(SavedAnalysis {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        time_period_id: row.get(3)?,
        filters: serde_json::from_str::<AnalysisFilters>(&filters).unwrap_or_default(),
        output_format: parse_output_format(&output_format),
        include_visualization: row.get::<_, i64>(6)? != 0,
        last_run_at: row.get::<_, Option<String>>(7)?.map(parse_dt),
        created_by: row.get(8)?,
    })
}

const SCHEDULE_SELECT: &str = "SELECT id, name, saved_analysis_id, schedule_kind, schedule_spec, is_active, \
     last_run_at, next_run_at, created_by FROM analysis_schedules";

fn row_to_schedule(row: &rusqlite::Row) -> rusqlite::Result<AnalysisSchedule> {
    let kind: String = row.get(3)?;
    Ok(AnalysisSchedule {
        id: row.get(0)?,
        name: row.get(1)?,
        saved_analysis_id: row.get(2)?,
        schedule_kind: ScheduleKind::parse(&kind).unwrap_or(ScheduleKind::Daily),
        schedule_spec: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        last_run_at: row.get::<_, Option<String>>(6)?.map(parse_dt),
        next_run_at: row.get::<_, Option<String>>(7)?.map(parse_dt),
        created_by: row.get(8)?,
    })
}

fn parse_dt(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_trend(s: &str) -> Option<TrendDirection> {
    match s {
        "INCREASING" => Some(TrendDirection::Increasing),
        "DECREASING" => Some(TrendDirection::Decreasing),
        "STABLE" => Some(TrendDirection::Stable),
        _ => None,
    }
}

fn parse_output_format(s: &str) -> OutputFormat {
    match s {
        "CSV" => OutputFormat::Csv,
        "TEXT" => OutputFormat::Text,
        _ => OutputFormat::Json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_time_period() -> TimePeriod {
        TimePeriod {
            id: "tp1".into(),
            name: "Q1".into(),
            start_date: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2023, 3, 31, 0, 0, 0).unwrap(),
            granularity: Granularity::Monthly,
            custom_interval_days: None,
            created_by: "u1".into(),
        }
    }

    fn sample_result(fingerprint: &str) -> AnalysisResult {
        AnalysisResult {
            id: "r1".into(),
            time_period_id: "tp1".into(),
            parameters: serde_json::json!({}),
            status: AnalysisStatus::Pending,
            start_value: None,
            end_value: None,
            absolute_change: None,
            percentage_change: None,
            trend_direction: None,
            currency_code: None,
            output_format: OutputFormat::Json,
            results: None,
            error_message: None,
            calculated_at: None,
            is_cached: false,
            cache_expires_at: None,
            created_by: "u1".into(),
            fingerprint: fingerprint.into(),
        }
    }

    #[test]
    fn round_trips_time_period() {
        let db = RegistryDb::open_in_memory().unwrap();
        db.create_time_period(&sample_time_period()).unwrap();
        let fetched = db.get_time_period("tp1").unwrap().unwrap();
        assert_eq!(fetched.name, "Q1");
        assert_eq!(fetched.granularity, Granularity::Monthly);
    }

    #[test]
    fn analysis_result_updates_persist() {
        let db = RegistryDb::open_in_memory().unwrap();
        db.create_time_period(&sample_time_period()).unwrap();
        let mut r = sample_result("fp1");
        db.create_analysis_result(&r).unwrap();

        r.status = AnalysisStatus::Completed;
        r.start_value = Some("100.00".parse().unwrap());
        r.end_value = Some("110.00".parse().unwrap());
        r.is_cached = false;
        db.update_analysis_result(&r).unwrap();

        let fetched = db.get_analysis_result("r1").unwrap().unwrap();
        assert_eq!(fetched.status, AnalysisStatus::Completed);
        assert_eq!(fetched.start_value, Some("100.00".parse().unwrap()));
    }

    #[test]
    fn saved_analysis_name_conflict_is_rejected() {
        let db = RegistryDb::open_in_memory().unwrap();
        let s = SavedAnalysis {
            id: "s1".into(),
            name: "weekly-ocean".into(),
            description: "".into(),
            time_period_id: None,
            filters: AnalysisFilters::default(),
            output_format: OutputFormat::Json,
            include_visualization: false,
            last_run_at: None,
            created_by: "u1".into(),
        };
        db.create_saved_analysis(&s).unwrap();
        let mut dup = s.clone();
        dup.id = "s2".into();
        assert!(matches!(
            db.create_saved_analysis(&dup),
            Err(AnalysisError::NameConflict(_))
        ));
    }

    #[test]
    fn deleting_saved_analysis_in_use_is_refused() {
        let db = RegistryDb::open_in_memory().unwrap();
        let s = SavedAnalysis {
            id: "s1".into(),
            name: "weekly-ocean".into(),
            description: "".into(),
            time_period_id: None,
            filters: AnalysisFilters::default(),
            output_format: OutputFormat::Json,
            include_visualization: false,
            last_run_at: None,
            created_by: "u1".into(),
        };
        db.create_saved_analysis(&s).unwrap();
        db.create_schedule(&AnalysisSchedule {
            id: "sch1".into(),
            name: "nightly".into(),
            saved_analysis_id: "s1".into(),
            schedule_kind: ScheduleKind::Daily,
            schedule_spec: String::new(),
            is_active: true,
            last_run_at: None,
            next_run_at: None,
            created_by: "u1".into(),
        })
        .unwrap();
        assert!(matches!(db.delete_saved_analysis("s1"), Err(AnalysisError::InUse(_))));
    }

    #[test]
    fn due_schedules_respects_next_run_at() {
        let db = RegistryDb::open_in_memory().unwrap();
        let s = SavedAnalysis {
            id: "s1".into(),
            name: "weekly-ocean".into(),
            description: "".into(),
            time_period_id: None,
            filters: AnalysisFilters::default(),
            output_format: OutputFormat::Json,
            include_visualization: false,
            last_run_at: None,
            created_by: "u1".into(),
        };
        db.create_saved_analysis(&s).unwrap();
        let now = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        db.create_schedule(&AnalysisSchedule {
            id: "sch1".into(),
            name: "nightly".into(),
            saved_analysis_id: "s1".into(),
            schedule_kind: ScheduleKind::Daily,
            schedule_spec: String::new(),
            is_active: true,
            last_run_at: Some(now - chrono::Duration::days(1)),
            next_run_at: Some(now - chrono::Duration::hours(1)),
            created_by: "u1".into(),
        })
        .unwrap();
        let due = db.due_schedules(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "sch1");
    }
}
