//! C6 — Analysis Orchestrator (spec §4.5): the `analyze()` state machine
//! tying together the time-period resolver, record store, aggregation
//! engine, movement calculator, result cache, and registry.
//!
//! Grounded on the teacher's engine-loop shape (`alert_engine.rs::eval_alerts`):
//! fetch-or-skip-on-error, a retry/backoff wrapper around the collaborator
//! I/O call, and a state transition persisted before and after the work.

use std::sync::Arc;
use std::time::Duration;

use crate::aggregation::{self, AggregationOutcome, PartitionBuckets};
use crate::cache::{ClaimOutcome, ResultCache};
use crate::clock::Clock;
use crate::config::{CacheConfig, OrchestratorConfig, PeriodConfig};
use crate::db::RegistryDb;
use crate::error::{AnalysisError, EngineResult, ErrorDisposition};
use crate::fingerprint;
use crate::models::analysis::{
    AnalysisPayload, AnalysisRequest, AnalysisResult, AnalysisStatus, MovementOutcome,
    PartitionResult,
};
use crate::models::filter::AnalysisFilters;
use crate::record_store::RecordStore;
use crate::time_period;

pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub from_cache: bool,
}

pub struct Orchestrator {
    registry: Arc<RegistryDb>,
    store: Arc<RecordStore>,
    cache: Arc<ResultCache>,
    clock: Arc<dyn Clock>,
    orchestrator_config: OrchestratorConfig,
    cache_config: CacheConfig,
    period_config: PeriodConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<RegistryDb>,
        store: Arc<RecordStore>,
        cache: Arc<ResultCache>,
        clock: Arc<dyn Clock>,
        orchestrator_config: OrchestratorConfig,
        cache_config: CacheConfig,
        period_config: PeriodConfig,
    ) -> Self {
        Self {
            registry,
            store,
            cache,
            clock,
            orchestrator_config,
            cache_config,
            period_config,
        }
    }

    /// spec §4.5 steps 1-10.
    pub async fn analyze(&self, request: AnalysisRequest) -> EngineResult<AnalysisOutcome> {
        let period = self
            .registry
            .get_time_period(&request.time_period_id)?
            .ok_or_else(|| AnalysisError::NotFound(format!("time_period {}", request.time_period_id)))?;
        period.validate()?;

        let mut canonical_filters = request.filters.clone();
        canonical_filters.canonicalize();
        let fp = fingerprint::fingerprint(&request, &period);

        if let Some(result_id) = self.cache.lookup_ready(&fp) {
            if let Some(mut result) = self.registry.get_analysis_result(&result_id)? {
                result.is_cached = true;
                return Ok(AnalysisOutcome { result, from_cache: true });
            }
        }

        let owner = uuid::Uuid::new_v4().to_string();
        let lease_duration = Duration::from_secs(self.cache_config.lease_duration_secs);
        let wait_timeout = Duration::from_secs(self.cache_config.wait_timeout_secs);

        if let Some(result) = self.claim_or_wait(&fp, &owner, lease_duration, wait_timeout).await? {
            return Ok(AnalysisOutcome { result, from_cache: true });
        }

        let result_id = uuid::Uuid::new_v4().to_string();
        let mut result = AnalysisResult {
            id: result_id.clone(),
            time_period_id: request.time_period_id.clone(),
            parameters: fingerprint::canonicalize(&request, &period),
            status: AnalysisStatus::Pending,
            start_value: None,
            end_value: None,
            absolute_change: None,
            percentage_change: None,
            trend_direction: None,
            currency_code: None,
            output_format: request.output_format,
            results: None,
            error_message: None,
            calculated_at: None,
            is_cached: false,
            cache_expires_at: None,
            created_by: request.user_id.clone(),
            fingerprint: fp.clone(),
        };
        self.registry.create_analysis_result(&result)?;

        result.status = AnalysisStatus::Processing;
        self.registry.update_analysis_result(&result)?;

        let outcome = self
            .run_with_retry(&result_id, &period, &canonical_filters)
            .await;

        match outcome {
            Ok(payload) => {
                apply_payload(
                    &mut result,
                    payload,
                    self.clock.now_utc(),
                    self.cache_config.result_ttl_secs,
                );
                result.status = AnalysisStatus::Completed;
                self.registry.update_analysis_result(&result)?;
                self.cache.publish_ready(
                    &fp,
                    &result_id,
                    Duration::from_secs(self.cache_config.result_ttl_secs),
                );
                self.cache.release(&fp, &owner);
                Ok(AnalysisOutcome { result, from_cache: false })
            }
            Err(AnalysisError::Cancelled) => {
                result.status = AnalysisStatus::Cancelled;
                self.registry.update_analysis_result(&result)?;
                self.cache.release(&fp, &owner);
                Err(AnalysisError::Cancelled)
            }
            Err(e) => {
                result.status = AnalysisStatus::Failed;
                result.error_message = Some(e.to_string());
                self.registry.update_analysis_result(&result)?;
                self.cache.release(&fp, &owner);
                Err(e)
            }
        }
    }

    /// Claim the in-flight lease, or wait with exponential backoff while
    /// another worker holds it. Returns `Some(result)` if a READY entry
    /// appears while waiting or is already present; `None` once the lease
    /// is claimed by this caller.
    async fn claim_or_wait(
        &self,
        fp: &str,
        owner: &str,
        lease_duration: Duration,
        wait_timeout: Duration,
    ) -> EngineResult<Option<AnalysisResult>> {
        let deadline = self.clock.monotonic() + wait_timeout;
        let mut attempt: u32 = 0;
        loop {
            match self.cache.try_claim(fp, owner, lease_duration) {
                ClaimOutcome::Claimed => return Ok(None),
                ClaimOutcome::ReadyNow(result_id) => {
                    return Ok(self.registry.get_analysis_result(&result_id)?.map(|mut result| {
                        result.is_cached = true;
                        result
                    }));
                }
                ClaimOutcome::HeldByOther { .. } => {
                    if self.clock.monotonic() >= deadline {
                        return Err(AnalysisError::InProgressElsewhere);
                    }
                    let delay = backoff_delay(attempt, Duration::from_millis(50));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// spec §4.5 steps 6-9: expand/fetch/aggregate/compute, retrying the
    /// collaborator I/O (record fetch) on retryable failure and failing
    /// immediately on a fatal error.
    async fn run_with_retry(
        &self,
        result_id: &str,
        period: &crate::models::time_period::TimePeriod,
        filters: &AnalysisFilters,
    ) -> EngineResult<AnalysisPayload> {
        let buckets = time_period::expand(period, self.period_config.max_buckets)?;

        let mut attempt: u32 = 0;
        loop {
            self.check_cancelled(result_id)?;
            match self.fetch_and_aggregate(result_id, &buckets, filters).await {
                Ok(outcome) => return build_payload(outcome, filters, self.orchestrator_config.trend_threshold_percent),
                Err(e) if e.disposition() == ErrorDisposition::Retryable => {
                    if attempt >= self.orchestrator_config.retry_attempts {
                        return Err(e);
                    }
                    let delay = backoff_delay(
                        attempt,
                        Duration::from_secs(self.orchestrator_config.retry_base_secs),
                    );
                    tracing::warn!(
                        result_id,
                        attempt,
                        error = %e,
                        "retrying analysis after retryable failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_and_aggregate(
        &self,
        result_id: &str,
        buckets: &[time_period::Bucket],
        filters: &AnalysisFilters,
    ) -> EngineResult<AggregationOutcome> {
        let start = buckets.first().expect("non-empty bucket sequence").start;
        let end = buckets.last().expect("non-empty bucket sequence").end;

        let mut cursor = self.store.query(start, end, filters)?;
        let mut records = Vec::new();
        loop {
            self.check_cancelled(result_id)?;
            let batch = cursor.next_batch().await?;
            if batch.is_empty() {
                break;
            }
            records.extend(batch);
        }

        aggregation::aggregate(records.into_iter(), buckets, filters)
    }

    fn check_cancelled(&self, result_id: &str) -> EngineResult<()> {
        if let Some(row) = self.registry.get_analysis_result(result_id)? {
            if row.status == AnalysisStatus::Cancelled {
                return Err(AnalysisError::Cancelled);
            }
        }
        Ok(())
    }

    /// Explicit cancellation entry point (spec §4.5: "setting CANCELLED
    /// during PROCESSING causes the in-flight worker to abort at the next
    /// safe checkpoint").
    pub fn cancel(&self, result_id: &str) -> EngineResult<()> {
        let mut row = self
            .registry
            .get_analysis_result(result_id)?
            .ok_or_else(|| AnalysisError::NotFound(format!("analysis_result {result_id}")))?;
        if !matches!(row.status, AnalysisStatus::Pending | AnalysisStatus::Processing) {
            return Err(AnalysisError::NotCancellable);
        }
        row.status = AnalysisStatus::Cancelled;
        self.registry.update_analysis_result(&row)
    }
}

fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
}

/// Build the `AnalysisPayload` from raw aggregation output (spec §4.4 run
/// per partition, plus the optional weighted aggregate).
///
/// Fatal per spec.md §4.4's per-partition note: if every partition is
/// `InsufficientData`, the request as a whole fails; a mix of computed and
/// insufficient partitions still succeeds.
fn build_payload(
    outcome: AggregationOutcome,
    filters: &AnalysisFilters,
    trend_threshold_percent: f64,
) -> EngineResult<AnalysisPayload> {
    let partitions: Vec<PartitionResult> = outcome
        .partitions
        .iter()
        .map(|p| PartitionResult {
            currency_code: p.key.currency_code.clone(),
            transport_mode: p.key.transport_mode.clone(),
            buckets: p.buckets.clone(),
            movement: crate::movement::compute(&p.buckets, trend_threshold_percent),
        })
        .collect();

    let any_computed = partitions
        .iter()
        .any(|p| matches!(p.movement, MovementOutcome::Computed(_)));
    if !partitions.is_empty() && !any_computed {
        return Err(AnalysisError::InsufficientData);
    }
    if partitions.is_empty() {
        return Err(AnalysisError::InsufficientData);
    }

    let weighted_aggregate = if filters.include_weighted_aggregate {
        match weighted_summary(&outcome.partitions, trend_threshold_percent) {
            MovementOutcome::Computed(summary) => Some(summary),
            MovementOutcome::InsufficientData => None,
        }
    } else {
        None
    };

    Ok(AnalysisPayload {
        partitions,
        mixed_currencies: outcome.mixed_currencies,
        mixed_modes: outcome.mixed_modes,
        weighted_aggregate,
    })
}

fn weighted_summary(partitions: &[PartitionBuckets], trend_threshold_percent: f64) -> MovementOutcome {
    crate::movement::weighted_aggregate(partitions, trend_threshold_percent)
}

/// Populate the top-level summary fields on `AnalysisResult` (spec §3): the
/// weighted aggregate when requested and available, else the sole
/// partition's movement when there is exactly one, else left unset (the
/// full per-partition detail still lives in `results`).
///
/// `result_ttl_secs` must be the same TTL passed to `cache.publish_ready`
/// for this result so the persisted `cache_expires_at` agrees with the
/// in-memory cache entry's real expiry.
fn apply_payload(
    result: &mut AnalysisResult,
    payload: AnalysisPayload,
    now: chrono::DateTime<chrono::Utc>,
    result_ttl_secs: u64,
) {
    result.calculated_at = Some(now);
    result.is_cached = false;
    result.cache_expires_at = Some(now + chrono::Duration::seconds(result_ttl_secs as i64));

    if let Some(summary) = &payload.weighted_aggregate {
        set_top_level(result, summary, None);
    } else if payload.partitions.len() == 1 {
        if let MovementOutcome::Computed(summary) = &payload.partitions[0].movement {
            set_top_level(result, summary, Some(payload.partitions[0].currency_code.clone()));
        }
    }

    result.results = Some(payload);
}

fn set_top_level(
    result: &mut AnalysisResult,
    summary: &crate::models::analysis::MovementSummary,
    currency_code: Option<String>,
) {
    result.start_value = Some(summary.start_value);
    result.end_value = Some(summary.end_value);
    result.absolute_change = Some(summary.absolute_change);
    result.percentage_change = Some(summary.percentage_change);
    result.trend_direction = Some(summary.trend_direction);
    result.currency_code = currency_code;
}
