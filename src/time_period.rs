//! C2 — Time-Period Resolver (spec §4.2): expands a `TimePeriod` into an
//! ordered sequence of half-open `[b_start, b_end)` aggregation buckets.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use crate::error::{AnalysisError, EngineResult};
use crate::models::time_period::{Granularity, TimePeriod};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Bucket {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Expand `period` into its bucket sequence.
///
/// `max_buckets` rejects windows that would produce more than that many
/// buckets with `PERIOD_TOO_GRANULAR` (spec §4.2), without ever
/// materializing more than `max_buckets + 1` buckets in memory.
pub fn expand(period: &TimePeriod, max_buckets: u32) -> EngineResult<Vec<Bucket>> {
    period.validate()?;

    let step: Step = match period.granularity {
        Granularity::Daily => Step::Days(1),
        Granularity::Weekly => Step::Days(7),
        Granularity::Monthly => Step::Months(1),
        Granularity::Quarterly => Step::Months(3),
        Granularity::Custom => {
            let days = period.custom_interval_days.ok_or_else(|| {
                AnalysisError::InvalidPeriod("CUSTOM granularity requires custom_interval_days".into())
            })?;
            Step::Days(days as i64)
        }
    };

    let mut buckets = Vec::new();
    let mut cursor = period.start_date;
    let mut k: i64 = 0;

    while cursor < period.end_date {
        let natural_end = step.advance(period.start_date, k + 1);
        let bucket_end = natural_end.min(period.end_date);

        if bucket_end <= cursor {
            // Zero-length bucket: dropped, and nothing further can advance.
            break;
        }

        buckets.push(Bucket {
            start: cursor,
            end: bucket_end,
        });

        if buckets.len() as u32 > max_buckets {
            return Err(AnalysisError::PeriodTooGranular { max: max_buckets });
        }

        cursor = bucket_end;
        k += 1;
    }

    Ok(buckets)
}

enum Step {
    Days(i64),
    Months(i32),
}

impl Step {
    /// The natural (untruncated) end of bucket `k-1`, i.e. the k-th boundary
    /// after `anchor`, counting the anchor itself as boundary 0.
    fn advance(&self, anchor: DateTime<Utc>, k: i64) -> DateTime<Utc> {
        match self {
            Step::Days(n) => anchor + Duration::days(n * k),
            Step::Months(n) => add_calendar_months(anchor, (*n as i64 * k) as i32),
        }
    }
}

/// Add `months` calendar months to `dt`, clamping the day-of-month to the
/// target month's last day (spec §4.2: "bucket k starts at (start_date + k
/// months) with day clamped to min(day_of_start_date, last_day_of_target_month)").
pub fn add_calendar_months(dt: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    let total = dt.year() * 12 + dt.month0() as i32 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let day = dt.day().min(last_day_of_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is always valid");
    Utc.from_utc_datetime(&date.and_time(dt.time()))
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("valid date");
    (first_of_next - Duration::days(1)).day()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily(start: DateTime<Utc>, end: DateTime<Utc>) -> TimePeriod {
        TimePeriod {
            id: "tp".into(),
            name: "t".into(),
            start_date: start,
            end_date: end,
            granularity: Granularity::Daily,
            custom_interval_days: None,
            created_by: "u".into(),
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn daily_seven_day_window_yields_seven_buckets() {
        let p = daily(ymd(2023, 1, 1), ymd(2023, 1, 8));
        let buckets = expand(&p, 10_000).unwrap();
        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets[0].start, ymd(2023, 1, 1));
        assert_eq!(buckets[6].end, ymd(2023, 1, 8));
    }

    #[test]
    fn bucket_coverage_has_no_gaps_or_overlaps() {
        let p = daily(ymd(2023, 1, 1), ymd(2023, 1, 8));
        let buckets = expand(&p, 10_000).unwrap();
        for w in buckets.windows(2) {
            assert_eq!(w[0].end, w[1].start);
        }
        assert_eq!(buckets.first().unwrap().start, p.start_date);
        assert_eq!(buckets.last().unwrap().end, p.end_date);
    }

    #[test]
    fn expand_is_idempotent() {
        let p = daily(ymd(2023, 1, 1), ymd(2023, 1, 8));
        assert_eq!(expand(&p, 10_000).unwrap(), expand(&p, 10_000).unwrap());
    }

    #[test]
    fn monthly_steps_by_calendar_month_with_day_clamp() {
        let mut p = daily(ymd(2023, 1, 31), ymd(2023, 4, 30));
        p.granularity = Granularity::Monthly;
        let buckets = expand(&p, 10_000).unwrap();
        // Jan 31 -> Feb 28 (clamped) -> Mar 31 -> truncated at Apr 30
        assert_eq!(buckets[0].start, ymd(2023, 1, 31));
        assert_eq!(buckets[0].end, ymd(2023, 2, 28));
        assert_eq!(buckets[1].end, ymd(2023, 3, 31));
    }

    #[test]
    fn quarterly_steps_three_calendar_months() {
        let mut p = daily(ymd(2023, 1, 1), ymd(2023, 12, 31));
        p.granularity = Granularity::Quarterly;
        let buckets = expand(&p, 10_000).unwrap();
        assert_eq!(buckets[0].end, ymd(2023, 4, 1));
        assert_eq!(buckets[1].end, ymd(2023, 7, 1));
    }

    #[test]
    fn custom_interval_last_bucket_is_truncated() {
        let mut p = daily(ymd(2023, 1, 1), ymd(2023, 1, 15));
        p.granularity = Granularity::Custom;
        p.custom_interval_days = Some(5);
        let buckets = expand(&p, 10_000).unwrap();
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0], Bucket { start: ymd(2023, 1, 1), end: ymd(2023, 1, 6) });
        assert_eq!(buckets[1], Bucket { start: ymd(2023, 1, 6), end: ymd(2023, 1, 11) });
        assert_eq!(buckets[2], Bucket { start: ymd(2023, 1, 11), end: ymd(2023, 1, 15) });
    }

    #[test]
    fn rejects_inverted_window() {
        let p = daily(ymd(2023, 1, 8), ymd(2023, 1, 1));
        assert!(matches!(expand(&p, 10_000), Err(AnalysisError::InvalidPeriod(_))));
    }

    #[test]
    fn rejects_custom_without_interval() {
        let mut p = daily(ymd(2023, 1, 1), ymd(2023, 1, 8));
        p.granularity = Granularity::Custom;
        assert!(matches!(expand(&p, 10_000), Err(AnalysisError::InvalidPeriod(_))));
    }

    #[test]
    fn rejects_windows_over_the_bucket_cap() {
        let p = daily(ymd(2000, 1, 1), ymd(2023, 1, 1));
        assert!(matches!(
            expand(&p, 1_000),
            Err(AnalysisError::PeriodTooGranular { max: 1_000 })
        ));
    }
}
