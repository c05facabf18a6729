//! Day-bucketed delta series from cumulative counters.
//!
//! Days are UTC calendar days. The cumulative count at the end of day `d` is
//! the number of entities created strictly before the following midnight.

use crate::error::{ReportError, Result};
use crate::indexer::{FilterSpec, IndexerAdapter, QueryName};
use crate::models::{DailyPoint, Window};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use futures::future::try_join_all;
use std::future::Future;

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

fn next_day(day: NaiveDate) -> Result<NaiveDate> {
    day.succ_opt()
        .ok_or_else(|| ReportError::InvalidArgument(format!("no day after {}", day)))
}

/// Instants the daily series of `window` spans: the start day's midnight up
/// to the midnight after the end day.
pub fn day_bounds(window: &Window) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let first_day = window.start.timestamp.date_naive();
    let after_last_day = next_day(window.end.timestamp.date_naive())?;
    Ok((midnight(first_day), midnight(after_last_day)))
}

/// One delta point per UTC day of `window`, both ends inclusive.
///
/// Issues N+1 counter reads for N days, all at once; the first is the
/// baseline at the start day's midnight.
pub async fn build_daily_series<F, Fut>(
    window: &Window,
    cumulative_count_at: F,
) -> Result<Vec<DailyPoint>>
where
    F: Fn(DateTime<Utc>) -> Fut,
    Fut: Future<Output = Result<u64>>,
{
    let first_day = window.start.timestamp.date_naive();
    let last_day = window.end.timestamp.date_naive();

    let mut days = Vec::new();
    let mut day = first_day;
    while day <= last_day {
        days.push(day);
        day = next_day(day)?;
    }

    let mut boundaries = Vec::with_capacity(days.len() + 1);
    boundaries.push(midnight(first_day));
    for day in &days {
        boundaries.push(midnight(next_day(*day)?));
    }

    let counts = try_join_all(boundaries.into_iter().map(&cumulative_count_at)).await?;

    Ok(days
        .into_iter()
        .zip(counts.windows(2))
        .map(|(date, pair)| DailyPoint {
            date,
            count: pair[1] as i64 - pair[0] as i64,
        })
        .collect())
}

/// Daily series of `query` entities matching `base`.
pub async fn daily_counts(
    indexer: &IndexerAdapter,
    query: QueryName,
    base: &FilterSpec,
    window: &Window,
) -> Result<Vec<DailyPoint>> {
    build_daily_series(window, |at| {
        let filter = base.clone().created_before(at);
        async move { indexer.count(query, &filter).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Block;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> Window {
        Window {
            start: Block {
                number: 1,
                hash: "0x01".into(),
                timestamp: start,
            },
            end: Block {
                number: 2,
                hash: "0x02".into(),
                timestamp: end,
            },
            end_was_open: false,
        }
    }

    #[tokio::test]
    async fn test_three_day_series() {
        let cumulative: HashMap<DateTime<Utc>, u64> = [
            (at(10, 0), 10),
            (at(11, 0), 12),
            (at(12, 0), 12),
            (at(13, 0), 15),
        ]
        .into_iter()
        .collect();
        let calls = AtomicUsize::new(0);

        let series = build_daily_series(&window(at(10, 9), at(12, 18)), |t| {
            calls.fetch_add(1, Ordering::SeqCst);
            let count = cumulative.get(&t).copied();
            async move { count.ok_or_else(|| ReportError::not_found(format!("count at {}", t))) }
        })
        .await
        .unwrap();

        let counts: Vec<i64> = series.iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![2, 0, 3]);
        assert_eq!(counts.iter().sum::<i64>(), 5);
        assert_eq!(series[0].date, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(series[2].date, NaiveDate::from_ymd_opt(2024, 3, 12).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_single_day_window() {
        let series = build_daily_series(&window(at(5, 1), at(5, 23)), |t| async move {
            Ok(if t > at(5, 12) { 7 } else { 4 })
        })
        .await
        .unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].count, 3);
    }

    #[tokio::test]
    async fn test_series_sums_to_counter_delta() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let base = at(1, 0).timestamp();
            let mut events: Vec<i64> = (0..rng.gen_range(0..400))
                .map(|_| base + rng.gen_range(0..20 * 86_400))
                .collect();
            events.sort_unstable();

            let start_day = rng.gen_range(1..10);
            let end_day = rng.gen_range(start_day..20);
            let w = window(at(start_day, 6), at(end_day, 6));

            let counter = |t: DateTime<Utc>| {
                let n = events.iter().filter(|e| **e < t.timestamp()).count() as u64;
                async move { Ok(n) }
            };

            let series = build_daily_series(&w, counter).await.unwrap();
            assert_eq!(series.len() as u32, end_day - start_day + 1);

            let before = events.iter().filter(|e| **e < at(start_day, 0).timestamp()).count();
            let through = events.iter().filter(|e| **e < at(end_day + 1, 0).timestamp()).count();
            let total: i64 = series.iter().map(|p| p.count).sum();
            assert_eq!(total, through as i64 - before as i64);
        }
    }

    #[test]
    fn test_day_bounds_cover_whole_days() {
        let (from, until) = day_bounds(&window(at(1, 6), at(3, 20))).unwrap();
        assert_eq!(from, at(1, 0));
        assert_eq!(until, at(4, 0));
    }
}
