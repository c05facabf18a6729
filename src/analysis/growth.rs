//! Absolute and percentage growth of cumulative counts.

use crate::error::Result;
use crate::indexer::{FilterSpec, IndexerAdapter, QueryName};
use crate::models::{GrowthMetric, Window};
use rust_decimal::Decimal;

/// Growth from `start_count` to `end_count`.
///
/// The percentage is `None` for a zero baseline; it is never NaN or infinite.
pub fn growth(start_count: u64, end_count: u64) -> GrowthMetric {
    let delta = i128::from(end_count) - i128::from(start_count);
    let growth_count = i64::try_from(delta).unwrap_or(if delta > 0 { i64::MAX } else { i64::MIN });

    let growth_percent = if start_count == 0 {
        None
    } else {
        Decimal::from(growth_count)
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|scaled| scaled.checked_div(Decimal::from(start_count)))
    };

    GrowthMetric {
        start_count,
        end_count,
        growth_count,
        growth_percent,
    }
}

/// Count `query` entities created up to the window's start and end.
pub async fn count_growth(
    indexer: &IndexerAdapter,
    query: QueryName,
    base: &FilterSpec,
    window: &Window,
) -> Result<GrowthMetric> {
    let at_start = base.clone().created_until(window.start.timestamp);
    let at_end = base.clone().created_until(window.end.timestamp);

    let (start_count, end_count) = futures::try_join!(
        indexer.count(query, &at_start),
        indexer.count(query, &at_end)
    )?;

    Ok(growth(start_count, end_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_growth_half_again() {
        let metric = growth(100, 150);
        assert_eq!(metric.growth_count, 50);
        assert_eq!(metric.growth_percent, Some(Decimal::from(50)));
    }

    #[test]
    fn test_zero_baseline_has_no_percent() {
        let metric = growth(0, 25);
        assert_eq!(metric.growth_count, 25);
        assert_eq!(metric.growth_percent, None);

        assert_eq!(growth(0, 0).growth_percent, None);
    }

    #[test]
    fn test_shrinking_count() {
        let metric = growth(200, 150);
        assert_eq!(metric.growth_count, -50);
        assert_eq!(metric.growth_percent, Some(Decimal::from(-25)));
    }

    #[test]
    fn test_percent_matches_ratio() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..5_000 {
            let start: u64 = rng.gen_range(1..=1_000_000);
            let end: u64 = rng.gen_range(0..=2_000_000);
            let metric = growth(start, end);

            assert_eq!(metric.growth_count, end as i64 - start as i64);
            let percent = metric.growth_percent.expect("non-zero baseline");
            let back = (percent * Decimal::from(start)).round_dp(6);
            assert_eq!(back, Decimal::from(metric.growth_count * 100), "{start} -> {end}");
        }
    }
}
