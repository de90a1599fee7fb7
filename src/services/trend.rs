use chrono::NaiveDate;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::AnalyticsConfig;
use crate::db::AnalyticsStore;
use crate::error::{AppError, AppResult};
use crate::models::entry::Entry;
use crate::models::trend::{Granularity, TrendKey, TrendPoint, TrendSeries};
use crate::services::daily_aggregate::average_score;

/// Build a dense series over `[key.range_start, key.range_end]`: one point per
/// bucket, `avg_score = None` where the bucket has no scored entry.
pub fn compute_trend(config: &AnalyticsConfig, key: TrendKey, entries: &[Entry]) -> TrendSeries {
    let granularity = key.granularity;
    let mut buckets: BTreeMap<NaiveDate, Vec<&Entry>> = BTreeMap::new();
    for entry in entries {
        let day = config.date_of(entry.created_at);
        if day < key.range_start || day > key.range_end {
            continue;
        }
        buckets
            .entry(granularity.bucket_start(day))
            .or_default()
            .push(entry);
    }

    let mut points = Vec::new();
    let mut next = Some(granularity.bucket_start(key.range_start));
    while let Some(bucket) = next.filter(|b| *b <= key.range_end) {
        let avg_score = buckets
            .get(&bucket)
            .and_then(|entries| average_score(entries.iter().copied()));
        points.push(TrendPoint {
            date: bucket,
            avg_score,
        });
        next = granularity.next_bucket(bucket);
    }

    TrendSeries {
        user_id: key.user_id,
        range_start: key.range_start,
        range_end: key.range_end,
        granularity,
        points,
    }
}

fn check_range(start: NaiveDate, end: NaiveDate) -> AppResult<()> {
    if start > end {
        return Err(AppError::Validation(format!(
            "range start {start} is after range end {end}"
        )));
    }
    Ok(())
}

/// Recompute the series for `key` from the entry store without caching it.
pub async fn compute_trend_from_entries(
    store: &dyn AnalyticsStore,
    config: &AnalyticsConfig,
    key: TrendKey,
) -> AppResult<TrendSeries> {
    check_range(key.range_start, key.range_end)?;
    let entries = store
        .entries_in_range(key.user_id, key.range_start, key.range_end)
        .await?;
    Ok(compute_trend(config, key, &entries))
}

/// Recompute the series for one (owner, range, granularity) and replace the
/// cached copy.
pub async fn build_trend_cache(
    store: &dyn AnalyticsStore,
    config: &AnalyticsConfig,
    user_id: Uuid,
    range_start: NaiveDate,
    range_end: NaiveDate,
    granularity: Granularity,
) -> AppResult<TrendSeries> {
    let key = TrendKey {
        user_id,
        range_start,
        range_end,
        granularity,
    };
    let series = compute_trend_from_entries(store, config, key).await?;
    store.upsert_trend_cache(&series).await?;

    tracing::debug!(
        user_id = %user_id,
        range_start = %range_start,
        range_end = %range_end,
        granularity = %granularity,
        points = series.points.len(),
        "Trend cache rebuilt"
    );

    Ok(series)
}

/// Read path: serve the cached series when present and well-formed, otherwise
/// compute it on the fly. Never writes the cache.
pub async fn read_trend(
    store: &dyn AnalyticsStore,
    config: &AnalyticsConfig,
    key: TrendKey,
) -> AppResult<TrendSeries> {
    check_range(key.range_start, key.range_end)?;

    let cached = match store.get_trend_cache(&key).await {
        Ok(cached) => cached,
        Err(e) => {
            tracing::warn!(error = %e, user_id = %key.user_id, "Trend cache read failed, computing ad hoc");
            None
        }
    };

    if let Some(raw) = cached {
        match serde_json::from_value::<Vec<TrendPoint>>(raw) {
            Ok(points) => {
                return Ok(TrendSeries {
                    user_id: key.user_id,
                    range_start: key.range_start,
                    range_end: key.range_end,
                    granularity: key.granularity,
                    points,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, user_id = %key.user_id, "Malformed trend cache, computing ad hoc");
            }
        }
    }

    compute_trend_from_entries(store, config, key).await
}
