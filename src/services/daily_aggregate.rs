use chrono::NaiveDate;
use sqlx::types::Json;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::db::AnalyticsStore;
use crate::error::AppResult;
use crate::models::aggregate::DailyMoodAggregate;
use crate::models::entry::Entry;

/// Arithmetic mean of the scores that are present, `None` when no entry is scored.
pub fn average_score<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Option<f64> {
    let (sum, count) = entries
        .into_iter()
        .filter_map(|e| e.mood_score)
        .fold((0.0f64, 0u32), |(sum, count), score| (sum + score, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Reduce one day's entries (oldest first) into its aggregate.
///
/// The dominant mood is the label with the highest count; ties go to the
/// label encountered first in entry order.
pub fn compute_daily_aggregate(user_id: Uuid, day: NaiveDate, entries: &[Entry]) -> DailyMoodAggregate {
    let mut ordered: Vec<(String, i64)> = Vec::new();
    for entry in entries {
        let label = entry.normalized_label();
        match ordered.iter_mut().find(|(l, _)| *l == label) {
            Some((_, count)) => *count += 1,
            None => ordered.push((label, 1)),
        }
    }

    let mut dominant: Option<&(String, i64)> = None;
    for bucket in &ordered {
        if dominant.map_or(true, |d| bucket.1 > d.1) {
            dominant = Some(bucket);
        }
    }
    let dominant_mood = dominant.map(|(label, _)| label.clone());

    DailyMoodAggregate {
        user_id,
        day,
        entry_count: entries.len() as i64,
        avg_mood_score: average_score(entries),
        dominant_mood,
        mood_histogram: Json(ordered.into_iter().collect::<BTreeMap<_, _>>()),
    }
}

/// Recompute and upsert the aggregate for one (owner, day).
pub async fn refresh_daily_aggregate(
    store: &dyn AnalyticsStore,
    user_id: Uuid,
    day: NaiveDate,
) -> AppResult<DailyMoodAggregate> {
    let entries = store.entries_on_date(user_id, day).await?;
    let aggregate = compute_daily_aggregate(user_id, day, &entries);
    store.upsert_daily_aggregate(&aggregate).await?;

    tracing::debug!(
        user_id = %user_id,
        day = %day,
        entries = aggregate.entry_count,
        "Daily mood aggregate refreshed"
    );

    Ok(aggregate)
}
