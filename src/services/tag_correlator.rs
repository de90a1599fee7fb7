use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::db::AnalyticsStore;
use crate::error::AppResult;
use crate::models::entry::Entry;
use crate::models::tag_stat::TagMoodStat;

#[derive(Default)]
struct TagAccumulator {
    occurrences: i64,
    score_sum: f64,
    scored: i64,
    last_seen: Option<DateTime<Utc>>,
}

/// Full recompute of per-tag statistics from every tagged entry of one owner.
/// Output is ordered by tag.
pub fn compute_tag_stats(user_id: Uuid, entries: &[Entry]) -> Vec<TagMoodStat> {
    let mut acc: BTreeMap<String, TagAccumulator> = BTreeMap::new();

    for entry in entries {
        for tag in entry.normalized_tags() {
            let slot = acc.entry(tag).or_default();
            slot.occurrences += 1;
            if let Some(score) = entry.mood_score {
                slot.score_sum += score;
                slot.scored += 1;
            }
            if slot.last_seen.map_or(true, |seen| entry.created_at > seen) {
                slot.last_seen = Some(entry.created_at);
            }
        }
    }

    acc.into_iter()
        .filter_map(|(tag, a)| {
            Some(TagMoodStat {
                user_id,
                tag,
                occurrences: a.occurrences,
                avg_mood_score: (a.scored > 0).then(|| a.score_sum / a.scored as f64),
                last_seen: a.last_seen?,
            })
        })
        .collect()
}

/// Recompute and overwrite the owner's tag stats. Tags no longer present on any
/// entry are pruned.
pub async fn refresh_tag_stats(store: &dyn AnalyticsStore, user_id: Uuid) -> AppResult<Vec<TagMoodStat>> {
    let entries = store.tagged_entries(user_id).await?;
    let stats = compute_tag_stats(user_id, &entries);
    store.replace_tag_stats(user_id, &stats).await?;

    tracing::debug!(user_id = %user_id, tags = stats.len(), "Tag mood stats refreshed");

    Ok(stats)
}
