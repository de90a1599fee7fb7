use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-tag mood correlation for one owner. Keyed by (user_id, tag), where
/// `tag` is the canonical lowercased form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TagMoodStat {
    pub user_id: Uuid,
    pub tag: String,
    pub occurrences: i64,
    pub avg_mood_score: Option<f64>,
    pub last_seen: DateTime<Utc>,
}
