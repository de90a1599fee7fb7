use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-day mood summary for one owner. Keyed by (user_id, day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DailyMoodAggregate {
    pub user_id: Uuid,
    pub day: NaiveDate,
    pub entry_count: i64,
    pub avg_mood_score: Option<f64>,
    pub dominant_mood: Option<String>,
    pub mood_histogram: Json<BTreeMap<String, i64>>,
}
