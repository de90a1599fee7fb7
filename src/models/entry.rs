use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A journal entry as seen by the analytics pipeline. Entries are written by
/// the CRUD layer; nothing in this service mutates them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub mood_label: Option<String>,
    pub mood_score: Option<f64>,
    pub tags: Vec<String>,
}

/// Label bucket used when an entry has no inferred mood label.
pub const UNKNOWN_MOOD: &str = "unknown";

impl Entry {
    pub fn normalized_label(&self) -> String {
        self.mood_label
            .as_deref()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| UNKNOWN_MOOD.to_string())
    }

    /// Canonical tags: trimmed, lowercased, empty ones dropped, duplicates
    /// within the entry collapsed (first occurrence wins).
    pub fn normalized_tags(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            let tag = normalize_tag(tag);
            if !tag.is_empty() && !out.contains(&tag) {
                out.push(tag);
            }
        }
        out
    }
}

pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}
