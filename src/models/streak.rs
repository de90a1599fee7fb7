use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Writing-streak state for one owner.
///
/// `longest_streak` is monotonic: a write may only raise it. The merge happens
/// inside the upsert statement, never in application code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WritingStreak {
    pub user_id: Uuid,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_written_date: Option<NaiveDate>,
}

#[cfg(test)]
impl WritingStreak {
    /// Combine a freshly computed streak with the stored row, keeping the
    /// highest longest_streak ever seen. Mirrors the `GREATEST` merge in the
    /// Postgres upsert for the in-memory store.
    pub fn merged_with(self, stored: Option<&WritingStreak>) -> WritingStreak {
        let floor = stored.map(|s| s.longest_streak).unwrap_or(0);
        WritingStreak {
            longest_streak: self.longest_streak.max(self.current_streak).max(floor),
            ..self
        }
    }
}
