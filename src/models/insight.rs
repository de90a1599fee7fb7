use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tag_stat::TagMoodStat;
use super::streak::WritingStreak;

pub const WINDOW_SUMMARY: &str = "window_summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

impl TrendDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Flat => "flat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayScore {
    pub date: NaiveDate,
    pub avg_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSummary {
    pub tag: String,
    pub occurrences: i64,
    pub avg_mood_score: Option<f64>,
}

impl From<&TagMoodStat> for TagSummary {
    fn from(s: &TagMoodStat) -> Self {
        Self {
            tag: s.tag.clone(),
            occurrences: s.occurrences,
            avg_mood_score: s.avg_mood_score,
        }
    }
}

/// Structured facts the narrative is built from. Stored alongside the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightFacts {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub entry_count: i64,
    pub overall_avg: Option<f64>,
    pub happiest_day: Option<DayScore>,
    pub lowest_day: Option<DayScore>,
    pub trend: TrendDirection,
    pub top_tags: Vec<TagSummary>,
    pub current_streak: i32,
    pub longest_streak: i32,
}

impl InsightFacts {
    pub fn with_streak(mut self, streak: Option<&WritingStreak>) -> Self {
        if let Some(s) = streak {
            self.current_streak = s.current_streak;
            self.longest_streak = s.longest_streak;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodInsight {
    pub user_id: Uuid,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub insight_type: String,
    pub facts: InsightFacts,
    pub narrative: String,
    /// Model identity, or "template" for the deterministic fallback.
    pub generator: String,
}
