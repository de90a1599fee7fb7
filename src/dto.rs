//! Request/response shapes for the internal HTTP surface.
//!
//! Conventions:
//! - `*Request`  → deserialized from JSON body
//! - `*Query`    → deserialized from query params
//! - `*Response` → serialized to JSON

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::streak::WritingStreak;
use crate::models::trend::Granularity;
use crate::services::realtime::EntryEvent;

// ============================================================================
// Hooks
// ============================================================================

/// POST /internal/hooks/entries
#[derive(Debug, Deserialize)]
pub struct EntryHookRequest {
    pub event: EntryEvent,
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct EntryHookResponse {
    /// False when the update was dropped; the next batch cycle repairs it.
    pub queued: bool,
}

// ============================================================================
// Operator
// ============================================================================

/// POST /internal/analytics/backfill
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_backfill_range"))]
pub struct BackfillRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub include_insights: bool,
}

fn validate_backfill_range(req: &BackfillRequest) -> Result<(), ValidationError> {
    if req.start_date > req.end_date {
        let mut err = ValidationError::new("start_after_end");
        err.message = Some("start_date must not be after end_date".into());
        return Err(err);
    }
    Ok(())
}

// ============================================================================
// Reads
// ============================================================================

/// GET /internal/analytics/owners/:user_id/trend
#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub granularity: Option<Granularity>,
}

/// GET /internal/analytics/owners/:user_id/streak
#[derive(Debug, Serialize)]
pub struct StreakResponse {
    pub user_id: Uuid,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_written_date: Option<NaiveDate>,
}

impl StreakResponse {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            current_streak: 0,
            longest_streak: 0,
            last_written_date: None,
        }
    }
}

impl From<WritingStreak> for StreakResponse {
    fn from(s: WritingStreak) -> Self {
        Self {
            user_id: s.user_id,
            current_streak: s.current_streak,
            longest_streak: s.longest_streak,
            last_written_date: s.last_written_date,
        }
    }
}
