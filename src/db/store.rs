//! Datastore seam for the analytics pipeline.
//!
//! The read half mirrors the queries the pipeline needs from the entry store;
//! the write half is one keyed upsert per derived table. Every upsert is a
//! single statement so concurrent writers on the same key can only ever
//! produce last-writer-wins, and `upsert_streak` additionally keeps
//! `longest_streak = GREATEST(stored, incoming)` inside the statement.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::aggregate::DailyMoodAggregate;
use crate::models::entry::Entry;
use crate::models::insight::MoodInsight;
use crate::models::run::RunReport;
use crate::models::streak::WritingStreak;
use crate::models::tag_stat::TagMoodStat;
use crate::models::trend::{TrendKey, TrendSeries};

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    // ── Entry store (read-only) ─────────────────────────────────────────

    /// Owners with at least one entry or an existing streak row.
    async fn list_owners(&self) -> AppResult<Vec<Uuid>>;

    /// Entries created on `day`, oldest first.
    async fn entries_on_date(&self, user_id: Uuid, day: NaiveDate) -> AppResult<Vec<Entry>>;

    /// Distinct calendar dates with at least one entry, most recent first.
    async fn written_dates(&self, user_id: Uuid) -> AppResult<Vec<NaiveDate>>;

    /// Entries carrying a non-empty tag set, oldest first.
    async fn tagged_entries(&self, user_id: Uuid) -> AppResult<Vec<Entry>>;

    /// Entries whose calendar date falls in `[start, end]`, oldest first.
    async fn entries_in_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<Entry>>;

    // ── Derived tables ──────────────────────────────────────────────────

    async fn upsert_daily_aggregate(&self, aggregate: &DailyMoodAggregate) -> AppResult<()>;

    async fn daily_aggregates_in_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<DailyMoodAggregate>>;

    /// Overwrite the owner's tag stats with `stats`. Rows for tags absent from
    /// `stats` are removed in the same transaction.
    async fn replace_tag_stats(&self, user_id: Uuid, stats: &[TagMoodStat]) -> AppResult<()>;

    /// Most frequent tags first.
    async fn top_tag_stats(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<TagMoodStat>>;

    /// Upsert and return the row as stored after the monotonic merge.
    async fn upsert_streak(&self, streak: &WritingStreak) -> AppResult<WritingStreak>;

    async fn get_streak(&self, user_id: Uuid) -> AppResult<Option<WritingStreak>>;

    async fn upsert_trend_cache(&self, series: &TrendSeries) -> AppResult<()>;

    /// Raw cached points for `key`; parsing is left to the reader.
    async fn get_trend_cache(&self, key: &TrendKey) -> AppResult<Option<serde_json::Value>>;

    async fn upsert_insight(&self, insight: &MoodInsight) -> AppResult<()>;

    // ── Run lease ───────────────────────────────────────────────────────

    /// Claim the pipeline lease. Returns false when another run holds an
    /// unfinished lease that started after `stale_before`.
    async fn try_begin_run(
        &self,
        pipeline_id: &str,
        run_id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> AppResult<bool>;

    async fn finish_run(
        &self,
        pipeline_id: &str,
        run_id: Uuid,
        report: Option<&RunReport>,
    ) -> AppResult<()>;
}
