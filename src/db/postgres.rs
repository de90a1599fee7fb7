use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::store::AnalyticsStore;
use crate::error::AppResult;
use crate::models::aggregate::DailyMoodAggregate;
use crate::models::entry::Entry;
use crate::models::insight::MoodInsight;
use crate::models::run::RunReport;
use crate::models::streak::WritingStreak;
use crate::models::tag_stat::TagMoodStat;
use crate::models::trend::{TrendKey, TrendSeries};

/// Calendar date of an entry under the service's fixed UTC offset ($2).
const ENTRY_DAY: &str = "((created_at AT TIME ZONE 'UTC') + make_interval(mins => $2))::date";

const ENTRY_COLUMNS: &str =
    "id, user_id, created_at, mood_label, mood_score, COALESCE(tags, '{}') AS tags";

#[derive(Clone)]
pub struct PgAnalyticsStore {
    db: PgPool,
    utc_offset_minutes: i32,
}

impl PgAnalyticsStore {
    pub fn new(db: PgPool, utc_offset_minutes: i32) -> Self {
        Self {
            db,
            utc_offset_minutes,
        }
    }
}

#[async_trait]
impl AnalyticsStore for PgAnalyticsStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.db)
            .await?;
        Ok(())
    }

    async fn list_owners(&self) -> AppResult<Vec<Uuid>> {
        let owners = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT user_id FROM journal_entries
            UNION
            SELECT user_id FROM writing_streaks
            ORDER BY user_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(owners)
    }

    async fn entries_on_date(&self, user_id: Uuid, day: NaiveDate) -> AppResult<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries \
             WHERE user_id = $1 AND {ENTRY_DAY} = $3 \
             ORDER BY created_at ASC, id ASC"
        );
        let entries = sqlx::query_as::<_, Entry>(&sql)
            .bind(user_id)
            .bind(self.utc_offset_minutes)
            .bind(day)
            .fetch_all(&self.db)
            .await?;

        Ok(entries)
    }

    async fn written_dates(&self, user_id: Uuid) -> AppResult<Vec<NaiveDate>> {
        let sql = format!(
            "SELECT DISTINCT {ENTRY_DAY} AS day FROM journal_entries \
             WHERE user_id = $1 \
             ORDER BY day DESC"
        );
        let dates = sqlx::query_scalar::<_, NaiveDate>(&sql)
            .bind(user_id)
            .bind(self.utc_offset_minutes)
            .fetch_all(&self.db)
            .await?;

        Ok(dates)
    }

    async fn tagged_entries(&self, user_id: Uuid) -> AppResult<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries \
             WHERE user_id = $1 AND cardinality(tags) > 0 \
             ORDER BY created_at ASC, id ASC"
        );
        let entries = sqlx::query_as::<_, Entry>(&sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;

        Ok(entries)
    }

    async fn entries_in_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries \
             WHERE user_id = $1 AND {ENTRY_DAY} BETWEEN $3 AND $4 \
             ORDER BY created_at ASC, id ASC"
        );
        let entries = sqlx::query_as::<_, Entry>(&sql)
            .bind(user_id)
            .bind(self.utc_offset_minutes)
            .bind(start)
            .bind(end)
            .fetch_all(&self.db)
            .await?;

        Ok(entries)
    }

    async fn upsert_daily_aggregate(&self, aggregate: &DailyMoodAggregate) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_mood_aggregates
                (user_id, day, entry_count, avg_mood_score, dominant_mood, mood_histogram, computed_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (user_id, day) DO UPDATE SET
                entry_count = EXCLUDED.entry_count,
                avg_mood_score = EXCLUDED.avg_mood_score,
                dominant_mood = EXCLUDED.dominant_mood,
                mood_histogram = EXCLUDED.mood_histogram,
                computed_at = NOW()
            "#,
        )
        .bind(aggregate.user_id)
        .bind(aggregate.day)
        .bind(aggregate.entry_count)
        .bind(aggregate.avg_mood_score)
        .bind(&aggregate.dominant_mood)
        .bind(&aggregate.mood_histogram)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn daily_aggregates_in_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<DailyMoodAggregate>> {
        let rows = sqlx::query_as::<_, DailyMoodAggregate>(
            r#"
            SELECT user_id, day, entry_count, avg_mood_score, dominant_mood, mood_histogram
            FROM daily_mood_aggregates
            WHERE user_id = $1 AND day BETWEEN $2 AND $3
            ORDER BY day ASC
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn replace_tag_stats(&self, user_id: Uuid, stats: &[TagMoodStat]) -> AppResult<()> {
        let tags: Vec<String> = stats.iter().map(|s| s.tag.clone()).collect();

        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM tag_mood_stats WHERE user_id = $1 AND NOT (tag = ANY($2))")
            .bind(user_id)
            .bind(&tags)
            .execute(&mut *tx)
            .await?;

        for stat in stats {
            sqlx::query(
                r#"
                INSERT INTO tag_mood_stats (user_id, tag, occurrences, avg_mood_score, last_seen, computed_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                ON CONFLICT (user_id, tag) DO UPDATE SET
                    occurrences = EXCLUDED.occurrences,
                    avg_mood_score = EXCLUDED.avg_mood_score,
                    last_seen = EXCLUDED.last_seen,
                    computed_at = NOW()
                "#,
            )
            .bind(user_id)
            .bind(&stat.tag)
            .bind(stat.occurrences)
            .bind(stat.avg_mood_score)
            .bind(stat.last_seen)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn top_tag_stats(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<TagMoodStat>> {
        let rows = sqlx::query_as::<_, TagMoodStat>(
            r#"
            SELECT user_id, tag, occurrences, avg_mood_score, last_seen
            FROM tag_mood_stats
            WHERE user_id = $1 AND occurrences > 0
            ORDER BY occurrences DESC, tag ASC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit.max(0))
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn upsert_streak(&self, streak: &WritingStreak) -> AppResult<WritingStreak> {
        let stored = sqlx::query_as::<_, WritingStreak>(
            r#"
            INSERT INTO writing_streaks (user_id, current_streak, longest_streak, last_written_date, updated_at)
            VALUES ($1, $2, GREATEST($2, $3), $4, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                current_streak = EXCLUDED.current_streak,
                longest_streak = GREATEST(writing_streaks.longest_streak, EXCLUDED.longest_streak),
                last_written_date = EXCLUDED.last_written_date,
                updated_at = NOW()
            RETURNING user_id, current_streak, longest_streak, last_written_date
            "#,
        )
        .bind(streak.user_id)
        .bind(streak.current_streak)
        .bind(streak.longest_streak)
        .bind(streak.last_written_date)
        .fetch_one(&self.db)
        .await?;

        Ok(stored)
    }

    async fn get_streak(&self, user_id: Uuid) -> AppResult<Option<WritingStreak>> {
        let row = sqlx::query_as::<_, WritingStreak>(
            "SELECT user_id, current_streak, longest_streak, last_written_date FROM writing_streaks WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    async fn upsert_trend_cache(&self, series: &TrendSeries) -> AppResult<()> {
        let key = series.key();
        sqlx::query(
            r#"
            INSERT INTO trend_caches (user_id, range_start, range_end, granularity, points, computed_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (user_id, range_start, range_end, granularity) DO UPDATE SET
                points = EXCLUDED.points,
                computed_at = NOW()
            "#,
        )
        .bind(key.user_id)
        .bind(key.range_start)
        .bind(key.range_end)
        .bind(key.granularity.as_str())
        .bind(Json(&series.points))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn get_trend_cache(&self, key: &TrendKey) -> AppResult<Option<serde_json::Value>> {
        let points = sqlx::query_scalar::<_, serde_json::Value>(
            r#"
            SELECT points FROM trend_caches
            WHERE user_id = $1 AND range_start = $2 AND range_end = $3 AND granularity = $4
            "#,
        )
        .bind(key.user_id)
        .bind(key.range_start)
        .bind(key.range_end)
        .bind(key.granularity.as_str())
        .fetch_optional(&self.db)
        .await?;

        Ok(points)
    }

    async fn upsert_insight(&self, insight: &MoodInsight) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO mood_insights
                (user_id, date_from, date_to, insight_type, facts, narrative, generator, generated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (user_id, date_from, date_to, insight_type) DO UPDATE SET
                facts = EXCLUDED.facts,
                narrative = EXCLUDED.narrative,
                generator = EXCLUDED.generator,
                generated_at = NOW()
            "#,
        )
        .bind(insight.user_id)
        .bind(insight.date_from)
        .bind(insight.date_to)
        .bind(&insight.insight_type)
        .bind(Json(&insight.facts))
        .bind(&insight.narrative)
        .bind(&insight.generator)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn try_begin_run(
        &self,
        pipeline_id: &str,
        run_id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> AppResult<bool> {
        // Claims the lease when it is free, finished, or abandoned by a crashed run.
        let claimed = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO pipeline_runs (pipeline_id, run_id, started_at, finished_at)
            VALUES ($1, $2, NOW(), NULL)
            ON CONFLICT (pipeline_id) DO UPDATE SET
                run_id = EXCLUDED.run_id,
                started_at = EXCLUDED.started_at,
                finished_at = NULL
            WHERE pipeline_runs.finished_at IS NOT NULL
               OR pipeline_runs.started_at < $3
            RETURNING run_id
            "#,
        )
        .bind(pipeline_id)
        .bind(run_id)
        .bind(stale_before)
        .fetch_optional(&self.db)
        .await?;

        Ok(claimed == Some(run_id))
    }

    async fn finish_run(
        &self,
        pipeline_id: &str,
        run_id: Uuid,
        report: Option<&RunReport>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET finished_at = NOW(), last_report = COALESCE($3, last_report)
            WHERE pipeline_id = $1 AND run_id = $2
            "#,
        )
        .bind(pipeline_id)
        .bind(run_id)
        .bind(report.map(Json))
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
