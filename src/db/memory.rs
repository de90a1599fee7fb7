//! In-memory `AnalyticsStore` for unit tests, with per-operation failure injection.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::config::AnalyticsConfig;
use crate::db::store::AnalyticsStore;
use crate::error::{AppError, AppResult};
use crate::models::aggregate::DailyMoodAggregate;
use crate::models::entry::Entry;
use crate::models::insight::MoodInsight;
use crate::models::run::RunReport;
use crate::models::streak::WritingStreak;
use crate::models::tag_stat::TagMoodStat;
use crate::models::trend::{TrendKey, TrendSeries};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    EntriesOnDate,
    WrittenDates,
    TaggedEntries,
    EntriesInRange,
    UpsertDailyAggregate,
    ReplaceTagStats,
    UpsertStreak,
    UpsertTrendCache,
    UpsertInsight,
}

struct Lease {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished: bool,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    aggregates: BTreeMap<(Uuid, NaiveDate), DailyMoodAggregate>,
    tag_stats: BTreeMap<(Uuid, String), TagMoodStat>,
    streaks: HashMap<Uuid, WritingStreak>,
    trends: HashMap<TrendKey, serde_json::Value>,
    insights: HashMap<(Uuid, NaiveDate, NaiveDate, String), MoodInsight>,
    leases: HashMap<String, Lease>,
    reports: Vec<RunReport>,
    failures: HashSet<(Op, Option<Uuid>)>,
}

pub struct MemoryStore {
    config: AnalyticsConfig,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            config: AnalyticsConfig::default(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn add_entry(
        &self,
        user_id: Uuid,
        created_at: DateTime<Utc>,
        label: Option<&str>,
        score: Option<f64>,
        tags: &[&str],
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().entries.push(Entry {
            id,
            user_id,
            created_at,
            mood_label: label.map(String::from),
            mood_score: score,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        });
        id
    }

    /// Adds an entry at noon on `day`.
    pub fn add_entry_on(
        &self,
        user_id: Uuid,
        day: NaiveDate,
        label: Option<&str>,
        score: Option<f64>,
        tags: &[&str],
    ) -> Uuid {
        let at = day.and_hms_opt(12, 0, 0).unwrap().and_utc();
        self.add_entry(user_id, at, label, score, tags)
    }

    pub fn delete_entry(&self, id: Uuid) {
        self.inner.lock().unwrap().entries.retain(|e| e.id != id);
    }

    pub fn delete_entries_where(&self, pred: impl Fn(&Entry) -> bool) {
        self.inner.lock().unwrap().entries.retain(|e| !pred(e));
    }

    /// Make `op` fail, for one owner or (with `None`) for everyone.
    pub fn fail(&self, op: Op, user_id: Option<Uuid>) {
        self.inner.lock().unwrap().failures.insert((op, user_id));
    }

    pub fn aggregate(&self, user_id: Uuid, day: NaiveDate) -> Option<DailyMoodAggregate> {
        self.inner.lock().unwrap().aggregates.get(&(user_id, day)).cloned()
    }

    pub fn aggregates(&self) -> Vec<DailyMoodAggregate> {
        self.inner.lock().unwrap().aggregates.values().cloned().collect()
    }

    pub fn tag_stat(&self, user_id: Uuid, tag: &str) -> Option<TagMoodStat> {
        self.inner
            .lock()
            .unwrap()
            .tag_stats
            .get(&(user_id, tag.to_string()))
            .cloned()
    }

    pub fn streak(&self, user_id: Uuid) -> Option<WritingStreak> {
        self.inner.lock().unwrap().streaks.get(&user_id).copied()
    }

    pub fn put_streak(&self, streak: WritingStreak) {
        self.inner.lock().unwrap().streaks.insert(streak.user_id, streak);
    }

    pub fn trend_raw(&self, key: &TrendKey) -> Option<serde_json::Value> {
        self.inner.lock().unwrap().trends.get(key).cloned()
    }

    pub fn put_trend_raw(&self, key: TrendKey, raw: serde_json::Value) {
        self.inner.lock().unwrap().trends.insert(key, raw);
    }

    pub fn insights(&self, user_id: Uuid) -> Vec<MoodInsight> {
        self.inner
            .lock()
            .unwrap()
            .insights
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn reports(&self) -> Vec<RunReport> {
        self.inner.lock().unwrap().reports.clone()
    }

    fn check(&self, inner: &Inner, op: Op, user_id: Uuid) -> AppResult<()> {
        if inner.failures.contains(&(op, Some(user_id))) || inner.failures.contains(&(op, None)) {
            return Err(AppError::Internal(anyhow::anyhow!(
                "injected failure: {op:?} for {user_id}"
            )));
        }
        Ok(())
    }

    fn day_of(&self, e: &Entry) -> NaiveDate {
        self.config.date_of(e.created_at)
    }

    fn sorted_entries(&self, inner: &Inner, pred: impl Fn(&Entry) -> bool) -> Vec<Entry> {
        let mut out: Vec<Entry> = inner.entries.iter().filter(|e| pred(e)).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn list_owners(&self) -> AppResult<Vec<Uuid>> {
        let inner = self.inner.lock().unwrap();
        let owners: BTreeSet<Uuid> = inner
            .entries
            .iter()
            .map(|e| e.user_id)
            .chain(inner.streaks.keys().copied())
            .collect();
        Ok(owners.into_iter().collect())
    }

    async fn entries_on_date(&self, user_id: Uuid, day: NaiveDate) -> AppResult<Vec<Entry>> {
        let inner = self.inner.lock().unwrap();
        self.check(&inner, Op::EntriesOnDate, user_id)?;
        Ok(self.sorted_entries(&inner, |e| e.user_id == user_id && self.day_of(e) == day))
    }

    async fn written_dates(&self, user_id: Uuid) -> AppResult<Vec<NaiveDate>> {
        let inner = self.inner.lock().unwrap();
        self.check(&inner, Op::WrittenDates, user_id)?;
        let dates: BTreeSet<NaiveDate> = inner
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| self.day_of(e))
            .collect();
        Ok(dates.into_iter().rev().collect())
    }

    async fn tagged_entries(&self, user_id: Uuid) -> AppResult<Vec<Entry>> {
        let inner = self.inner.lock().unwrap();
        self.check(&inner, Op::TaggedEntries, user_id)?;
        Ok(self.sorted_entries(&inner, |e| e.user_id == user_id && !e.tags.is_empty()))
    }

    async fn entries_in_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<Entry>> {
        let inner = self.inner.lock().unwrap();
        self.check(&inner, Op::EntriesInRange, user_id)?;
        Ok(self.sorted_entries(&inner, |e| {
            let day = self.day_of(e);
            e.user_id == user_id && day >= start && day <= end
        }))
    }

    async fn upsert_daily_aggregate(&self, aggregate: &DailyMoodAggregate) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        self.check(&inner, Op::UpsertDailyAggregate, aggregate.user_id)?;
        inner
            .aggregates
            .insert((aggregate.user_id, aggregate.day), aggregate.clone());
        Ok(())
    }

    async fn daily_aggregates_in_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<DailyMoodAggregate>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .aggregates
            .range((user_id, start)..=(user_id, end))
            .map(|(_, a)| a.clone())
            .collect())
    }

    async fn replace_tag_stats(&self, user_id: Uuid, stats: &[TagMoodStat]) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        self.check(&inner, Op::ReplaceTagStats, user_id)?;
        inner.tag_stats.retain(|(owner, _), _| *owner != user_id);
        for stat in stats {
            inner
                .tag_stats
                .insert((user_id, stat.tag.clone()), stat.clone());
        }
        Ok(())
    }

    async fn top_tag_stats(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<TagMoodStat>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<TagMoodStat> = inner
            .tag_stats
            .values()
            .filter(|s| s.user_id == user_id && s.occurrences > 0)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then(a.tag.cmp(&b.tag)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn upsert_streak(&self, streak: &WritingStreak) -> AppResult<WritingStreak> {
        let mut inner = self.inner.lock().unwrap();
        self.check(&inner, Op::UpsertStreak, streak.user_id)?;
        let merged = streak.merged_with(inner.streaks.get(&streak.user_id));
        inner.streaks.insert(streak.user_id, merged);
        Ok(merged)
    }

    async fn get_streak(&self, user_id: Uuid) -> AppResult<Option<WritingStreak>> {
        Ok(self.streak(user_id))
    }

    async fn upsert_trend_cache(&self, series: &TrendSeries) -> AppResult<()> {
        let raw = serde_json::to_value(&series.points)?;
        let mut inner = self.inner.lock().unwrap();
        self.check(&inner, Op::UpsertTrendCache, series.user_id)?;
        inner.trends.insert(series.key(), raw);
        Ok(())
    }

    async fn get_trend_cache(&self, key: &TrendKey) -> AppResult<Option<serde_json::Value>> {
        Ok(self.trend_raw(key))
    }

    async fn upsert_insight(&self, insight: &MoodInsight) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        self.check(&inner, Op::UpsertInsight, insight.user_id)?;
        inner.insights.insert(
            (
                insight.user_id,
                insight.date_from,
                insight.date_to,
                insight.insight_type.clone(),
            ),
            insight.clone(),
        );
        Ok(())
    }

    async fn try_begin_run(
        &self,
        pipeline_id: &str,
        run_id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        match inner.leases.get_mut(pipeline_id) {
            Some(lease) if !lease.finished && lease.started_at >= stale_before => Ok(false),
            Some(lease) => {
                *lease = Lease {
                    run_id,
                    started_at: now,
                    finished: false,
                };
                Ok(true)
            }
            None => {
                inner.leases.insert(
                    pipeline_id.to_string(),
                    Lease {
                        run_id,
                        started_at: now,
                        finished: false,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn finish_run(
        &self,
        pipeline_id: &str,
        run_id: Uuid,
        report: Option<&RunReport>,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(lease) = inner.leases.get_mut(pipeline_id) {
            if lease.run_id == run_id {
                lease.finished = true;
            }
        }
        if let Some(report) = report {
            inner.reports.push(report.clone());
        }
        Ok(())
    }
}

/// Hold the lease as if a run started `age` ago and never finished.
pub fn hold_lease(store: &MemoryStore, pipeline_id: &str, age: Duration) {
    store.inner.lock().unwrap().leases.insert(
        pipeline_id.to_string(),
        Lease {
            run_id: Uuid::new_v4(),
            started_at: Utc::now() - age,
            finished: false,
        },
    );
}

/// Mark the lease as finished, as the holder would on completion.
pub fn release_lease(store: &MemoryStore, pipeline_id: &str) {
    if let Some(lease) = store.inner.lock().unwrap().leases.get_mut(pipeline_id) {
        lease.finished = true;
    }
}
