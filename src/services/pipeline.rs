//! Batch orchestration of the analytics components.
//!
//! A scheduled cycle and a backfill differ only in the window they process;
//! both go through [`AnalyticsPipeline::run_window`]. Every unit of work is
//! isolated: a failure for one (owner, day) or one (owner, component) is
//! logged, counted in the run report, and the loop moves on.

use chrono::{Duration, NaiveDate, Utc};
use futures_util::{stream, StreamExt};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AnalyticsConfig;
use crate::db::AnalyticsStore;
use crate::error::{AppError, AppResult};
use crate::models::run::{OwnerReport, RunKind, RunOutcome, RunReport, PIPELINE_ID};
use crate::models::trend::Granularity;
use crate::services::daily_aggregate::refresh_daily_aggregate;
use crate::services::insight::InsightGenerator;
use crate::services::streak::recompute_streak;
use crate::services::tag_correlator::refresh_tag_stats;
use crate::services::trend::build_trend_cache;

/// Run lease held for the lifetime of one run. A run that is cancelled or
/// panics before [`RunLease::release`] releases it from `Drop` instead.
struct RunLease {
    store: Arc<dyn AnalyticsStore>,
    run_id: Uuid,
    held: bool,
}

impl RunLease {
    async fn release(mut self, report: Option<&RunReport>) {
        if let Err(e) = self.store.finish_run(PIPELINE_ID, self.run_id, report).await {
            tracing::error!(error = %e, run_id = %self.run_id, "Failed to release analytics run lease");
        }
        self.held = false;
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        tracing::warn!(run_id = %self.run_id, "Analytics run abandoned, releasing lease");

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let run_id = self.run_id;
        handle.spawn(async move {
            if let Err(e) = store.finish_run(PIPELINE_ID, run_id, None).await {
                tracing::error!(error = %e, run_id = %run_id, "Failed to release abandoned analytics run lease");
            }
        });
    }
}

pub struct AnalyticsPipeline {
    store: Arc<dyn AnalyticsStore>,
    config: AnalyticsConfig,
    insights: Option<InsightGenerator>,
}

/// Inclusive list of dates from `start` to `end`.
pub fn dates_in(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut next = Some(start);
    while let Some(day) = next.filter(|d| *d <= end) {
        out.push(day);
        next = day.succ_opt();
    }
    out
}

impl AnalyticsPipeline {
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        config: AnalyticsConfig,
        insights: Option<InsightGenerator>,
    ) -> Self {
        Self {
            store,
            config,
            insights,
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Trailing window ending at `today`, `window_days` long.
    pub fn scheduled_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let span = i64::from(self.config.window_days.max(1)) - 1;
        let start = today
            .checked_sub_signed(Duration::days(span))
            .unwrap_or(NaiveDate::MIN);
        (start, today)
    }

    pub async fn run_scheduled_cycle(&self) -> AppResult<RunOutcome> {
        self.run_scheduled_cycle_at(self.config.today()).await
    }

    pub async fn run_scheduled_cycle_at(&self, today: NaiveDate) -> AppResult<RunOutcome> {
        let (start, end) = self.scheduled_window(today);
        self.run_window(
            RunKind::Scheduled,
            start,
            end,
            today,
            self.config.insights_enabled,
        )
        .await
    }

    pub async fn backfill(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        include_insights: bool,
    ) -> AppResult<RunOutcome> {
        self.backfill_at(start, end, include_insights, self.config.today())
            .await
    }

    pub async fn backfill_at(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        include_insights: bool,
        today: NaiveDate,
    ) -> AppResult<RunOutcome> {
        if start > end {
            return Err(AppError::Validation(format!(
                "start_date {start} is after end_date {end}"
            )));
        }
        self.run_window(RunKind::Backfill, start, end, today, include_insights)
            .await
    }

    /// Claim the run lease, process every owner over `[start, end]`, release.
    /// `today` anchors the current-streak computation.
    pub async fn run_window(
        &self,
        kind: RunKind,
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
        with_insights: bool,
    ) -> AppResult<RunOutcome> {
        let run_id = Uuid::new_v4();
        let stale_before = Utc::now() - Duration::seconds(self.config.run_lease_secs);

        if !self
            .store
            .try_begin_run(PIPELINE_ID, run_id, stale_before)
            .await?
        {
            tracing::info!(kind = kind.as_str(), "Analytics run already in progress, skipping");
            return Ok(RunOutcome::Skipped);
        }
        let lease = RunLease {
            store: self.store.clone(),
            run_id,
            held: true,
        };

        tracing::info!(
            run_id = %run_id,
            kind = kind.as_str(),
            window_start = %start,
            window_end = %end,
            "Analytics run started"
        );

        let result = self
            .process_owners(run_id, kind, start, end, today, with_insights)
            .await;

        lease.release(result.as_ref().ok()).await;

        let report = result?;
        tracing::info!(
            run_id = %run_id,
            owners = report.owners,
            days = report.days_aggregated,
            insights = report.insights_written,
            failures = report.failures.total(),
            "Analytics run finished"
        );

        Ok(RunOutcome::Completed(report))
    }

    async fn process_owners(
        &self,
        run_id: Uuid,
        kind: RunKind,
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
        with_insights: bool,
    ) -> AppResult<RunReport> {
        let owners = self.store.list_owners().await?;
        let days = dates_in(start, end);

        let owner_reports: Vec<OwnerReport> = stream::iter(owners)
            .map(|user_id| self.process_owner(user_id, &days, today, with_insights))
            .buffer_unordered(self.config.owner_concurrency.max(1))
            .collect()
            .await;

        let mut report = RunReport::new(run_id, kind, start, end);
        for owner in owner_reports {
            report.absorb(owner);
        }
        Ok(report)
    }

    /// Run every component for one owner over `days` (ascending, non-empty).
    pub async fn process_owner(
        &self,
        user_id: Uuid,
        days: &[NaiveDate],
        today: NaiveDate,
        with_insights: bool,
    ) -> OwnerReport {
        let store = self.store.as_ref();
        let mut report = OwnerReport::default();

        for day in days {
            match refresh_daily_aggregate(store, user_id, *day).await {
                Ok(_) => report.days_aggregated += 1,
                Err(e) => {
                    report.failures.daily_aggregate += 1;
                    tracing::warn!(error = %e, user_id = %user_id, day = %day, "Daily aggregate failed");
                }
            }
        }

        if let Err(e) = refresh_tag_stats(store, user_id).await {
            report.failures.tag_correlation += 1;
            tracing::warn!(error = %e, user_id = %user_id, "Tag correlation failed");
        }

        if let Err(e) = recompute_streak(store, user_id, today).await {
            report.failures.streak += 1;
            tracing::warn!(error = %e, user_id = %user_id, "Streak recompute failed");
        }

        let (Some(&start), Some(&end)) = (days.first(), days.last()) else {
            return report;
        };

        if let Err(e) =
            build_trend_cache(store, &self.config, user_id, start, end, Granularity::Day).await
        {
            report.failures.trend_cache += 1;
            tracing::warn!(error = %e, user_id = %user_id, "Trend cache build failed");
        }

        if with_insights {
            if let Some(insights) = &self.insights {
                match insights.generate(store, user_id, start, end).await {
                    Ok(outcome) => {
                        report.insight_written = outcome.persisted;
                        report.insight_fallback = outcome.fallback;
                    }
                    Err(e) => {
                        report.failures.insight += 1;
                        tracing::warn!(error = %e, user_id = %user_id, "Insight generation failed");
                    }
                }
            }
        }

        report
    }
}
