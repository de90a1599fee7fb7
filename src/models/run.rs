use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// Fixed identifier of the analytics pipeline's run lease.
pub const PIPELINE_ID: &str = "mood_analytics";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Scheduled,
    Backfill,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Backfill => "backfill",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComponentFailures {
    pub daily_aggregate: u32,
    pub tag_correlation: u32,
    pub streak: u32,
    pub trend_cache: u32,
    pub insight: u32,
}

impl ComponentFailures {
    pub fn total(&self) -> u32 {
        self.daily_aggregate + self.tag_correlation + self.streak + self.trend_cache + self.insight
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub owners: u32,
    pub days_aggregated: u32,
    pub insights_written: u32,
    pub insight_fallbacks: u32,
    pub failures: ComponentFailures,
}

impl RunReport {
    pub fn new(run_id: Uuid, kind: RunKind, window_start: NaiveDate, window_end: NaiveDate) -> Self {
        Self {
            run_id,
            kind,
            window_start,
            window_end,
            owners: 0,
            days_aggregated: 0,
            insights_written: 0,
            insight_fallbacks: 0,
            failures: ComponentFailures::default(),
        }
    }

    pub fn absorb(&mut self, owner: OwnerReport) {
        self.owners += 1;
        self.days_aggregated += owner.days_aggregated;
        self.failures.daily_aggregate += owner.failures.daily_aggregate;
        self.failures.tag_correlation += owner.failures.tag_correlation;
        self.failures.streak += owner.failures.streak;
        self.failures.trend_cache += owner.failures.trend_cache;
        self.failures.insight += owner.failures.insight;
        if owner.insight_written {
            self.insights_written += 1;
        }
        if owner.insight_fallback {
            self.insight_fallbacks += 1;
        }
    }
}

/// Outcome of running every component for one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerReport {
    pub days_aggregated: u32,
    pub insight_written: bool,
    pub insight_fallback: bool,
    pub failures: ComponentFailures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(RunReport),
    /// Another run held the lease.
    Skipped,
}
