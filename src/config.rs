use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    pub internal_api_token: String,

    pub analytics: AnalyticsConfig,

    pub claude_api_key: String,
    pub claude_model: String,
    pub claude_timeout_secs: u64,
}

/// Knobs for the aggregation pipeline. Kept separate from the HTTP config so
/// the pipeline can be constructed in tests without touching the environment.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Fixed offset used to turn entry timestamps into calendar dates.
    pub utc_offset_minutes: i32,
    pub interval_secs: u64,
    pub window_days: u32,
    pub max_backfill_days: u32,
    pub owner_concurrency: usize,
    pub run_lease_secs: i64,
    pub streak_queue_capacity: usize,

    pub insights_enabled: bool,
    pub insight_trend_threshold: f64,
    pub insight_top_tags: i64,
    pub insight_max_tokens: u32,
    pub insight_max_prompt_chars: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            interval_secs: 3600,
            window_days: 7,
            max_backfill_days: 730,
            owner_concurrency: 4,
            run_lease_secs: 3600,
            streak_queue_capacity: 1024,
            insights_enabled: true,
            insight_trend_threshold: 0.05,
            insight_top_tags: 3,
            insight_max_tokens: 300,
            insight_max_prompt_chars: 4000,
        }
    }
}

impl AnalyticsConfig {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Calendar date of `now` in the service timezone.
    pub fn date_of(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset()).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = AnalyticsConfig::default();

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .expect("PORT must be a number"),

            internal_api_token: env::var("INTERNAL_API_TOKEN")
                .expect("INTERNAL_API_TOKEN must be set"),

            analytics: AnalyticsConfig {
                utc_offset_minutes: env::var("ANALYTICS_UTC_OFFSET_MINUTES")
                    .unwrap_or_else(|_| "0".into())
                    .parse()
                    .expect("ANALYTICS_UTC_OFFSET_MINUTES must be a number"),
                interval_secs: parse_or("ANALYTICS_INTERVAL_SECS", defaults.interval_secs),
                window_days: parse_or("ANALYTICS_WINDOW_DAYS", defaults.window_days).max(1),
                max_backfill_days: parse_or(
                    "ANALYTICS_MAX_BACKFILL_DAYS",
                    defaults.max_backfill_days,
                ),
                owner_concurrency: parse_or(
                    "ANALYTICS_OWNER_CONCURRENCY",
                    defaults.owner_concurrency,
                )
                .max(1),
                run_lease_secs: parse_or("ANALYTICS_RUN_LEASE_SECS", defaults.run_lease_secs),
                streak_queue_capacity: parse_or(
                    "STREAK_QUEUE_CAPACITY",
                    defaults.streak_queue_capacity,
                )
                .max(1),
                insights_enabled: parse_or("INSIGHTS_ENABLED", defaults.insights_enabled),
                insight_trend_threshold: parse_or(
                    "INSIGHT_TREND_THRESHOLD",
                    defaults.insight_trend_threshold,
                ),
                insight_top_tags: parse_or("INSIGHT_TOP_TAGS", defaults.insight_top_tags).max(0),
                insight_max_tokens: parse_or("INSIGHT_MAX_TOKENS", defaults.insight_max_tokens),
                insight_max_prompt_chars: parse_or(
                    "INSIGHT_MAX_PROMPT_CHARS",
                    defaults.insight_max_prompt_chars,
                ),
            },

            claude_api_key: env::var("CLAUDE_API_KEY").unwrap_or_else(|_| String::new()),
            claude_model: env::var("CLAUDE_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".into()),
            claude_timeout_secs: parse_or("CLAUDE_TIMEOUT_SECS", 30),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
