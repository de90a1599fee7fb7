use chrono::NaiveDate;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::AnalyticsConfig;
use crate::db::AnalyticsStore;
use crate::error::{AppError, AppResult};
use crate::models::aggregate::DailyMoodAggregate;
use crate::models::insight::{
    DayScore, InsightFacts, MoodInsight, TagSummary, TrendDirection, WINDOW_SUMMARY,
};
use crate::services::daily_aggregate::average_score;
use crate::services::generator::{GenerationError, TextGenerator};

pub const TEMPLATE_GENERATOR: &str = "template";

#[derive(Debug, Clone)]
pub struct InsightOutcome {
    pub insight: MoodInsight,
    pub fallback: bool,
    pub persisted: bool,
}

/// Narrative summaries over a date range, with a deterministic template used
/// whenever the text-generation collaborator fails, times out, or is disabled.
pub struct InsightGenerator {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    trend_threshold: f64,
    top_tags: i64,
    max_tokens: u32,
    max_prompt_chars: usize,
}

impl InsightGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration, config: &AnalyticsConfig) -> Self {
        Self {
            generator,
            timeout,
            trend_threshold: config.insight_trend_threshold,
            top_tags: config.insight_top_tags.max(0),
            max_tokens: config.insight_max_tokens,
            max_prompt_chars: config.insight_max_prompt_chars,
        }
    }

    pub async fn gather_facts(
        &self,
        store: &dyn AnalyticsStore,
        user_id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> AppResult<InsightFacts> {
        let entries = store.entries_in_range(user_id, date_from, date_to).await?;
        let days = store
            .daily_aggregates_in_range(user_id, date_from, date_to)
            .await?;
        let top_tags = store.top_tag_stats(user_id, self.top_tags).await?;
        let streak = store.get_streak(user_id).await?;

        let (happiest_day, lowest_day) = extremes(&days);

        let facts = InsightFacts {
            date_from,
            date_to,
            entry_count: entries.len() as i64,
            overall_avg: average_score(&entries),
            happiest_day,
            lowest_day,
            trend: trend_direction(&days, self.trend_threshold),
            top_tags: top_tags.iter().map(TagSummary::from).collect(),
            current_streak: 0,
            longest_streak: 0,
        };

        Ok(facts.with_streak(streak.as_ref()))
    }

    async fn narrate(&self, facts: &InsightFacts) -> Result<String, GenerationError> {
        let prompt = build_prompt(facts, self.max_prompt_chars);
        match tokio::time::timeout(self.timeout, self.generator.generate(&prompt, self.max_tokens)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.timeout)),
        }
    }

    /// Generate and upsert the window-summary insight for one owner.
    ///
    /// Only fact gathering can fail this call. A failed upsert is logged and
    /// reported through `persisted = false`.
    pub async fn generate(
        &self,
        store: &dyn AnalyticsStore,
        user_id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> AppResult<InsightOutcome> {
        if date_from > date_to {
            return Err(AppError::Validation(format!(
                "insight range start {date_from} is after range end {date_to}"
            )));
        }

        let facts = self.gather_facts(store, user_id, date_from, date_to).await?;

        let (narrative, generator, fallback) = match self.narrate(&facts).await {
            Ok(text) => (text, self.generator.identity().to_string(), false),
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "Text generation unavailable, using template insight");
                (template_narrative(&facts), TEMPLATE_GENERATOR.to_string(), true)
            }
        };

        let insight = MoodInsight {
            user_id,
            date_from,
            date_to,
            insight_type: WINDOW_SUMMARY.to_string(),
            facts,
            narrative,
            generator,
        };

        let persisted = match store.upsert_insight(&insight).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, user_id = %user_id, "Failed to store mood insight");
                false
            }
        };

        Ok(InsightOutcome {
            insight,
            fallback,
            persisted,
        })
    }
}

/// Happiest and lowest scored days. Ties resolve to the earliest date.
pub fn extremes(days: &[DailyMoodAggregate]) -> (Option<DayScore>, Option<DayScore>) {
    let mut happiest: Option<DayScore> = None;
    let mut lowest: Option<DayScore> = None;

    let mut scored: Vec<DayScore> = days
        .iter()
        .filter_map(|d| {
            d.avg_mood_score.map(|avg_score| DayScore {
                date: d.day,
                avg_score,
            })
        })
        .collect();
    scored.sort_by_key(|d| d.date);

    for day in scored {
        if happiest.as_ref().map_or(true, |h| day.avg_score > h.avg_score) {
            happiest = Some(day.clone());
        }
        if lowest.as_ref().map_or(true, |l| day.avg_score < l.avg_score) {
            lowest = Some(day);
        }
    }

    (happiest, lowest)
}

/// Compare the first and last scored days of the range. Deltas within
/// `threshold` count as flat.
pub fn trend_direction(days: &[DailyMoodAggregate], threshold: f64) -> TrendDirection {
    let mut scored: Vec<(NaiveDate, f64)> = days
        .iter()
        .filter_map(|d| d.avg_mood_score.map(|s| (d.day, s)))
        .collect();
    scored.sort_by_key(|(day, _)| *day);

    let (Some(first), Some(last)) = (scored.first(), scored.last()) else {
        return TrendDirection::Flat;
    };
    if scored.len() < 2 {
        return TrendDirection::Flat;
    }

    let delta = last.1 - first.1;
    if delta > threshold {
        TrendDirection::Up
    } else if delta < -threshold {
        TrendDirection::Down
    } else {
        TrendDirection::Flat
    }
}

pub fn build_prompt(facts: &InsightFacts, max_chars: usize) -> String {
    let mut prompt = format!(
        "You are a supportive journaling companion. Write a short, warm summary (2-3 sentences, plain text, no lists) \
         of this person's mood between {} and {}.\n\nFacts:\n",
        facts.date_from, facts.date_to
    );

    let _ = writeln!(prompt, "- Journal entries written: {}", facts.entry_count);
    if let Some(avg) = facts.overall_avg {
        let _ = writeln!(prompt, "- Average mood score: {avg:.2}");
    }
    if let Some(day) = &facts.happiest_day {
        let _ = writeln!(prompt, "- Happiest day: {} (score {:.2})", day.date, day.avg_score);
    }
    if let Some(day) = &facts.lowest_day {
        let _ = writeln!(prompt, "- Lowest day: {} (score {:.2})", day.date, day.avg_score);
    }
    let _ = writeln!(prompt, "- Mood trend over the period: {}", facts.trend.as_str());
    for tag in &facts.top_tags {
        match tag.avg_mood_score {
            Some(avg) => {
                let _ = writeln!(prompt, "- Tag \"{}\": {} entries, average mood {avg:.2}", tag.tag, tag.occurrences);
            }
            None => {
                let _ = writeln!(prompt, "- Tag \"{}\": {} entries", tag.tag, tag.occurrences);
            }
        }
    }
    let _ = writeln!(
        prompt,
        "- Writing streak: {} days current, {} days longest",
        facts.current_streak, facts.longest_streak
    );

    if prompt.chars().count() > max_chars {
        prompt = prompt.chars().take(max_chars).collect();
    }
    prompt
}

/// Deterministic narrative assembled from the same facts as the prompt.
pub fn template_narrative(facts: &InsightFacts) -> String {
    if facts.entry_count == 0 {
        return format!(
            "No journal entries between {} and {} yet. Your current writing streak is {} days.",
            facts.date_from, facts.date_to, facts.current_streak
        );
    }

    let mut parts = Vec::new();

    let entries_word = if facts.entry_count == 1 { "entry" } else { "entries" };
    match facts.overall_avg {
        Some(avg) => parts.push(format!(
            "Between {} and {} you wrote {} {entries_word} with an average mood score of {avg:.2}.",
            facts.date_from, facts.date_to, facts.entry_count
        )),
        None => parts.push(format!(
            "Between {} and {} you wrote {} {entries_word}.",
            facts.date_from, facts.date_to, facts.entry_count
        )),
    }

    match (&facts.happiest_day, &facts.lowest_day) {
        (Some(high), Some(low)) if high.date != low.date => parts.push(format!(
            "Your happiest day was {} ({:.2}) and your lowest was {} ({:.2}).",
            high.date, high.avg_score, low.date, low.avg_score
        )),
        (Some(high), _) => parts.push(format!(
            "Your happiest day was {} ({:.2}).",
            high.date, high.avg_score
        )),
        _ => {}
    }

    parts.push(match facts.trend {
        TrendDirection::Up => "Your mood trended upward over the period.".to_string(),
        TrendDirection::Down => "Your mood trended downward over the period.".to_string(),
        TrendDirection::Flat => "Your mood held steady over the period.".to_string(),
    });

    if !facts.top_tags.is_empty() {
        let tags: Vec<&str> = facts.top_tags.iter().map(|t| t.tag.as_str()).collect();
        parts.push(format!("You wrote most often about {}.", tags.join(", ")));
    }

    parts.push(format!(
        "Current writing streak: {} days (longest {}).",
        facts.current_streak, facts.longest_streak
    ));

    parts.join(" ")
}
