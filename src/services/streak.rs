//! Writing-streak calculation shared by the batch run and the real-time
//! updater. Both paths go through [`recompute_streak`].

use chrono::NaiveDate;
use std::collections::HashSet;
use uuid::Uuid;

use crate::db::AnalyticsStore;
use crate::error::AppResult;
use crate::models::streak::WritingStreak;

/// Consecutive written days ending today, or ending yesterday when the owner
/// has not written yet today.
pub fn current_streak(written: &HashSet<NaiveDate>, today: NaiveDate) -> i32 {
    let yesterday = today.pred_opt();
    let mut check_date = if written.contains(&today) {
        Some(today)
    } else if yesterday.is_some_and(|d| written.contains(&d)) {
        yesterday
    } else {
        return 0;
    };

    let mut streak = 0i32;
    while let Some(day) = check_date.filter(|d| written.contains(d)) {
        streak += 1;
        check_date = day.pred_opt();
    }
    streak
}

/// Longest run of consecutive days in `dates` (any order, duplicates allowed).
pub fn longest_run(dates: &[NaiveDate]) -> i32 {
    let mut sorted = dates.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut longest = 0i32;
    let mut run = 0i32;
    let mut prev: Option<NaiveDate> = None;

    for date in sorted {
        run = match prev {
            Some(p) if p.succ_opt() == Some(date) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(date);
    }
    longest
}

/// Streak as computed from the entry store alone, before the monotonic merge.
pub fn compute_streak(user_id: Uuid, dates_desc: &[NaiveDate], today: NaiveDate) -> WritingStreak {
    if dates_desc.is_empty() {
        return WritingStreak {
            user_id,
            current_streak: 0,
            longest_streak: 0,
            last_written_date: None,
        };
    }

    let written: HashSet<NaiveDate> = dates_desc.iter().copied().collect();
    let current = current_streak(&written, today);

    WritingStreak {
        user_id,
        current_streak: current,
        longest_streak: longest_run(dates_desc).max(current),
        last_written_date: dates_desc.iter().max().copied(),
    }
}

/// Recompute one owner's streak and upsert it. The returned value is the row
/// as stored, i.e. after `longest_streak` was merged with the stored maximum.
pub async fn recompute_streak(
    store: &dyn AnalyticsStore,
    user_id: Uuid,
    today: NaiveDate,
) -> AppResult<WritingStreak> {
    let dates = store.written_dates(user_id).await?;
    let computed = compute_streak(user_id, &dates, today);
    let stored = store.upsert_streak(&computed).await?;

    tracing::debug!(
        user_id = %user_id,
        current = stored.current_streak,
        longest = stored.longest_streak,
        "Writing streak recomputed"
    );

    Ok(stored)
}
