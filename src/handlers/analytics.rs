use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, NaiveDate};
use uuid::Uuid;
use validator::Validate;

use crate::dto::{BackfillRequest, StreakResponse, TrendQuery};
use crate::error::{AppError, AppResult};
use crate::models::run::{RunOutcome, RunReport};
use crate::models::trend::{TrendKey, TrendSeries};
use crate::services::trend::read_trend;
use crate::AppState;

fn completed(outcome: RunOutcome) -> AppResult<Json<RunReport>> {
    match outcome {
        RunOutcome::Completed(report) => Ok(Json(report)),
        RunOutcome::Skipped => Err(AppError::Conflict(
            "An analytics run is already in progress".into(),
        )),
    }
}

/// Inclusive range length must stay within `max_days`.
fn check_span(what: &str, start: NaiveDate, end: NaiveDate, max_days: u32) -> AppResult<()> {
    let span = (end - start).num_days() + 1;
    if span > i64::from(max_days) {
        return Err(AppError::Validation(format!(
            "{what} range spans {span} days, maximum is {max_days}"
        )));
    }
    Ok(())
}

/// POST /internal/analytics/run
pub async fn run_now(State(state): State<AppState>) -> AppResult<Json<RunReport>> {
    let outcome = state.pipeline.run_scheduled_cycle().await?;
    completed(outcome)
}

/// POST /internal/analytics/backfill
pub async fn backfill(
    State(state): State<AppState>,
    Json(body): Json<BackfillRequest>,
) -> AppResult<Json<RunReport>> {
    body.validate()?;

    check_span(
        "backfill",
        body.start_date,
        body.end_date,
        state.config.analytics.max_backfill_days,
    )?;

    tracing::info!(
        start_date = %body.start_date,
        end_date = %body.end_date,
        include_insights = body.include_insights,
        "Backfill requested"
    );

    let outcome = state
        .pipeline
        .backfill(body.start_date, body.end_date, body.include_insights)
        .await?;
    completed(outcome)
}

/// GET /internal/analytics/owners/:user_id/trend
pub async fn get_trend(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<TrendQuery>,
) -> AppResult<Json<TrendSeries>> {
    let analytics = &state.config.analytics;
    let range_end = query.end_date.unwrap_or_else(|| analytics.today());
    let range_start = query.start_date.unwrap_or_else(|| {
        range_end
            .checked_sub_signed(Duration::days(i64::from(analytics.window_days.max(1)) - 1))
            .unwrap_or(NaiveDate::MIN)
    });
    if range_start <= range_end {
        check_span("trend", range_start, range_end, analytics.max_backfill_days)?;
    }

    let key = TrendKey {
        user_id,
        range_start,
        range_end,
        granularity: query.granularity.unwrap_or_default(),
    };

    let series = read_trend(state.store.as_ref(), analytics, key).await?;
    Ok(Json(series))
}

/// GET /internal/analytics/owners/:user_id/streak
pub async fn get_streak(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<StreakResponse>> {
    let streak = state.store.get_streak(user_id).await?;
    Ok(Json(
        streak
            .map(StreakResponse::from)
            .unwrap_or_else(|| StreakResponse::empty(user_id)),
    ))
}
