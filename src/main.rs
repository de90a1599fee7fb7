use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod db;
mod dto;
mod error;
mod handlers;
mod models;
mod services;

use config::Config;
use db::{AnalyticsStore, PgAnalyticsStore};
use services::insight::InsightGenerator;
use services::pipeline::AnalyticsPipeline;
use services::realtime::StreakUpdater;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AnalyticsStore>,
    pub config: Arc<Config>,
    pub pipeline: Arc<AnalyticsPipeline>,
    pub streak_updater: StreakUpdater,
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz));

    let internal_routes = Router::new()
        .route("/internal/hooks/entries", post(handlers::hooks::entry_changed))
        .route("/internal/analytics/run", post(handlers::analytics::run_now))
        .route(
            "/internal/analytics/backfill",
            post(handlers::analytics::backfill),
        )
        .route(
            "/internal/analytics/owners/:user_id/trend",
            get(handlers::analytics::get_trend),
        )
        .route(
            "/internal/analytics/owners/:user_id/streak",
            get(handlers::analytics::get_streak),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_internal_token,
        ));

    Router::new()
        .merge(public_routes)
        .merge(internal_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodline_analytics=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());
    let analytics = config.analytics.clone();

    // Database
    let db = db::create_pool(&config.database_url, analytics.owner_concurrency).await?;

    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations applied");

    let store: Arc<dyn AnalyticsStore> =
        Arc::new(PgAnalyticsStore::new(db, analytics.utc_offset_minutes));

    let insights = analytics.insights_enabled.then(|| {
        InsightGenerator::new(
            services::generator::from_config(&config),
            Duration::from_secs(config.claude_timeout_secs),
            &analytics,
        )
    });

    let pipeline = Arc::new(AnalyticsPipeline::new(
        store.clone(),
        analytics.clone(),
        insights,
    ));

    let (streak_updater, _streak_worker) = StreakUpdater::spawn(store.clone(), analytics.clone());
    services::scheduler::spawn_analytics_scheduler(pipeline.clone());

    let state = AppState {
        store,
        config: config.clone(),
        pipeline,
        streak_updater,
    };

    let app = router(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{Duration as ChronoDuration, Utc};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::AnalyticsConfig;
    use crate::db::memory::MemoryStore;

    const TOKEN: &str = "test-token";

    fn test_state(store: Arc<MemoryStore>) -> AppState {
        let analytics = AnalyticsConfig {
            insights_enabled: false,
            max_backfill_days: 30,
            ..AnalyticsConfig::default()
        };
        let config = Config {
            database_url: String::new(),
            host: "127.0.0.1".into(),
            port: 0,
            internal_api_token: TOKEN.into(),
            analytics: analytics.clone(),
            claude_api_key: String::new(),
            claude_model: "unused".into(),
            claude_timeout_secs: 1,
        };
        let store: Arc<dyn AnalyticsStore> = store;
        let pipeline = Arc::new(AnalyticsPipeline::new(store.clone(), analytics.clone(), None));
        let (streak_updater, _) = StreakUpdater::spawn(store.clone(), analytics);
        AppState {
            store,
            config: Arc::new(config),
            pipeline,
            streak_updater,
        }
    }

    fn authed(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = router(test_state(Arc::new(MemoryStore::new())));
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_internal_routes_require_token() {
        let app = router(test_state(Arc::new(MemoryStore::new())));
        let resp = app
            .oneshot(
                Request::post("/internal/analytics/run")
                    .header(header::AUTHORIZATION, "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_entry_hook_is_accepted_immediately() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        store.add_entry(owner, Utc::now(), Some("happy"), Some(0.7), &[]);
        let app = router(test_state(store.clone()));

        let resp = app
            .oneshot(authed(
                "POST",
                "/internal/hooks/entries",
                Some(serde_json::json!({ "event": "created", "user_id": owner })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(resp).await["queued"], true);

        for _ in 0..100 {
            if store.streak(owner).is_some() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("streak was never written");
    }

    #[tokio::test]
    async fn test_run_now_returns_report() {
        let store = Arc::new(MemoryStore::new());
        store.add_entry(Uuid::new_v4(), Utc::now(), Some("calm"), Some(0.5), &["work"]);
        let app = router(test_state(store));

        let resp = app
            .oneshot(authed("POST", "/internal/analytics/run", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["owners"], 1);
        assert_eq!(body["days_aggregated"], 7);
    }

    #[tokio::test]
    async fn test_backfill_rejects_oversized_range() {
        let app = router(test_state(Arc::new(MemoryStore::new())));
        let today = Utc::now().date_naive();
        let resp = app
            .oneshot(authed(
                "POST",
                "/internal/analytics/backfill",
                Some(serde_json::json!({
                    "start_date": today - ChronoDuration::days(365),
                    "end_date": today,
                })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_backfill_at_calendar_end_does_not_lock_runs() {
        let store = Arc::new(MemoryStore::new());
        store.add_entry(Uuid::new_v4(), Utc::now(), Some("calm"), Some(0.5), &[]);
        let app = router(test_state(store));

        let resp = app
            .clone()
            .oneshot(authed(
                "POST",
                "/internal/analytics/backfill",
                Some(serde_json::json!({
                    "start_date": chrono::NaiveDate::MAX,
                    "end_date": chrono::NaiveDate::MAX,
                })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["days_aggregated"], 1);

        let resp = app
            .oneshot(authed("POST", "/internal/analytics/run", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_trend_rejects_oversized_range() {
        let app = router(test_state(Arc::new(MemoryStore::new())));
        let owner = Uuid::new_v4();
        let resp = app
            .oneshot(authed(
                "GET",
                &format!(
                    "/internal/analytics/owners/{owner}/trend?start_date=0001-01-01&end_date=9999-12-31"
                ),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_trend_falls_back_when_uncached() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        let day = chrono::NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();
        store.add_entry_on(owner, day, None, Some(0.4), &[]);
        let app = router(test_state(store));

        let resp = app
            .oneshot(authed(
                "GET",
                &format!(
                    "/internal/analytics/owners/{owner}/trend?start_date=2026-02-02&end_date=2026-02-04"
                ),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["points"].as_array().unwrap().len(), 3);
        assert_eq!(body["points"][1]["avg_score"], 0.4);
        assert_eq!(body["granularity"], "day");
    }

    #[tokio::test]
    async fn test_streak_for_unknown_owner_is_zero() {
        let app = router(test_state(Arc::new(MemoryStore::new())));
        let owner = Uuid::new_v4();
        let resp = app
            .oneshot(authed(
                "GET",
                &format!("/internal/analytics/owners/{owner}/streak"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["longest_streak"], 0);
    }
}
