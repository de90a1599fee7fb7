use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Pool shared by the scheduler, the streak worker and the HTTP handlers.
/// Each concurrent owner in a batch run holds at most one connection at a time.
pub async fn create_pool(database_url: &str, owner_concurrency: usize) -> Result<PgPool, sqlx::Error> {
    let max_connections = (owner_concurrency as u32).saturating_add(8).max(10);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}
