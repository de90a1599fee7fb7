#[cfg(test)]
pub mod memory;
pub mod pool;
pub mod postgres;
pub mod store;

pub use pool::create_pool;
pub use postgres::PgAnalyticsStore;
pub use store::AnalyticsStore;
