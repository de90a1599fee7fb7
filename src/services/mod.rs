pub mod daily_aggregate;
pub mod generator;
pub mod insight;
pub mod pipeline;
pub mod realtime;
pub mod scheduler;
pub mod streak;
pub mod tag_correlator;
pub mod trend;
