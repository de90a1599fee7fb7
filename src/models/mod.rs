pub mod aggregate;
pub mod entry;
pub mod insight;
pub mod run;
pub mod streak;
pub mod tag_stat;
pub mod trend;
