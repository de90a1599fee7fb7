//! Real-time streak updates triggered by entry mutations.
//!
//! Handlers submit a job and return immediately; a single worker task drains
//! the queue and recomputes the owner's streak. Errors are logged only. A job
//! dropped because the queue is full is repaired by the next batch cycle.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::AnalyticsConfig;
use crate::db::AnalyticsStore;
use crate::services::streak::recompute_streak;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryEvent {
    Created,
    Deleted,
}

impl EntryEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StreakJob {
    user_id: Uuid,
    event: EntryEvent,
}

#[derive(Clone)]
pub struct StreakUpdater {
    tx: mpsc::Sender<StreakJob>,
}

impl StreakUpdater {
    pub fn spawn(store: Arc<dyn AnalyticsStore>, config: AnalyticsConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.streak_queue_capacity.max(1));
        let handle = tokio::spawn(run_worker(rx, store, config));
        (Self { tx }, handle)
    }

    /// Queue a recompute for `user_id` without waiting for it. Returns false
    /// when the job could not be queued.
    pub fn notify(&self, user_id: Uuid, event: EntryEvent) -> bool {
        match self.tx.try_send(StreakJob { user_id, event }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(user_id = %user_id, event = event.as_str(), "Streak update queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(user_id = %user_id, event = event.as_str(), "Streak update worker stopped, dropping job");
                false
            }
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<StreakJob>,
    store: Arc<dyn AnalyticsStore>,
    config: AnalyticsConfig,
) {
    while let Some(job) = rx.recv().await {
        match recompute_streak(store.as_ref(), job.user_id, config.today()).await {
            Ok(streak) => {
                tracing::debug!(
                    user_id = %job.user_id,
                    event = job.event.as_str(),
                    current = streak.current_streak,
                    longest = streak.longest_streak,
                    "Real-time streak update applied"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    user_id = %job.user_id,
                    event = job.event.as_str(),
                    "Real-time streak update failed"
                );
            }
        }
    }
    tracing::info!("Streak update worker stopped");
}
