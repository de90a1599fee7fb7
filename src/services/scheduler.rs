use std::sync::Arc;
use tokio::time::MissedTickBehavior;

use crate::models::run::RunOutcome;
use crate::services::pipeline::AnalyticsPipeline;

/// Spawn the recurring analytics cycle. The first cycle runs immediately.
pub fn spawn_analytics_scheduler(pipeline: Arc<AnalyticsPipeline>) -> tokio::task::JoinHandle<()> {
    let period = pipeline.config().interval();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = period.as_secs(),
            window_days = pipeline.config().window_days,
            "Analytics scheduler started"
        );

        loop {
            interval.tick().await;
            match pipeline.run_scheduled_cycle().await {
                Ok(RunOutcome::Completed(report)) => {
                    if report.failures.total() > 0 {
                        tracing::warn!(
                            run_id = %report.run_id,
                            failures = report.failures.total(),
                            "Scheduled analytics cycle finished with failures"
                        );
                    }
                }
                Ok(RunOutcome::Skipped) => {
                    tracing::info!("Scheduled analytics cycle skipped: previous run still active");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Scheduled analytics cycle failed");
                }
            }
        }
    })
}
