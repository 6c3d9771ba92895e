//! Cron-triggered full recompute.

use apalis::prelude::*;
use tracing::{info, warn};

use super::queue::{BackgroundTask, RecomputeTrigger, SubmitOutcome, TaskQueue};

/// Marker struct for the cron-triggered recompute.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct ScheduledRecomputeJob;

impl From<chrono::DateTime<chrono::Utc>> for ScheduledRecomputeJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct RecomputeScheduleContext {
    pub tasks: TaskQueue,
}

/// Hand the recompute to the background queue so scheduled and API-triggered
/// runs share the same coalescing.
pub async fn process_scheduled_recompute(
    _job: ScheduledRecomputeJob,
    ctx: Data<RecomputeScheduleContext>,
) -> Result<(), apalis::prelude::Error> {
    let outcome = ctx.tasks.submit(BackgroundTask::RecalculateAll {
        trigger: RecomputeTrigger::Schedule,
    });
    match outcome {
        SubmitOutcome::Queued => {
            info!(target = "trendline::jobs", "Scheduled recompute queued");
        }
        SubmitOutcome::Coalesced => {}
        SubmitOutcome::Dropped | SubmitOutcome::Closed => {
            warn!(
                target = "trendline::jobs",
                outcome = ?outcome,
                "Scheduled recompute was not queued"
            );
        }
    }
    Ok(())
}
