mod queue;
mod recompute;

pub use queue::{
    BackgroundTask, RecomputeTrigger, SubmitOutcome, TaskQueue, TaskReceiver, TaskWorkerHandle,
    spawn_task_worker, task_queue,
};
pub use recompute::{RecomputeScheduleContext, ScheduledRecomputeJob, process_scheduled_recompute};
