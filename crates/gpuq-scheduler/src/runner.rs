//! Runs the job at the head of the queue

use gpuq_core::{ExitStatusPolicy, Job, JobConfig, SchedulerState};
use gpuq_runtime::{JobExit, Runtime};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// What a call to [`JobRunner::run_next`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The queue was empty
    Idle,
    /// No artifact exists for the job; it was dropped
    Discarded(Job),
    /// The launcher could not be started; the job was dropped
    LaunchFailed(Job),
    /// The job ran to completion, successfully or not
    Completed { job: Job, exit: JobExit },
}

/// Executes queued jobs one at a time
pub struct JobRunner {
    base_dir: PathBuf,
    exit_status: ExitStatusPolicy,
}

impl JobRunner {
    pub fn new(config: &JobConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            exit_status: config.exit_status,
        }
    }

    pub fn exit_status_policy(&self) -> ExitStatusPolicy {
        self.exit_status
    }

    /// Pop the head of the queue and run it, blocking until it exits.
    ///
    /// A job whose artifact is missing is dropped without a diagnostic beyond
    /// a debug log; it is not requeued.
    pub async fn run_next(&self, state: &mut SchedulerState, runtime: &dyn Runtime) -> RunOutcome {
        let Some(job) = state.queue.pop_front() else {
            return RunOutcome::Idle;
        };

        let path = self.base_dir.join(job.name());
        if tokio::fs::metadata(&path).await.is_err() {
            debug!(job = %job, path = %path.display(), "Job artifact missing, dropping");
            return RunOutcome::Discarded(job);
        }

        info!(job = %job, remaining = state.queue.len(), "Running job");

        let exit = match runtime.run_job(&path).await {
            Ok(exit) => exit,
            Err(e) => {
                warn!(job = %job, error = %e, "Job could not be launched");
                return RunOutcome::LaunchFailed(job);
            }
        };

        match self.exit_status {
            ExitStatusPolicy::Discard => {}
            ExitStatusPolicy::Log => {
                if !exit.success() {
                    warn!(job = %job, code = ?exit.code, "Job exited unsuccessfully");
                }
            }
        }

        info!(job = %job, "Job finished");
        RunOutcome::Completed { job, exit }
    }
}
