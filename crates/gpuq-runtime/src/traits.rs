//! Runtime trait definitions

use async_trait::async_trait;
use gpuq_core::{GpuqResult, Pid, ResourceSnapshot};
use std::path::Path;

/// How a job process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobExit {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
}

impl JobExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runtime trait for launching jobs and terminating processes
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Run a job to completion, discarding its output
    async fn run_job(&self, job_path: &Path) -> GpuqResult<JobExit>;

    /// Send an unconditional kill signal to a process
    async fn kill(&self, pid: Pid) -> GpuqResult<()>;

    /// Get the runtime name
    fn name(&self) -> &'static str;
}

/// Source of accelerator process snapshots
#[async_trait]
pub trait ResourceMonitor: Send + Sync {
    /// Take a fresh snapshot of the processes holding the accelerator
    async fn poll(&self) -> GpuqResult<ResourceSnapshot>;
}
