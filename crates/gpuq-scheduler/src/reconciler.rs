//! Enforcement of the allow-list against the accelerator's process table
//!
//! Every process holding the accelerator that is not on the allow-list is
//! killed outright: no grace period, no confirmation. A process that starts
//! and exits between two reconciliations is never seen.

use gpuq_core::{GpuqResult, Pid, SchedulerState};
use gpuq_runtime::{ResourceMonitor, Runtime};
use tracing::{debug, info, warn};

/// Outcome of one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Unauthorized processes that were killed
    pub killed: Vec<Pid>,
    /// Unauthorized processes the kill signal could not be delivered to
    pub failed: Vec<Pid>,
}

/// Refresh the snapshot and kill every consumer not on the allow-list.
///
/// Only a monitor failure is returned as an error.
pub async fn reconcile(
    state: &mut SchedulerState,
    monitor: &dyn ResourceMonitor,
    runtime: &dyn Runtime,
) -> GpuqResult<ReconcileReport> {
    state.snapshot = monitor.poll().await?;

    let unauthorized = state.allow_list.unauthorized(&state.snapshot);
    let mut report = ReconcileReport::default();

    if unauthorized.is_empty() {
        debug!(processes = state.snapshot.len(), "No unauthorized processes");
        return Ok(report);
    }

    for pid in unauthorized {
        let name = state
            .snapshot
            .get(pid)
            .map(|r| r.name.clone())
            .unwrap_or_default();

        match runtime.kill(pid).await {
            Ok(()) => {
                info!(pid = pid, name = %name, "Killed unauthorized process");
                report.killed.push(pid);
            }
            Err(e) => {
                warn!(pid = pid, name = %name, error = %e, "Failed to kill unauthorized process");
                report.failed.push(pid);
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGpu, FakeMonitor, FakeRuntime};
    use gpuq_core::{AllowList, GpuqError};

    #[tokio::test]
    async fn test_survivors_are_allowed_processes() {
        let gpu = FakeGpu::with_pids(&[1, 2, 3, 4]);
        let monitor = FakeMonitor::new(gpu.clone());
        let runtime = FakeRuntime::on(gpu.clone());
        let mut state = SchedulerState {
            allow_list: [2, 4, 9].into_iter().collect::<AllowList>(),
            ..SchedulerState::default()
        };

        let report = reconcile(&mut state, &monitor, &runtime).await.unwrap();

        assert_eq!(report.killed, vec![1, 3]);
        assert!(report.failed.is_empty());
        assert_eq!(gpu.pids(), vec![2, 4]);
        assert_eq!(state.snapshot.len(), 4);
    }

    #[tokio::test]
    async fn test_nothing_to_kill() {
        let gpu = FakeGpu::with_pids(&[5]);
        let monitor = FakeMonitor::new(gpu.clone());
        let runtime = FakeRuntime::on(gpu.clone());
        let mut state = SchedulerState {
            allow_list: [5].into_iter().collect::<AllowList>(),
            ..SchedulerState::default()
        };

        let report = reconcile(&mut state, &monitor, &runtime).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert!(runtime.kills().is_empty());
    }

    #[tokio::test]
    async fn test_kill_failure_is_not_fatal() {
        let monitor = FakeMonitor::new(FakeGpu::with_pids(&[7]));
        // The runtime sees a different accelerator, so the kill misses
        let runtime = FakeRuntime::new();
        let mut state = SchedulerState::default();

        let report = reconcile(&mut state, &monitor, &runtime).await.unwrap();
        assert!(report.killed.is_empty());
        assert_eq!(report.failed, vec![7]);
    }

    #[tokio::test]
    async fn test_monitor_failure_propagates() {
        let monitor = FakeMonitor::failing();
        let runtime = FakeRuntime::new();
        let mut state = SchedulerState::default();

        let result = reconcile(&mut state, &monitor, &runtime).await;
        assert!(matches!(result, Err(GpuqError::Monitor(_))));
    }
}
