//! Top-level Idle / Draining / Exiting state machine
//!
//! The supervisor owns the [`SchedulerState`] and drives every other
//! component in strict sequence. A running job blocks the loop: command
//! files and reconciliation are handled only between jobs.
//!
//! ```text
//!            queue empty, background          queue non-empty
//!   Idle  <-------------------------  Draining  <------------  Idle
//!                                        |
//!                                        | queue empty, foreground / exit requested
//!                                        v
//!                                     Exiting
//! ```
//!
//! An exit request is checked after every step, so it is honored promptly
//! but never interrupts a job already running.

use gpuq_core::{GpuqResult, Job, SchedulerConfig, SchedulerState, HELP_TEXT};
use gpuq_runtime::{ResourceMonitor, Runtime};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::control::{ControlChannel, Notice};
use crate::reconciler::reconcile;
use crate::runner::JobRunner;
use crate::timer::{IdleTimer, Wake};

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Queue empty in background mode; polling for commands
    Idle,
    /// Running queued jobs one at a time
    Draining,
    /// Terminal
    Exiting,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Draining => write!(f, "Draining"),
            Phase::Exiting => write!(f, "Exiting"),
        }
    }
}

/// Why the supervisor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A control file requested exit
    Requested,
    /// The queue ran dry outside background mode
    Drained,
    /// A shutdown signal was received
    Interrupted,
}

/// The scheduler's control loop
pub struct Supervisor {
    state: SchedulerState,
    phase: Phase,
    exit_reason: ExitReason,
    interrupted: bool,
    control: ControlChannel,
    runner: JobRunner,
    timer: IdleTimer,
    monitor: Arc<dyn ResourceMonitor>,
    runtime: Arc<dyn Runtime>,
}

impl Supervisor {
    /// Take the startup baseline and read pending command files.
    ///
    /// Everything on the accelerator at this point is exempt from
    /// reconciliation. Fails if the accelerator cannot be queried.
    pub async fn start(
        config: &SchedulerConfig,
        jobs: Vec<Job>,
        monitor: Arc<dyn ResourceMonitor>,
        runtime: Arc<dyn Runtime>,
        shutdown: watch::Receiver<bool>,
    ) -> GpuqResult<Self> {
        let control = ControlChannel::new(&config.control);
        control.prepare().await?;

        let baseline = monitor.poll().await?;
        info!(
            protected = baseline.len(),
            runtime = runtime.name(),
            "Baseline taken"
        );

        let mut state = SchedulerState::new(baseline, config.supervisor.background_mode);
        state.queue.enqueue_tail(jobs);

        let mut supervisor = Self {
            state,
            phase: Phase::Draining,
            exit_reason: ExitReason::Drained,
            interrupted: false,
            control,
            runner: JobRunner::new(&config.job),
            timer: IdleTimer::new(config.supervisor.idle_interval(), shutdown),
            monitor,
            runtime,
        };

        supervisor.ingest().await;
        supervisor.phase = if supervisor.exit_pending() {
            Phase::Exiting
        } else if supervisor.state.queue.is_empty() && supervisor.state.background_mode {
            supervisor.enter_idle();
            Phase::Idle
        } else {
            Phase::Draining
        };

        Ok(supervisor)
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run until Exiting
    pub async fn run(mut self) -> GpuqResult<ExitReason> {
        loop {
            let phase = self.step().await?;
            debug!(phase = %phase, queued = self.state.queue.len(), "Cycle finished");
            if phase == Phase::Exiting {
                return Ok(self.exit_reason);
            }
        }
    }

    /// Run one cycle of the current state and return the next state
    pub async fn step(&mut self) -> GpuqResult<Phase> {
        match self.phase {
            Phase::Idle => self.idle_cycle().await?,
            Phase::Draining => self.drain_cycle().await?,
            Phase::Exiting => {}
        }
        Ok(self.phase)
    }

    async fn idle_cycle(&mut self) -> GpuqResult<()> {
        if self.timer.wait().await == Wake::Shutdown {
            debug!("Idle wait interrupted");
        }
        if self.exit_pending() {
            return Ok(());
        }

        // Anything that started while we were idle is presumed legitimate
        let snapshot = self.monitor.poll().await?;
        self.state.rebaseline(snapshot);

        self.ingest().await;
        if self.exit_pending() {
            return Ok(());
        }

        if !self.state.queue.is_empty() {
            info!(queued = self.state.queue.len(), "Leaving idle");
            self.phase = Phase::Draining;
        } else if !self.state.background_mode {
            self.exit(ExitReason::Drained);
        }
        Ok(())
    }

    async fn drain_cycle(&mut self) -> GpuqResult<()> {
        let outcome = self
            .runner
            .run_next(&mut self.state, self.runtime.as_ref())
            .await;
        debug!(outcome = ?outcome, "Run step finished");
        if self.exit_pending() {
            return Ok(());
        }

        self.ingest().await;
        if self.exit_pending() {
            return Ok(());
        }

        let report = reconcile(&mut self.state, self.monitor.as_ref(), self.runtime.as_ref()).await?;
        if !report.failed.is_empty() {
            warn!(pids = ?report.failed, "Some unauthorized processes survived");
        }
        if self.exit_pending() {
            return Ok(());
        }

        if self.state.queue.is_empty() {
            if self.state.background_mode {
                self.enter_idle();
                self.phase = Phase::Idle;
            } else {
                self.exit(ExitReason::Drained);
            }
        }
        Ok(())
    }

    async fn ingest(&mut self) {
        let report = self.control.ingest(&mut self.state).await;
        if !report.is_empty() {
            debug!(
                applied = report.applied,
                rejected = report.rejected.len(),
                "Control files ingested"
            );
        }
        for notice in &report.notices {
            if let Some(text) = render_notice(notice) {
                println!("{}", text);
            }
        }
    }

    /// Fold a shutdown signal into the exit flag; true if the loop must stop
    fn exit_pending(&mut self) -> bool {
        if self.timer.shutdown_requested() && !self.state.exit_requested {
            info!("Shutdown signal received");
            self.state.exit_requested = true;
            self.interrupted = true;
        }

        if self.state.exit_requested {
            let reason = if self.interrupted {
                ExitReason::Interrupted
            } else {
                ExitReason::Requested
            };
            self.exit(reason);
            true
        } else {
            false
        }
    }

    fn enter_idle(&self) {
        info!(
            interval = ?self.timer.interval(),
            "Queue empty, idling"
        );
    }

    fn exit(&mut self, reason: ExitReason) {
        info!(reason = ?reason, queued = self.state.queue.len(), "Exiting");
        self.phase = Phase::Exiting;
        self.exit_reason = reason;
    }
}

/// Console text for a notice; problems are already logged
fn render_notice(notice: &Notice) -> Option<String> {
    match notice {
        Notice::Queue(jobs) if jobs.is_empty() => Some("Queue is empty".to_string()),
        Notice::Queue(jobs) => Some(format!("Queue ({}): {}", jobs.len(), jobs.join(", "))),
        Notice::Help => Some(HELP_TEXT.to_string()),
        Notice::InvalidBackgroundMode(_) | Notice::InvalidPid(_) => None,
    }
}
