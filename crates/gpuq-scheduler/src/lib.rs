//! gpuq-scheduler: the gpuq control loop
//!
//! This crate composes the scheduler out of:
//! - Control file ingestion
//! - One-at-a-time job execution
//! - Reconciliation of accelerator users against the allow-list
//! - The Idle / Draining / Exiting supervisor

pub mod control;
pub mod reconciler;
pub mod runner;
pub mod supervisor;
pub mod timer;

#[cfg(test)]
pub(crate) mod testing;

pub use control::{ControlChannel, IngestReport, Notice};
pub use reconciler::{reconcile, ReconcileReport};
pub use runner::{JobRunner, RunOutcome};
pub use supervisor::{ExitReason, Phase, Supervisor};
pub use timer::{shutdown_channel, IdleTimer, ShutdownHandle, Wake};
