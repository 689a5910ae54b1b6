//! gpuq-runtime: Runtime abstraction layer
//!
//! This crate provides the effectful edges of the scheduler:
//! - Process-based job launching and process termination
//! - Accelerator process table polling through `nvidia-smi`

pub mod monitor;
pub mod process;
pub mod traits;

pub use monitor::NvidiaSmiMonitor;
pub use process::{ProcessRuntime, ProcessRuntimeConfig};
pub use traits::{JobExit, ResourceMonitor, Runtime};
