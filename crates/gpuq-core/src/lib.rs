//! gpuq-core: Core types for the gpuq job serializer
//!
//! This crate provides the fundamental types used throughout gpuq:
//! - Job queue, allow-list and scheduler state
//! - Control command batches and their precedence
//! - `nvidia-smi` process table parsing
//! - Configuration types
//! - Error handling

pub mod command;
pub mod config;
pub mod error;
pub mod gpu;
pub mod model;

pub use command::*;
pub use config::*;
pub use error::*;
pub use gpu::*;
pub use model::*;
