//! Accelerator monitor backed by `nvidia-smi`

use async_trait::async_trait;
use gpuq_core::{parse_process_table, GpuqError, GpuqResult, MonitorConfig, ResourceSnapshot};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::traits::ResourceMonitor;

/// Polls the process table printed by `nvidia-smi`
pub struct NvidiaSmiMonitor {
    command: PathBuf,
    args: Vec<String>,
}

impl NvidiaSmiMonitor {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

impl Default for NvidiaSmiMonitor {
    fn default() -> Self {
        Self::new(&MonitorConfig::default())
    }
}

#[async_trait]
impl ResourceMonitor for NvidiaSmiMonitor {
    async fn poll(&self) -> GpuqResult<ResourceSnapshot> {
        let output = Command::new(&self.command)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| {
                GpuqError::Monitor(format!(
                    "Failed to run {}: {}",
                    self.command.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(GpuqError::Monitor(format!(
                "{} exited with {}: {}",
                self.command.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let snapshot = parse_process_table(&String::from_utf8_lossy(&output.stdout))?;
        debug!(processes = snapshot.len(), "Polled accelerator");

        Ok(snapshot)
    }
}
