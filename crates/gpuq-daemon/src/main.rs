//! gpuq daemon
//!
//! Runs queued GPU jobs one at a time and kills anything that grabs the
//! accelerator without being exempted.

mod shutdown;

use anyhow::Context;
use clap::Parser;
use gpuq_core::{Job, SchedulerConfig};
use gpuq_runtime::{NvidiaSmiMonitor, ProcessRuntime, ProcessRuntimeConfig};
use gpuq_scheduler::{shutdown_channel, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// gpuqd - serialize GPU jobs on a single machine
#[derive(Parser, Debug)]
#[command(name = "gpuqd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Jobs to queue at startup
    jobs: Vec<String>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory scanned for control files
    #[arg(long)]
    control_dir: Option<PathBuf>,

    /// Execution environment jobs run in
    #[arg(long)]
    environment: Option<String>,

    /// Keep running when the queue is empty
    #[arg(long)]
    background: bool,

    /// Seconds between idle polls
    #[arg(long)]
    idle_interval: Option<f64>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<SchedulerConfig> {
        let mut config = match &self.config {
            Some(path) => SchedulerConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SchedulerConfig::default(),
        };

        if let Some(dir) = &self.control_dir {
            config.control.dir = dir.clone();
        }
        if let Some(env) = &self.environment {
            config.job.environment = env.clone();
        }
        if self.background {
            config.supervisor.background_mode = true;
        }
        if let Some(secs) = self.idle_interval {
            config.supervisor.idle_interval_secs = secs;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }

        Ok(config)
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    init_logging(&config.logging.level)?;

    info!("Starting gpuq daemon v{}", env!("CARGO_PKG_VERSION"));
    info!(
        control_dir = %config.control.dir.display(),
        background = config.supervisor.background_mode,
        "Watching for control files"
    );

    let (handle, shutdown) = shutdown_channel();
    shutdown::install(handle);

    let monitor = Arc::new(NvidiaSmiMonitor::new(&config.monitor));
    let runtime = Arc::new(ProcessRuntime::new(ProcessRuntimeConfig::from(&config.job)));
    let jobs = args.jobs.iter().map(|j| Job::from(j.as_str())).collect();

    let result = match Supervisor::start(&config, jobs, monitor, runtime, shutdown).await {
        Ok(supervisor) => supervisor.run().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(reason) => {
            info!(reason = ?reason, "gpuq daemon stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "gpuq daemon aborted");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "gpuqd",
            "--background",
            "--control-dir",
            "/run/gpuq",
            "--idle-interval",
            "2.5",
            "a.py",
            "b.py",
        ]);
        let config = args.load_config().unwrap();

        assert!(config.supervisor.background_mode);
        assert_eq!(config.control.dir, PathBuf::from("/run/gpuq"));
        assert_eq!(config.supervisor.idle_interval_secs, 2.5);
        assert_eq!(args.jobs, vec!["a.py", "b.py"]);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_config_file_fails() {
        let args = Args::parse_from(["gpuqd", "--config", "/nonexistent/gpuq.toml"]);
        assert!(args.load_config().is_err());
    }
}
