//! Process-based runtime implementation
//!
//! Jobs run as direct OS processes launched through a fixed invocation
//! template, e.g. `conda run -n <env> python <job>`.

use async_trait::async_trait;
use gpuq_core::{GpuqError, GpuqResult, JobConfig, Pid};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::traits::{JobExit, Runtime};

/// Process-based runtime configuration
#[derive(Debug, Clone)]
pub struct ProcessRuntimeConfig {
    /// Launcher executable
    pub program: String,
    /// Argument template with `{env}` and `{job}` placeholders
    pub args: Vec<String>,
    /// Named execution environment substituted for `{env}`
    pub environment: String,
}

impl Default for ProcessRuntimeConfig {
    fn default() -> Self {
        Self::from(&JobConfig::default())
    }
}

impl From<&JobConfig> for ProcessRuntimeConfig {
    fn from(config: &JobConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            environment: config.environment.clone(),
        }
    }
}

/// Process-based runtime for running jobs
pub struct ProcessRuntime {
    config: ProcessRuntimeConfig,
}

impl ProcessRuntime {
    /// Create a new process runtime
    pub fn new(config: ProcessRuntimeConfig) -> Self {
        Self { config }
    }

    /// Build the command that runs a job
    fn build_command(&self, job_path: &Path) -> Command {
        let mut cmd = Command::new(&self.config.program);

        let job = job_path.to_string_lossy();
        for arg in &self.config.args {
            cmd.arg(
                arg.replace("{env}", &self.config.environment)
                    .replace("{job}", &job),
            );
        }

        // Output is captured and thrown away; jobs never read a terminal
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        cmd
    }
}

#[async_trait]
impl Runtime for ProcessRuntime {
    async fn run_job(&self, job_path: &Path) -> GpuqResult<JobExit> {
        info!(
            job = %job_path.display(),
            environment = %self.config.environment,
            "Starting job process"
        );

        let output = self.build_command(job_path).output().await.map_err(|e| {
            error!(
                job = %job_path.display(),
                error = %e,
                "Failed to spawn job process"
            );
            GpuqError::Runtime(format!("Failed to spawn job: {}", e))
        })?;

        debug!(
            job = %job_path.display(),
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Job process exited"
        );

        Ok(JobExit {
            code: output.status.code(),
        })
    }

    async fn kill(&self, pid: Pid) -> GpuqResult<()> {
        info!(pid = pid, "Killing process");

        #[cfg(unix)]
        let output = Command::new("kill")
            .arg("-KILL")
            .arg(pid.to_string())
            .output()
            .await;

        #[cfg(windows)]
        let output = Command::new("taskkill")
            .arg("/PID")
            .arg(pid.to_string())
            .arg("/F")
            .output()
            .await;

        match output {
            Ok(o) if o.status.success() => Ok(()),
            Ok(o) => Err(GpuqError::Runtime(format!(
                "Failed to kill {}: {}",
                pid,
                String::from_utf8_lossy(&o.stderr).trim()
            ))),
            Err(e) => Err(GpuqError::Runtime(format!("Failed to kill {}: {}", pid, e))),
        }
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_process_runtime_config_default() {
        let config = ProcessRuntimeConfig::default();
        assert_eq!(config.program, "conda");
        assert_eq!(config.environment, "base");
    }

    #[test]
    fn test_build_command() {
        let runtime = ProcessRuntime::new(ProcessRuntimeConfig {
            program: "conda".to_string(),
            args: vec![
                "run".to_string(),
                "-n".to_string(),
                "{env}".to_string(),
                "python".to_string(),
                "{job}".to_string(),
            ],
            environment: "torch".to_string(),
        });

        let cmd = runtime.build_command(&PathBuf::from("/jobs/train.py"));
        let std_cmd = cmd.as_std();
        let args: Vec<_> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(std_cmd.get_program(), "conda");
        assert_eq!(args, vec!["run", "-n", "torch", "python", "/jobs/train.py"]);
        assert_eq!(runtime.name(), "process");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_job_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fail.sh");
        std::fs::write(&script, "echo noisy\nexit 3\n").unwrap();

        let runtime = ProcessRuntime::new(ProcessRuntimeConfig {
            program: "sh".to_string(),
            args: vec!["{job}".to_string()],
            environment: String::new(),
        });

        let exit = runtime.run_job(&script).await.unwrap();
        assert_eq!(exit.code, Some(3));
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn test_run_job_missing_launcher() {
        let runtime = ProcessRuntime::new(ProcessRuntimeConfig {
            program: "/nonexistent/gpuq-launcher".to_string(),
            args: vec!["{job}".to_string()],
            environment: String::new(),
        });

        let result = runtime.run_job(&PathBuf::from("job.py")).await;
        assert!(matches!(result, Err(GpuqError::Runtime(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_process() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let runtime = ProcessRuntime::new(ProcessRuntimeConfig::default());

        runtime.kill(child.id()).await.unwrap();

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(9));
    }
}
