//! In-memory runtime and monitor used by the scheduler tests

use async_trait::async_trait;
use gpuq_core::{GpuqError, GpuqResult, Pid, ProcessRecord, ResourceSnapshot};
use gpuq_runtime::{JobExit, ResourceMonitor, Runtime};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

type RunHook = Box<dyn Fn(&Path) + Send + Sync>;

/// Processes currently on the fake accelerator
#[derive(Clone, Default)]
pub struct FakeGpu {
    pids: Arc<Mutex<BTreeSet<Pid>>>,
}

impl FakeGpu {
    pub fn with_pids(pids: &[Pid]) -> Self {
        let gpu = Self::default();
        gpu.start(pids);
        gpu
    }

    pub fn start(&self, pids: &[Pid]) {
        self.pids.lock().unwrap().extend(pids.iter().copied());
    }

    /// The processes exit on their own
    pub fn stop(&self, pids: &[Pid]) {
        let mut live = self.pids.lock().unwrap();
        for pid in pids {
            live.remove(pid);
        }
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.pids.lock().unwrap().iter().copied().collect()
    }

    fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot::from_records(self.pids().into_iter().map(|pid| ProcessRecord {
            gpu: 0,
            gpu_instance: None,
            compute_instance: None,
            pid,
            kind: "C".to_string(),
            name: format!("proc-{}", pid),
            memory_mib: Some(256),
        }))
    }

    fn kill(&self, pid: Pid) -> bool {
        self.pids.lock().unwrap().remove(&pid)
    }
}

pub struct FakeMonitor {
    gpu: FakeGpu,
    fail: bool,
    polls: Mutex<usize>,
}

impl FakeMonitor {
    pub fn new(gpu: FakeGpu) -> Self {
        Self {
            gpu,
            fail: false,
            polls: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(FakeGpu::default())
        }
    }

    pub fn polls(&self) -> usize {
        *self.polls.lock().unwrap()
    }
}

#[async_trait]
impl ResourceMonitor for FakeMonitor {
    async fn poll(&self) -> GpuqResult<ResourceSnapshot> {
        *self.polls.lock().unwrap() += 1;
        if self.fail {
            return Err(GpuqError::Monitor("driver not loaded".to_string()));
        }
        Ok(self.gpu.snapshot())
    }
}

pub struct FakeRuntime {
    gpu: FakeGpu,
    exit_code: i32,
    fail_launch: bool,
    spawns: Vec<Pid>,
    hook: Option<RunHook>,
    runs: Mutex<Vec<PathBuf>>,
    kills: Mutex<Vec<Pid>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::on(FakeGpu::default())
    }

    pub fn on(gpu: FakeGpu) -> Self {
        Self {
            gpu,
            exit_code: 0,
            fail_launch: false,
            spawns: Vec::new(),
            hook: None,
            runs: Mutex::new(Vec::new()),
            kills: Mutex::new(Vec::new()),
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    /// Every job run leaves these pids behind on the accelerator
    pub fn spawning(mut self, pids: &[Pid]) -> Self {
        self.spawns = pids.to_vec();
        self
    }

    /// Called while each job "runs"
    pub fn with_hook(mut self, hook: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn runs(&self) -> Vec<PathBuf> {
        self.runs.lock().unwrap().clone()
    }

    pub fn kills(&self) -> Vec<Pid> {
        self.kills.lock().unwrap().clone()
    }
}

#[async_trait]
impl Runtime for FakeRuntime {
    async fn run_job(&self, job_path: &Path) -> GpuqResult<JobExit> {
        if self.fail_launch {
            return Err(GpuqError::Runtime("launcher not found".to_string()));
        }
        self.runs.lock().unwrap().push(job_path.to_path_buf());
        if let Some(hook) = &self.hook {
            hook(job_path);
        }
        self.gpu.start(&self.spawns);
        Ok(JobExit {
            code: Some(self.exit_code),
        })
    }

    async fn kill(&self, pid: Pid) -> GpuqResult<()> {
        self.kills.lock().unwrap().push(pid);
        if self.gpu.kill(pid) {
            Ok(())
        } else {
            Err(GpuqError::Runtime(format!("no such process: {}", pid)))
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
