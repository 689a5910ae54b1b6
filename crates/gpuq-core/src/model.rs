//! Job, queue, allow-list and scheduler state definitions

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

use crate::gpu::{Pid, ResourceSnapshot};

/// A queued job, identified only by its path or name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Job(String);

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Job {
    fn from(name: &str) -> Self {
        Job::new(name)
    }
}

impl From<String> for Job {
    fn from(name: String) -> Self {
        Job(name)
    }
}

/// Ordered job list.
///
/// Duplicates are allowed; the same job may be queued several times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQueue {
    jobs: VecDeque<Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append jobs to the end of the queue, keeping their order
    pub fn enqueue_tail(&mut self, jobs: impl IntoIterator<Item = Job>) {
        self.jobs.extend(jobs);
    }

    /// Promote jobs to the front of the queue.
    ///
    /// Every existing entry equal to one of the promoted jobs is dropped, so
    /// the promoted jobs appear exactly where they were put. Duplicates of
    /// other jobs are left alone.
    pub fn enqueue_head(&mut self, jobs: Vec<Job>) {
        let rest: Vec<Job> = std::mem::take(&mut self.jobs)
            .into_iter()
            .filter(|j| !jobs.contains(j))
            .collect();
        let mut promoted = VecDeque::from(jobs);
        promoted.extend(rest);
        self.jobs = promoted;
    }

    /// Remove every entry equal to `job`, returning how many were removed
    pub fn remove_all(&mut self, job: &Job) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|j| j != job);
        before - self.jobs.len()
    }

    /// Pop the job at the head of the queue
    pub fn pop_front(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Job names in queue order
    pub fn names(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.name().to_string()).collect()
    }
}

impl FromIterator<Job> for JobQueue {
    fn from_iter<T: IntoIterator<Item = Job>>(iter: T) -> Self {
        Self {
            jobs: iter.into_iter().collect(),
        }
    }
}

/// Pids that the reconciler must never kill
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    pids: BTreeSet<Pid>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow every consumer present in a snapshot
    pub fn from_snapshot(snapshot: &ResourceSnapshot) -> Self {
        Self {
            pids: snapshot.pids().collect(),
        }
    }

    pub fn extend(&mut self, pids: impl IntoIterator<Item = Pid>) {
        self.pids.extend(pids);
    }

    pub fn remove(&mut self, pid: Pid) -> bool {
        self.pids.remove(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.pids.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pids.iter().copied()
    }

    /// Pids in `snapshot` that are not allowed
    pub fn unauthorized(&self, snapshot: &ResourceSnapshot) -> Vec<Pid> {
        snapshot.pids().filter(|p| !self.contains(*p)).collect()
    }
}

impl FromIterator<Pid> for AllowList {
    fn from_iter<T: IntoIterator<Item = Pid>>(iter: T) -> Self {
        Self {
            pids: iter.into_iter().collect(),
        }
    }
}

/// Everything the supervisor owns between cycles
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    /// Pending jobs
    pub queue: JobQueue,
    /// Consumers exempt from reconciliation
    pub allow_list: AllowList,
    /// Most recent accelerator snapshot
    pub snapshot: ResourceSnapshot,
    /// Keep running on an empty queue
    pub background_mode: bool,
    /// Set once an exit has been requested
    pub exit_requested: bool,
}

impl SchedulerState {
    /// Create state seeded from the accelerator as it looks at startup.
    ///
    /// Everything already running is assumed legitimate.
    pub fn new(initial: ResourceSnapshot, background_mode: bool) -> Self {
        Self {
            queue: JobQueue::new(),
            allow_list: AllowList::from_snapshot(&initial),
            snapshot: initial,
            background_mode,
            exit_requested: false,
        }
    }

    /// Make `snapshot` current and protect exactly the consumers in it.
    ///
    /// Pids missing from `snapshot` lose their exemption, so a pid reused by
    /// a later process is not protected by its predecessor's entry.
    pub fn rebaseline(&mut self, snapshot: ResourceSnapshot) {
        self.allow_list = AllowList::from_snapshot(&snapshot);
        self.snapshot = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::ProcessRecord;

    fn jobs(names: &[&str]) -> Vec<Job> {
        names.iter().map(|n| Job::from(*n)).collect()
    }

    fn queue(names: &[&str]) -> JobQueue {
        jobs(names).into_iter().collect()
    }

    fn record(pid: Pid) -> ProcessRecord {
        ProcessRecord {
            gpu: 0,
            gpu_instance: None,
            compute_instance: None,
            pid,
            kind: "C".to_string(),
            name: "python".to_string(),
            memory_mib: Some(100),
        }
    }

    #[test]
    fn test_enqueue_tail_preserves_order() {
        let mut q = queue(&["a.py", "b.py"]);
        q.enqueue_tail(jobs(&["c.py", "a.py"]));
        assert_eq!(q.names(), vec!["a.py", "b.py", "c.py", "a.py"]);
    }

    #[test]
    fn test_enqueue_head_promotes_and_dedups_promoted_only() {
        let mut q = queue(&["a.py", "b.py", "c.py", "b.py", "d.py", "d.py"]);
        q.enqueue_head(jobs(&["c.py", "b.py"]));
        assert_eq!(q.names(), vec!["c.py", "b.py", "a.py", "d.py", "d.py"]);
    }

    #[test]
    fn test_enqueue_head_on_empty_queue() {
        let mut q = JobQueue::new();
        q.enqueue_head(jobs(&["x.py"]));
        assert_eq!(q.names(), vec!["x.py"]);
    }

    #[test]
    fn test_remove_all_is_idempotent() {
        let mut q = queue(&["a.py", "b.py", "a.py"]);
        assert_eq!(q.remove_all(&Job::from("a.py")), 2);
        let once = q.clone();
        assert_eq!(q.remove_all(&Job::from("a.py")), 0);
        assert_eq!(q, once);
        assert_eq!(q.names(), vec!["b.py"]);
    }

    #[test]
    fn test_pop_front() {
        let mut q = queue(&["a.py", "b.py"]);
        assert_eq!(q.pop_front(), Some(Job::from("a.py")));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_unauthorized() {
        let snapshot = ResourceSnapshot::from_records(vec![record(1), record(2), record(3)]);
        let allow: AllowList = [2].into_iter().collect();
        assert_eq!(allow.unauthorized(&snapshot), vec![1, 3]);
    }

    #[test]
    fn test_state_seeds_allow_list() {
        let snapshot = ResourceSnapshot::from_records(vec![record(10), record(20)]);
        let state = SchedulerState::new(snapshot, true);
        assert!(state.allow_list.contains(10));
        assert!(state.allow_list.contains(20));
        assert!(state.background_mode);
        assert!(!state.exit_requested);
    }

    #[test]
    fn test_rebaseline_protects_fresh_snapshot() {
        let mut state = SchedulerState::new(ResourceSnapshot::from_records(vec![record(5)]), true);
        let snapshot = ResourceSnapshot::from_records(vec![record(5), record(8)]);

        state.rebaseline(snapshot.clone());

        assert!(snapshot.pids().all(|p| state.allow_list.contains(p)));
        assert_eq!(state.allow_list.len(), 2);
        assert_eq!(state.snapshot, snapshot);
    }

    #[test]
    fn test_rebaseline_drops_exited_pids() {
        let mut state = SchedulerState::new(ResourceSnapshot::from_records(vec![record(7)]), true);
        state.allow_list.extend([9]);

        state.rebaseline(ResourceSnapshot::from_records(vec![record(8)]));

        assert!(!state.allow_list.contains(7));
        assert!(!state.allow_list.contains(9));
        assert!(state.allow_list.contains(8));
    }
}
