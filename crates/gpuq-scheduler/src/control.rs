//! Drop-in control file ingestion
//!
//! Files named `<base>[N].<ext>` in the control directory are claimed by
//! renaming them to `<name>.claimed`, decoded, applied to the scheduler state
//! and deleted. Delivery is at-most-once best effort: a claimed file is never
//! picked up again, even if the process dies before deleting it.
//!
//! Files are processed in directory-listing order. A numeric suffix does not
//! imply processing order.

use gpuq_core::{
    parse_bool, CommandBatch, ControlCommand, ControlConfig, GpuqResult, Job, SchedulerState,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CLAIMED_SUFFIX: &str = "claimed";
const REJECTED_SUFFIX: &str = "rejected";

/// Output requested by, or problems found in, a command batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// `read_queue`: queue contents at the time the command ran
    Queue(Vec<String>),
    /// `show_help` / `info`
    Help,
    /// `set_background_mode` value that is not boolean-like
    InvalidBackgroundMode(String),
    /// Exemption identifier that is not a pid
    InvalidPid(String),
}

/// Result of one ingestion pass
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Number of files whose commands were applied
    pub applied: usize,
    /// Files that could not be decoded
    pub rejected: Vec<PathBuf>,
    /// Notices in the order they were produced
    pub notices: Vec<Notice>,
}

impl IngestReport {
    pub fn is_empty(&self) -> bool {
        self.applied == 0 && self.rejected.is_empty()
    }
}

/// Reader of drop-in command files
pub struct ControlChannel {
    dir: PathBuf,
    base_name: String,
    extension: String,
}

impl ControlChannel {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            base_name: config.base_name.clone(),
            extension: config.extension.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the control directory if it does not exist
    pub async fn prepare(&self) -> GpuqResult<()> {
        if !self.dir.exists() {
            tokio::fs::create_dir_all(&self.dir).await?;
            info!(path = %self.dir.display(), "Created control directory");
        }
        Ok(())
    }

    /// Whether `file_name` is a command file: base name, optional positive
    /// integer, extension
    pub fn matches(&self, file_name: &str) -> bool {
        let Some(stem) = file_name
            .strip_suffix(self.extension.as_str())
            .and_then(|s| s.strip_suffix('.'))
        else {
            return false;
        };
        let Some(suffix) = stem.strip_prefix(self.base_name.as_str()) else {
            return false;
        };

        suffix.is_empty()
            || (suffix.bytes().all(|b| b.is_ascii_digit())
                && suffix.parse::<u64>().map_or(false, |n| n > 0))
    }

    /// Command files currently waiting, in directory-listing order
    async fn pending(&self) -> GpuqResult<Vec<PathBuf>> {
        let mut files = Vec::new();

        if !self.dir.exists() {
            return Ok(files);
        }

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_str().map_or(false, |n| self.matches(n)) {
                files.push(entry.path());
            }
        }

        Ok(files)
    }

    /// Apply every pending command file to `state`.
    ///
    /// Never fails: problems with individual files are logged and reported.
    pub async fn ingest(&self, state: &mut SchedulerState) -> IngestReport {
        let mut report = IngestReport::default();

        let files = match self.pending().await {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    path = %self.dir.display(),
                    error = %e,
                    "Failed to list control directory"
                );
                return report;
            }
        };

        for path in files {
            self.ingest_file(&path, state, &mut report).await;
        }

        report
    }

    async fn ingest_file(&self, path: &Path, state: &mut SchedulerState, report: &mut IngestReport) {
        let claimed = with_suffix(path, CLAIMED_SUFFIX);
        if let Err(e) = tokio::fs::rename(path, &claimed).await {
            // Another reader or the writer removed it first
            debug!(path = %path.display(), error = %e, "Control file vanished before claim");
            return;
        }

        let batch = match tokio::fs::read_to_string(&claimed).await {
            Ok(content) => CommandBatch::from_json(&content),
            Err(e) => Err(e.into()),
        };

        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Rejecting control file");
                let rejected = with_suffix(path, REJECTED_SUFFIX);
                if let Err(e) = tokio::fs::rename(&claimed, &rejected).await {
                    warn!(path = %claimed.display(), error = %e, "Failed to set aside control file");
                }
                report.rejected.push(path.to_path_buf());
                return;
            }
        };

        let commands = batch.into_commands();
        info!(
            path = %path.display(),
            commands = commands.len(),
            "Applying control file"
        );
        for command in commands {
            apply(command, state, &mut report.notices);
        }

        if let Err(e) = tokio::fs::remove_file(&claimed).await {
            warn!(path = %claimed.display(), error = %e, "Failed to remove applied control file");
        }
        report.applied += 1;
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Apply one command to the scheduler state
pub fn apply(command: ControlCommand, state: &mut SchedulerState, notices: &mut Vec<Notice>) {
    match command {
        ControlCommand::AddExempt(ids) => {
            let pids = parse_pids(ids, notices);
            info!(pids = ?pids, "Exempting processes");
            state.allow_list.extend(pids);
        }
        ControlCommand::RemoveExempt(ids) => {
            let pids = parse_pids(ids, notices);
            info!(pids = ?pids, "Removing exemptions");
            for pid in pids {
                state.allow_list.remove(pid);
            }
        }
        ControlCommand::ReadQueue => {
            notices.push(Notice::Queue(state.queue.names()));
        }
        ControlCommand::EnqueueTail(names) => {
            info!(jobs = ?names, "Appending jobs");
            state.queue.enqueue_tail(names.into_iter().map(Job::from));
        }
        ControlCommand::EnqueueHead(names) => {
            info!(jobs = ?names, "Promoting jobs");
            state
                .queue
                .enqueue_head(names.into_iter().map(Job::from).collect());
        }
        ControlCommand::DequeueByName(names) => {
            for name in names {
                let removed = state.queue.remove_all(&Job::from(name.as_str()));
                info!(job = %name, removed = removed, "Dequeued job");
            }
        }
        ControlCommand::SetBackgroundMode(value) => match parse_bool(&value) {
            Some(enabled) => {
                info!(enabled = enabled, "Background mode changed");
                state.background_mode = enabled;
            }
            None => {
                warn!(value = %value, "Ignoring unparseable background mode");
                notices.push(Notice::InvalidBackgroundMode(value));
            }
        },
        ControlCommand::ShowHelp => notices.push(Notice::Help),
        ControlCommand::RequestExit => {
            info!("Exit requested");
            state.exit_requested = true;
        }
    }
}

fn parse_pids(ids: Vec<String>, notices: &mut Vec<Notice>) -> Vec<u32> {
    let mut pids = Vec::with_capacity(ids.len());
    for id in ids {
        match id.trim().parse() {
            Ok(pid) => pids.push(pid),
            Err(_) => {
                warn!(id = %id, "Ignoring invalid pid");
                notices.push(Notice::InvalidPid(id));
            }
        }
    }
    pids
}
