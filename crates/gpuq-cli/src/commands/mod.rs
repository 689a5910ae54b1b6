//! Command file construction and submission

use super::Commands;
use anyhow::{bail, Context};
use gpuq_core::{parse_bool, ArgList, CommandBatch, ControlConfig};
use std::path::{Path, PathBuf};

/// Build the command batch for a subcommand
pub fn batch_for(command: Commands) -> anyhow::Result<CommandBatch> {
    let mut batch = CommandBatch::default();

    match command {
        Commands::Add { jobs, front } => {
            if front {
                batch.enqueue_head = Some(ArgList::from(jobs));
            } else {
                batch.enqueue_tail = Some(ArgList::from(jobs));
            }
        }
        Commands::Remove { jobs } => {
            batch.dequeue_by_name = Some(ArgList::from(jobs));
        }
        Commands::Queue => {
            batch.read_queue = Some(serde_json::Value::Bool(true));
        }
        Commands::Exempt { pids } => {
            batch.add_exempt = Some(pid_args(&pids));
        }
        Commands::Unexempt { pids } => {
            batch.remove_exempt = Some(pid_args(&pids));
        }
        Commands::Background { enabled } => {
            if parse_bool(&enabled).is_none() {
                bail!("Invalid background mode '{}': expected true or false", enabled);
            }
            batch.set_background_mode = Some(ArgList::One(enabled));
        }
        Commands::Exit => {
            batch.request_exit = Some(serde_json::Value::Bool(true));
        }
        Commands::Info => {
            batch.show_help = Some(serde_json::Value::Bool(true));
        }
    }

    Ok(batch)
}

fn pid_args(pids: &[u32]) -> ArgList {
    ArgList::from(pids.iter().map(|p| p.to_string()).collect::<Vec<_>>())
}

/// Write a batch into the control directory.
///
/// The file is written under a temporary name private to this call and then
/// hard-linked to the first free `<base><n>.<ext>` name. Linking fails
/// instead of replacing an existing file, so concurrent submissions never
/// overwrite each other and the daemon never sees a partial command file.
pub fn submit(control: &ControlConfig, batch: &CommandBatch) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(&control.dir)
        .with_context(|| format!("creating {}", control.dir.display()))?;

    let content = batch.to_json()?;
    let now = chrono::Utc::now();
    let suffix = now.timestamp_millis();
    if suffix <= 0 {
        bail!("System clock is before the epoch");
    }

    let tmp = control.dir.join(format!(
        ".{}.{}.{}.tmp",
        control.base_name,
        std::process::id(),
        now.timestamp_nanos_opt().unwrap_or(suffix)
    ));
    std::fs::write(&tmp, content).with_context(|| format!("writing {}", tmp.display()))?;

    let published = publish(&tmp, control, suffix);
    if let Err(e) = std::fs::remove_file(&tmp) {
        tracing::debug!(path = %tmp.display(), error = %e, "Failed to remove temporary file");
    }
    let target = published?;

    tracing::debug!(path = %target.display(), "Submitted command file");
    Ok(target)
}

/// Link `tmp` to the first free command file name at or after `suffix`
fn publish(tmp: &Path, control: &ControlConfig, mut suffix: i64) -> anyhow::Result<PathBuf> {
    loop {
        let target = command_path(&control.dir, &control.base_name, suffix, &control.extension);
        match std::fs::hard_link(tmp, &target) {
            Ok(()) => return Ok(target),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("moving command into {}", target.display()))
            }
        }
    }
}

fn command_path(dir: &Path, base: &str, suffix: i64, extension: &str) -> PathBuf {
    dir.join(format!("{}{}.{}", base, suffix, extension))
}
