//! gpuq CLI
//!
//! Command-line interface that talks to a running gpuq daemon by dropping
//! command files into its control directory.

mod commands;

use clap::{Parser, Subcommand};
use gpuq_core::SchedulerConfig;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// gpuq - queue GPU jobs for the gpuq daemon
#[derive(Parser, Debug)]
#[command(name = "gpuq")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Daemon configuration file (for the control directory settings)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Control directory, overrides the configuration file
    #[arg(long, global = true)]
    control_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue jobs
    Add {
        /// Job paths, relative to the daemon's job directory
        #[arg(required = true)]
        jobs: Vec<String>,

        /// Move the jobs to the front of the queue
        #[arg(long)]
        front: bool,
    },

    /// Remove every occurrence of jobs from the queue
    Remove {
        #[arg(required = true)]
        jobs: Vec<String>,
    },

    /// Ask the daemon to print its queue
    Queue,

    /// Protect processes from being killed
    Exempt {
        #[arg(required = true)]
        pids: Vec<u32>,
    },

    /// Stop protecting processes
    Unexempt {
        #[arg(required = true)]
        pids: Vec<u32>,
    },

    /// Switch background mode (keep running on an empty queue)
    Background {
        /// true/false, yes/no, on/off
        enabled: String,
    },

    /// Ask the daemon to exit after the running job
    Exit,

    /// Ask the daemon to print its control file help
    Info,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let mut control = match &cli.config {
        Some(path) => SchedulerConfig::from_file(path)?.control,
        None => SchedulerConfig::default().control,
    };
    if let Some(dir) = cli.control_dir {
        control.dir = dir;
    }

    let batch = commands::batch_for(cli.command)?;
    let path = commands::submit(&control, &batch)?;
    println!("Submitted {}", path.display());

    Ok(())
}
