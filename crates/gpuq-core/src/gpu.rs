//! Accelerator process table snapshot and `nvidia-smi` output parsing
//!
//! The parser depends on the section layout of `nvidia-smi`'s default
//! human-readable report:
//!
//! ```text
//! +-----------------------------------------------------------------------------+
//! | Processes:                                                                  |
//! |  GPU   GI   CI        PID   Type   Process name                  GPU Memory |
//! |        ID   ID                                                   Usage      |
//! |=============================================================================|
//! |    0   N/A  N/A      4242      C   python                            2048MiB |
//! +-----------------------------------------------------------------------------+
//! ```
//!
//! A report whose layout drifts from this is a parse failure, never an empty
//! snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{GpuqError, GpuqResult};

/// Consumer identifier (operating system process id)
pub type Pid = u32;

/// One row of the accelerator's process table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Device index
    pub gpu: u32,
    /// GPU instance id (MIG), if reported
    pub gpu_instance: Option<u32>,
    /// Compute instance id (MIG), if reported
    pub compute_instance: Option<u32>,
    /// Process id
    pub pid: Pid,
    /// Consumer kind (`C` compute, `G` graphics, `C+G`)
    pub kind: String,
    /// Process name as printed by the driver
    pub name: String,
    /// Memory used in MiB, if reported
    pub memory_mib: Option<u64>,
}

/// Processes currently holding the accelerator, keyed by pid.
///
/// Rebuilt wholesale on every poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    processes: BTreeMap<Pid, ProcessRecord>,
}

impl ResourceSnapshot {
    /// Create an empty snapshot
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from parsed records; a pid seen twice keeps its last row
    pub fn from_records(records: impl IntoIterator<Item = ProcessRecord>) -> Self {
        Self {
            processes: records.into_iter().map(|r| (r.pid, r)).collect(),
        }
    }

    /// Pids of all consumers in the snapshot
    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.processes.keys().copied()
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessRecord> {
        self.processes.get(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.processes.values()
    }
}

const PROCESSES_HEADER: &str = "Processes:";
const NO_PROCESSES: &str = "No running processes found";

/// Column layout of the process table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// `GPU GI CI PID Type Process-name Memory`
    WithInstances,
    /// `GPU PID Type Process-name Memory` (drivers without MIG columns)
    Legacy,
}

impl Layout {
    fn min_columns(self) -> usize {
        match self {
            Layout::WithInstances => 7,
            Layout::Legacy => 5,
        }
    }
}

/// Parse the process table out of a full `nvidia-smi` report
pub fn parse_process_table(output: &str) -> GpuqResult<ResourceSnapshot> {
    let lines: Vec<&str> = output.lines().map(str::trim).collect();

    let header = lines
        .iter()
        .position(|l| cell_text(l).starts_with(PROCESSES_HEADER))
        .ok_or_else(|| GpuqError::Parse("process table header not found".to_string()))?;

    if header == 0 || !is_separator(lines[header - 1]) {
        return Err(GpuqError::Parse(
            "process table header is not preceded by a separator".to_string(),
        ));
    }

    let rule = lines[header + 1..]
        .iter()
        .position(|l| l.starts_with("|="))
        .map(|i| header + 1 + i)
        .ok_or_else(|| GpuqError::Parse("process table column rule not found".to_string()))?;

    let layout = if lines[header + 1..rule]
        .iter()
        .any(|l| l.split_whitespace().any(|w| w == "GI"))
    {
        Layout::WithInstances
    } else {
        Layout::Legacy
    };

    let bottom = lines[rule + 1..]
        .iter()
        .position(|l| is_separator(l))
        .map(|i| rule + 1 + i)
        .ok_or_else(|| {
            GpuqError::Parse("process table bottom separator not found".to_string())
        })?;

    let mut records = Vec::new();
    for line in &lines[rule + 1..bottom] {
        let text = cell_text(line);
        if text.is_empty() || text.contains(NO_PROCESSES) {
            continue;
        }
        records.push(parse_row(text, layout)?);
    }

    Ok(ResourceSnapshot::from_records(records))
}

fn is_separator(line: &str) -> bool {
    line.starts_with("+-")
}

/// Strip the table border from a row
fn cell_text(line: &str) -> &str {
    let line = line.strip_prefix('|').unwrap_or(line);
    let line = line.strip_suffix('|').unwrap_or(line);
    line.trim()
}

fn parse_row(text: &str, layout: Layout) -> GpuqResult<ProcessRecord> {
    let cols: Vec<&str> = text.split_whitespace().collect();
    if cols.len() < layout.min_columns() {
        return Err(GpuqError::Parse(format!("malformed process row: {}", text)));
    }

    let (gpu_instance, compute_instance, rest) = match layout {
        Layout::WithInstances => (
            parse_optional(cols[1], text)?,
            parse_optional(cols[2], text)?,
            &cols[3..],
        ),
        Layout::Legacy => (None, None, &cols[1..]),
    };

    let memory = rest[rest.len() - 1];
    let memory_mib = if memory == "N/A" {
        None
    } else {
        Some(
            memory
                .strip_suffix("MiB")
                .and_then(|m| m.parse().ok())
                .ok_or_else(|| GpuqError::Parse(format!("bad memory column: {}", text)))?,
        )
    };

    Ok(ProcessRecord {
        gpu: parse_number(cols[0], text)?,
        gpu_instance,
        compute_instance,
        pid: parse_number(rest[0], text)?,
        kind: rest[1].to_string(),
        name: rest[2..rest.len() - 1].join(" "),
        memory_mib,
    })
}

fn parse_number(value: &str, row: &str) -> GpuqResult<u32> {
    value
        .parse()
        .map_err(|_| GpuqError::Parse(format!("expected a number, got '{}' in: {}", value, row)))
}

fn parse_optional(value: &str, row: &str) -> GpuqResult<Option<u32>> {
    if value == "N/A" {
        Ok(None)
    } else {
        parse_number(value, row).map(Some)
    }
}
