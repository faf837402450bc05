use ignore::{DirEntry, WalkBuilder};
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, error, warn};

// markers written by `/usr/bin/time -v`
const USERTIME_STR: &str = "User time (seconds):";
const ELAPSTIME_STR: &str = "Elapsed (wall clock) time (h:mm:ss or m:ss): ";
const MAXMEM_STR: &str = "Maximum resident set size (kbytes): ";
// markers written by the shell `time` builtin in posix mode
const REAL_STR: &str = "real ";
const USER_STR: &str = "user ";

#[derive(Error, Debug)]
pub enum LogParseError {
    #[error("Failed to read log file")]
    Io(#[from] std::io::Error),
    #[error("Unparseable value in line {line:?}")]
    InvalidValue { line: String },
}

/// Resources consumed by a single task, as reported in its log
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    pub usertime: f64,
    pub walltime: f64,
    pub max_memory_kb: u64,
}

/// Counts, times and memory aggregated over a set of tasks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskStats {
    completed_task_count: usize,
    total_task_count: usize,
    total_cpu_walltime: f64,
    total_cpu_usertime: f64,
    total_tasks_with_cputimes: usize,
    total_memory_kb: f64,
    max_memory_kb: f64,
}

impl TaskStats {
    pub fn new(completed_task_count: usize, total_task_count: usize) -> Self {
        Self {
            completed_task_count,
            total_task_count,
            ..Self::default()
        }
    }

    /// Fold the usage of every task with a parsed log into the stats
    pub fn with_compute(mut self, usages: &[ResourceUsage]) -> Self {
        debug!("Found {} with compute times", usages.len());

        self.total_tasks_with_cputimes = usages.len();
        self.total_cpu_usertime = usages.iter().map(|usage| usage.usertime).sum();
        self.total_cpu_walltime = usages.iter().map(|usage| usage.walltime).sum();
        self.total_memory_kb = usages
            .iter()
            .map(|usage| usage.max_memory_kb as f64)
            .sum();
        self.max_memory_kb = usages
            .iter()
            .map(|usage| usage.max_memory_kb as f64)
            .fold(0.0, f64::max);

        self
    }

    pub fn completed_task_count(&self) -> usize {
        self.completed_task_count
    }

    pub fn total_task_count(&self) -> usize {
        self.total_task_count
    }

    pub fn total_cpu_walltime(&self) -> f64 {
        self.total_cpu_walltime
    }

    pub fn total_cpu_usertime(&self) -> f64 {
        self.total_cpu_usertime
    }

    pub fn total_tasks_with_cputimes(&self) -> usize {
        self.total_tasks_with_cputimes
    }

    pub fn total_memory_kb(&self) -> f64 {
        self.total_memory_kb
    }

    pub fn max_memory_kb(&self) -> f64 {
        self.max_memory_kb
    }
}

/// Every regular file below `path` (or `path` itself if it is a file)
pub fn files_in_directory(path: Option<&Path>) -> Vec<DirEntry> {
    let Some(path) = path else {
        error!("Path is None, returning nothing");

        return Vec::new();
    };

    let mut builder = WalkBuilder::new(path);
    // log directories are not source trees, look at everything
    builder
        .standard_filters(false)
        .follow_links(true)
        .sort_by_file_name(|a, b| a.cmp(b));

    builder
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!(error = ?error, "Failed to search for task logs: {error}");
                None
            }
        })
        .filter(|entry| entry.file_type().map_or(false, |kind| kind.is_file()))
        .collect()
}

/// Parse the resource usage reported in a single log file.
///
/// Recognized lines may appear anywhere; the last match of a field wins,
/// except for `Elapsed` lines which add up. Task output around them may hold
/// arbitrary bytes, lines are decoded lossily.
pub fn parse_resource_log(path: &Path) -> Result<ResourceUsage, LogParseError> {
    let content = fs::read(path)?;
    let mut usage = ResourceUsage::default();

    for raw_line in content.split(|byte| *byte == b'\n') {
        let decoded = String::from_utf8_lossy(raw_line);
        let line = decoded.trim_end_matches('\r');

        if line.contains(USERTIME_STR) {
            usage.usertime = value_after(line, ": ", 1)?;
        }
        if line.contains(MAXMEM_STR) {
            usage.max_memory_kb = value_after(line, "): ", 2)?;
        }
        if line.contains(ELAPSTIME_STR) {
            let raw: String = value_after(line, "): ", 2)?;
            usage.walltime += parse_clock_time(&raw).ok_or_else(|| invalid(line))?;
        }
        if let Some(seconds) = line.strip_prefix(REAL_STR) {
            usage.walltime = seconds.trim().parse().map_err(|_| invalid(line))?;
        }
        if let Some(seconds) = line.strip_prefix(USER_STR) {
            usage.usertime = seconds.trim().parse().map_err(|_| invalid(line))?;
        }
    }

    Ok(usage)
}

/// Usage of every task log below `dirpath` that reports a positive walltime
pub fn compute_usage_in_directory(dirpath: Option<&Path>) -> Vec<ResourceUsage> {
    files_in_directory(dirpath)
        .into_iter()
        .filter_map(|entry| {
            debug!(path = ?entry.path(), "Examining task log");

            match parse_resource_log(entry.path()) {
                Ok(usage) if usage.walltime > 0.0 => Some(usage),
                Ok(_) => {
                    debug!(path = ?entry.path(), "Parsed file had 0 walltime so skipping");
                    None
                }
                Err(error) => {
                    debug!(path = ?entry.path(), error = ?error, "Skipping unparseable log: {error}");
                    None
                }
            }
        })
        .collect()
}

fn invalid(line: &str) -> LogParseError {
    LogParseError::InvalidValue {
        line: line.to_owned(),
    }
}

/// parse whatever follows the first `marker` in `line`, skipping `offset` bytes
fn value_after<T: std::str::FromStr>(
    line: &str,
    marker: &str,
    offset: usize,
) -> Result<T, LogParseError> {
    line.find(marker)
        .and_then(|index| line.get(index + offset..))
        .and_then(|value| value.trim().parse().ok())
        .ok_or_else(|| invalid(line))
}

/// `H:MM:SS` or `M:SS` (seconds may be fractional) to seconds
fn parse_clock_time(raw: &str) -> Option<f64> {
    let parts = raw
        .split(':')
        .map(|part| part.parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;

    match parts.as_slice() {
        [hours, minutes, seconds] => Some(hours * 3600.0 + minutes * 60.0 + seconds),
        [minutes, seconds] => Some(minutes * 60.0 + seconds),
        _ => Some(0.0),
    }
}
