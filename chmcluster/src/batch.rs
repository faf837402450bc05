use crate::job::BATCH_TASK_ID;
use ini::Ini;
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, warn};

/// Suffix a previous batch configuration is moved to
pub const OLD_SUFFIX: &str = ".old";

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("configfile passed in cannot be null")]
    InvalidConfigFile,
    #[error("task list cannot be None")]
    InvalidTaskList,
    #[error("Failed to write batched job config")]
    Io(#[from] std::io::Error),
    #[error("Failed to read batched job config: {0}")]
    Ini(#[from] ini::Error),
}

/// Writes the list of batches (array job elements) a runner works through.
///
/// Each batch is a section named after its 1-based index holding the
/// comma separated ids of the tasks run on one node.
#[derive(Debug, Clone)]
pub struct BatchedTasksListGenerator {
    tasks_per_node: usize,
}

impl BatchedTasksListGenerator {
    pub fn new(tasks_per_node: usize) -> Self {
        if tasks_per_node == 0 {
            warn!("tasks_per_node of 0 requested, using 1 task per batch");
        }

        Self {
            tasks_per_node: tasks_per_node.max(1),
        }
    }

    pub fn tasks_per_node(&self) -> usize {
        self.tasks_per_node
    }

    /// Write `task_list` batched by `tasks_per_node` into `configfile`.
    ///
    /// Returns the number of batches, i.e. the number of array job elements
    /// that need to be run. An empty task list writes nothing.
    #[tracing::instrument(level = "debug", skip(self, task_list))]
    pub fn write_batched_config(
        &self,
        configfile: Option<&Path>,
        task_list: Option<&[String]>,
    ) -> Result<usize, BatchError> {
        let configfile = configfile.ok_or(BatchError::InvalidConfigFile)?;
        let task_list = task_list.ok_or(BatchError::InvalidTaskList)?;

        if task_list.is_empty() {
            debug!("All tasks complete");

            return Ok(0);
        }

        let mut bconfig = Ini::new();
        let mut batch_count = 0;

        for (index, batch) in task_list.chunks(self.tasks_per_node).enumerate() {
            bconfig
                .with_section(Some((index + 1).to_string()))
                .set(BATCH_TASK_ID, batch.join(","));
            batch_count += 1;
        }

        self.write_batched_task_config(&bconfig, configfile)?;

        Ok(batch_count)
    }

    fn write_batched_task_config(&self, bconfig: &Ini, configfile: &Path) -> Result<(), BatchError> {
        if configfile.is_file() {
            debug!("Previous batched job config file found. Appending {OLD_SUFFIX} suffix");
            fs::rename(configfile, old_path(configfile))?;
        }

        debug!(path = ?configfile, "Writing batched job config file");
        bconfig.write_to_file(configfile)?;

        Ok(())
    }
}

/// `<configfile>.old`
pub fn old_path(configfile: &Path) -> PathBuf {
    let mut path = OsString::from(configfile.as_os_str());
    path.push(OLD_SUFFIX);

    PathBuf::from(path)
}

/// Read a batch configuration back as (batch id, task ids) in batch order
pub fn load_batched_config(configfile: &Path) -> Result<Vec<(String, Vec<String>)>, BatchError> {
    let bconfig = Ini::load_from_file(configfile)?;

    Ok(bconfig
        .iter()
        .filter_map(|(section, properties)| {
            section.map(|name| {
                let tasks = properties
                    .get(BATCH_TASK_ID)
                    .map(|tasks| {
                        tasks
                            .split(',')
                            .filter(|task| !task.is_empty())
                            .map(str::to_owned)
                            .collect()
                    })
                    .unwrap_or_default();

                (name.to_owned(), tasks)
            })
        })
        .collect())
}
