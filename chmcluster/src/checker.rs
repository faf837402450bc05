use crate::job::{
    resolve_output_path, JobConfig, CHM_OUTPUT_IMAGE, JOB_DIR, MERGE_INPUT_TILE_DIR,
    MERGE_OUTPUT_IMAGE,
};
use itertools::Itertools;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};
use tracing::{debug, error, info, warn};

/// The two kinds of tasks a CHM job consists of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRole {
    Chm,
    Merge,
}

impl TaskRole {
    /// key holding the output image of a task of this role
    pub fn output_key(&self) -> &'static str {
        match self {
            Self::Chm => CHM_OUTPUT_IMAGE,
            Self::Merge => MERGE_OUTPUT_IMAGE,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Chm => "CHM",
            Self::Merge => "Merge",
        }
    }
}

/// Infers which tasks of a job are incomplete by looking for their outputs
pub struct TaskChecker<'a> {
    config: &'a dyn JobConfig,
    role: TaskRole,
}

impl<'a> TaskChecker<'a> {
    pub fn new(config: &'a dyn JobConfig, role: TaskRole) -> Self {
        Self { config, role }
    }

    pub fn chm(config: &'a dyn JobConfig) -> Self {
        Self::new(config, TaskRole::Chm)
    }

    pub fn merge(config: &'a dyn JobConfig) -> Self {
        Self::new(config, TaskRole::Merge)
    }

    /// Task ids whose output image is not a regular file, in declared order
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn get_incomplete_tasks_list(&self) -> Vec<String> {
        let job_dir = self.config.job_dir();

        if job_dir.is_none() {
            error!("No {JOB_DIR} in configuration, using output paths as given");
        }

        let sections = self.config.sections();
        let task_list = sections
            .iter()
            .filter(|section| {
                match self.config.get(section, self.role.output_key()) {
                    Some(out_file) => {
                        let out_file = resolve_output_path(job_dir.as_deref(), &out_file);
                        debug!(path = ?out_file, "Checking if image file exists");

                        !out_file.is_file()
                    }
                    None => {
                        warn!(
                            task = section.as_str(),
                            "Task has no {}, counting it as incomplete",
                            self.role.output_key()
                        );

                        true
                    }
                }
            })
            .cloned()
            .collect_vec();

        info!(
            "Found {} of {} to be incomplete tasks",
            task_list.len(),
            sections.len()
        );

        task_list
    }
}

/// Whether a merge task can be started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Blocked(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// reason the task can't run, `None` if it can
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Ready => None,
            Self::Blocked(reason) => Some(reason),
        }
    }
}

/// Maps merge tasks onto the CHM tasks producing their input tiles.
///
/// A CHM task feeds a merge task if its output image lies directly in the
/// merge task's input tile directory.
#[derive(Debug, Clone)]
pub struct MergeTaskDependencies {
    // merge task id -> tile directory (None if undeclared) and CHM task ids
    lookup: BTreeMap<String, (Option<PathBuf>, Vec<String>)>,
    incomplete_chm_tasks: BTreeSet<String>,
}

impl MergeTaskDependencies {
    pub fn new(
        chm_config: &dyn JobConfig,
        merge_config: &dyn JobConfig,
        incomplete_chm_tasks: &[String],
    ) -> Self {
        Self {
            lookup: Self::build_lookup_table(chm_config, merge_config),
            incomplete_chm_tasks: incomplete_chm_tasks.iter().cloned().collect(),
        }
    }

    fn build_lookup_table(
        chm_config: &dyn JobConfig,
        merge_config: &dyn JobConfig,
    ) -> BTreeMap<String, (Option<PathBuf>, Vec<String>)> {
        let chm_job_dir = chm_config.job_dir();
        let merge_job_dir = merge_config.job_dir();

        // tile directory -> CHM tasks writing into it
        let mut producers: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
        for section in chm_config.sections() {
            let Some(out_file) = chm_config.get(&section, CHM_OUTPUT_IMAGE) else {
                continue;
            };
            let out_file = resolve_output_path(chm_job_dir.as_deref(), &out_file);

            if let Some(parent) = out_file.parent() {
                producers
                    .entry(parent.to_path_buf())
                    .or_default()
                    .push(section);
            }
        }

        merge_config
            .sections()
            .into_iter()
            .map(|section| {
                let tile_dir = merge_config
                    .get(&section, MERGE_INPUT_TILE_DIR)
                    .map(|dir| resolve_output_path(merge_job_dir.as_deref(), &dir));
                let chm_tasks = tile_dir
                    .as_ref()
                    .and_then(|dir| producers.get(dir).cloned())
                    .unwrap_or_default();

                debug!(
                    merge_task = section.as_str(),
                    tile_dir = ?tile_dir,
                    "Merge task depends on {} CHM task(s)",
                    chm_tasks.len()
                );

                (section, (tile_dir, chm_tasks))
            })
            .collect()
    }

    /// CHM tasks `taskid` depends on, `None` for an unknown merge task
    pub fn chm_tasks_for(&self, taskid: &str) -> Option<&[String]> {
        self.lookup
            .get(taskid)
            .map(|(_, chm_tasks)| chm_tasks.as_slice())
    }

    /// Check if the merge task `taskid` can run now
    pub fn can_task_be_run(&self, taskid: &str) -> Readiness {
        let Some((tile_dir, chm_tasks)) = self.lookup.get(taskid) else {
            return Readiness::Blocked(format!("No merge task with id {taskid}"));
        };

        if tile_dir.is_none() {
            return Readiness::Blocked(format!(
                "Merge task {taskid} has no {MERGE_INPUT_TILE_DIR}"
            ));
        }

        let blocking = chm_tasks
            .iter()
            .filter(|task| self.incomplete_chm_tasks.contains(*task))
            .collect_vec();

        if blocking.is_empty() {
            Readiness::Ready
        } else {
            Readiness::Blocked(format!(
                "{} CHM task(s) not complete: {}",
                blocking.len(),
                blocking.iter().join(",")
            ))
        }
    }
}
