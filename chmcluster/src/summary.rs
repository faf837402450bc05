pub mod format;

use self::format::{
    float_to_string, float_to_string_1dp, float_to_string_with_unitprefix, number_to_string,
    percent_complete, years_to_string,
};
use crate::{
    checker::TaskRole,
    config::JobSettings,
    job::JobConfig,
    stats::{compute_usage_in_directory, files_in_directory, TaskStats},
};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Count, size and dimensions of the input images of a job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageStatsSummary {
    image_count: u64,
    total_size_bytes: u64,
    // (width, height) -> number of images, None if dimensions were never read
    dimensions: Option<BTreeMap<(u32, u32), u64>>,
}

impl ImageStatsSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image_stats(&mut self, size_bytes: u64, dimensions: Option<(u32, u32)>) {
        self.image_count += 1;
        self.total_size_bytes += size_bytes;

        if let Some(dimensions) = dimensions {
            *self
                .dimensions
                .get_or_insert_with(BTreeMap::new)
                .entry(dimensions)
                .or_default() += 1;
        }
    }

    pub fn image_count(&self) -> u64 {
        self.image_count
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.total_size_bytes
    }

    pub fn dimensions(&self) -> Option<&BTreeMap<(u32, u32), u64>> {
        self.dimensions.as_ref()
    }
}

/// Human readable summary of a CHM job.
///
/// All text is rendered on construction, the summary never changes afterwards.
#[derive(Debug, Clone)]
pub struct TaskSummary {
    settings: Option<JobSettings>,
    chm_task_stats: Option<TaskStats>,
    merge_task_stats: Option<TaskStats>,
    chm_task_summary: String,
    chm_compute_summary: String,
    merge_task_summary: String,
    merge_compute_summary: String,
    image_summary: String,
}

impl TaskSummary {
    pub fn new(
        settings: Option<JobSettings>,
        chm_task_stats: Option<TaskStats>,
        merge_task_stats: Option<TaskStats>,
        image_stats_summary: Option<&ImageStatsSummary>,
    ) -> Self {
        Self {
            chm_task_summary: summary_from_task_stats(chm_task_stats.as_ref()),
            chm_compute_summary: compute_summary_from_task_stats(
                TaskRole::Chm.label(),
                chm_task_stats.as_ref(),
            ),
            merge_task_summary: summary_from_task_stats(merge_task_stats.as_ref()),
            merge_compute_summary: compute_summary_from_task_stats(
                TaskRole::Merge.label(),
                merge_task_stats.as_ref(),
            ),
            image_summary: input_image_summary(image_stats_summary),
            settings,
            chm_task_stats,
            merge_task_stats,
        }
    }

    pub fn chm_task_stats(&self) -> Option<&TaskStats> {
        self.chm_task_stats.as_ref()
    }

    pub fn merge_task_stats(&self) -> Option<&TaskStats> {
        self.merge_task_stats.as_ref()
    }

    /// The whole summary as multi-line text
    pub fn get_summary(&self) -> String {
        let Some(ref settings) = self.settings else {
            warn!("Job settings missing in TaskSummary so skipping output of job details");

            return format!(
                "CHM tasks: {}\nMerge tasks: {}\n",
                self.chm_task_summary, self.merge_task_summary
            );
        };

        format!(
            "chmcluster version: {}\n\
             Tiles: {} with {} overlap\n\
             Disable histogram equalization in CHM: {}\n\
             Tasks: {} tiles per task, {} tasks(s) per node\n\
             Trained CHM model: {}\n\
             CHM binary: {}\n\n\
             {}\
             CHM tasks: {}{}\n\
             Merge tasks: {}{}\n",
            settings.version,
            settings.tile_size,
            settings.overlap_size,
            settings.disable_histogram_eq,
            settings.tiles_per_task,
            settings.tasks_per_node,
            settings.model,
            settings.chm_binary,
            self.image_summary,
            self.chm_task_summary,
            self.chm_compute_summary,
            self.merge_task_summary,
            self.merge_compute_summary,
        )
    }
}

/// `#% complete (# of # completed)`
fn summary_from_task_stats(task_stats: Option<&TaskStats>) -> String {
    let Some(task_stats) = task_stats else {
        return "NA".to_owned();
    };

    let total = task_stats.total_task_count();
    if total == 0 {
        return "Total number of tasks is <= 0".to_owned();
    }

    let completed = task_stats.completed_task_count();

    format!(
        "{} complete ({} of {} completed)",
        percent_complete(completed, total),
        number_to_string(completed as u64),
        number_to_string(total as u64)
    )
}

/// Runtime, memory and CPU consumption lines, empty without compute data
fn compute_summary_from_task_stats(prefix: &str, task_stats: Option<&TaskStats>) -> String {
    let Some(task_stats) = task_stats else {
        warn!("No task stats for {prefix}, unable to calculate CPU consumption");

        return String::new();
    };

    let with_cputimes = task_stats.total_tasks_with_cputimes();
    if with_cputimes == 0 {
        info!("No tasks with cpu times found");

        return String::new();
    }
    let with_cputimes = with_cputimes as f64;

    let avg_hours_per_task = task_stats.total_cpu_walltime() / with_cputimes / 3600.0;
    let avg_mem_gb = task_stats.total_memory_kb() / with_cputimes / 1_000_000.0;

    let usertime = task_stats.total_cpu_usertime();
    let total_user_hours = usertime / 3600.0;
    let total_user_years = total_user_hours / 24.0 / 365.0;
    let avg_compute_hours_per_task = usertime / with_cputimes / 3600.0;

    let remaining = task_stats
        .total_task_count()
        .saturating_sub(task_stats.completed_task_count());
    let (remain_hours, remain_years) = if remaining > 0 {
        let remain_compute_hours = avg_compute_hours_per_task * remaining as f64;

        (
            float_to_string_1dp(remain_compute_hours),
            years_to_string(remain_compute_hours / 24.0 / 365.0),
        )
    } else {
        ("NA".to_owned(), "NA".to_owned())
    };

    format!(
        "\n{prefix} runtime: {} hours per task ({}GB ram)\n\
         {prefix} CPU consumption so far: {} CPU hours (~{} years)\n\
         {prefix} estimated remaining compute: {remain_hours} CPU hours (~{remain_years} years)\n",
        float_to_string_1dp(avg_hours_per_task),
        float_to_string(avg_mem_gb),
        float_to_string_1dp(total_user_hours),
        years_to_string(total_user_years),
    )
}

/// Most common `W x H`, flagged if images differ in size
fn image_dimensions_from_map(dimensions: Option<&BTreeMap<(u32, u32), u64>>) -> String {
    let Some(dimensions) = dimensions else {
        return "No image dimension data found".to_owned();
    };

    match dimensions.len() {
        0 => "Image dimension data empty".to_owned(),
        1 => {
            let (width, height) = dimensions.keys().next().copied().unwrap_or_default();

            format!(
                "{} x {}",
                number_to_string(width.into()),
                number_to_string(height.into())
            )
        }
        _ => {
            // ties go to the last dimension seen
            let ((width, height), count) = dimensions.iter().fold(
                ((0, 0), 0),
                |best, (dims, count)| {
                    if *count >= best.1 {
                        (*dims, *count)
                    } else {
                        best
                    }
                },
            );

            format!(
                "{} x {} *Only {} images have this dimension",
                number_to_string(width.into()),
                number_to_string(height.into()),
                number_to_string(count)
            )
        }
    }
}

fn input_image_summary(image_stats_summary: Option<&ImageStatsSummary>) -> String {
    let Some(image_stats_summary) = image_stats_summary else {
        info!("ImageStatsSummary is None, not outputting stats");

        return String::new();
    };

    format!(
        "Number input images: {} ({}bytes)\nDimensions of images: {}\n\n",
        number_to_string(image_stats_summary.image_count()),
        float_to_string_with_unitprefix(image_stats_summary.total_size_bytes()),
        image_dimensions_from_map(image_stats_summary.dimensions())
    )
}

/// Examines a CHM job and builds its `TaskSummary`
pub struct TaskSummaryFactory<'a> {
    settings: Option<&'a JobSettings>,
    chm_config: Option<&'a dyn JobConfig>,
    merge_config: Option<&'a dyn JobConfig>,
    chm_incomplete_tasks: Option<&'a [String]>,
    merge_incomplete_tasks: Option<&'a [String]>,
    output_compute: bool,
}

impl<'a> TaskSummaryFactory<'a> {
    pub fn new(
        settings: Option<&'a JobSettings>,
        chm_config: Option<&'a dyn JobConfig>,
        merge_config: Option<&'a dyn JobConfig>,
    ) -> Self {
        Self {
            settings,
            chm_config,
            merge_config,
            chm_incomplete_tasks: None,
            merge_incomplete_tasks: None,
            output_compute: false,
        }
    }

    pub fn with_chm_incomplete_tasks(mut self, tasks: &'a [String]) -> Self {
        self.chm_incomplete_tasks = Some(tasks);
        self
    }

    pub fn with_merge_incomplete_tasks(mut self, tasks: &'a [String]) -> Self {
        self.merge_incomplete_tasks = Some(tasks);
        self
    }

    /// also account compute consumed and summarize the input images
    pub fn with_output_compute(mut self, output_compute: bool) -> Self {
        self.output_compute = output_compute;
        self
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn get_task_summary(&self) -> TaskSummary {
        TaskSummary::new(
            self.settings.cloned(),
            Some(self.task_stats(TaskRole::Chm)),
            Some(self.task_stats(TaskRole::Merge)),
            self.image_stats_summary().as_ref(),
        )
    }

    fn task_stats(&self, role: TaskRole) -> TaskStats {
        let (config, incomplete_tasks) = match role {
            TaskRole::Chm => (self.chm_config, self.chm_incomplete_tasks),
            TaskRole::Merge => (self.merge_config, self.merge_incomplete_tasks),
        };

        let total = config.map_or(0, |config| config.sections().len());
        debug!("Total {} task count: {total}", role.label());

        // an unknown incomplete list counts as nothing incomplete
        let completed = match incomplete_tasks {
            Some(incomplete_tasks) => total.saturating_sub(incomplete_tasks.len()),
            None => {
                debug!(
                    "No incomplete {} task list given, treating all tasks as complete",
                    role.label()
                );
                total
            }
        };

        let stats = TaskStats::new(completed, total);
        if !self.output_compute {
            return stats;
        }

        let stdout_dir = self.settings.map(|settings| match role {
            TaskRole::Chm => settings.stdout_dir(),
            TaskRole::Merge => settings.merge_stdout_dir(),
        });
        if stdout_dir.is_none() {
            error!("Unable to get output directory, skipping examining of compute hours consumed");
        }

        stats.with_compute(&compute_usage_in_directory(stdout_dir.as_deref()))
    }

    fn image_stats_summary(&self) -> Option<ImageStatsSummary> {
        if !self.output_compute {
            debug!("Skipping analysis of input image data");

            return None;
        }

        let mut summary = ImageStatsSummary::new();
        let Some(images) = self.settings.and_then(|settings| settings.images.as_deref()) else {
            error!("No input image path set");

            return Some(summary);
        };

        if !images.is_dir() {
            error!(path = ?images, "Input image path not a directory");

            return Some(summary);
        }

        for entry in files_in_directory(Some(images)) {
            match entry.metadata() {
                Ok(metadata) => summary.add_image_stats(metadata.len(), None),
                Err(error) => warn!(path = ?entry.path(), "Unable to stat image: {error}"),
            }
        }

        Some(summary)
    }
}
