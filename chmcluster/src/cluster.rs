use crate::{
    checker::TaskRole,
    config::JobSettings,
    job::{CHECK_CHM_JOB, CHM_RUNNER, MERGE_RUNNER},
    scheduler::{Backend, ScriptError, ScriptRequest, Scheduler},
};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

const SUBMIT_SCRIPT_PREFIX: &str = "runjobs.";
const MERGE_SUBMIT_SCRIPT_PREFIX: &str = "runmerge.";

/// The clusters CHM jobs are known to run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterKind {
    Rocce,
    Gordon,
    Comet,
}

impl ClusterKind {
    pub const ALL: [ClusterKind; 3] = [Self::Rocce, Self::Gordon, Self::Comet];

    /// Case-insensitive lookup, logs unsupported names
    pub fn from_name(name: &str) -> Option<Self> {
        let lc_cluster = name.to_lowercase();
        let kind = Self::ALL
            .into_iter()
            .find(|kind| kind.name() == lc_cluster);

        if kind.is_none() {
            error!("No cluster class supporting {lc_cluster} found");
        }

        kind
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rocce => "rocce",
            Self::Gordon => "gordon",
            Self::Comet => "comet",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            Self::Rocce => "Rocce",
            Self::Gordon => "Gordon",
            Self::Comet => "Comet",
        }
    }

    pub fn default_tasks_per_node(&self) -> usize {
        match self {
            Self::Rocce => 1,
            Self::Gordon => 8,
            Self::Comet => 16,
        }
    }

    pub fn default_merge_tasks_per_node(&self) -> usize {
        match self {
            Self::Rocce => 1,
            Self::Gordon => 6,
            Self::Comet => 10,
        }
    }

    /// largest array job the scheduler of the cluster accepts in one submission
    pub fn max_tasks_per_array_job(&self) -> Option<usize> {
        match self {
            Self::Gordon => Some(1000),
            Self::Rocce | Self::Comet => None,
        }
    }

    /// The scheduler setup of the cluster, without an account
    pub fn scheduler(&self) -> Scheduler {
        match self {
            Self::Rocce => Scheduler::new(Backend::Sge, self.name()).with_queue("all.q"),
            Self::Gordon => Scheduler::new(Backend::Pbs, self.name())
                .with_queue("normal")
                .with_singularity_cmd("module load singularity/2.2\n"),
            Self::Comet => Scheduler::new(Backend::Slurm, self.name())
                .with_queue("compute")
                .with_singularity_cmd("module load singularity/2.3.2\n"),
        }
    }
}

/// Submit scripts with fixed names (`runjobs.<cluster>`, `runmerge.<cluster>`)
/// in the output directory of a job, plus the commands to submit them.
#[derive(Debug, Clone)]
pub struct Cluster {
    kind: ClusterKind,
    scheduler: Scheduler,
    settings: Option<JobSettings>,
}

impl Cluster {
    pub fn new(kind: ClusterKind) -> Self {
        Self {
            kind,
            scheduler: kind.scheduler(),
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: JobSettings) -> Self {
        self.set_settings(settings);
        self
    }

    pub fn set_settings(&mut self, settings: JobSettings) {
        self.scheduler.set_account(settings.account.clone());
        self.settings = Some(settings);
    }

    pub fn kind(&self) -> ClusterKind {
        self.kind
    }

    /// name of the cluster
    pub fn cluster(&self) -> &'static str {
        self.kind.name()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn submit_script_name(&self) -> String {
        format!("{SUBMIT_SCRIPT_PREFIX}{}", self.kind.name())
    }

    pub fn merge_submit_script_name(&self) -> String {
        format!("{MERGE_SUBMIT_SCRIPT_PREFIX}{}", self.kind.name())
    }

    /// `tasks_per_node` if it is a positive number, the cluster default otherwise
    pub fn get_suggested_tasks_per_node(&self, tasks_per_node: Option<&str>) -> usize {
        suggested_tasks_per_node(tasks_per_node, self.kind.default_tasks_per_node())
    }

    pub fn get_suggested_merge_tasks_per_node(&self, tasks_per_node: Option<&str>) -> usize {
        suggested_tasks_per_node(tasks_per_node, self.kind.default_merge_tasks_per_node())
    }

    /// The `checkchmjob.py` invocation a user runs to resubmit incomplete tasks
    pub fn get_checkchmjob_command(&self) -> Result<String, ScriptError> {
        let settings = self.settings()?;

        Ok(format!(
            "{} \"{}\" --submit",
            script_bin_path(Some(settings), CHECK_CHM_JOB).display(),
            settings.out_dir.display()
        ))
    }

    pub fn chm_runner_path(&self) -> PathBuf {
        script_bin_path(self.settings.as_ref(), CHM_RUNNER)
    }

    pub fn merge_runner_path(&self) -> PathBuf {
        script_bin_path(self.settings.as_ref(), MERGE_RUNNER)
    }

    pub fn submit_script_path(&self) -> PathBuf {
        self.script_path(TaskRole::Chm)
    }

    pub fn merge_submit_script_path(&self) -> PathBuf {
        self.script_path(TaskRole::Merge)
    }

    /// Command submitting `number_jobs` batches of CHM tasks
    pub fn get_chm_submit_command(&self, number_jobs: usize) -> Result<String, ScriptError> {
        self.submit_command(TaskRole::Chm, number_jobs)
    }

    /// Command submitting `number_jobs` batches of merge tasks
    pub fn get_merge_submit_command(&self, number_jobs: usize) -> Result<String, ScriptError> {
        self.submit_command(TaskRole::Merge, number_jobs)
    }

    /// Write the CHM submit script, returns its path
    pub fn generate_submit_script(
        &self,
        number_tasks: Option<usize>,
    ) -> Result<PathBuf, ScriptError> {
        self.write_script(TaskRole::Chm, number_tasks)
    }

    /// Write the merge submit script, returns its path
    pub fn generate_merge_submit_script(
        &self,
        number_tasks: Option<usize>,
    ) -> Result<PathBuf, ScriptError> {
        self.write_script(TaskRole::Merge, number_tasks)
    }

    fn settings(&self) -> Result<&JobSettings, ScriptError> {
        self.settings.as_ref().ok_or_else(|| {
            error!(cluster = self.kind.name(), "No job settings set on cluster");
            ScriptError::MissingSettings
        })
    }

    fn script_name(&self, role: TaskRole) -> String {
        match role {
            TaskRole::Chm => self.submit_script_name(),
            TaskRole::Merge => self.merge_submit_script_name(),
        }
    }

    fn script_path(&self, role: TaskRole) -> PathBuf {
        let script_name = self.script_name(role);

        match self.settings {
            Some(ref settings) => settings.out_dir.join(script_name),
            None => PathBuf::from(script_name),
        }
    }

    /// caps `number_tasks` at the array limit of the cluster, with a note for the user
    fn adjusted_number_of_tasks(&self, number_tasks: usize) -> (usize, String) {
        match self.kind.max_tasks_per_array_job() {
            Some(max) if number_tasks > max => {
                warn!(
                    cluster = self.kind.name(),
                    "{number_tasks} tasks exceed the array job limit of {max}"
                );

                (
                    max,
                    format!(
                        "\n# {} is limited to {max} per {} call. Once these jobs are complete \
                         {CHECK_CHM_JOB} will need to be run again\n\n",
                        self.kind.display_name(),
                        self.scheduler.backend().vars().submit_cmd
                    ),
                )
            }
            _ => (number_tasks, String::new()),
        }
    }

    fn submit_command(&self, role: TaskRole, number_jobs: usize) -> Result<String, ScriptError> {
        let settings = self.settings()?;
        let vars = self.scheduler.backend().vars();
        let (number_jobs, warning) = self.adjusted_number_of_tasks(number_jobs);
        let script_name = self.script_name(role);

        let submit = match vars.array_flag {
            Some(flag) => format!("{} {flag} 1-{number_jobs} {script_name}", vars.submit_cmd),
            None => {
                // the array size lives in the script header
                self.write_script(role, Some(number_jobs))?;
                format!("{} {script_name}", vars.submit_cmd)
            }
        };

        Ok(format!(
            "{warning}cd \"{}\";{submit}",
            settings.out_dir.display()
        ))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn write_script(
        &self,
        role: TaskRole,
        number_tasks: Option<usize>,
    ) -> Result<PathBuf, ScriptError> {
        let settings = self.settings()?;
        let (stdout_dir, job_name, walltime, memory_gb, runner) = match role {
            TaskRole::Chm => (
                settings.stdout_dir(),
                &settings.job_name,
                &settings.walltime,
                settings.max_chm_memory_gb,
                self.chm_runner_path(),
            ),
            TaskRole::Merge => (
                settings.merge_stdout_dir(),
                &settings.merge_job_name,
                &settings.merge_walltime,
                settings.max_merge_memory_gb,
                self.merge_runner_path(),
            ),
        };

        // backends without an array flag need the array size in the header
        let number_tasks = match self.scheduler.backend().vars().array_flag {
            Some(_) => number_tasks,
            None => Some(number_tasks.unwrap_or(1)),
        };

        let script_name = self.script_name(role);
        let stdout_path = stdout_dir.join(self.scheduler.array_job_out_file_name());
        let cmds = runner_commands(
            &runner,
            self.scheduler.taskid_variable(),
            &settings.out_dir,
            &settings.shared_tmp_dir,
        );

        let request = ScriptRequest {
            script_name: Some(script_name.as_str()),
            working_dir: Some(settings.out_dir.as_path()),
            stdout_path: Some(stdout_path.as_path()),
            job_name: Some(job_name.as_str()),
            walltime: Some(walltime.as_str()),
            cmds: &cmds,
            required_mem_gb: Some(memory_gb),
            number_tasks,
        };

        let (_, script) = self.scheduler.write_submit_script(&request)?;
        debug!(path = ?script, "Wrote {} submit script", role.label());

        Ok(script)
    }
}

fn suggested_tasks_per_node(tasks_per_node: Option<&str>, default: usize) -> usize {
    let Some(tasks_per_node) = tasks_per_node else {
        debug!("Using default since tasks per node is None");

        return default;
    };

    match tasks_per_node.trim().parse::<i64>() {
        Ok(value) if value > 0 => usize::try_from(value).unwrap_or(default),
        Ok(_) => {
            debug!("Using default since tasks per node is 0 or less");
            default
        }
        Err(_) => {
            debug!("Using default since tasks per node int conversion failed");
            default
        }
    }
}

/// `name` inside the script bin directory, bare `name` if none is configured
fn script_bin_path(settings: Option<&JobSettings>, name: &str) -> PathBuf {
    match settings.and_then(|settings| settings.script_bin.as_ref()) {
        Some(script_bin) => script_bin.join(name),
        None => PathBuf::from(name),
    }
}

/// Run the runner for the current array task under `time -v` and pass on its exit code
fn runner_commands(runner: &Path, taskid: &str, working_dir: &Path, tmp_dir: &str) -> String {
    let runner_name = runner
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    format!(
        "echo \"TASKID: {taskid}\"\n\n\
         /usr/bin/time -v {} {taskid} {} --scratchdir {tmp_dir} --log DEBUG\n\
         \nexitcode=$?\n\
         echo \"{runner_name} exited with code: $exitcode\"\n\
         exit $exitcode\n",
        runner.display(),
        working_dir.display(),
    )
}

/// Looks up clusters by name
pub struct ClusterFactory;

impl ClusterFactory {
    /// Cluster for `name` (case-insensitive), `None` if unsupported
    pub fn get_cluster_by_name(name: Option<&str>) -> Option<Cluster> {
        let Some(name) = name else {
            error!("name passed in is None");

            return None;
        };

        let kind = ClusterKind::from_name(name)?;
        debug!("Returning cluster {}", kind.name());

        Some(Cluster::new(kind))
    }
}
