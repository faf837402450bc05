pub mod backend;

pub use self::backend::{Backend, BackendVars};
use crate::cluster::ClusterKind;
use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error};

const OUT_SUFFIX: &str = ".out";
// rwxr--r--
const SCRIPT_MODE: u32 = 0o744;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Script name cannot be None")]
    InvalidScriptName,
    #[error("Working dir cannot be None")]
    InvalidWorkingDir,
    #[error("No job settings available to generate a script from")]
    MissingSettings,
    #[error("Failed to write submit script")]
    Io(#[from] std::io::Error),
}

/// Everything a submission script is generated from.
///
/// Unset directives are left out of the header.
#[derive(Debug, Clone, Default)]
pub struct ScriptRequest<'a> {
    pub script_name: Option<&'a str>,
    pub working_dir: Option<&'a Path>,
    pub stdout_path: Option<&'a Path>,
    pub job_name: Option<&'a str>,
    pub walltime: Option<&'a str>,
    pub cmds: &'a str,
    pub required_mem_gb: Option<u32>,
    pub number_tasks: Option<usize>,
}

/// Generates submission scripts for one cluster running a given batch scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduler {
    backend: Backend,
    cluster_name: String,
    queue: Option<String>,
    account: Option<String>,
    load_singularity_cmd: Option<String>,
}

impl Scheduler {
    pub fn new(backend: Backend, cluster_name: impl Into<String>) -> Self {
        Self {
            backend,
            cluster_name: cluster_name.into(),
            queue: None,
            account: None,
            load_singularity_cmd: None,
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// shell line(s) making singularity available, written before the commands
    pub fn with_singularity_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.load_singularity_cmd = Some(cmd.into());
        self
    }

    /// account to bill hours consumed on the cluster to
    pub fn set_account(&mut self, account: Option<String>) {
        self.account = account;
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn singularity_load_command(&self) -> Option<&str> {
        self.load_singularity_cmd.as_deref()
    }

    pub fn jobid_for_arrayjob_variable(&self) -> &'static str {
        self.backend.vars().jobid_for_arrayjob
    }

    pub fn jobid_variable(&self) -> &'static str {
        self.backend.vars().jobid
    }

    pub fn taskid_variable(&self) -> &'static str {
        self.backend.vars().taskid
    }

    /// `<jobid>.out`
    pub fn job_out_file_name(&self) -> String {
        format!("{}{OUT_SUFFIX}", self.backend.vars().jobid_for_filepath)
    }

    /// `<jobid>.<taskid>.out`
    pub fn array_job_out_file_name(&self) -> String {
        let vars = self.backend.vars();

        format!(
            "{}.{}{OUT_SUFFIX}",
            vars.jobid_for_filepath, vars.taskid_for_filepath
        )
    }

    /// Write `<working_dir>/<script_name>` and make it executable.
    ///
    /// Returns the instruction a user runs to submit the script and the path
    /// of the script.
    #[tracing::instrument(level = "debug", skip(self, request))]
    pub fn write_submit_script(
        &self,
        request: &ScriptRequest,
    ) -> Result<(String, PathBuf), ScriptError> {
        let script_name = request.script_name.ok_or(ScriptError::InvalidScriptName)?;
        let working_dir = request.working_dir.ok_or(ScriptError::InvalidWorkingDir)?;
        let script = working_dir.join(script_name);

        let mut content = self
            .backend
            .script_header(self.queue(), self.account(), request);
        if let Some(ref load_singularity_cmd) = self.load_singularity_cmd {
            debug!("Load singularity command is not None adding to submit script");
            content.push_str(load_singularity_cmd);
        }
        content.push_str(request.cmds);

        fs::write(&script, content)?;
        make_script_executable(&script)?;

        Ok((
            self.submit_command(&script, working_dir, request.number_tasks),
            script,
        ))
    }

    fn submit_command(
        &self,
        script: &Path,
        working_dir: &Path,
        number_tasks: Option<usize>,
    ) -> String {
        let vars = self.backend.vars();
        let array_args = match (number_tasks, vars.array_flag) {
            (Some(number_tasks), Some(flag)) => format!(" {flag} 1-{number_tasks} "),
            _ => " ".to_owned(),
        };

        format!(
            "To submit run: cd {}; {}{array_args}{}",
            working_dir.display(),
            vars.submit_cmd,
            script.display()
        )
    }
}

fn make_script_executable(script: &Path) -> Result<(), ScriptError> {
    if !script.exists() {
        error!(path = ?script, "Script does not exist, skipping permission change");

        return Ok(());
    }

    debug!(path = ?script, "Making script executable");
    fs::set_permissions(script, fs::Permissions::from_mode(SCRIPT_MODE))?;

    Ok(())
}

/// Looks up the scheduler setup of the supported clusters
pub struct SchedulerFactory;

impl SchedulerFactory {
    /// Scheduler for `cluster_name` (case-insensitive), `None` if unsupported
    pub fn get_scheduler_by_cluster_name(cluster_name: Option<&str>) -> Option<Scheduler> {
        let Some(cluster_name) = cluster_name else {
            error!("clustername passed in is None");

            return None;
        };

        let kind = ClusterKind::from_name(cluster_name)?;
        let scheduler = kind.scheduler();
        debug!(
            "Returning {:?} scheduler for {}",
            scheduler.backend(),
            kind.name()
        );

        Some(scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_file_names_use_backend_variables() {
        let slurm = Scheduler::new(Backend::Slurm, "comet");
        assert_eq!(slurm.job_out_file_name(), "%A.out");
        assert_eq!(slurm.array_job_out_file_name(), "%A.%a.out");

        let sge = Scheduler::new(Backend::Sge, "rocce");
        assert_eq!(sge.array_job_out_file_name(), "$JOB_ID.$TASK_ID.out");

        let pbs = Scheduler::new(Backend::Pbs, "gordon");
        assert_eq!(pbs.array_job_out_file_name(), "$PBS_JOBID.$PBS_ARRAYID.out");
        assert_eq!(pbs.taskid_variable(), "$PBS_ARRAYID");
    }

    #[test]
    fn submit_command_array_args() {
        let dir = Path::new("/w");
        let script = Path::new("/w/foo.sh");

        let slurm = Scheduler::new(Backend::Slurm, "comet");
        assert_eq!(
            slurm.submit_command(script, dir, Some(5)),
            "To submit run: cd /w; sbatch -a 1-5 /w/foo.sh"
        );
        assert_eq!(
            slurm.submit_command(script, dir, None),
            "To submit run: cd /w; sbatch /w/foo.sh"
        );

        let pbs = Scheduler::new(Backend::Pbs, "gordon");
        assert_eq!(
            pbs.submit_command(script, dir, Some(5)),
            "To submit run: cd /w; qsub /w/foo.sh"
        );
    }

    #[test]
    fn factory_is_case_insensitive() {
        let scheduler = SchedulerFactory::get_scheduler_by_cluster_name(Some("RoCcE")).unwrap();
        assert_eq!(scheduler.backend(), Backend::Sge);
        assert_eq!(scheduler.queue(), Some("all.q"));
        assert!(scheduler.singularity_load_command().is_none());

        assert!(SchedulerFactory::get_scheduler_by_cluster_name(None).is_none());
    }
}
