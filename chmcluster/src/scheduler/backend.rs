use super::ScriptRequest;
use std::fmt::Write;
use tracing::debug;

/// Batch schedulers submission scripts can be generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Slurm,
    Sge,
    Pbs,
}

/// Names a scheduler gives its job and task ids, and how jobs are submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendVars {
    pub jobid_for_filepath: &'static str,
    pub jobid_for_arrayjob: &'static str,
    pub jobid: &'static str,
    pub taskid_for_filepath: &'static str,
    pub taskid: &'static str,
    pub submit_cmd: &'static str,
    pub array_flag: Option<&'static str>,
}

const SLURM_VARS: BackendVars = BackendVars {
    jobid_for_filepath: "%A",
    jobid_for_arrayjob: "$SLURM_ARRAY_JOB_ID",
    jobid: "$SLURM_JOB_ID",
    taskid_for_filepath: "%a",
    taskid: "$SLURM_ARRAY_TASK_ID",
    submit_cmd: "sbatch",
    array_flag: Some("-a"),
};

const SGE_VARS: BackendVars = BackendVars {
    jobid_for_filepath: "$JOB_ID",
    jobid_for_arrayjob: "$JOB_ID",
    jobid: "$JOB_ID",
    taskid_for_filepath: "$TASK_ID",
    taskid: "$SGE_TASK_ID",
    submit_cmd: "qsub",
    array_flag: Some("-t"),
};

// PBS takes the array size in the script header, not on the command line
const PBS_VARS: BackendVars = BackendVars {
    jobid_for_filepath: "$PBS_JOBID",
    jobid_for_arrayjob: "$PBS_JOBID",
    jobid: "$PBS_JOBID",
    taskid_for_filepath: "$PBS_ARRAYID",
    taskid: "$PBS_ARRAYID",
    submit_cmd: "qsub",
    array_flag: None,
};

impl Backend {
    pub fn vars(&self) -> &'static BackendVars {
        match self {
            Self::Slurm => &SLURM_VARS,
            Self::Sge => &SGE_VARS,
            Self::Pbs => &PBS_VARS,
        }
    }

    /// Directives and environment echo put at the top of a submission script
    pub(super) fn script_header(
        &self,
        queue: Option<&str>,
        account: Option<&str>,
        request: &ScriptRequest,
    ) -> String {
        match self {
            Self::Slurm => slurm_header(queue, account, request),
            Self::Sge => sge_header(queue, request),
            Self::Pbs => pbs_header(queue, account, request),
        }
    }
}

fn echo_block(header: &mut String, jobid: &str) {
    header.push_str("echo \"HOST: $HOSTNAME\"\n");
    header.push_str("echo \"DATE: `date`\"\n");
    let _ = writeln!(header, "echo \"JOBID: {jobid}\"\n");
}

fn slurm_header(queue: Option<&str>, account: Option<&str>, request: &ScriptRequest) -> String {
    let mut header = String::from("#!/bin/sh\n#\n#SBATCH --nodes=1\n");

    match account {
        Some(account) => {
            let _ = writeln!(header, "#SBATCH -A {account}");
        }
        None => debug!("Account is None, not setting"),
    }
    if let Some(working_dir) = request.working_dir {
        let _ = writeln!(header, "#SBATCH -D {}", working_dir.display());
    }
    match queue {
        Some(queue) => {
            let _ = writeln!(header, "#SBATCH -p {queue}");
        }
        None => debug!("Queue is None, not setting"),
    }

    header.push_str("#SBATCH --export=SLURM_UMASK=0022\n");
    if let Some(stdout_path) = request.stdout_path {
        let _ = writeln!(header, "#SBATCH -o {}", stdout_path.display());
    }
    if let Some(job_name) = request.job_name {
        let _ = writeln!(header, "#SBATCH -J {job_name}");
    }
    if let Some(walltime) = request.walltime {
        let _ = writeln!(header, "#SBATCH -t {walltime}");
    }
    if let Some(mem) = request.required_mem_gb {
        let _ = writeln!(header, "#SBATCH --mem={mem}G");
    }

    echo_block(&mut header, SLURM_VARS.jobid);
    header
}

fn sge_header(queue: Option<&str>, request: &ScriptRequest) -> String {
    let mut header = String::from("#!/bin/sh\n#$ -V\n#$ -S /bin/sh\n#$ -notify\n");

    if let Some(working_dir) = request.working_dir {
        let _ = writeln!(header, "#$ -wd {}", working_dir.display());
    }
    match queue {
        Some(queue) => {
            let _ = writeln!(header, "#$ -q {queue}");
        }
        None => debug!("Queue is None, not setting"),
    }
    if let Some(stdout_path) = request.stdout_path {
        let _ = writeln!(header, "#$ -j y\n#$ -o {}", stdout_path.display());
    }
    if let Some(job_name) = request.job_name {
        let _ = writeln!(header, "#$ -N {job_name}");
    }

    // walltime and memory share a single resource line
    let mut resources = Vec::new();
    if let Some(walltime) = request.walltime {
        resources.push(format!("h_rt={walltime}"));
    }
    if let Some(mem) = request.required_mem_gb {
        resources.push(format!("h_vmem={mem}G,virtual_free={mem}G"));
    }
    if !resources.is_empty() {
        let _ = write!(header, "#$ -l {}", resources.join(","));
    }

    header.push_str("\n\n");
    echo_block(&mut header, SGE_VARS.jobid);
    header
}

fn pbs_header(queue: Option<&str>, account: Option<&str>, request: &ScriptRequest) -> String {
    let mut header = String::from("#!/bin/sh\n#\n#PBS -V\n#PBS -m n\n");

    if let Some(working_dir) = request.working_dir {
        let _ = writeln!(header, "#PBS -wd {}", working_dir.display());
    }
    match queue {
        Some(queue) => {
            let _ = writeln!(header, "#PBS -q {queue}");
        }
        None => debug!("Queue is None, not setting"),
    }
    if let Some(account) = account {
        let _ = writeln!(header, "#PBS -A {account}");
    }

    header.push_str("#PBS -l nodes=1:ppn=16:native:noflash\n");
    if let Some(number_tasks) = request.number_tasks {
        let _ = writeln!(header, "#PBS -t 1-{number_tasks}");
    }
    if let Some(stdout_path) = request.stdout_path {
        let _ = writeln!(header, "#PBS -j oe\n#PBS -o {}", stdout_path.display());
    }
    if let Some(job_name) = request.job_name {
        let _ = writeln!(header, "#PBS -N {job_name}");
    }
    if let Some(walltime) = request.walltime {
        let _ = writeln!(header, "#PBS -l walltime={walltime}");
    }
    if let Some(mem) = request.required_mem_gb {
        let _ = writeln!(header, "#PBS -l mem={mem}G");
    }

    echo_block(&mut header, PBS_VARS.jobid);
    header
}
