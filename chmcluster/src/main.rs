use chmcluster::{
    BatchedTasksListGenerator, Cluster, ClusterFactory, JobConfig, JobSettings,
    MergeTaskDependencies, TaskChecker, TaskSummaryFactory,
};
use clap::{Args, Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_unwrap::ResultExt;

#[derive(Parser)]
#[command(name = "chmcluster", version)]
#[command(about = "Track, batch and submit the tasks of CHM jobs on HPC clusters")]
struct Cli {
    /// Log level or filter, RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct JobArgs {
    /// YAML job settings
    #[arg(value_name = "SETTINGS")]
    settings: PathBuf,

    /// Operate on the merge tasks instead of the CHM tasks
    #[arg(long)]
    merge: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List incomplete tasks
    Check {
        #[command(flatten)]
        job: JobArgs,

        /// Report whether this merge task can run
        #[arg(long, value_name = "TASK_ID")]
        can_run: Option<String>,
    },
    /// Write the batched task list for the incomplete tasks
    Batch {
        #[command(flatten)]
        job: JobArgs,

        /// Tasks per array job element, defaults to the cluster suggestion
        #[arg(long)]
        tasks_per_node: Option<String>,
    },
    /// Print a completion and resource usage summary
    Summary {
        /// YAML job settings
        #[arg(value_name = "SETTINGS")]
        settings: PathBuf,

        /// Also account compute consumed and input images
        #[arg(long)]
        compute: bool,
    },
    /// Generate the submit script of the cluster
    Script {
        #[command(flatten)]
        job: JobArgs,
    },
    /// Print the command submitting a number of batches
    SubmitCommand {
        #[command(flatten)]
        job: JobArgs,

        #[arg(value_name = "NUMBER_JOBS")]
        number_jobs: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check { job, can_run } => check(&job, can_run.as_deref()),
        Commands::Batch {
            job,
            tasks_per_node,
        } => batch(&job, tasks_per_node.as_deref()),
        Commands::Summary { settings, compute } => summary(&load_settings(&settings), compute),
        Commands::Script { job } => script(&job),
        Commands::SubmitCommand { job, number_jobs } => submit_command(&job, number_jobs),
    }
}

fn load_settings(path: &Path) -> JobSettings {
    let settings = JobSettings::load(path).unwrap_or_log();

    if settings.preflight_checks() {
        error!(path = ?path, "Job settings contain errors, see above");
        std::process::exit(1);
    }

    settings
}

fn load_cluster(settings: &JobSettings) -> Option<Cluster> {
    ClusterFactory::get_cluster_by_name(settings.cluster.as_deref())
        .map(|cluster| cluster.with_settings(settings.clone()))
}

fn incomplete_tasks(config: &dyn JobConfig, merge: bool) -> Vec<String> {
    if merge {
        TaskChecker::merge(config).get_incomplete_tasks_list()
    } else {
        TaskChecker::chm(config).get_incomplete_tasks_list()
    }
}

fn check(job: &JobArgs, can_run: Option<&str>) -> ExitCode {
    let settings = load_settings(&job.settings);
    let config = if job.merge {
        settings.load_merge_config()
    } else {
        settings.load_chm_config()
    };
    let Some(config) = config else {
        return ExitCode::FAILURE;
    };

    for task in incomplete_tasks(&config, job.merge) {
        println!("{task}");
    }

    let Some(taskid) = can_run else {
        return ExitCode::SUCCESS;
    };

    let (Some(chm_config), Some(merge_config)) =
        (settings.load_chm_config(), settings.load_merge_config())
    else {
        return ExitCode::FAILURE;
    };

    let incomplete_chm = TaskChecker::chm(&chm_config).get_incomplete_tasks_list();
    let dependencies = MergeTaskDependencies::new(&chm_config, &merge_config, &incomplete_chm);
    let readiness = dependencies.can_task_be_run(taskid);

    match readiness.reason() {
        None => println!("Merge task {taskid} can run"),
        Some(reason) => println!("Merge task {taskid} cannot run: {reason}"),
    }

    ExitCode::SUCCESS
}

fn batch(job: &JobArgs, tasks_per_node: Option<&str>) -> ExitCode {
    let settings = load_settings(&job.settings);
    let (config, configfile) = if job.merge {
        (settings.load_merge_config(), settings.batched_merge_config_path())
    } else {
        (settings.load_chm_config(), settings.batched_config_path())
    };
    let Some(config) = config else {
        return ExitCode::FAILURE;
    };

    let default_tasks_per_node = settings.tasks_per_node.to_string();
    let requested = tasks_per_node.or(Some(default_tasks_per_node.as_str()));
    let tasks_per_node = match load_cluster(&settings) {
        Some(cluster) if job.merge => cluster.get_suggested_merge_tasks_per_node(requested),
        Some(cluster) => cluster.get_suggested_tasks_per_node(requested),
        None => settings.tasks_per_node as usize,
    };

    let task_list = incomplete_tasks(&config, job.merge);
    match BatchedTasksListGenerator::new(tasks_per_node)
        .write_batched_config(Some(configfile.as_path()), Some(task_list.as_slice()))
    {
        Ok(batches) => {
            info!(path = ?configfile, "Wrote {batches} batches");
            println!("{batches}");

            ExitCode::SUCCESS
        }
        Err(error) => {
            error!(error = ?error, path = ?configfile, "Unable to write batched config: {error}");

            ExitCode::FAILURE
        }
    }
}

fn summary(settings: &JobSettings, compute: bool) -> ExitCode {
    let chm_config = settings.load_chm_config();
    let merge_config = settings.load_merge_config();

    let chm_incomplete = chm_config
        .as_ref()
        .map(|config| incomplete_tasks(config, false));
    let merge_incomplete = merge_config
        .as_ref()
        .map(|config| incomplete_tasks(config, true));

    let mut factory = TaskSummaryFactory::new(
        Some(settings),
        chm_config.as_ref().map(|config| config as &dyn JobConfig),
        merge_config.as_ref().map(|config| config as &dyn JobConfig),
    )
    .with_output_compute(compute);
    if let Some(ref tasks) = chm_incomplete {
        factory = factory.with_chm_incomplete_tasks(tasks);
    }
    if let Some(ref tasks) = merge_incomplete {
        factory = factory.with_merge_incomplete_tasks(tasks);
    }

    print!("{}", factory.get_task_summary().get_summary());

    ExitCode::SUCCESS
}

fn script(job: &JobArgs) -> ExitCode {
    let settings = load_settings(&job.settings);
    let Some(cluster) = load_cluster(&settings) else {
        return ExitCode::FAILURE;
    };

    let result = if job.merge {
        cluster.generate_merge_submit_script(None)
    } else {
        cluster.generate_submit_script(None)
    };

    match result {
        Ok(script) => {
            println!("{}", script.display());

            ExitCode::SUCCESS
        }
        Err(error) => {
            error!(error = ?error, "Unable to generate submit script: {error}");

            ExitCode::FAILURE
        }
    }
}

fn submit_command(job: &JobArgs, number_jobs: usize) -> ExitCode {
    let settings = load_settings(&job.settings);
    let Some(cluster) = load_cluster(&settings) else {
        return ExitCode::FAILURE;
    };

    let command = if job.merge {
        cluster.get_merge_submit_command(number_jobs)
    } else {
        cluster.get_chm_submit_command(number_jobs)
    };

    match command.and_then(|command| Ok((command, cluster.get_checkchmjob_command()?))) {
        Ok((command, checkchmjob)) => {
            println!("{command}");
            println!("# Once complete check progress with: {checkchmjob}");

            ExitCode::SUCCESS
        }
        Err(error) => {
            error!(error = ?error, "Unable to create submit command: {error}");

            ExitCode::FAILURE
        }
    }
}
