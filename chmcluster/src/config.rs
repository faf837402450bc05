use crate::job::{
    IniJobConfig, BATCHED_JOBS_FILE_NAME, BATCHED_MERGE_JOBS_FILE_NAME, CHM_CONFIG_FILE_NAME,
    MERGE_CONFIG_FILE_NAME, RUN_DIR,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::Error,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read job settings")]
    FileNotFound(#[from] Error),
    #[error("Job settings are invalid: {0}")]
    InvalidSettings(#[from] serde_yaml::Error),
    #[error("Job configuration could not be parsed: {0}")]
    InvalidJobConfig(#[from] ini::Error),
}

/// Everything known about a CHM job that is not a per task value.
///
/// Loaded from a YAML file next to the job; all paths that are not set
/// explicitly are derived from `out_dir`.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct JobSettings {
    // output directory of the job, scripts and job lists live here
    pub out_dir: PathBuf,
    pub chm_config: Option<PathBuf>,
    pub merge_config: Option<PathBuf>,
    pub stdout_dir: Option<PathBuf>,
    pub merge_stdout_dir: Option<PathBuf>,

    #[serde(default = "default_job_name")]
    pub job_name: String,
    #[serde(default = "default_merge_job_name")]
    pub merge_job_name: String,
    #[serde(default = "default_walltime")]
    pub walltime: String,
    #[serde(default = "default_walltime")]
    pub merge_walltime: String,
    #[serde(default = "default_chm_memory")]
    pub max_chm_memory_gb: u32,
    #[serde(default = "default_merge_memory")]
    pub max_merge_memory_gb: u32,

    // billing account, clusters without accounting ignore it
    pub account: Option<String>,
    pub cluster: Option<String>,
    // directory containing the runner scripts, if unset they are expected on PATH
    pub script_bin: Option<PathBuf>,
    #[serde(default = "default_tmp_dir")]
    pub shared_tmp_dir: String,
    pub images: Option<PathBuf>,

    // CHM parameters, only reported in summaries
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_tile_size")]
    pub tile_size: String,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: String,
    #[serde(default)]
    pub disable_histogram_eq: bool,
    #[serde(default = "default_one")]
    pub tiles_per_task: u32,
    #[serde(default = "default_one")]
    pub tasks_per_node: u32,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub chm_binary: String,
}

impl JobSettings {
    /// settings with defaults for everything but the output directory
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            chm_config: None,
            merge_config: None,
            stdout_dir: None,
            merge_stdout_dir: None,
            job_name: default_job_name(),
            merge_job_name: default_merge_job_name(),
            walltime: default_walltime(),
            merge_walltime: default_walltime(),
            max_chm_memory_gb: default_chm_memory(),
            max_merge_memory_gb: default_merge_memory(),
            account: None,
            cluster: None,
            script_bin: None,
            shared_tmp_dir: default_tmp_dir(),
            images: None,
            version: default_version(),
            tile_size: default_tile_size(),
            overlap_size: default_overlap_size(),
            disable_histogram_eq: false,
            tiles_per_task: 1,
            tasks_per_node: 1,
            model: String::new(),
            chm_binary: String::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let settings: Self = serde_yaml::from_reader(File::open(path)?)?;
        info!(path = ?path, out_dir = ?settings.out_dir, "Loaded job settings");

        Ok(settings)
    }

    pub fn chm_config_path(&self) -> PathBuf {
        self.chm_config
            .clone()
            .unwrap_or_else(|| self.out_dir.join(CHM_CONFIG_FILE_NAME))
    }

    pub fn merge_config_path(&self) -> PathBuf {
        self.merge_config
            .clone()
            .unwrap_or_else(|| self.out_dir.join(MERGE_CONFIG_FILE_NAME))
    }

    pub fn batched_config_path(&self) -> PathBuf {
        self.out_dir.join(BATCHED_JOBS_FILE_NAME)
    }

    pub fn batched_merge_config_path(&self) -> PathBuf {
        self.out_dir.join(BATCHED_MERGE_JOBS_FILE_NAME)
    }

    pub fn stdout_dir(&self) -> PathBuf {
        self.stdout_dir
            .clone()
            .unwrap_or_else(|| self.out_dir.join(RUN_DIR).join("stdout"))
    }

    pub fn merge_stdout_dir(&self) -> PathBuf {
        self.merge_stdout_dir
            .clone()
            .unwrap_or_else(|| self.out_dir.join("mergerun").join("stdout"))
    }

    /// load the CHM task configuration, `None` if it can't be read
    pub fn load_chm_config(&self) -> Option<IniJobConfig> {
        load_optional(&self.chm_config_path())
    }

    /// load the merge task configuration, `None` if it can't be read
    pub fn load_merge_config(&self) -> Option<IniJobConfig> {
        load_optional(&self.merge_config_path())
    }

    /// Report every problem with the settings before giving up.
    /// Returns true if any error was found.
    pub fn preflight_checks(&self) -> bool {
        let mut contains_error = false;

        if !self.out_dir.is_dir() {
            error!(
                "out_dir {} is not a directory",
                self.out_dir.to_string_lossy()
            );
            contains_error = true;
        }

        for (name, walltime) in [
            ("walltime", &self.walltime),
            ("merge_walltime", &self.merge_walltime),
        ] {
            if !is_valid_walltime(walltime) {
                error!("{name} ({walltime}) must be of the form HH:MM:SS");
                contains_error = true;
            }
        }

        if self.tasks_per_node == 0 {
            error!("tasks_per_node cannot be 0, at least one task has to run per node");
            contains_error = true;
        }

        if self.max_chm_memory_gb == 0 || self.max_merge_memory_gb == 0 {
            warn!("A memory limit of 0 GB was requested, schedulers will most likely reject it");
        }

        if let Some(ref images) = self.images {
            if !images.is_dir() {
                warn!(
                    "images ({}) is not a directory, image statistics will be empty",
                    images.to_string_lossy()
                );
            }
        }

        contains_error
    }
}

fn load_optional(path: &Path) -> Option<IniJobConfig> {
    match IniJobConfig::load(path) {
        Ok(config) => Some(config),
        Err(error) => {
            error!(error = ?error, path = ?path, "Unable to load job configuration: {error}");

            None
        }
    }
}

/// `[H]H:MM:SS` with minutes and seconds below 60
fn is_valid_walltime(walltime: &str) -> bool {
    let parts: Vec<&str> = walltime.split(':').collect();

    parts.len() == 3
        && parts.iter().all(|part| part.parse::<u32>().is_ok())
        && parts[1..]
            .iter()
            .all(|part| part.len() == 2 && part.parse::<u32>().map_or(false, |v| v < 60))
}

fn default_job_name() -> String {
    "chmjob".to_owned()
}

fn default_merge_job_name() -> String {
    "mergechmjob".to_owned()
}

fn default_walltime() -> String {
    "12:00:00".to_owned()
}

fn default_chm_memory() -> u32 {
    10
}

fn default_merge_memory() -> u32 {
    20
}

fn default_tmp_dir() -> String {
    "/tmp".to_owned()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}

fn default_tile_size() -> String {
    "512x512".to_owned()
}

fn default_overlap_size() -> String {
    "0x0".to_owned()
}

fn default_one() -> u32 {
    1
}
