use crate::config::ConfigErrors;
use ini::Ini;
use itertools::Itertools;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Section holding values shared by every task, e.g. the job directory
pub const DEFAULT_SECTION: &str = "DEFAULT";
/// Key of the job directory in the `DEFAULT` section
pub const JOB_DIR: &str = "jobdir";
/// Directory below the job directory relative output paths are resolved against
pub const RUN_DIR: &str = "chmrun";
/// Key of the output image of a CHM task
pub const CHM_OUTPUT_IMAGE: &str = "outputimage";
/// Key of the output image of a merge task
pub const MERGE_OUTPUT_IMAGE: &str = "mergeoutputimage";
/// Key of the directory a merge task reads its tiles from
pub const MERGE_INPUT_TILE_DIR: &str = "inputtiledir";
/// Key holding the comma separated task ids of a batch
pub const BATCH_TASK_ID: &str = "tasks";

pub const CHM_CONFIG_FILE_NAME: &str = "chm.jobs.list";
pub const MERGE_CONFIG_FILE_NAME: &str = "merge.jobs.list";
pub const BATCHED_JOBS_FILE_NAME: &str = "batchedjobs.list";
pub const BATCHED_MERGE_JOBS_FILE_NAME: &str = "batchedmergejobs.list";

pub const CHM_RUNNER: &str = "chmrunner.py";
pub const MERGE_RUNNER: &str = "mergetilerunner.py";
pub const CHECK_CHM_JOB: &str = "checkchmjob.py";

/// A job configuration: every section except `DEFAULT` is one task.
///
/// Lookups fall back to the `DEFAULT` section, the same way INI parsers with
/// default sections behave.
pub trait JobConfig {
    /// task sections in declared order, `DEFAULT` excluded
    fn sections(&self) -> Vec<String>;

    /// value of `key` in `section`, or in `DEFAULT` if the section lacks it
    fn get(&self, section: &str, key: &str) -> Option<String>;

    /// job directory declared in the `DEFAULT` section
    fn job_dir(&self) -> Option<PathBuf> {
        self.get(DEFAULT_SECTION, JOB_DIR).map(PathBuf::from)
    }
}

/// Resolve a declared output path of a task.
///
/// Relative paths are placed below `<job_dir>/chmrun`; without a job directory
/// they are returned as given.
pub fn resolve_output_path(job_dir: Option<&Path>, out_file: &str) -> PathBuf {
    let path = PathBuf::from(out_file);

    match job_dir {
        Some(job_dir) if !path.is_absolute() => job_dir.join(RUN_DIR).join(path),
        _ => path,
    }
}

/// `JobConfig` backed by an INI file
#[derive(Debug, Clone)]
pub struct IniJobConfig {
    ini: Ini,
}

impl IniJobConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        debug!(path = ?path, "Loading job configuration");

        Ok(Self {
            ini: Ini::load_from_file(path)?,
        })
    }

    pub fn from_ini(ini: Ini) -> Self {
        Self { ini }
    }
}

impl JobConfig for IniJobConfig {
    fn sections(&self) -> Vec<String> {
        self.ini
            .sections()
            .flatten()
            .filter(|name| *name != DEFAULT_SECTION)
            .unique()
            .map(str::to_owned)
            .collect()
    }

    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get_from(Some(section), key)
            .or_else(|| self.ini.get_from(Some(DEFAULT_SECTION), key))
            .map(str::to_owned)
    }
}

/// In-memory `JobConfig`, keeps sections in insertion order
#[derive(Debug, Clone, Default)]
pub struct MemoryJobConfig {
    defaults: BTreeMap<String, String>,
    sections: Vec<(String, BTreeMap<String, String>)>,
}

impl MemoryJobConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// set `key` in `section`, creating the section on first use
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> &mut Self {
        if section == DEFAULT_SECTION {
            self.defaults.insert(key.to_owned(), value.to_owned());

            return self;
        }

        match self.sections.iter_mut().find(|(name, _)| name == section) {
            Some((_, values)) => {
                values.insert(key.to_owned(), value.to_owned());
            }
            None => {
                let mut values = BTreeMap::new();
                values.insert(key.to_owned(), value.to_owned());
                self.sections.push((section.to_owned(), values));
            }
        }

        self
    }

    pub fn with(mut self, section: &str, key: &str, value: &str) -> Self {
        self.set(section, key, value);
        self
    }

    pub fn with_default(self, key: &str, value: &str) -> Self {
        self.with(DEFAULT_SECTION, key, value)
    }
}

impl JobConfig for MemoryJobConfig {
    fn sections(&self) -> Vec<String> {
        self.sections.iter().map(|(name, _)| name.clone()).collect()
    }

    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections
            .iter()
            .find(|(name, _)| name == section)
            .and_then(|(_, values)| values.get(key))
            .or_else(|| self.defaults.get(key))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_below_run_dir() {
        assert_eq!(
            resolve_output_path(Some(Path::new("/jobs/a")), "tiles/001.png"),
            PathBuf::from("/jobs/a/chmrun/tiles/001.png")
        );
        assert_eq!(
            resolve_output_path(Some(Path::new("/jobs/a")), "/abs/001.png"),
            PathBuf::from("/abs/001.png")
        );
        assert_eq!(
            resolve_output_path(None, "tiles/001.png"),
            PathBuf::from("tiles/001.png")
        );
    }

    #[test]
    fn memory_config_falls_back_to_defaults() {
        let config = MemoryJobConfig::new()
            .with_default(JOB_DIR, "/jobs/a")
            .with("2", CHM_OUTPUT_IMAGE, "b.png")
            .with("1", CHM_OUTPUT_IMAGE, "a.png");

        assert_eq!(config.sections(), vec!["2".to_owned(), "1".to_owned()]);
        assert_eq!(config.get("1", CHM_OUTPUT_IMAGE).as_deref(), Some("a.png"));
        assert_eq!(config.get("1", JOB_DIR).as_deref(), Some("/jobs/a"));
        assert_eq!(config.job_dir(), Some(PathBuf::from("/jobs/a")));
        assert_eq!(config.get("3", CHM_OUTPUT_IMAGE), None);
    }

    #[test]
    fn ini_config_skips_default_section() {
        let ini = Ini::load_from_str(
            "[DEFAULT]\njobdir = /jobs/b\n\n[a]\noutputimage = a.png\n\n[b]\noutputimage = /x/b.png\n",
        )
        .unwrap();
        let config = IniJobConfig::from_ini(ini);

        assert_eq!(config.sections(), vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(config.get("b", CHM_OUTPUT_IMAGE).as_deref(), Some("/x/b.png"));
        assert_eq!(config.get("a", JOB_DIR).as_deref(), Some("/jobs/b"));
        assert_eq!(config.job_dir(), Some(PathBuf::from("/jobs/b")));
    }
}
