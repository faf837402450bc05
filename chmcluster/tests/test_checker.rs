use chmcluster::{
    job::{CHM_OUTPUT_IMAGE, JOB_DIR, MERGE_INPUT_TILE_DIR, MERGE_OUTPUT_IMAGE},
    IniJobConfig, JobConfig, MemoryJobConfig, MergeTaskDependencies, Readiness, TaskChecker,
};
use std::fs;
use tempfile::tempdir;

/// Job directory with the output of tasks `A` and `C` present
fn chm_job() -> (tempfile::TempDir, MemoryJobConfig) {
    let dir = tempdir().unwrap();
    let tiles = dir.path().join("chmrun").join("tiles");
    fs::create_dir_all(&tiles).unwrap();
    fs::write(tiles.join("a.png"), "png").unwrap();
    fs::write(tiles.join("c.png"), "png").unwrap();

    let config = MemoryJobConfig::new()
        .with_default(JOB_DIR, &dir.path().to_string_lossy())
        .with("A", CHM_OUTPUT_IMAGE, "tiles/a.png")
        .with("B", CHM_OUTPUT_IMAGE, "tiles/b.png")
        .with("C", CHM_OUTPUT_IMAGE, "tiles/c.png")
        .with("D", CHM_OUTPUT_IMAGE, "tiles/d.png");

    (dir, config)
}

#[test]
fn test_incomplete_tasks_in_declared_order() {
    let (_dir, config) = chm_job();

    assert_eq!(
        TaskChecker::chm(&config).get_incomplete_tasks_list(),
        vec!["B".to_owned(), "D".to_owned()]
    );
}

#[test]
fn test_absolute_output_paths_ignore_job_dir() {
    let dir = tempdir().unwrap();
    let done = dir.path().join("done.png");
    fs::write(&done, "png").unwrap();

    let config = MemoryJobConfig::new()
        .with_default(JOB_DIR, "/does/not/exist")
        .with("1", MERGE_OUTPUT_IMAGE, &done.to_string_lossy())
        .with("2", MERGE_OUTPUT_IMAGE, &dir.path().join("missing.png").to_string_lossy());

    assert_eq!(
        TaskChecker::merge(&config).get_incomplete_tasks_list(),
        vec!["2".to_owned()]
    );
}

#[test]
fn test_directory_is_not_an_output() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("chmrun").join("out.png")).unwrap();

    let config = MemoryJobConfig::new()
        .with_default(JOB_DIR, &dir.path().to_string_lossy())
        .with("1", CHM_OUTPUT_IMAGE, "out.png");

    assert_eq!(
        TaskChecker::chm(&config).get_incomplete_tasks_list(),
        vec!["1".to_owned()]
    );
}

#[test]
fn test_task_without_output_key_is_incomplete() {
    let (_dir, config) = chm_job();
    let config = config.with("E", "someotherkey", "value");

    assert_eq!(
        TaskChecker::chm(&config).get_incomplete_tasks_list(),
        vec!["B".to_owned(), "D".to_owned(), "E".to_owned()]
    );
}

#[test]
fn test_ini_job_config() {
    let dir = tempdir().unwrap();
    let run_dir = dir.path().join("chmrun");
    fs::create_dir_all(&run_dir).unwrap();
    fs::write(run_dir.join("1.png"), "png").unwrap();

    let config_path = dir.path().join("chm.jobs.list");
    fs::write(
        &config_path,
        format!(
            "[DEFAULT]\njobdir = {}\n\n[1]\noutputimage = 1.png\n\n[2]\noutputimage = 2.png\n",
            dir.path().display()
        ),
    )
    .unwrap();

    let config = IniJobConfig::load(&config_path).unwrap();
    assert_eq!(config.sections(), vec!["1".to_owned(), "2".to_owned()]);
    assert_eq!(
        TaskChecker::chm(&config).get_incomplete_tasks_list(),
        vec!["2".to_owned()]
    );
}

#[test]
fn test_merge_task_waits_for_its_chm_tasks() {
    let (_dir, chm_config) = chm_job();
    let other = chm_config
        .clone()
        .with("E", CHM_OUTPUT_IMAGE, "othertiles/e.png");
    let merge_config = MemoryJobConfig::new()
        .with_default(JOB_DIR, &chm_config.job_dir().unwrap().to_string_lossy())
        .with("1", MERGE_INPUT_TILE_DIR, "tiles")
        .with("1", MERGE_OUTPUT_IMAGE, "merged/1.png")
        .with("2", MERGE_INPUT_TILE_DIR, "othertiles")
        .with("3", MERGE_OUTPUT_IMAGE, "merged/3.png");

    let incomplete = TaskChecker::chm(&other).get_incomplete_tasks_list();
    let dependencies = MergeTaskDependencies::new(&other, &merge_config, &incomplete);

    assert_eq!(
        dependencies.chm_tasks_for("1"),
        Some(&["A".to_owned(), "B".to_owned(), "C".to_owned(), "D".to_owned()][..])
    );
    assert_eq!(
        dependencies.can_task_be_run("1"),
        Readiness::Blocked("2 CHM task(s) not complete: B,D".to_owned())
    );
    assert_eq!(
        dependencies.can_task_be_run("2").reason(),
        Some("1 CHM task(s) not complete: E")
    );
    assert_eq!(
        dependencies.can_task_be_run("3"),
        Readiness::Blocked("Merge task 3 has no inputtiledir".to_owned())
    );
    assert!(!dependencies.can_task_be_run("nope").is_ready());
}

#[test]
fn test_merge_task_ready_once_tiles_exist() {
    let (dir, chm_config) = chm_job();
    let tiles = dir.path().join("chmrun").join("tiles");
    fs::write(tiles.join("b.png"), "png").unwrap();
    fs::write(tiles.join("d.png"), "png").unwrap();

    let merge_config = MemoryJobConfig::new()
        .with_default(JOB_DIR, &dir.path().to_string_lossy())
        .with("1", MERGE_INPUT_TILE_DIR, "tiles");

    let incomplete = TaskChecker::chm(&chm_config).get_incomplete_tasks_list();
    assert!(incomplete.is_empty());

    let dependencies = MergeTaskDependencies::new(&chm_config, &merge_config, &incomplete);
    assert_eq!(dependencies.can_task_be_run("1"), Readiness::Ready);
}
