use chmcluster::{ClusterFactory, ClusterKind, JobSettings, ScriptError};
use std::{fs, path::Path};
use tempfile::tempdir;

fn settings(out_dir: &Path) -> JobSettings {
    let mut settings = JobSettings::new(out_dir);
    settings.script_bin = Some("/opt/chm/bin".into());
    settings.shared_tmp_dir = "/scratch".to_owned();
    settings.account = Some("abc123".to_owned());
    settings
}

#[test]
fn test_factory_lookup() {
    let cluster = ClusterFactory::get_cluster_by_name(Some("Comet")).unwrap();
    assert_eq!(cluster.kind(), ClusterKind::Comet);
    assert_eq!(cluster.cluster(), "comet");
    assert_eq!(cluster.submit_script_name(), "runjobs.comet");
    assert_eq!(cluster.merge_submit_script_name(), "runmerge.comet");

    assert!(ClusterFactory::get_cluster_by_name(Some("hopper")).is_none());
    assert!(ClusterFactory::get_cluster_by_name(None).is_none());
}

#[test]
fn test_checkchmjob_command() {
    let cluster = ClusterFactory::get_cluster_by_name(Some("rocce"))
        .unwrap()
        .with_settings(settings(Path::new("/data/job")));

    assert_eq!(
        cluster.get_checkchmjob_command().unwrap(),
        "/opt/chm/bin/checkchmjob.py \"/data/job\" --submit"
    );
    assert_eq!(
        cluster.chm_runner_path(),
        Path::new("/opt/chm/bin/chmrunner.py")
    );
    assert_eq!(
        cluster.merge_runner_path(),
        Path::new("/opt/chm/bin/mergetilerunner.py")
    );
    assert_eq!(
        cluster.submit_script_path(),
        Path::new("/data/job/runjobs.rocce")
    );
}

#[test]
fn test_array_flag_submit_commands() {
    let rocce = ClusterFactory::get_cluster_by_name(Some("rocce"))
        .unwrap()
        .with_settings(settings(Path::new("/data/job")));
    assert_eq!(
        rocce.get_chm_submit_command(5).unwrap(),
        "cd \"/data/job\";qsub -t 1-5 runjobs.rocce"
    );
    assert_eq!(
        rocce.get_merge_submit_command(2).unwrap(),
        "cd \"/data/job\";qsub -t 1-2 runmerge.rocce"
    );

    let comet = ClusterFactory::get_cluster_by_name(Some("comet"))
        .unwrap()
        .with_settings(settings(Path::new("/data/job")));
    assert_eq!(
        comet.get_chm_submit_command(3000).unwrap(),
        "cd \"/data/job\";sbatch -a 1-3000 runjobs.comet"
    );
}

#[test]
fn test_gordon_submit_command_rewrites_script() {
    let dir = tempdir().unwrap();
    let gordon = ClusterFactory::get_cluster_by_name(Some("gordon"))
        .unwrap()
        .with_settings(settings(dir.path()));

    let command = gordon.get_chm_submit_command(1500).unwrap();
    assert_eq!(
        command,
        format!(
            "\n# Gordon is limited to 1000 per qsub call. Once these jobs are complete \
             checkchmjob.py will need to be run again\n\n\
             cd \"{}\";qsub runjobs.gordon",
            dir.path().display()
        )
    );

    let content = fs::read_to_string(dir.path().join("runjobs.gordon")).unwrap();
    assert!(content.contains("#PBS -t 1-1000\n"));
    assert!(content.contains("#PBS -A abc123\n"));

    let command = gordon.get_merge_submit_command(12).unwrap();
    assert_eq!(
        command,
        format!("cd \"{}\";qsub runmerge.gordon", dir.path().display())
    );
    let content = fs::read_to_string(dir.path().join("runmerge.gordon")).unwrap();
    assert!(content.contains("#PBS -t 1-12\n"));
    assert!(content.contains("#PBS -N mergechmjob\n"));
    assert!(content.contains("#PBS -l mem=20G\n"));
}

#[test]
fn test_generated_rocce_script() {
    let dir = tempdir().unwrap();
    let rocce = ClusterFactory::get_cluster_by_name(Some("rocce"))
        .unwrap()
        .with_settings(settings(dir.path()));

    let script = rocce.generate_submit_script(None).unwrap();
    assert_eq!(script, dir.path().join("runjobs.rocce"));

    let content = fs::read_to_string(script).unwrap();
    let wd = dir.path().display();

    assert!(content.starts_with("#!/bin/sh\n"));
    assert!(content.contains(&format!("#$ -o {wd}/chmrun/stdout/$JOB_ID.$TASK_ID.out\n")));
    assert!(content.contains("#$ -N chmjob\n"));
    assert!(content.contains("#$ -l h_rt=12:00:00,h_vmem=10G,virtual_free=10G\n"));
    assert!(content.contains(&format!(
        "/usr/bin/time -v /opt/chm/bin/chmrunner.py $SGE_TASK_ID {wd} --scratchdir /scratch --log DEBUG\n"
    )));
    assert!(content.ends_with(
        "\nexitcode=$?\necho \"chmrunner.py exited with code: $exitcode\"\nexit $exitcode\n"
    ));
    // SGE has no accounting directive
    assert!(!content.contains("abc123"));
}

#[test]
fn test_generated_comet_merge_script() {
    let dir = tempdir().unwrap();
    let comet = ClusterFactory::get_cluster_by_name(Some("comet"))
        .unwrap()
        .with_settings(settings(dir.path()));

    let script = comet.generate_merge_submit_script(None).unwrap();
    let content = fs::read_to_string(script).unwrap();
    let wd = dir.path().display();

    assert!(content.contains("#SBATCH -A abc123\n"));
    assert!(content.contains(&format!("#SBATCH -o {wd}/mergerun/stdout/%A.%a.out\n")));
    assert!(content.contains("module load singularity/2.3.2\n"));
    assert!(content.contains("mergetilerunner.py $SLURM_ARRAY_TASK_ID"));
    assert!(!content.contains("#SBATCH -a"));
}

#[test]
fn test_gordon_without_account() {
    let dir = tempdir().unwrap();
    let mut settings = settings(dir.path());
    settings.account = None;

    let gordon = ClusterFactory::get_cluster_by_name(Some("gordon"))
        .unwrap()
        .with_settings(settings);
    let content = fs::read_to_string(gordon.generate_submit_script(None).unwrap()).unwrap();

    assert!(!content.contains("#PBS -A"));
    assert!(content.contains("#PBS -t 1-1\n"));
}

#[test]
fn test_scripts_need_settings() {
    let cluster = ClusterFactory::get_cluster_by_name(Some("comet")).unwrap();

    assert!(matches!(
        cluster.generate_submit_script(None),
        Err(ScriptError::MissingSettings)
    ));
    assert!(matches!(
        cluster.get_chm_submit_command(1),
        Err(ScriptError::MissingSettings)
    ));
}
