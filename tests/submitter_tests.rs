
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dmlc_yarn::config::JobConfig;
use dmlc_yarn::launch::{build_launch_spec, LaunchEnvironment, LaunchSpec, Submitter};
use dmlc_yarn::probe::probe_cluster;
use dmlc_yarn::process::TokioRunner;
use dmlc_yarn::staging::{FileStager, LocalFs};
use dmlc_yarn::DmlcError;
use tempfile::TempDir;
use test_harness::{cmd, fake_hadoop, kmeans_workspace, support_dir, write_script, FAKE_CLASSPATH};

/// Fake `java` that records its argv and environment under `$OUT_DIR`.
fn fake_java(dir: &Path, exit_code: i32, delay_secs: u32) -> std::path::PathBuf {
    write_script(
        dir,
        "java",
        &format!(
            "sleep {}\nprintf '%s\\n' \"$@\" > \"$OUT_DIR/args\"\nenv > \"$OUT_DIR/env\"\nexit {}",
            delay_secs, exit_code
        ),
    )
}

struct Fixture {
    bin: TempDir,
    _support: TempDir,
    _workspace: TempDir,
    out: TempDir,
    spec: LaunchSpec,
}

fn fixture(java_exit: i32, java_delay_secs: u32, hadoop_version: &str) -> Fixture {
    let bin = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let hadoop = fake_hadoop(bin.path(), hadoop_version);
    let java = fake_java(bin.path(), java_exit, java_delay_secs);
    let (support_tmp, support) = support_dir();
    let (workspace, job) = kmeans_workspace();

    let config = JobConfig::new(4, cmd(&["./kmeans", "../kmeans.conf"]))
        .with_hadoop_binary(hadoop)
        .with_java_binary(java)
        .with_support(support)
        .resolve()
        .unwrap();
    let fs = LocalFs::with_cwd(&job);
    let staging = FileStager::new(&fs).stage(&config.command, true, &config.files, &config.support);

    let inherited = vec![("PATH".to_string(), "/usr/bin:/bin".to_string())];
    let mut extra = LaunchEnvironment::new();
    extra.insert(
        "OUT_DIR".to_string(),
        out.path().to_string_lossy().into_owned(),
    );
    extra.insert("DMLC_TRACKER_URI".to_string(), "10.0.0.7".to_string());

    Fixture {
        spec: build_launch_spec(&config, &staging, inherited, &extra),
        bin,
        _support: support_tmp,
        _workspace: workspace,
        out,
    }
}

#[tokio::test]
async fn test_successful_submission() {
    let fx = fixture(0, 0, "Hadoop 2.7.3");
    let submitter = Submitter::new(Arc::new(TokioRunner), false).unwrap();

    let handle = submitter.launch(fx.spec.clone());
    handle.wait().await.expect("submission should succeed");

    let args = std::fs::read_to_string(fx.out.path().join("args")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(args[0], "-cp");
    assert!(args[1].starts_with(FAKE_CLASSPATH));
    assert!(args[1].ends_with("dmlc-yarn.jar"));
    assert_eq!(args[2], "org.apache.hadoop.yarn.dmlc.Client");
    assert_eq!(args.iter().filter(|a| **a == "-file").count(), 4);
    assert!(args.ends_with(&["./run_hdfs_prog.py", "./kmeans", "./kmeans.conf"]));
    assert!(args.contains(&"DMLC[nworker=4]:kmeans"));
}

#[tokio::test]
async fn test_environment_reaches_client() {
    let fx = fixture(0, 0, "Hadoop 2.7.3");
    let submitter = Submitter::new(Arc::new(TokioRunner), false).unwrap();

    submitter.launch(fx.spec.clone()).wait().await.unwrap();

    let env = std::fs::read_to_string(fx.out.path().join("env")).unwrap();
    for expected in [
        "DMLC_NUM_WORKER=4",
        "DMLC_NUM_SERVER=0",
        "DMLC_CPU_VCORES=1",
        "DMLC_MEMORY_MB=1024",
        "DMLC_HDFS_OPTS=-Xmx128m",
        "DMLC_TRACKER_URI=10.0.0.7",
    ] {
        assert!(env.lines().any(|l| l == expected), "missing {}", expected);
    }
}

#[tokio::test]
async fn test_failing_client_is_reported() {
    let fx = fixture(3, 0, "Hadoop 2.7.3");
    let submitter = Submitter::new(Arc::new(TokioRunner), false).unwrap();

    let handle = submitter.launch(fx.spec.clone());
    let err = handle.wait().await.unwrap_err();

    assert!(err.is_submission_failure());
    assert!(matches!(err, DmlcError::SubmissionFailed { code: Some(3) }));
}

#[tokio::test]
async fn test_launch_returns_before_client_exits() {
    let fx = fixture(0, 1, "Hadoop 2.7.3");
    let submitter = Submitter::new(Arc::new(TokioRunner), true).unwrap();

    let handle = submitter.launch(fx.spec.clone());
    assert!(!handle.is_finished());
    assert!(handle.command_line().contains("classpath`"));

    tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("client should finish")
        .expect("client should succeed");
}

#[tokio::test]
async fn test_detached_failure_after_return() {
    let fx = fixture(1, 1, "Hadoop 2.7.3");
    let submitter = Submitter::new(Arc::new(TokioRunner), false).unwrap();

    let handle = submitter.launch(fx.spec.clone());
    assert!(!handle.is_finished());

    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, DmlcError::SubmissionFailed { code: Some(1) }));
}

#[tokio::test]
async fn test_classpath_failure_aborts_launch() {
    let mut fx = fixture(0, 0, "Hadoop 2.7.3");
    let broken = write_script(fx.bin.path(), "broken-hadoop", "echo 'no config' >&2\nexit 4");
    fx.spec.command.hadoop_binary = broken;
    let submitter = Submitter::new(Arc::new(TokioRunner), false).unwrap();

    let err = submitter.launch(fx.spec.clone()).wait().await.unwrap_err();

    assert!(matches!(err, DmlcError::ClasspathResolution(_)));
    assert!(err.to_string().contains("no config"));
    assert!(!fx.out.path().join("args").exists());
}

#[tokio::test]
async fn test_missing_java_is_reported() {
    let mut fx = fixture(0, 0, "Hadoop 2.7.3");
    fx.spec.command.java = fx.bin.path().join("no-such-java");
    let submitter = Submitter::new(Arc::new(TokioRunner), false).unwrap();

    let err = submitter.launch(fx.spec.clone()).wait().await.unwrap_err();
    assert!(matches!(err, DmlcError::ClientSpawn(_)));
    assert!(err.is_submission_failure());
}

#[test]
fn test_submitter_requires_runtime() {
    let err = Submitter::new(Arc::new(TokioRunner), false).unwrap_err();
    assert!(matches!(err, DmlcError::Configuration(_)));
}

#[tokio::test]
async fn test_probe_real_binary() {
    let bin = tempfile::tempdir().unwrap();
    let hadoop = fake_hadoop(bin.path(), "Hadoop 2.7.3");

    let runtime = probe_cluster(&TokioRunner, &hadoop).await.unwrap();
    assert_eq!(runtime.version.major, 2);
    assert_eq!(runtime.classpath, FAKE_CLASSPATH);
}

#[tokio::test]
async fn test_probe_old_hadoop_still_usable() {
    let bin = tempfile::tempdir().unwrap();
    let hadoop = fake_hadoop(bin.path(), "Hadoop 1.2.1");

    let runtime = probe_cluster(&TokioRunner, &hadoop).await.unwrap();
    assert_eq!(runtime.version.raw, "1.2.1");
    assert!(!runtime.version.is_supported());
}

#[tokio::test]
async fn test_probe_missing_binary() {
    let bin = tempfile::tempdir().unwrap();
    let err = probe_cluster(&TokioRunner, &bin.path().join("hadoop"))
        .await
        .unwrap_err();
    assert!(matches!(err, DmlcError::Configuration(_)));
}
