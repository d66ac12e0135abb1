use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::{JobConfig, DEFAULT_NAME_NODE};
use crate::process::Invocation;
use crate::staging::Staging;

/// Main class of the YARN client packaged in `dmlc-yarn.jar`.
pub const CLIENT_ENTRY_POINT: &str = "org.apache.hadoop.yarn.dmlc.Client";

pub const ENV_CPU_VCORES: &str = "DMLC_CPU_VCORES";
pub const ENV_MEMORY_MB: &str = "DMLC_MEMORY_MB";
pub const ENV_NUM_WORKER: &str = "DMLC_NUM_WORKER";
pub const ENV_NUM_SERVER: &str = "DMLC_NUM_SERVER";
pub const ENV_HDFS_OPTS: &str = "DMLC_HDFS_OPTS";
pub const ENV_HDFS_NAMENODE: &str = "DMLC_HDFS_NAMENODE";

pub type LaunchEnvironment = BTreeMap<String, String>;

/// Java invocation of the YARN client, kept as data until launch.
///
/// The hadoop classpath is not baked in: it is queried from `hadoop_binary`
/// right before the client starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchCommand {
    pub java: PathBuf,
    pub hadoop_binary: PathBuf,
    pub client_jar: PathBuf,
    pub entry_point: String,
    /// Everything after the entry point: `-file` pairs, job flags, bootstrap + user command
    pub client_args: Vec<String>,
}

impl LaunchCommand {
    /// `hadoop classpath`, whose output is prepended to the client jar.
    pub fn classpath_query(&self) -> Invocation {
        Invocation::new(&self.hadoop_binary).arg("classpath")
    }

    pub fn classpath(&self, hadoop_classpath: &str) -> String {
        format!(
            "{}:{}",
            hadoop_classpath.trim(),
            self.client_jar.to_string_lossy()
        )
    }

    pub fn to_invocation(&self, hadoop_classpath: &str, env: LaunchEnvironment) -> Invocation {
        Invocation::new(&self.java)
            .arg("-cp")
            .arg(self.classpath(hadoop_classpath))
            .arg(self.entry_point.clone())
            .args(self.client_args.iter().cloned())
            .with_env(env)
    }

    /// Diagnostic rendering with the classpath shown as the query that produces it.
    pub fn display(&self) -> String {
        let classpath = format!("`{} classpath`", self.hadoop_binary.display());
        let mut parts = vec![
            self.java.to_string_lossy().into_owned(),
            "-cp".to_string(),
            self.classpath(&classpath),
            self.entry_point.clone(),
        ];
        parts.extend(self.client_args.iter().cloned());
        parts.join(" ")
    }

    /// Paths passed with `-file`, in command order.
    ///
    /// Only the leading `-file` pairs count; the user command may carry its
    /// own `-file` flags.
    pub fn staged_files(&self) -> Vec<&str> {
        self.client_args
            .chunks(2)
            .take_while(|pair| pair.len() == 2 && pair[0] == "-file")
            .map(|pair| pair[1].as_str())
            .collect()
    }
}

/// Command plus environment for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchSpec {
    pub command: LaunchCommand,
    /// Full environment the client runs with
    #[serde(skip)]
    pub env: LaunchEnvironment,
    /// Tracker-supplied and job-specific variables layered over the inherited environment
    pub overrides: LaunchEnvironment,
}

/// Variables every container of the job needs, derived from the config alone.
pub fn job_environment(config: &JobConfig) -> LaunchEnvironment {
    let mut env = LaunchEnvironment::new();
    env.insert(ENV_CPU_VCORES.to_string(), config.vcores.to_string());
    env.insert(ENV_MEMORY_MB.to_string(), config.memory_mb.to_string());
    env.insert(ENV_NUM_WORKER.to_string(), config.num_workers.to_string());
    env.insert(ENV_NUM_SERVER.to_string(), config.num_servers.to_string());
    env.insert(ENV_HDFS_OPTS.to_string(), config.hdfs_opts.clone());
    if config.name_node != DEFAULT_NAME_NODE {
        env.insert(ENV_HDFS_NAMENODE.to_string(), config.name_node.clone());
    }
    env
}

/// Assemble the client launch for one submission.
///
/// Pure: the inherited environment is passed in, nothing is read from the
/// process. Overlay order is inherited, then `extra`, then job variables.
pub fn build_launch_spec<I>(
    config: &JobConfig,
    staging: &Staging,
    inherited: I,
    extra: &LaunchEnvironment,
) -> LaunchSpec
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut overrides = extra.clone();
    overrides.extend(job_environment(config));

    let mut env: LaunchEnvironment = inherited.into_iter().collect();
    env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut client_args = Vec::with_capacity(staging.files.len() * 2 + 7 + staging.command.len());
    for file in staging.files.iter() {
        client_args.push("-file".to_string());
        client_args.push(file.to_string_lossy().into_owned());
    }
    client_args.push("-jobname".to_string());
    client_args.push(config.job_name.clone());
    client_args.push("-tempdir".to_string());
    client_args.push(config.temp_dir.clone());
    client_args.push("-queue".to_string());
    client_args.push(config.queue.clone());
    client_args.push(config.support.remote_bootstrap());
    client_args.extend(staging.command.iter().cloned());

    LaunchSpec {
        command: LaunchCommand {
            java: config.java_binary.clone(),
            hadoop_binary: config.hadoop_binary.clone(),
            client_jar: config.support.client_jar.clone(),
            entry_point: CLIENT_ENTRY_POINT.to_string(),
            client_args,
        },
        env,
        overrides,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupportArtifacts;
    use crate::staging::StagedFileSet;
    use std::path::Path;

    fn config() -> JobConfig {
        JobConfig::new(4, vec!["./kmeans".to_string(), "../kmeans.conf".to_string()])
            .with_hadoop_binary("/opt/hadoop/bin/hadoop")
            .with_support(SupportArtifacts::in_dir(Path::new("/opt/dmlc/yarn")))
            .resolve()
            .unwrap()
    }

    fn staging() -> Staging {
        let mut files = StagedFileSet::new();
        files.insert("/home/u/job/kmeans");
        files.insert("/home/u/kmeans.conf");
        files.insert("/opt/dmlc/yarn/dmlc-yarn.jar");
        files.insert("/opt/dmlc/yarn/run_hdfs_prog.py");
        Staging {
            files,
            command: vec!["./kmeans".to_string(), "./kmeans.conf".to_string()],
        }
    }

    fn inherited() -> Vec<(String, String)> {
        vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("DMLC_NUM_WORKER".to_string(), "99".to_string()),
            ("DMLC_TRACKER_URI".to_string(), "stale".to_string()),
        ]
    }

    #[test]
    fn environment_overlay_order() {
        let mut extra = LaunchEnvironment::new();
        extra.insert("DMLC_TRACKER_URI".to_string(), "10.0.0.5".to_string());
        extra.insert("DMLC_MEMORY_MB".to_string(), "1".to_string());

        let spec = build_launch_spec(&config(), &staging(), inherited(), &extra);

        assert_eq!(spec.env["PATH"], "/usr/bin");
        assert_eq!(spec.env["DMLC_TRACKER_URI"], "10.0.0.5");
        assert_eq!(spec.env[ENV_NUM_WORKER], "4");
        assert_eq!(spec.env[ENV_NUM_SERVER], "0");
        assert_eq!(spec.env[ENV_MEMORY_MB], "1024");
        assert_eq!(spec.env[ENV_CPU_VCORES], "1");
        assert_eq!(spec.env[ENV_HDFS_OPTS], "-Xmx128m");
        assert!(!spec.env.contains_key(ENV_HDFS_NAMENODE));
        assert!(!spec.overrides.contains_key("PATH"));
    }

    #[test]
    fn namenode_exported_when_set() {
        let mut cfg = config();
        cfg.name_node = "hdfs://nn1:8020".to_string();
        let spec = build_launch_spec(&cfg, &staging(), Vec::new(), &LaunchEnvironment::new());
        assert_eq!(spec.env[ENV_HDFS_NAMENODE], "hdfs://nn1:8020");
    }

    #[test]
    fn command_layout() {
        let spec = build_launch_spec(&config(), &staging(), Vec::new(), &LaunchEnvironment::new());
        let cmd = &spec.command;

        assert_eq!(cmd.entry_point, CLIENT_ENTRY_POINT);
        assert_eq!(cmd.staged_files().len(), 4);
        assert!(cmd.staged_files().contains(&"/home/u/kmeans.conf"));

        let tail: Vec<&str> = cmd.client_args[8..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "-jobname",
                "DMLC[nworker=4]:kmeans",
                "-tempdir",
                "/tmp",
                "-queue",
                "default",
                "./run_hdfs_prog.py",
                "./kmeans",
                "./kmeans.conf",
            ]
        );
    }

    #[test]
    fn user_file_flags_are_not_staged_files() {
        let mut staging = staging();
        staging.command.extend(["-file".to_string(), "./kmeans.conf".to_string()]);
        let spec = build_launch_spec(&config(), &staging, Vec::new(), &LaunchEnvironment::new());

        let files = spec.command.staged_files();
        assert_eq!(files.len(), 4);
        assert!(!files.contains(&"./kmeans.conf"));
        assert!(spec.command.client_args.ends_with(&[
            "./kmeans.conf".to_string(),
            "-file".to_string(),
            "./kmeans.conf".to_string(),
        ]));
    }

    #[test]
    fn invocation_resolves_classpath() {
        let spec = build_launch_spec(&config(), &staging(), Vec::new(), &LaunchEnvironment::new());
        let inv = spec
            .command
            .to_invocation("/etc/hadoop:/opt/hadoop/share/*\n", spec.env.clone());

        assert_eq!(inv.program, PathBuf::from("java"));
        assert_eq!(inv.args[0], "-cp");
        assert_eq!(
            inv.args[1],
            "/etc/hadoop:/opt/hadoop/share/*:/opt/dmlc/yarn/dmlc-yarn.jar"
        );
        assert_eq!(inv.args[2], CLIENT_ENTRY_POINT);
        assert_eq!(inv.env.as_ref(), Some(&spec.env));
        assert_eq!(
            spec.command.classpath_query().display(),
            "/opt/hadoop/bin/hadoop classpath"
        );
    }

    #[test]
    fn display_shows_classpath_query() {
        let spec = build_launch_spec(&config(), &staging(), Vec::new(), &LaunchEnvironment::new());
        let shown = spec.command.display();
        assert!(shown.starts_with("java -cp `/opt/hadoop/bin/hadoop classpath`:/opt/dmlc/yarn/dmlc-yarn.jar"));
        assert!(shown.ends_with("./run_hdfs_prog.py ./kmeans ./kmeans.conf"));
    }

    #[test]
    fn builder_is_idempotent() {
        let mut extra = LaunchEnvironment::new();
        extra.insert("DMLC_TRACKER_PORT".to_string(), "9091".to_string());
        let a = build_launch_spec(&config(), &staging(), inherited(), &extra);
        let b = build_launch_spec(&config(), &staging(), inherited(), &extra);
        assert_eq!(a, b);
        assert_eq!(a.command.display(), b.command.display());
    }
}
