use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{DmlcError, Result};
use crate::staging::basename;

/// Job name sentinel that asks for a synthesized name.
pub const AUTO_JOB_NAME: &str = "auto";
/// Namenode sentinel meaning "whatever libhdfs picks up from the hadoop config".
pub const DEFAULT_NAME_NODE: &str = "default";

pub const CLIENT_JAR_NAME: &str = "dmlc-yarn.jar";
pub const BOOTSTRAP_SCRIPT_NAME: &str = "run_hdfs_prog.py";

/// Files the submission client needs in the distributed cache on every launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportArtifacts {
    /// Packaged YARN client (`org.apache.hadoop.yarn.dmlc.Client`)
    pub client_jar: PathBuf,
    /// Script each container runs to set up libhdfs before exec'ing the user command
    pub bootstrap_script: PathBuf,
}

impl SupportArtifacts {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            client_jar: dir.join(CLIENT_JAR_NAME),
            bootstrap_script: dir.join(BOOTSTRAP_SCRIPT_NAME),
        }
    }

    /// Locate the support directory: an explicit directory wins, otherwise
    /// `<dir of this executable>/../yarn`.
    pub fn locate(explicit_dir: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = explicit_dir {
            return Ok(Self::in_dir(&dir));
        }
        let exe = std::env::current_exe()?;
        let exe_dir = exe
            .parent()
            .ok_or_else(|| DmlcError::config("cannot determine executable directory"))?;
        Ok(Self::in_dir(&exe_dir.join("..").join("yarn")))
    }

    /// Path the bootstrap script has inside a container's working directory.
    pub fn remote_bootstrap(&self) -> String {
        format!("./{}", basename(&self.bootstrap_script.to_string_lossy()))
    }
}

impl Default for SupportArtifacts {
    fn default() -> Self {
        Self::in_dir(Path::new("yarn"))
    }
}

/// Everything needed to submit one job, resolved once at startup.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub num_workers: u32,
    /// 0 launches a worker-only job
    pub num_servers: u32,
    pub hadoop_binary: PathBuf,
    pub java_binary: PathBuf,
    pub job_name: String,
    pub queue: String,
    /// HDFS directory for intermediate results
    pub temp_dir: String,
    pub vcores: u32,
    pub memory_mb: u64,
    /// JVM options handed to libhdfs inside each container
    pub hdfs_opts: String,
    pub name_node: String,
    pub verbose: bool,
    /// Raw `-f` values; each one may hold several `#`-separated paths
    pub files: Vec<String>,
    pub auto_file_cache: bool,
    pub command: Vec<String>,
    pub support: SupportArtifacts,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            num_servers: 0,
            hadoop_binary: PathBuf::from("hadoop"),
            java_binary: PathBuf::from("java"),
            job_name: AUTO_JOB_NAME.to_string(),
            queue: "default".to_string(),
            temp_dir: "/tmp".to_string(),
            vcores: 1,
            memory_mb: 1024,
            hdfs_opts: "-Xmx128m".to_string(),
            name_node: DEFAULT_NAME_NODE.to_string(),
            verbose: false,
            files: Vec::new(),
            auto_file_cache: true,
            command: Vec::new(),
            support: SupportArtifacts::default(),
        }
    }
}

impl JobConfig {
    pub fn new(num_workers: u32, command: Vec<String>) -> Self {
        Self {
            num_workers,
            command,
            ..Default::default()
        }
    }

    pub fn with_servers(mut self, num_servers: u32) -> Self {
        self.num_servers = num_servers;
        self
    }

    pub fn with_hadoop_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.hadoop_binary = path.into();
        self
    }

    pub fn with_java_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.java_binary = path.into();
        self
    }

    pub fn with_support(mut self, support: SupportArtifacts) -> Self {
        self.support = support;
        self
    }

    pub fn with_files(mut self, group: impl Into<String>) -> Self {
        self.files.push(group.into());
        self
    }

    /// Validate and fill in derived fields. Safe to call more than once.
    ///
    /// The job name is synthesized here, from the command as the user typed
    /// it, before any staging rewrites the first token.
    pub fn resolve(mut self) -> Result<Self> {
        if self.num_workers == 0 {
            return Err(DmlcError::config("number of workers must be at least 1"));
        }
        if self.command.is_empty() {
            return Err(DmlcError::config("no command given"));
        }
        if self.job_name == AUTO_JOB_NAME {
            self.job_name = default_job_name(self.num_workers, self.num_servers, &self.command);
        }
        Ok(self)
    }

    /// Human-readable command summary handed to the tracker.
    pub fn process_summary(&self) -> String {
        self.command.join(" ")
    }
}

/// `DMLC[nworker=4]:kmeans` or `DMLC[nworker=4,nserver=2]:kmeans`.
pub fn default_job_name(num_workers: u32, num_servers: u32, command: &[String]) -> String {
    let program = command.first().map(|c| basename(c)).unwrap_or_default();
    if num_servers == 0 {
        format!("DMLC[nworker={}]:{}", num_workers, program)
    } else {
        format!(
            "DMLC[nworker={},nserver={}]:{}",
            num_workers, num_servers, program
        )
    }
}

/// Find the hadoop binary: the explicit path if given, else `$HADOOP_HOME/bin/hadoop`.
pub fn resolve_hadoop_binary(
    explicit: Option<PathBuf>,
    hadoop_home: Option<PathBuf>,
) -> Result<PathBuf> {
    let (candidate, origin) = match (explicit, hadoop_home) {
        (Some(path), _) => (path, "--hadoop-binary"),
        (None, Some(home)) => (home.join("bin").join("hadoop"), "HADOOP_HOME"),
        (None, None) => {
            return Err(DmlcError::config(
                "hadoop binary not specified: pass --hadoop-binary or set HADOOP_HOME",
            ))
        }
    };

    if !candidate.is_file() {
        return Err(DmlcError::config(format!(
            "hadoop binary {} (from {}) does not exist or is not a file",
            candidate.display(),
            origin
        )));
    }
    Ok(candidate)
}

pub fn resolve_java_binary(explicit: Option<PathBuf>, java_home: Option<PathBuf>) -> PathBuf {
    match (explicit, java_home) {
        (Some(path), _) => path,
        (None, Some(home)) => home.join("bin").join("java"),
        (None, None) => PathBuf::from("java"),
    }
}
