//! External command execution.
//!
//! Every subprocess this crate starts (`hadoop version`, `hadoop classpath`,
//! the java submission client) goes through [`ProcessRunner`] as an argv
//! vector. Nothing is ever handed to a shell, so paths and job names with
//! spaces or metacharacters reach the child untouched.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;

/// A single command line plus the environment it runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// When set, the child sees exactly these variables and nothing inherited
    pub env: Option<BTreeMap<String, String>>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: None,
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Space-joined rendering for logs. Not meant to be re-parsed by a shell.
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref env) = self.env {
            cmd.env_clear().envs(env);
        }
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        // The submission client must outlive us if the operator detaches early.
        cmd.kill_on_drop(false);
        cmd
    }
}

/// Exit status and captured streams of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn first_line(&self) -> &str {
        self.stdout.lines().next().unwrap_or("")
    }
}

/// Capability to run external commands.
pub trait ProcessRunner: Send + Sync + 'static {
    /// Run to completion, capturing stdout and stderr.
    fn output(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = io::Result<ProcessOutput>> + Send;

    /// Run to completion with stdout and stderr passed through to ours.
    /// Only the exit status is reported.
    fn run(&self, invocation: &Invocation)
        -> impl Future<Output = io::Result<ProcessOutput>> + Send;
}

/// Runs commands as real child processes on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

impl ProcessRunner for TokioRunner {
    async fn output(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
        tracing::debug!(command = %invocation.display(), "Running command");
        let output = invocation
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(ProcessOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
        tracing::debug!(command = %invocation.display(), "Spawning command");
        let status = invocation
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        Ok(ProcessOutput {
            success: status.success(),
            code: status.code(),
            ..Default::default()
        })
    }
}
