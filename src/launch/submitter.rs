use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{DmlcError, Result};
use crate::launch::spec::LaunchSpec;
use crate::process::ProcessRunner;

/// A submission running in the background.
///
/// Dropping the handle detaches it; the client keeps running. [`wait`](Self::wait)
/// yields the client's outcome.
#[derive(Debug)]
pub struct SubmissionHandle {
    id: Uuid,
    command_line: String,
    task: JoinHandle<Result<()>>,
}

impl SubmissionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The launch command as it was logged before starting.
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the submission client to exit.
    ///
    /// # Errors
    ///
    /// `DmlcError::SubmissionFailed` if the client exits non-zero,
    /// `DmlcError::ClasspathResolution` if `hadoop classpath` fails first,
    /// `DmlcError::ClientSpawn` if java cannot be started,
    /// `DmlcError::TaskJoin` if the background task panicked or was aborted.
    pub async fn wait(self) -> Result<()> {
        self.task.await?
    }
}

/// Starts the YARN submission client without waiting for it.
///
/// Submissions run on the runtime the submitter was created in, so `launch`
/// may be called from any thread.
#[derive(Debug)]
pub struct Submitter<R: ProcessRunner> {
    runner: Arc<R>,
    runtime: Handle,
    verbose: bool,
}

impl<R: ProcessRunner> Clone for Submitter<R> {
    fn clone(&self) -> Self {
        Self {
            runner: self.runner.clone(),
            runtime: self.runtime.clone(),
            verbose: self.verbose,
        }
    }
}

impl<R: ProcessRunner> Submitter<R> {
    /// # Errors
    ///
    /// `DmlcError::Configuration` when called outside a tokio runtime.
    pub fn new(runner: Arc<R>, verbose: bool) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| DmlcError::config(format!("submitter needs a tokio runtime: {}", e)))?;
        Ok(Self {
            runner,
            runtime,
            verbose,
        })
    }

    /// Spawn the client on the tokio runtime and return immediately.
    pub fn launch(&self, spec: LaunchSpec) -> SubmissionHandle {
        let id = Uuid::new_v4();
        let command_line = spec.command.display();
        if self.verbose {
            tracing::info!(submission_id = %id, command = %command_line, "Launching YARN client");
        } else {
            tracing::debug!(submission_id = %id, command = %command_line, "Launching YARN client");
        }

        let runner = self.runner.clone();
        let task = self
            .runtime
            .spawn(async move { run_submission(runner.as_ref(), id, spec).await });

        SubmissionHandle {
            id,
            command_line,
            task,
        }
    }
}

async fn run_submission<R: ProcessRunner>(runner: &R, id: Uuid, spec: LaunchSpec) -> Result<()> {
    let query = spec.command.classpath_query().with_env(spec.env.clone());
    let classpath = runner
        .output(&query)
        .await
        .map_err(|e| DmlcError::ClasspathResolution(e.to_string()))?;
    if !classpath.success {
        let err = DmlcError::ClasspathResolution(format!(
            "exit code {:?}: {}",
            classpath.code,
            classpath.stderr.trim()
        ));
        tracing::error!(submission_id = %id, error = %err, "Submission aborted");
        return Err(err);
    }

    let invocation = spec.command.to_invocation(&classpath.stdout, spec.env);
    let status = match runner.run(&invocation).await {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(submission_id = %id, error = %e, "Failed to start YARN client");
            return Err(DmlcError::ClientSpawn(e));
        }
    };

    if status.success {
        tracing::info!(submission_id = %id, "YARN client finished");
        Ok(())
    } else {
        tracing::error!(submission_id = %id, exit_code = ?status.code, "YARN client failed");
        Err(DmlcError::SubmissionFailed { code: status.code })
    }
}
