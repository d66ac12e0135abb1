use std::path::Path;
use std::sync::Arc;

use crate::config::JobConfig;
use crate::error::{DmlcError, Result};
use crate::launch::{build_launch_spec, LaunchEnvironment, LaunchSpec, SubmissionHandle, Submitter};
use crate::probe::{probe_cluster, ClusterRuntime};
use crate::process::{Invocation, ProcessRunner};
use crate::staging::{FileStager, PathProbe};
use crate::tracker::{SubmitCallback, Tracker, TrackerRegistration};

/// Lifecycle of a job submission.
///
/// `Submitting` and `Detached` describe individual callback invocations, which
/// run independently once the tracker has taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Unconfigured,
    VersionChecked,
    AwaitingCallback,
    Submitting,
    Detached,
}

/// Top-level driver: probes hadoop, then hands the tracker a submission callback.
pub struct Orchestrator<R: ProcessRunner, P: PathProbe + 'static> {
    state: OrchestratorState,
    runtime: Option<ClusterRuntime>,
    build_client: bool,
    pipeline: SubmissionPipeline<R, P>,
}

impl<R: ProcessRunner, P: PathProbe + 'static> Orchestrator<R, P> {
    /// # Errors
    ///
    /// Returns `DmlcError::Configuration` if the config does not validate or
    /// no tokio runtime is running.
    pub fn new(config: JobConfig, runner: Arc<R>, probe: Arc<P>) -> Result<Self> {
        let config = Arc::new(config.resolve()?);
        let submitter = Submitter::new(runner.clone(), config.verbose)?;
        Ok(Self {
            state: OrchestratorState::Unconfigured,
            runtime: None,
            build_client: true,
            pipeline: SubmissionPipeline {
                config,
                runner,
                probe,
                submitter,
            },
        })
    }

    /// Never run `build.sh` for a missing client jar, only warn. For dry runs.
    pub fn without_client_build(mut self) -> Self {
        self.build_client = false;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn config(&self) -> &JobConfig {
        &self.pipeline.config
    }

    pub fn runtime(&self) -> Option<&ClusterRuntime> {
        self.runtime.as_ref()
    }

    fn expect_state(&self, expected: OrchestratorState) -> Result<()> {
        if self.state != expected {
            return Err(DmlcError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Probe the hadoop installation, then make sure the client jar exists.
    ///
    /// # Errors
    ///
    /// `DmlcError::Configuration` for an unusable hadoop binary or a missing
    /// jar. An old hadoop version is only a warning.
    pub async fn check_version(&mut self) -> Result<&ClusterRuntime> {
        self.expect_state(OrchestratorState::Unconfigured)?;
        let config = self.pipeline.config.clone();
        let runner = self.pipeline.runner.as_ref();

        let runtime = probe_cluster(runner, &config.hadoop_binary).await?;

        if self.build_client {
            ensure_client_jar(runner, &config.support.client_jar).await?;
        } else if !config.support.client_jar.is_file() {
            tracing::warn!(
                jar = %config.support.client_jar.display(),
                "Client jar not found, a real submission would run build.sh"
            );
        }
        if !config.support.bootstrap_script.exists() {
            tracing::warn!(
                path = %config.support.bootstrap_script.display(),
                "Bootstrap script not found locally, containers may fail to start"
            );
        }

        self.state = OrchestratorState::VersionChecked;
        let runtime = self.runtime.insert(runtime);
        Ok(&*runtime)
    }

    /// Stage files and build the launch for one invocation without starting it.
    pub fn prepare(&self, extra_env: &LaunchEnvironment) -> LaunchSpec {
        self.pipeline.prepare(extra_env)
    }

    /// Stage, build and launch one submission. Each call is independent.
    pub fn submit(
        &self,
        num_workers: u32,
        num_servers: u32,
        extra_env: LaunchEnvironment,
    ) -> SubmissionHandle {
        self.pipeline.submit(num_workers, num_servers, extra_env)
    }

    /// The callback handed to the tracker. Holds only shared, immutable state.
    pub fn callback(&self) -> SubmitCallback {
        let pipeline = self.pipeline.clone();
        Arc::new(move |num_workers: u32, num_servers: u32, extra_env: LaunchEnvironment| {
            pipeline.submit(num_workers, num_servers, extra_env)
        })
    }

    /// Register with the tracker and let it drive submissions.
    ///
    /// # Errors
    ///
    /// `DmlcError::InvalidState` unless [`check_version`](Self::check_version)
    /// succeeded first, otherwise whatever the tracker reports.
    pub async fn register<T: Tracker>(&mut self, tracker: &T) -> Result<()> {
        self.expect_state(OrchestratorState::VersionChecked)?;
        let config = &self.pipeline.config;
        let registration = TrackerRegistration {
            num_workers: config.num_workers,
            num_servers: config.num_servers,
            verbose: config.verbose,
            process_summary: config.process_summary(),
        };
        self.state = OrchestratorState::AwaitingCallback;
        tracker.run(registration, self.callback()).await
    }

    /// Probe, then register. The usual entry point.
    pub async fn run<T: Tracker>(mut self, tracker: &T) -> Result<()> {
        self.check_version().await?;
        self.register(tracker).await
    }
}

/// Per-invocation stage → build → launch, shared with the tracker callback.
struct SubmissionPipeline<R: ProcessRunner, P: PathProbe + 'static> {
    config: Arc<JobConfig>,
    runner: Arc<R>,
    probe: Arc<P>,
    submitter: Submitter<R>,
}

impl<R: ProcessRunner, P: PathProbe + 'static> Clone for SubmissionPipeline<R, P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            runner: self.runner.clone(),
            probe: self.probe.clone(),
            submitter: self.submitter.clone(),
        }
    }
}

impl<R: ProcessRunner, P: PathProbe + 'static> SubmissionPipeline<R, P> {
    fn prepare(&self, extra_env: &LaunchEnvironment) -> LaunchSpec {
        let config = self.config.as_ref();
        let staging = FileStager::new(self.probe.as_ref()).stage(
            &config.command,
            config.auto_file_cache,
            &config.files,
            &config.support,
        );
        tracing::debug!(
            staged = staging.files.len(),
            command = ?staging.command,
            "Staged files for distributed cache"
        );
        build_launch_spec(config, &staging, inherited_env(), extra_env)
    }

    fn submit(
        &self,
        num_workers: u32,
        num_servers: u32,
        extra_env: LaunchEnvironment,
    ) -> SubmissionHandle {
        tracing::info!(
            state = ?OrchestratorState::Submitting,
            nworker = num_workers,
            nserver = num_servers,
            job_name = %self.config.job_name,
            "Preparing submission"
        );
        let spec = self.prepare(&extra_env);
        let handle = self.submitter.launch(spec);
        tracing::info!(
            state = ?OrchestratorState::Detached,
            submission_id = %handle.id(),
            "Submission running in background"
        );
        handle
    }
}

/// Snapshot of our environment. Variables that are not valid UTF-8 are not passed on.
fn inherited_env() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
}

/// Build the client jar with the `build.sh` next to it if it is missing.
async fn ensure_client_jar<R: ProcessRunner>(runner: &R, jar: &Path) -> Result<()> {
    if jar.is_file() {
        return Ok(());
    }

    let dir = jar.parent().unwrap_or_else(|| Path::new("."));
    let build_script = dir.join("build.sh");
    if !build_script.is_file() {
        return Err(DmlcError::config(format!(
            "cannot find {} and there is no build.sh to create it",
            jar.display()
        )));
    }

    tracing::warn!(jar = %jar.display(), "Client jar not found, running build.sh");
    let out = runner
        .output(&Invocation::new(&build_script).in_dir(dir))
        .await
        .map_err(|e| DmlcError::config(format!("failed to run {}: {}", build_script.display(), e)))?;

    if !out.success || !jar.is_file() {
        return Err(DmlcError::config(format!(
            "failed to build {} (exit code {:?}), try running build.sh manually",
            jar.display(),
            out.code
        )));
    }
    Ok(())
}
