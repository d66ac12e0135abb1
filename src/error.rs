use thiserror::Error;

use crate::orchestrator::OrchestratorState;

#[derive(Error, Debug)]
pub enum DmlcError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Orchestrator is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: OrchestratorState,
        actual: OrchestratorState,
    },

    #[error("Submission client exited with code {code:?}")]
    SubmissionFailed { code: Option<i32> },

    #[error("Failed to resolve hadoop classpath: {0}")]
    ClasspathResolution(String),

    #[error("Failed to start submission client: {0}")]
    ClientSpawn(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Submission task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DmlcError {
    pub fn config(msg: impl Into<String>) -> Self {
        DmlcError::Configuration(msg.into())
    }

    /// True for failures reported by a detached submission rather than at startup.
    pub fn is_submission_failure(&self) -> bool {
        matches!(
            self,
            DmlcError::SubmissionFailed { .. }
                | DmlcError::ClasspathResolution(_)
                | DmlcError::ClientSpawn(_)
                | DmlcError::TaskJoin(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DmlcError>;
