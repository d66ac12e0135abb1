pub mod config;
pub mod error;
pub mod launch;
pub mod orchestrator;
pub mod probe;
pub mod process;
pub mod shutdown;
pub mod staging;
pub mod tracker;

pub use config::JobConfig;
pub use error::{DmlcError, Result};
pub use orchestrator::{Orchestrator, OrchestratorState};
