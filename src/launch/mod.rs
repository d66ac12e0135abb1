//! Launching the YARN submission client.
//!
//! - [`spec`]: builds the client's command line and environment from the
//!   job config and a staging result. No I/O.
//! - [`submitter`]: resolves the hadoop classpath and runs the client in a
//!   background task, handing back a [`SubmissionHandle`].

pub mod spec;
pub mod submitter;

pub use spec::{build_launch_spec, LaunchCommand, LaunchEnvironment, LaunchSpec};
pub use submitter::{SubmissionHandle, Submitter};
