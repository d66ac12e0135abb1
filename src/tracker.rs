//! Tracker seam.
//!
//! The tracker owns the worker/server rendezvous. The orchestrator only hands
//! it a [`SubmitCallback`]; the tracker decides when, and how often, to call it.

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::launch::{LaunchEnvironment, SubmissionHandle};

pub const ENV_TRACKER_URI: &str = "DMLC_TRACKER_URI";
pub const ENV_TRACKER_PORT: &str = "DMLC_TRACKER_PORT";
pub const DEFAULT_TRACKER_PORT: u16 = 9091;

/// Starts one detached submission for (workers, servers, extra environment).
pub type SubmitCallback =
    Arc<dyn Fn(u32, u32, LaunchEnvironment) -> SubmissionHandle + Send + Sync>;

/// What the tracker is told about the job at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerRegistration {
    pub num_workers: u32,
    pub num_servers: u32,
    pub verbose: bool,
    /// The user command, space-joined, for the tracker's bookkeeping
    pub process_summary: String,
}

pub trait Tracker {
    /// Take over coordination of the job. Returns once the tracker considers
    /// the job handed off, or with the error of a failed submission.
    fn run(
        &self,
        registration: TrackerRegistration,
        submit: SubmitCallback,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Tracker running outside this process, reachable at a fixed address.
///
/// Submits once with the rendezvous address in the environment, then reports
/// the submission's outcome. Cancelling the shutdown token stops waiting
/// without touching the client process.
#[derive(Debug, Clone)]
pub struct ExternalTracker {
    host: String,
    port: u16,
    shutdown: CancellationToken,
}

impl ExternalTracker {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn rendezvous_env(&self) -> LaunchEnvironment {
        let mut env = LaunchEnvironment::new();
        env.insert(ENV_TRACKER_URI.to_string(), self.host.clone());
        env.insert(ENV_TRACKER_PORT.to_string(), self.port.to_string());
        env
    }
}

impl Tracker for ExternalTracker {
    async fn run(&self, registration: TrackerRegistration, submit: SubmitCallback) -> Result<()> {
        tracing::info!(
            nworker = registration.num_workers,
            nserver = registration.num_servers,
            tracker = %format!("{}:{}", self.host, self.port),
            command = %registration.process_summary,
            "Submitting job"
        );

        let handle = submit(
            registration.num_workers,
            registration.num_servers,
            self.rendezvous_env(),
        );
        let submission_id = handle.id();

        tokio::select! {
            result = handle.wait() => {
                match result {
                    Ok(()) => tracing::info!(submission_id = %submission_id, "Job submission finished"),
                    Err(e) => {
                        tracing::error!(submission_id = %submission_id, error = %e, "Job submission failed");
                        return Err(e);
                    }
                }
            }
            _ = self.shutdown.cancelled() => {
                tracing::warn!(
                    submission_id = %submission_id,
                    "Detaching, the YARN client keeps running in the background"
                );
            }
        }
        Ok(())
    }
}

/// Address other hosts most likely reach us on: the source address of the
/// default route. No packets are sent.
pub fn guess_host_ip() -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
    Ok(socket.local_addr()?.ip())
}
