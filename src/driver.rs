//! Container runtime seam
//!
//! The orchestrator never talks to a container runtime directly; it drives
//! this trait. The production implementation shells out to `docker compose`,
//! the mock implementation backs tests and demo mode. Error variants keep
//! "could not reach the runtime" (retry-safe) apart from "the runtime said
//! no" (operator problem).

pub mod compose;
pub mod testing;

use crate::error::OrchestratorError;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The runtime could not be reached (socket down, binary missing)
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),
    /// The runtime completed the call but the operation failed
    #[error("container operation failed: {0}")]
    Failed(String),
    /// The call outran its deadline
    #[error("container operation timed out after {0}s")]
    Timeout(u64),
}

impl From<DriverError> for OrchestratorError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Unavailable(msg) => OrchestratorError::DriverUnavailable(msg),
            DriverError::Failed(msg) => OrchestratorError::DriverFailure(msg),
            DriverError::Timeout(secs) => {
                OrchestratorError::DriverUnavailable(format!("timed out after {secs}s"))
            }
        }
    }
}

/// A rendered compose-style topology for one team
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Compose project name; stable per team
    pub project: String,
    pub compose_yaml: String,
}

/// One service as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub service: String,
    pub running: bool,
}

/// Result of a non-interactive exec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Duplex byte streams of an interactive exec.
///
/// Cancelling `stop` tears the underlying session down.
pub struct ConsoleStreams {
    pub output: mpsc::Receiver<Vec<u8>>,
    pub input: mpsc::Sender<Vec<u8>>,
    pub stop: CancellationToken,
}

/// Compose-style container runtime operations
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    /// Bring a topology up. Idempotent: re-running with an extended
    /// topology brings up only the delta.
    async fn up(&self, topology: &Topology) -> Result<(), DriverError>;

    /// Bring the whole project down.
    async fn down(&self, project: &str) -> Result<(), DriverError>;

    /// Stop and remove one service from a running project.
    async fn remove_service(&self, project: &str, service: &str) -> Result<(), DriverError>;

    /// Per-service state, empty when the project is not up.
    async fn status(&self, project: &str) -> Result<Vec<ServiceStatus>, DriverError>;

    /// Run a command inside a running service and wait for it.
    async fn exec(
        &self,
        project: &str,
        service: &str,
        argv: &[String],
        env: &[(String, String)],
    ) -> Result<ExecOutput, DriverError>;

    /// Open an interactive session against a running service.
    async fn attach(&self, project: &str, service: &str) -> Result<ConsoleStreams, DriverError>;
}
