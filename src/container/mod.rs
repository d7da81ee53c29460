//! Container reconciliation layer.
//!
//! This module converges a declared set of named containers to a desired
//! lifecycle state against a Docker-compatible runtime. It handles the
//! start/create/pull recovery chain for a single container and fans the work
//! out concurrently across every declared container.
//!
//! ## Architecture
//!
//! - [`descriptor`]: declared container shape (name, image, ports)
//! - [`runtime`]: the runtime capability trait the reconciler drives
//! - `client`: bollard-backed runtime adapter (feature `docker`)
//! - [`readiness`]: pluggable post-start readiness checks
//! - [`reconciler`]: per-container lifecycle state machine
//! - [`orchestrator`]: concurrent fan-out and result aggregation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dockerstrap::container::{
//!     ContainerDescriptor, DockerRuntime, Operation, Orchestrator, OrchestratorConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Arc::new(DockerRuntime::from_env().await?);
//!     let orchestrator = Orchestrator::new(runtime, OrchestratorConfig::default());
//!
//!     let descriptors = vec![ContainerDescriptor::new(
//!         "postgres",
//!         "postgres:latest",
//!         vec!["5432".to_string()],
//!     )];
//!
//!     let report = orchestrator.run(Operation::Bootstrap, &descriptors).await?;
//!     report.into_result()?;
//!     Ok(())
//! }
//! ```

#[cfg(feature = "docker")]
mod client;
pub mod descriptor;
pub mod orchestrator;
pub mod readiness;
pub mod reconciler;
pub mod runtime;

#[cfg(test)]
mod tests;

#[cfg(feature = "docker")]
pub use client::{ConnectionSettings, DockerRuntime};
pub use descriptor::{ContainerDescriptor, Port, validate_descriptors};
pub use orchestrator::{ContainerReport, Operation, Orchestrator, OrchestratorConfig, RunReport};
pub use readiness::{FixedDelay, NoWait, ReadinessProbe, TcpPortProbe};
pub use reconciler::{Outcome, Reconciler, ReconcilerConfig};
pub use runtime::{
    ContainerObservation, ContainerRuntime, CreateRequest, HostBinding, ObservedState,
    PortBindings,
};

/// Container reconciliation errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Listing containers from the runtime failed
    #[error("Failed to list containers: {0}")]
    RuntimeQuery(String),

    /// Container creation failed for a reason other than a missing image
    #[error("Failed to create container {name}: {message}")]
    RuntimeCreate { name: String, message: String },

    /// Container start failed for a reason other than missing/already running
    #[error("Failed to start container {name}: {message}")]
    RuntimeStart { name: String, message: String },

    /// Image pull failed
    #[error("Failed to pull image {image}: {message}")]
    RuntimePull { image: String, message: String },

    /// Container removal failed
    #[error("Failed to remove container {name}: {message}")]
    RuntimeRemove { name: String, message: String },

    /// The runtime has no container with this name
    #[error("No such container: {0}")]
    ContainerNotFound(String),

    /// The runtime has no local copy of this image
    #[error("No such image: {0}")]
    ImageNotFound(String),

    /// The container was already running when asked to start
    #[error("Container already running: {0}")]
    AlreadyRunning(String),

    /// A descriptor is malformed
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Two descriptors share a name
    #[error("Duplicate container name: {0}")]
    DuplicateName(String),

    /// The readiness probe gave up on a started container
    #[error("Container {name} not ready: {message}")]
    NotReady { name: String, message: String },

    /// Connecting to the runtime failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Test environment file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A reconciliation task panicked or was cancelled
    #[error("Reconciliation task for {name} failed: {message}")]
    TaskFailed { name: String, message: String },

    /// One or more containers failed to reconcile
    #[error("{} container(s) failed: {}", .0.len(), .0.join(", "))]
    Failed(Vec<String>),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// Whether the runtime reported a missing container.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::ContainerNotFound(_))
    }

    /// Whether the runtime reported a missing image.
    pub fn is_image_missing(&self) -> bool {
        matches!(self, ContainerError::ImageNotFound(_))
    }

    /// Whether the runtime reported the container as already running.
    pub fn is_already_running(&self) -> bool {
        matches!(self, ContainerError::AlreadyRunning(_))
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
