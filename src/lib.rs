//! # dockerstrap
//!
//! Bootstrap a testing environment from a declared set of Docker containers.
//! Developers list the services a test suite needs; dockerstrap makes sure
//! each one exists and is running, and can tear them down or cycle them
//! without manual intervention.
//!
//! ## Architecture Overview
//!
//! - **[`container`]**: per-container lifecycle reconciliation and the
//!   concurrent orchestrator that drives it across all declared containers
//! - **[`cli`]**: command line parsing and test environment file loading
//! - **[`env`]**: file names, environment variables and defaults
//!
//! Reconciliation is one-shot: every container is reconciled independently
//! and concurrently, and a run returns once all of them have finished, with
//! a per-container report.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dockerstrap::cli::TestEnvironment;
//! use dockerstrap::container::{DockerRuntime, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let environment = TestEnvironment::load("testenv.yaml")?;
//!     let runtime = Arc::new(DockerRuntime::from_env().await?);
//!
//!     let orchestrator = Orchestrator::new(runtime, environment.orchestrator_config(None));
//!     let report = orchestrator.bootstrap(&environment.containers).await?;
//!
//!     for (name, outcome) in report.into_result()? {
//!         println!("{}: {}", name, outcome);
//!     }
//!     Ok(())
//! }
//! ```

/// Container lifecycle reconciliation and orchestration.
///
/// Converges declared containers to running or absent against a Docker
/// compatible runtime, recovering from missing containers, missing images
/// and concurrent starts.
pub mod container;

/// Environment constants and path utilities.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use container::{
    ContainerDescriptor, ContainerError, ContainerRuntime, Operation, Orchestrator,
    OrchestratorConfig, Outcome, RunReport,
};
