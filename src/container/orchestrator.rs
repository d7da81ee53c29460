//! Concurrent multi-container reconciliation.
//!
//! Spawns one task per descriptor, waits for all of them, and reports every
//! container's result. A failing container never cancels or hides the others.

use crate::container::readiness::{FixedDelay, ReadinessProbe};
use crate::container::reconciler::{Outcome, Reconciler, ReconcilerConfig};
use crate::container::{
    ContainerDescriptor, ContainerError, ContainerRuntime, Result, validate_descriptors,
};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// Desired lifecycle transition for every descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Converge to running
    Bootstrap,
    /// Converge to absent
    Teardown,
    /// Remove if running, then converge to running
    Refresh,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Bootstrap => write!(f, "bootstrap"),
            Operation::Teardown => write!(f, "teardown"),
            Operation::Refresh => write!(f, "refresh"),
        }
    }
}

/// Orchestrator configuration.
#[derive(Clone)]
pub struct OrchestratorConfig {
    /// Maximum simultaneous reconciliations; `None` runs every descriptor at once
    pub max_concurrency: Option<usize>,
    /// Readiness check applied after each start
    pub readiness: Arc<dyn ReadinessProbe>,
    /// Per-container reconciler settings
    pub reconciler: ReconcilerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            readiness: Arc::new(FixedDelay::default()),
            reconciler: ReconcilerConfig::default(),
        }
    }
}

impl fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("max_concurrency", &self.max_concurrency)
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Result of reconciling one container.
#[derive(Debug)]
pub struct ContainerReport {
    pub name: String,
    pub outcome: Result<Outcome>,
}

/// Per-container results of one run, in descriptor order.
#[derive(Debug)]
pub struct RunReport {
    pub operation: Operation,
    pub containers: Vec<ContainerReport>,
}

impl RunReport {
    /// Whether every container reconciled.
    pub fn is_success(&self) -> bool {
        self.containers.iter().all(|report| report.outcome.is_ok())
    }

    /// The failed containers with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ContainerError)> {
        self.containers.iter().filter_map(|report| match &report.outcome {
            Ok(_) => None,
            Err(e) => Some((report.name.as_str(), e)),
        })
    }

    /// Look up one container's result.
    pub fn get(&self, name: &str) -> Option<&Result<Outcome>> {
        self.containers
            .iter()
            .find(|report| report.name == name)
            .map(|report| &report.outcome)
    }

    /// Collapse into the successful outcomes, or a `Failed` error naming
    /// every container that did not reconcile.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::Failed` if any container failed.
    pub fn into_result(self) -> Result<Vec<(String, Outcome)>> {
        let failed: Vec<String> = self.failures().map(|(name, _)| name.to_string()).collect();
        if !failed.is_empty() {
            return Err(ContainerError::Failed(failed));
        }

        Ok(self
            .containers
            .into_iter()
            .filter_map(|report| report.outcome.ok().map(|outcome| (report.name, outcome)))
            .collect())
    }
}

/// Fans reconciliation out across independent containers.
pub struct Orchestrator {
    reconciler: Reconciler,
    runtime_name: &'static str,
    max_concurrency: Option<usize>,
}

impl Orchestrator {
    /// Create an orchestrator over a shared runtime handle.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: OrchestratorConfig) -> Self {
        Self {
            runtime_name: runtime.runtime_name(),
            reconciler: Reconciler::with_readiness(runtime, config.readiness, config.reconciler),
            max_concurrency: config.max_concurrency.filter(|limit| *limit > 0),
        }
    }

    /// Converge every descriptor to running.
    pub async fn bootstrap(&self, descriptors: &[ContainerDescriptor]) -> Result<RunReport> {
        self.run(Operation::Bootstrap, descriptors).await
    }

    /// Converge every descriptor to absent.
    pub async fn teardown(&self, descriptors: &[ContainerDescriptor]) -> Result<RunReport> {
        self.run(Operation::Teardown, descriptors).await
    }

    /// Refresh every descriptor.
    pub async fn refresh(&self, descriptors: &[ContainerDescriptor]) -> Result<RunReport> {
        self.run(Operation::Refresh, descriptors).await
    }

    /// Reconcile every descriptor concurrently and wait for all of them.
    ///
    /// # Errors
    ///
    /// Returns an error only when the descriptor collection is invalid, before
    /// anything is spawned. Per-container failures are in the report.
    pub async fn run(
        &self,
        operation: Operation,
        descriptors: &[ContainerDescriptor],
    ) -> Result<RunReport> {
        validate_descriptors(descriptors)?;

        let permits = self.max_concurrency.map(|limit| Arc::new(Semaphore::new(limit)));
        info!(
            "Running {} for {} container(s) on {}{}",
            operation,
            descriptors.len(),
            self.runtime_name,
            self.max_concurrency
                .map(|limit| format!(" with at most {} at a time", limit))
                .unwrap_or_default()
        );

        let handles: Vec<_> = descriptors
            .iter()
            .cloned()
            .map(|descriptor| {
                let reconciler = self.reconciler.clone();
                let permits = permits.clone();
                tokio::spawn(async move {
                    let _permit = match permits {
                        Some(semaphore) => Some(semaphore.acquire_owned().await.map_err(|e| {
                            ContainerError::TaskFailed {
                                name: descriptor.name.clone(),
                                message: e.to_string(),
                            }
                        })?),
                        None => None,
                    };

                    info!("Now running {} for container {}", operation, descriptor);
                    match operation {
                        Operation::Bootstrap => reconciler.setup(&descriptor).await,
                        Operation::Teardown => reconciler.teardown(&descriptor).await,
                        Operation::Refresh => reconciler.refresh(&descriptor).await,
                    }
                })
            })
            .collect();

        let results = join_all(handles).await;

        let containers: Vec<ContainerReport> = descriptors
            .iter()
            .zip(results)
            .map(|(descriptor, joined)| {
                let outcome = joined.unwrap_or_else(|e| {
                    Err(ContainerError::TaskFailed {
                        name: descriptor.name.clone(),
                        message: e.to_string(),
                    })
                });
                match &outcome {
                    Ok(done) => debug!("Container {} {}", descriptor.name, done),
                    Err(e) => error!("Container {} failed: {}", descriptor.name, e),
                }
                ContainerReport {
                    name: descriptor.name.clone(),
                    outcome,
                }
            })
            .collect();

        Ok(RunReport {
            operation,
            containers,
        })
    }
}
