//! Per-container lifecycle reconciliation.
//!
//! [`Reconciler::setup`] walks a small state machine:
//!
//! ```text
//! CheckRunning ──running──▶ done
//!      │
//!      ▼
//! AttemptStart ──ok / already running──▶ done
//!      │ no such container
//!      ▼
//!   Create ──ok──▶ FinalStart ──▶ done
//!      │ no such image (first time only)
//!      ▼
//!    Pull ──ok──▶ Create
//! ```
//!
//! Every other runtime error is terminal. The second create never pulls
//! again, so a persistently missing image fails instead of looping.

use crate::container::readiness::{FixedDelay, ReadinessProbe};
use crate::container::runtime::{ContainerRuntime, CreateRequest, PortBindings};
use crate::container::{ContainerDescriptor, ContainerError, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a reconciliation did to reach the desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Already running, nothing was changed
    AlreadyRunning,
    /// An existing container was started
    Started,
    /// The container was created, then started
    Created,
    /// The image was pulled, then the container created and started
    Pulled,
    /// The container was removed
    Removed,
    /// Teardown found no container to remove
    Absent,
    /// A running container was removed and set up again
    Refreshed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Outcome::AlreadyRunning => "already running",
            Outcome::Started => "started",
            Outcome::Created => "created and started",
            Outcome::Pulled => "pulled, created and started",
            Outcome::Removed => "removed",
            Outcome::Absent => "already absent",
            Outcome::Refreshed => "refreshed",
        };
        f.write_str(text)
    }
}

/// Reconciler behavior switches.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerConfig {
    /// Fail teardown when the container does not exist
    pub strict_teardown: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetupState {
    CheckRunning,
    AttemptStart,
    Create { pulled: bool },
    Pull,
    FinalStart { pulled: bool },
}

/// Drives one container descriptor to its desired lifecycle state.
#[derive(Clone)]
pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    readiness: Arc<dyn ReadinessProbe>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler using the default settle delay.
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self::with_readiness(runtime, Arc::new(FixedDelay::default()), ReconcilerConfig::default())
    }

    /// Create a reconciler with an explicit readiness probe and config.
    pub fn with_readiness(
        runtime: Arc<dyn ContainerRuntime>,
        readiness: Arc<dyn ReadinessProbe>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            runtime,
            readiness,
            config,
        }
    }

    /// Check whether `descriptor` is observed running.
    ///
    /// Lists every container, running or stopped, on each call.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeQuery` if the listing fails.
    pub async fn is_running(&self, descriptor: &ContainerDescriptor) -> Result<bool> {
        let observations = self.runtime.list_containers(true).await?;
        Ok(observations
            .iter()
            .any(|observation| observation.shows_running(descriptor)))
    }

    /// Converge `descriptor` to running.
    ///
    /// # Errors
    ///
    /// Returns the first unrecovered runtime error, or `NotReady` if the
    /// readiness probe gives up.
    pub async fn setup(&self, descriptor: &ContainerDescriptor) -> Result<Outcome> {
        let request = CreateRequest::for_descriptor(descriptor)?;
        let bindings = request.port_bindings.clone();
        let mut state = SetupState::CheckRunning;

        loop {
            debug!("{}: {:?}", descriptor.name, state);
            state = match state {
                SetupState::CheckRunning => {
                    if self.is_running(descriptor).await? {
                        info!("Container {} is already running", descriptor.name);
                        return Ok(Outcome::AlreadyRunning);
                    }
                    SetupState::AttemptStart
                }
                SetupState::AttemptStart => {
                    match self.start(descriptor, &bindings).await {
                        Ok(()) => return self.settle(descriptor, Outcome::Started).await,
                        Err(e) if e.is_already_running() => {
                            warn!("Container {} was started concurrently", descriptor.name);
                            return Ok(Outcome::AlreadyRunning);
                        }
                        Err(e) if e.is_not_found() => SetupState::Create { pulled: false },
                        Err(e) => return Err(start_error(descriptor, e)),
                    }
                }
                SetupState::Create { pulled } => {
                    info!("Creating container {}", descriptor);
                    match self.runtime.create_container(&request).await {
                        Ok(()) => SetupState::FinalStart { pulled },
                        Err(e) if e.is_image_missing() && !pulled => SetupState::Pull,
                        Err(e) => return Err(create_error(descriptor, e)),
                    }
                }
                SetupState::Pull => {
                    self.pull(descriptor).await?;
                    SetupState::Create { pulled: true }
                }
                SetupState::FinalStart { pulled } => {
                    let outcome = if pulled {
                        Outcome::Pulled
                    } else {
                        Outcome::Created
                    };
                    match self.start(descriptor, &bindings).await {
                        Ok(()) => return self.settle(descriptor, outcome).await,
                        Err(e) if e.is_already_running() => {
                            warn!("Container {} was started concurrently", descriptor.name);
                            return Ok(Outcome::AlreadyRunning);
                        }
                        Err(e) => return Err(start_error(descriptor, e)),
                    }
                }
            };
        }
    }

    /// Force-remove the container without checking whether it exists.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeRemove` on failure. A missing container is only an
    /// error (`ContainerNotFound`) with `strict_teardown`.
    pub async fn teardown(&self, descriptor: &ContainerDescriptor) -> Result<Outcome> {
        info!("Removing container {}", descriptor.name);
        match self.runtime.remove_container(&descriptor.name, true).await {
            Ok(()) => Ok(Outcome::Removed),
            Err(e) if e.is_not_found() && !self.config.strict_teardown => {
                debug!("Container {} does not exist", descriptor.name);
                Ok(Outcome::Absent)
            }
            Err(e) if e.is_not_found() => Err(e),
            Err(e @ ContainerError::RuntimeRemove { .. }) => Err(e),
            Err(e) => Err(ContainerError::RuntimeRemove {
                name: descriptor.name.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Remove the container if it is running, then set it up.
    ///
    /// # Errors
    ///
    /// Returns the first error from the running check, teardown or setup.
    pub async fn refresh(&self, descriptor: &ContainerDescriptor) -> Result<Outcome> {
        let torn_down = if self.is_running(descriptor).await? {
            info!("Container {} is up, tearing it down", descriptor.name);
            self.teardown(descriptor).await?;
            true
        } else {
            info!("Container {} is not up", descriptor.name);
            false
        };

        let outcome = self.setup(descriptor).await?;
        Ok(if torn_down { Outcome::Refreshed } else { outcome })
    }

    async fn start(&self, descriptor: &ContainerDescriptor, bindings: &PortBindings) -> Result<()> {
        debug!("Starting container {}", descriptor.name);
        self.runtime.start_container(&descriptor.name, bindings).await
    }

    async fn pull(&self, descriptor: &ContainerDescriptor) -> Result<()> {
        info!(
            "Downloading image {} for {}, this may take a few minutes",
            descriptor.image, descriptor.name
        );
        match self.runtime.pull_image(&descriptor.image).await {
            Ok(()) => {
                info!("Download complete for {}", descriptor.image);
                Ok(())
            }
            Err(e @ ContainerError::RuntimePull { .. }) => Err(e),
            Err(e) => Err(ContainerError::RuntimePull {
                image: descriptor.image.clone(),
                message: e.to_string(),
            }),
        }
    }

    async fn settle(&self, descriptor: &ContainerDescriptor, outcome: Outcome) -> Result<Outcome> {
        self.readiness.wait_ready(descriptor).await?;
        info!("Container {} has been started", descriptor.name);
        Ok(outcome)
    }
}

fn start_error(descriptor: &ContainerDescriptor, error: ContainerError) -> ContainerError {
    match error {
        e @ ContainerError::RuntimeStart { .. } => e,
        e => ContainerError::RuntimeStart {
            name: descriptor.name.clone(),
            message: e.to_string(),
        },
    }
}

fn create_error(descriptor: &ContainerDescriptor, error: ContainerError) -> ContainerError {
    match error {
        e @ ContainerError::RuntimeCreate { .. } => e,
        e => ContainerError::RuntimeCreate {
            name: descriptor.name.clone(),
            message: e.to_string(),
        },
    }
}
