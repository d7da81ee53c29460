//! Runtime capability interface.
//!
//! The reconciler only ever talks to the container runtime through
//! [`ContainerRuntime`]. Implementations map their native failures onto the
//! [`ContainerError`](crate::container::ContainerError) taxonomy, in particular
//! `ContainerNotFound`, `ImageNotFound` and `AlreadyRunning`, which drive the
//! recovery branches.

use crate::container::descriptor::Port;
use crate::container::{ContainerDescriptor, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

/// Wildcard address host ports are published on.
pub const ALL_INTERFACES: &str = "0.0.0.0";

/// Structured container state as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

impl ObservedState {
    /// Parse the runtime's state string (`running`, `exited`, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" => Some(ObservedState::Created),
            "running" => Some(ObservedState::Running),
            "paused" => Some(ObservedState::Paused),
            "restarting" => Some(ObservedState::Restarting),
            "removing" => Some(ObservedState::Removing),
            "exited" => Some(ObservedState::Exited),
            "dead" => Some(ObservedState::Dead),
            _ => None,
        }
    }
}

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerObservation {
    /// Container names; Docker prefixes them with `/`
    pub names: Vec<String>,
    /// Image reference the container was created from
    pub image: String,
    /// Human-readable status, e.g. `Up 3 minutes`
    pub status: String,
    /// Structured state, when the runtime provides one
    pub state: Option<ObservedState>,
}

impl ContainerObservation {
    /// Whether this observation shows `descriptor` running.
    ///
    /// The name matches by substring and the image exactly. Running-ness comes
    /// from the structured state; the `Up` status prefix is only consulted for
    /// runtimes that report no state.
    pub fn shows_running(&self, descriptor: &ContainerDescriptor) -> bool {
        let name_matches = self
            .names
            .iter()
            .any(|name| name.contains(descriptor.name.as_str()));
        if !name_matches || self.image != descriptor.image {
            return false;
        }

        match self.state {
            Some(state) => state == ObservedState::Running,
            None => self.status.starts_with("Up"),
        }
    }
}

/// Host side of a port binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    pub host_ip: String,
    pub host_port: u16,
}

/// Container port to host binding.
pub type PortBindings = BTreeMap<Port, HostBinding>;

/// Bind every port to the same host port on all interfaces.
pub fn identity_bindings(ports: &[Port]) -> PortBindings {
    ports
        .iter()
        .map(|port| {
            (
                *port,
                HostBinding {
                    host_ip: ALL_INTERFACES.to_string(),
                    host_port: port.number(),
                },
            )
        })
        .collect()
}

/// Parameters of a create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub image: String,
    pub exposed_ports: BTreeSet<Port>,
    /// Bindings for runtimes that fix them at creation time
    pub port_bindings: PortBindings,
}

impl CreateRequest {
    /// Build the create call for a descriptor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDescriptor` if a port does not parse.
    pub fn for_descriptor(descriptor: &ContainerDescriptor) -> Result<Self> {
        let ports = descriptor.parsed_ports()?;
        Ok(Self {
            name: descriptor.name.clone(),
            image: descriptor.image.clone(),
            exposed_ports: ports.iter().copied().collect(),
            port_bindings: identity_bindings(&ports),
        })
    }
}

/// Capabilities the reconciler needs from a container runtime.
///
/// Implementations must be safe to share between concurrently running
/// reconciliation tasks.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers, including stopped ones when `all` is set.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerObservation>>;

    /// Create a container. Fails with `ImageNotFound` when the image is not local.
    async fn create_container(&self, request: &CreateRequest) -> Result<()>;

    /// Start a container by name. Fails with `ContainerNotFound` or `AlreadyRunning`
    /// for the recoverable cases.
    async fn start_container(&self, name: &str, bindings: &PortBindings) -> Result<()>;

    /// Pull an image from its registry.
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Remove a container by name. Fails with `ContainerNotFound` when absent.
    async fn remove_container(&self, name: &str, force: bool) -> Result<()>;

    /// Short identifier for logs.
    fn runtime_name(&self) -> &'static str;
}
