//! Declared container shape.

use crate::container::{ContainerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A TCP port exposed by a container and published under the same host port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port(u16);

impl Port {
    /// Parse a decimal port number. Zero is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        match trimmed.parse::<u16>() {
            Ok(0) | Err(_) => Err(ContainerError::InvalidDescriptor(format!(
                "'{}' is not a valid TCP port",
                raw
            ))),
            Ok(number) => Ok(Port(number)),
        }
    }

    /// The port number.
    pub fn number(self) -> u16 {
        self.0
    }

    /// The runtime's key for this port, e.g. `5432/tcp`.
    pub fn tcp_key(self) -> String {
        format!("{}/tcp", self.0)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared specification of a container.
///
/// `name` is both the runtime container name and the key used to match
/// observed containers, so it must be unique within one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    /// Container name
    pub name: String,
    /// Image reference used to create the container
    pub image: String,
    /// Exposed TCP ports, published on the host under the same number
    #[serde(default)]
    pub ports: Vec<String>,
}

impl ContainerDescriptor {
    /// Create a descriptor.
    pub fn new<N: Into<String>, I: Into<String>>(name: N, image: I, ports: Vec<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports,
        }
    }

    /// Parse the declared ports, preserving declaration order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDescriptor` if any entry is not a decimal port number.
    pub fn parsed_ports(&self) -> Result<Vec<Port>> {
        self.ports
            .iter()
            .map(|raw| {
                Port::parse(raw).map_err(|_| {
                    ContainerError::InvalidDescriptor(format!(
                        "container {} declares invalid port '{}'",
                        self.name, raw
                    ))
                })
            })
            .collect()
    }

    /// Check name, image and ports.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDescriptor` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ContainerError::InvalidDescriptor(
                "container name is required".to_string(),
            ));
        }
        if self.image.trim().is_empty() {
            return Err(ContainerError::InvalidDescriptor(format!(
                "container {} has no image",
                self.name
            )));
        }
        self.parsed_ports()?;
        Ok(())
    }
}

impl fmt::Display for ContainerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.image)
    }
}

/// Validate a descriptor collection before reconciling it.
///
/// # Errors
///
/// Returns `InvalidDescriptor` for a malformed entry or `DuplicateName` when
/// two entries share a name.
pub fn validate_descriptors(descriptors: &[ContainerDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for descriptor in descriptors {
        descriptor.validate()?;
        if !seen.insert(descriptor.name.as_str()) {
            return Err(ContainerError::DuplicateName(descriptor.name.clone()));
        }
    }
    Ok(())
}
