//! Test environment file loading
//!
//! The test environment file declares the containers to reconcile and, under
//! an optional `settings` table, how to reconcile them:
//!
//! ```yaml
//! containers:
//!   - name: postgres
//!     image: postgres:latest
//!     ports: ["5432"]
//! settings:
//!   max_concurrency: 4
//!   strict_teardown: false
//!   readiness:
//!     kind: tcp
//!     timeout_seconds: 30
//! ```
//!
//! `.toml` files are parsed as TOML, anything else as YAML.

use crate::container::{
    ContainerDescriptor, ContainerError, FixedDelay, NoWait, OrchestratorConfig, ReadinessProbe,
    ReconcilerConfig, Result, TcpPortProbe, validate_descriptors,
};
use crate::env;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Contents of a test environment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestEnvironment {
    #[serde(default)]
    pub containers: Vec<ContainerDescriptor>,
    #[serde(default)]
    pub settings: Settings,
}

/// Reconciliation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum simultaneous reconciliations; unbounded when absent or 0
    pub max_concurrency: Option<usize>,
    /// Post-start readiness check
    pub readiness: ReadinessSettings,
    /// Fail teardown of containers that do not exist
    pub strict_teardown: bool,
}

/// How to decide that a started container is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReadinessSettings {
    /// Sleep for a fixed number of seconds
    Delay {
        #[serde(default = "default_delay_seconds")]
        seconds: u64,
    },
    /// Poll every declared port until it accepts TCP connections
    Tcp {
        #[serde(default = "default_probe_host")]
        host: String,
        #[serde(default = "default_probe_timeout_seconds")]
        timeout_seconds: u64,
        #[serde(default = "default_probe_interval_millis")]
        interval_millis: u64,
    },
    /// Do not wait
    None,
}

fn default_delay_seconds() -> u64 {
    env::DEFAULT_SETTLE_DELAY.as_secs()
}

fn default_probe_host() -> String {
    env::readiness::DEFAULT_PROBE_HOST.to_string()
}

fn default_probe_timeout_seconds() -> u64 {
    env::readiness::DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_probe_interval_millis() -> u64 {
    env::readiness::DEFAULT_PROBE_INTERVAL_MILLIS
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        ReadinessSettings::Delay {
            seconds: default_delay_seconds(),
        }
    }
}

impl ReadinessSettings {
    /// Build the probe these settings describe.
    pub fn to_probe(&self) -> Arc<dyn ReadinessProbe> {
        match self {
            ReadinessSettings::Delay { seconds } => {
                Arc::new(FixedDelay::new(Duration::from_secs(*seconds)))
            }
            ReadinessSettings::Tcp {
                host,
                timeout_seconds,
                interval_millis,
            } => Arc::new(TcpPortProbe {
                host: host.clone(),
                timeout: Duration::from_secs(*timeout_seconds),
                interval: Duration::from_millis(*interval_millis),
            }),
            ReadinessSettings::None => Arc::new(NoWait),
        }
    }
}

impl TestEnvironment {
    /// Load and validate a test environment file.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read or parsed, or the
    /// descriptor validation error if the containers are inconsistent.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading test environment from {:?}", path);

        let content = fs::read_to_string(path).map_err(|e| {
            ContainerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let environment = if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
        .map_err(|e| match e {
            ContainerError::Config(message) => {
                ContainerError::Config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })?;

        validate_descriptors(&environment.containers)?;
        Ok(environment)
    }

    /// Parse a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `Config` on malformed input.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| ContainerError::Config(e.to_string()))
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `Config` on malformed input.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ContainerError::Config(e.to_string()))
    }

    /// Orchestrator configuration for these settings, with an optional
    /// command line override of the concurrency limit.
    pub fn orchestrator_config(&self, max_concurrency: Option<usize>) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrency: max_concurrency
                .or(self.settings.max_concurrency)
                .filter(|limit| *limit > 0),
            readiness: self.settings.readiness.to_probe(),
            reconciler: ReconcilerConfig {
                strict_teardown: self.settings.strict_teardown,
            },
        }
    }
}
