//! Docker client adapter.
//!
//! Implements [`ContainerRuntime`] on top of the bollard Docker API, mapping
//! the daemon's status codes onto the reconciler's error taxonomy.

use crate::container::runtime::{
    ContainerObservation, ContainerRuntime, CreateRequest, ObservedState, PortBindings,
};
use crate::container::{ContainerError, Result};
use crate::env;
use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::service::{HostConfig, PortBinding};
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// How to reach the Docker daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Daemon endpoint; local defaults when unset
    pub endpoint: Option<String>,
    /// Directory with `cert.pem`, `key.pem` and `ca.pem`
    pub cert_path: Option<PathBuf>,
    /// Require TLS
    pub tls_verify: bool,
    /// Request timeout in seconds
    pub timeout: u64,
}

impl ConnectionSettings {
    /// Read `DOCKER_HOST`, `DOCKER_CERT_PATH` and `DOCKER_TLS_VERIFY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            endpoint: non_empty(env::docker::HOST_VAR),
            cert_path: non_empty(env::docker::CERT_PATH_VAR).map(PathBuf::from),
            tls_verify: non_empty(env::docker::TLS_VERIFY_VAR).as_deref() == Some("1"),
            timeout: env::docker::CLIENT_TIMEOUT_SECS,
        }
    }
}

/// Docker Engine backed runtime.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Arc<Docker>,
}

impl DockerRuntime {
    /// Connect using the `DOCKER_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the daemon cannot be reached.
    pub async fn from_env() -> Result<Self> {
        Self::connect(&ConnectionSettings::from_env()).await
    }

    /// Connect with explicit settings and verify the daemon answers.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the client cannot be built or the ping fails.
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let docker = Self::build_client(settings)?;
        let runtime = Self {
            docker: Arc::new(docker),
        };
        runtime.ping().await?;
        Ok(runtime)
    }

    fn build_client(settings: &ConnectionSettings) -> Result<Docker> {
        let timeout = if settings.timeout == 0 {
            env::docker::CLIENT_TIMEOUT_SECS
        } else {
            settings.timeout
        };
        let connection_error =
            |e: BollardError| ContainerError::Connection(format!("Failed to connect to Docker: {}", e));

        let Some(endpoint) = settings.endpoint.as_deref() else {
            debug!("DOCKER_HOST not set, using local defaults");
            return Docker::connect_with_local_defaults().map_err(connection_error);
        };

        if settings.tls_verify {
            let cert_dir = settings.cert_path.as_deref().ok_or_else(|| {
                ContainerError::Connection(format!(
                    "{} is required when {}=1",
                    env::docker::CERT_PATH_VAR,
                    env::docker::TLS_VERIFY_VAR
                ))
            })?;
            debug!("Connecting to {} over TLS", endpoint);
            return Docker::connect_with_ssl(
                endpoint,
                &env::key_file_path(cert_dir),
                &env::cert_file_path(cert_dir),
                &env::ca_file_path(cert_dir),
                timeout,
                bollard::API_DEFAULT_VERSION,
            )
            .map_err(connection_error);
        }

        #[cfg(unix)]
        {
            if endpoint.starts_with("unix://") {
                debug!("Connecting to socket {}", endpoint);
                return Docker::connect_with_socket(endpoint, timeout, bollard::API_DEFAULT_VERSION)
                    .map_err(connection_error);
            }
        }

        debug!("Connecting to {}", endpoint);
        Docker::connect_with_http(endpoint, timeout, bollard::API_DEFAULT_VERSION)
            .map_err(connection_error)
    }

    /// Ping the daemon to verify connectivity.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the ping fails.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map_err(|e| {
            ContainerError::Connection(format!("Docker daemon is not reachable: {}", e))
        })?;
        debug!("Docker ping successful");
        Ok(())
    }

    /// Get the underlying Docker client.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

fn status_code(error: &BollardError) -> Option<u16> {
    match error {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn to_bollard_bindings(bindings: &PortBindings) -> HashMap<String, Option<Vec<PortBinding>>> {
    bindings
        .iter()
        .map(|(port, host)| {
            (
                port.tcp_key(),
                Some(vec![PortBinding {
                    host_ip: Some(host.host_ip.clone()),
                    host_port: Some(host.host_port.to_string()),
                }]),
            )
        })
        .collect()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerObservation>> {
        let containers = self
            .docker
            .list_containers(Some(bollard::container::ListContainersOptions::<String> {
                all,
                ..Default::default()
            }))
            .await
            .map_err(|e| ContainerError::RuntimeQuery(e.to_string()))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerObservation {
                names: c.names.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                status: c.status.unwrap_or_default(),
                state: c
                    .state
                    .and_then(|state| ObservedState::parse(&state.to_string())),
            })
            .collect())
    }

    async fn create_container(&self, request: &CreateRequest) -> Result<()> {
        let options = bollard::container::CreateContainerOptions {
            name: request.name.as_str(),
            ..Default::default()
        };

        let exposed_ports: HashMap<String, HashMap<(), ()>> = request
            .exposed_ports
            .iter()
            .map(|port| (port.tcp_key(), HashMap::new()))
            .collect();

        // The Engine API only accepts port bindings at creation time.
        let host_config = HostConfig {
            port_bindings: Some(to_bollard_bindings(&request.port_bindings)),
            ..Default::default()
        };

        let config = bollard::container::Config {
            image: Some(request.image.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        match self.docker.create_container(Some(options), config).await {
            Ok(response) => {
                info!("Created container: {} ({})", request.name, response.id);
                Ok(())
            }
            Err(e) if status_code(&e) == Some(404) => {
                Err(ContainerError::ImageNotFound(request.image.clone()))
            }
            Err(e) => Err(ContainerError::RuntimeCreate {
                name: request.name.clone(),
                message: e.to_string(),
            }),
        }
    }

    async fn start_container(&self, name: &str, bindings: &PortBindings) -> Result<()> {
        debug!("Starting container {} with bindings {:?}", name, bindings);

        match self
            .docker
            .start_container(name, None::<bollard::container::StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(304) => {
                Err(ContainerError::AlreadyRunning(name.to_string()))
            }
            Err(e) if status_code(&e) == Some(404) => {
                Err(ContainerError::ContainerNotFound(name.to_string()))
            }
            Err(e) => Err(ContainerError::RuntimeStart {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let pull_error = |message: String| ContainerError::RuntimePull {
            image: image.to_string(),
            message,
        };

        let mut stream = self.docker.create_image(
            Some(bollard::image::CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull {}: {}", image, status);
                    }
                    if let Some(error) = info.error {
                        return Err(pull_error(error));
                    }
                }
                Err(e) => return Err(pull_error(e.to_string())),
            }
        }

        info!("Successfully pulled image: {}", image);
        Ok(())
    }

    async fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        match self
            .docker
            .remove_container(
                name,
                Some(bollard::container::RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => {
                info!("Removed container: {}", name);
                Ok(())
            }
            Err(e) if status_code(&e) == Some(404) => {
                Err(ContainerError::ContainerNotFound(name.to_string()))
            }
            Err(e) => Err(ContainerError::RuntimeRemove {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn runtime_name(&self) -> &'static str {
        "docker"
    }
}
