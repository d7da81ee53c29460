//! Post-start readiness checks.
//!
//! A started container is only considered reconciled once its probe returns.
//! [`FixedDelay`] reproduces the classic settle sleep; [`TcpPortProbe`] waits
//! for every declared port to accept connections.

use crate::container::{ContainerDescriptor, ContainerError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};
use tracing::debug;

/// Decides when a freshly started container is ready.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Wait until `descriptor`'s container is ready.
    async fn wait_ready(&self, descriptor: &ContainerDescriptor) -> Result<()>;
}

/// Sleep for a fixed duration after start.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    pub delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(crate::env::DEFAULT_SETTLE_DELAY)
    }
}

#[async_trait]
impl ReadinessProbe for FixedDelay {
    async fn wait_ready(&self, descriptor: &ContainerDescriptor) -> Result<()> {
        debug!("Waiting {:?} for {} to settle", self.delay, descriptor.name);
        sleep(self.delay).await;
        Ok(())
    }
}

/// Consider a container ready as soon as it is started.
#[derive(Debug, Clone, Default)]
pub struct NoWait;

#[async_trait]
impl ReadinessProbe for NoWait {
    async fn wait_ready(&self, _descriptor: &ContainerDescriptor) -> Result<()> {
        Ok(())
    }
}

/// Poll each declared port until it accepts a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpPortProbe {
    /// Host the published ports are reachable on
    pub host: String,
    /// Overall deadline across all ports
    pub timeout: Duration,
    /// Pause between attempts
    pub interval: Duration,
}

impl Default for TcpPortProbe {
    fn default() -> Self {
        use crate::env::readiness;
        Self {
            host: readiness::DEFAULT_PROBE_HOST.to_string(),
            timeout: Duration::from_secs(readiness::DEFAULT_PROBE_TIMEOUT_SECS),
            interval: Duration::from_millis(readiness::DEFAULT_PROBE_INTERVAL_MILLIS),
        }
    }
}

#[async_trait]
impl ReadinessProbe for TcpPortProbe {
    async fn wait_ready(&self, descriptor: &ContainerDescriptor) -> Result<()> {
        let deadline = Instant::now() + self.timeout;

        for port in descriptor.parsed_ports()? {
            let address = format!("{}:{}", self.host, port);
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(ContainerError::NotReady {
                        name: descriptor.name.clone(),
                        message: format!("{} did not accept connections within {:?}", address, self.timeout),
                    });
                }

                match timeout(remaining, TcpStream::connect(&address)).await {
                    Ok(Ok(_)) => {
                        debug!("{} is accepting connections on {}", descriptor.name, address);
                        break;
                    }
                    Ok(Err(e)) => {
                        debug!("{} not ready on {}: {}", descriptor.name, address, e);
                        sleep(self.interval.min(remaining)).await;
                    }
                    Err(_) => {}
                }
            }
        }

        Ok(())
    }
}
