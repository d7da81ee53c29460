//! Environment constants and path utilities for dockerstrap.
//!
//! This module centralizes the file names, environment variable names and
//! defaults used throughout the application, making them easier to maintain
//! and modify.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default test environment file name, resolved relative to the working directory
pub const DEFAULT_TESTENV_FILE: &str = "testenv.yaml";

/// Environment variable overriding the test environment file
pub const TESTENV_FILE_VAR: &str = "TEST_ENV_FILE";

/// Default settle delay applied after a container is started
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Docker daemon connection variables and TLS material
pub mod docker {
    /// Daemon endpoint, e.g. `tcp://192.168.99.100:2376` or `unix:///var/run/docker.sock`
    pub const HOST_VAR: &str = "DOCKER_HOST";

    /// Directory holding the TLS client certificate, key and CA
    pub const CERT_PATH_VAR: &str = "DOCKER_CERT_PATH";

    /// Set to `1` to enforce TLS
    pub const TLS_VERIFY_VAR: &str = "DOCKER_TLS_VERIFY";

    /// Client certificate file name within the cert directory
    pub const CERT_FILE_NAME: &str = "cert.pem";

    /// Client key file name within the cert directory
    pub const KEY_FILE_NAME: &str = "key.pem";

    /// CA certificate file name within the cert directory
    pub const CA_FILE_NAME: &str = "ca.pem";

    /// Client request timeout in seconds
    pub const CLIENT_TIMEOUT_SECS: u64 = 120;
}

/// Readiness probe defaults
pub mod readiness {
    /// Host polled by the TCP readiness probe
    pub const DEFAULT_PROBE_HOST: &str = "127.0.0.1";

    /// How long the TCP probe waits for every port to accept connections
    pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

    /// Delay between TCP connection attempts
    pub const DEFAULT_PROBE_INTERVAL_MILLIS: u64 = 250;
}

/// Build the client certificate path from a cert directory
pub fn cert_file_path(cert_dir: &Path) -> PathBuf {
    cert_dir.join(docker::CERT_FILE_NAME)
}

/// Build the client key path from a cert directory
pub fn key_file_path(cert_dir: &Path) -> PathBuf {
    cert_dir.join(docker::KEY_FILE_NAME)
}

/// Build the CA certificate path from a cert directory
pub fn ca_file_path(cert_dir: &Path) -> PathBuf {
    cert_dir.join(docker::CA_FILE_NAME)
}
