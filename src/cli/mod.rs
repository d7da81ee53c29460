//! CLI-specific functionality for dockerstrap
//!
//! This module contains the command line argument parsing and the loading of
//! the test environment file that declares the containers.

pub mod args;
pub mod config;

pub use args::{Args, Commands};
pub use config::{ReadinessSettings, Settings, TestEnvironment};
