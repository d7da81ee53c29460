//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `start` (`s`): start the listed docker containers
//! - `clean` (`c`): remove the listed docker containers
//! - `refresh` (`r`): remove running containers and start them up again

use crate::container::Operation;
use crate::env;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dockerstrap")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bootstrap a testing environment using docker containers")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// File containing the test environment configuration
    #[arg(
        short = 'f',
        long = "testenv-file",
        env = env::TESTENV_FILE_VAR,
        default_value = env::DEFAULT_TESTENV_FILE,
        global = true
    )]
    pub testenv_file: PathBuf,

    /// Maximum number of containers reconciled at once (0 = unbounded)
    #[arg(long = "max-concurrency", value_name = "N", global = true)]
    pub max_concurrency: Option<usize>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Start the listed docker containers
    #[command(visible_alias = "s")]
    Start,
    /// Remove the listed docker containers
    #[command(visible_alias = "c")]
    Clean,
    /// Remove running containers and start them up
    #[command(visible_alias = "r")]
    Refresh,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// The orchestrator operation selected by the subcommand.
    pub fn operation(&self) -> Operation {
        match self.command {
            Commands::Start => Operation::Bootstrap,
            Commands::Clean => Operation::Teardown,
            Commands::Refresh => Operation::Refresh,
        }
    }
}
