use anyhow::Context;
use dockerstrap::cli::{Args, TestEnvironment};
use dockerstrap::container::{DockerRuntime, Orchestrator};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over the verbosity flag
    let default_filter = if args.verbose {
        "dockerstrap=debug"
    } else {
        "dockerstrap=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let environment = TestEnvironment::load(&args.testenv_file).with_context(|| {
        format!(
            "Failed to load test environment from {}",
            args.testenv_file.display()
        )
    })?;

    let runtime = DockerRuntime::from_env()
        .await
        .context("Docker not started")?;

    let orchestrator = Orchestrator::new(
        Arc::new(runtime),
        environment.orchestrator_config(args.max_concurrency),
    );

    let operation = args.operation();
    let report = orchestrator
        .run(operation, &environment.containers)
        .await
        .with_context(|| format!("Failed to {}", operation))?;

    for container in &report.containers {
        match &container.outcome {
            Ok(outcome) => info!("Container \"{}\": {}", container.name, outcome),
            Err(e) => error!("Container \"{}\": {}", container.name, e),
        }
    }

    if !report.is_success() {
        let failed = report.failures().count();
        error!(
            "{} of {} container(s) failed during {}",
            failed,
            report.containers.len(),
            operation
        );
        std::process::exit(1);
    }

    info!("{} complete", operation);
    Ok(())
}
