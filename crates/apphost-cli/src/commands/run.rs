//! `apphost run` — Start a composition and supervise it until interrupted.

use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use apphost_common::config::AppHostConfig;
use apphost_common::constants;
use apphost_common::error::OrchestrationError;
use apphost_compose::graph::CompositionGraph;
use apphost_runtime::orchestrator::Orchestrator;
use apphost_runtime::process::ProcessLauncher;
use clap::Args;

use crate::output::{self, BOLD, DIM, GREEN, RED, RESET};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the composition manifest.
    #[arg(default_value = constants::DEFAULT_MANIFEST)]
    pub manifest: String,

    /// Write a JSON state snapshot to this file on every state change.
    #[arg(long, env = "APPHOST_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// How long a resource may take to accept connections.
    #[arg(long, env = "APPHOST_STARTUP_TIMEOUT_MS", default_value_t = constants::DEFAULT_STARTUP_TIMEOUT_MS)]
    pub startup_timeout_ms: u64,

    /// Delay between readiness probes of a starting resource.
    #[arg(long, env = "APPHOST_READINESS_POLL_MS", default_value_t = constants::DEFAULT_READINESS_POLL_MS)]
    pub readiness_poll_ms: u64,

    /// Delay between liveness checks once everything runs.
    #[arg(long, env = "APPHOST_SUPERVISE_INTERVAL_MS", default_value_t = constants::DEFAULT_SUPERVISE_INTERVAL_MS)]
    pub supervise_interval_ms: u64,
}

impl RunArgs {
    /// Builds the run configuration from the parsed arguments.
    #[must_use]
    pub fn config(&self) -> AppHostConfig {
        AppHostConfig {
            manifest: PathBuf::from(&self.manifest),
            state_file: self.state_file.clone(),
            startup_timeout_ms: self.startup_timeout_ms,
            readiness_poll_ms: self.readiness_poll_ms,
            supervise_interval_ms: self.supervise_interval_ms,
        }
    }
}

/// Executes the `run` command.
///
/// Blocks until SIGINT/SIGTERM, then stops everything in reverse order.
///
/// # Errors
///
/// Returns an error if the manifest is invalid, a resource fails to
/// start, or shutdown is incomplete.
pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let config = args.config();
    config.validate()?;

    let manifest = apphost_compose::manifest::load_manifest(&config.manifest)?;
    let graph = manifest.build_graph()?;
    let launcher = ProcessLauncher::from_config(manifest.launch_specs(), &config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run_composition(graph, launcher, &config))
}

async fn run_composition(
    graph: CompositionGraph,
    launcher: ProcessLauncher,
    config: &AppHostConfig,
) -> anyhow::Result<()> {
    let total_start = Instant::now();
    print_header(&graph);

    let mut orchestrator =
        Orchestrator::new(graph, launcher).with_supervise_interval(config.supervise_interval());
    if let Some(path) = &config.state_file {
        orchestrator = orchestrator.with_state_file(path);
    }
    let reporter = tokio::spawn(output::report_events(
        orchestrator.subscribe(),
        total_start,
    ));

    let shutdown = shutdown_signal()?;
    let result = match orchestrator.run(shutdown).await {
        Err(e @ OrchestrationError::StartupFailed { .. }) => {
            eprintln!("  {RED}{BOLD}Startup failed:{RESET} {e}");
            eprintln!("  Stopping resources that already started...");
            if let Err(stop_err) = orchestrator.shutdown().await {
                tracing::warn!(error = %stop_err, "cleanup after failed startup was incomplete");
            }
            Err(e.into())
        }
        other => other.map_err(anyhow::Error::from),
    };

    drop(orchestrator);
    let _ = reporter.await;

    if result.is_ok() {
        eprintln!("  {GREEN}All resources stopped.{RESET}");
    }
    result
}

fn print_header(graph: &CompositionGraph) {
    eprintln!();
    eprintln!(
        "  {BOLD}apphost{RESET} {DIM}v{}{RESET}  {} resource(s)",
        env!("CARGO_PKG_VERSION"),
        graph.len()
    );
    eprintln!("  Press {BOLD}Ctrl+C{RESET} to stop all resources.");
    eprintln!();
}

/// Completes on the first SIGINT or SIGTERM.
fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    let (tx, mut rx) = tokio::sync::watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = tx.send(true);
    })
    .context("failed to set Ctrl+C handler")?;

    Ok(async move {
        let _ = rx.wait_for(|stopped| *stopped).await;
        tracing::info!("stop requested");
    })
}
