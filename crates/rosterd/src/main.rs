//! rosterd — the roster daemon.
//!
//! Runs the refresh loop and serves the published instance set:
//! - Refresher (discovery, probes, monitor listing, reconciliation)
//! - JSON API over the published store
//!
//! # Usage
//!
//! ```text
//! rosterd serve --config /etc/roster/roster.toml --port 3000
//! rosterd once --config roster.toml --sort health --pretty
//! rosterd config
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use roster_core::RosterConfig;
use roster_probe::{CycleOutcome, Refresher};
use roster_state::{InstanceStore, SortSpec};

#[derive(Parser)]
#[command(name = "rosterd", about = "roster instance aggregator daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the refresh loop and serve the JSON API.
    Serve {
        /// Path to roster.toml (defaults apply when omitted).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured listen port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a single refresh cycle and print the result.
    Once {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Sort spec for the printed list, e.g. "health,location-reverse".
        #[arg(long)]
        sort: Option<String>,

        #[arg(long)]
        pretty: bool,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rosterd=debug,roster_probe=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, port } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = port {
                config.server.listen.set_port(port);
            }
            run_serve(config).await
        }
        Command::Once {
            config,
            sort,
            pretty,
        } => run_once(load_config(config.as_deref())?, sort, pretty).await,
        Command::Config { config } => {
            print!("{}", load_config(config.as_deref())?.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RosterConfig> {
    match path {
        Some(path) => RosterConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(RosterConfig::default()),
    }
}

async fn run_serve(config: RosterConfig) -> anyhow::Result<()> {
    info!("roster daemon starting");

    // An unknown default sort key is a configuration error, not a request error.
    let default_sort = SortSpec::parse(&config.server.default_sort)
        .context("invalid server.default_sort")?;

    let store = InstanceStore::new();
    let refresher = Arc::new(Refresher::new(&config, store.clone())?);
    info!(
        discovery = %config.discovery.url,
        monitor = %config.monitor.url,
        "refresher initialized"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresh_handle = tokio::spawn({
        let refresher = refresher.clone();
        async move { refresher.run(shutdown_rx).await }
    });

    let router = roster_api::build_router(store, default_sort);
    let addr: SocketAddr = config.server.listen;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    join_refresher(refresh_handle).await;
    info!("roster daemon stopped");
    Ok(())
}

/// Wait for the refresher task; a panic or cancellation is logged, not lost.
async fn join_refresher(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, panicked = e.is_panic(), "refresher task failed");
            false
        }
    }
}

async fn run_once(config: RosterConfig, sort: Option<String>, pretty: bool) -> anyhow::Result<()> {
    let spec = SortSpec::parse(sort.as_deref().unwrap_or(&config.server.default_sort))
        .context("invalid sort spec")?;

    let refresher = Refresher::new(&config, InstanceStore::new())?;
    let report = refresher.run_cycle().await;
    info!(
        discovered = report.discovered,
        probed = report.probed,
        timed_out = report.timed_out,
        monitors = report.monitors,
        failed_pages = ?report.failed_pages,
        "refresh cycle finished"
    );

    if let CycleOutcome::Aborted(reason) = report.outcome {
        anyhow::bail!("refresh cycle aborted: {reason}");
    }

    let snapshot = refresher.store().snapshot();
    let sorted = snapshot.sorted(&spec);
    let rendered = if pretty {
        serde_json::to_string_pretty(&sorted)?
    } else {
        serde_json::to_string(&sorted)?
    };
    println!("{rendered}");
    Ok(())
}
