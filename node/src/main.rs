// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Tillpoint Node
//!
//! Entry point for the `tillpoint-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and runs one of the subcommands:
//!
//! - `serve`     : serve the checkout API to wallets
//! - `watch`     : run a payment session against a ledger
//! - `reference` : print a fresh reference
//! - `version`   : print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use tillpoint_protocol::checkout::{self, CheckoutConfig, CheckoutService};
use tillpoint_protocol::ledger::{InMemoryLedger, LedgerClient, RpcLedger};
use tillpoint_protocol::reference::{OsReferenceGenerator, ReferenceGenerator};
use tillpoint_protocol::session::{PollerConfig, SessionConfig, SessionController, SessionEvent};

use cli::{Commands, TillpointCli};
use logging::LogFormat;
use metrics::CheckoutMetrics;

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "tillpoint_node=info,tillpoint_protocol=info,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TillpointCli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args, cli.log_format).await,
        Commands::Watch(args) => watch(args, cli.log_format).await,
        Commands::Reference(args) => print_reference(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Serves the checkout API and the metrics endpoint until Ctrl+C.
async fn serve(args: cli::ServeArgs, format: LogFormat) -> Result<()> {
    logging::init_logging(DEFAULT_LOG_FILTER, format).context("failed to initialize logging")?;

    tracing::info!(
        port = args.port,
        metrics_port = args.metrics_port,
        in_memory = args.in_memory,
        "starting tillpoint-node"
    );

    // --- Ledger ---
    let ledger: Arc<dyn LedgerClient> = if args.in_memory {
        tracing::warn!("using in-memory ledger; transactions will not reach a real network");
        Arc::new(InMemoryLedger::new())
    } else {
        tracing::info!(rpc_url = %args.rpc_url, "using JSON-RPC ledger");
        Arc::new(
            RpcLedger::new(&args.rpc_url)
                .with_context(|| format!("failed to create RPC client for {}", args.rpc_url))?,
        )
    };

    // --- Checkout ---
    let checkout = Arc::new(CheckoutService::new(
        ledger,
        CheckoutConfig {
            label: args.label,
            icon: args.icon,
            message: args.message,
            recipient: args.recipient,
            lamports: args.lamports,
        },
    ));

    // --- Metrics ---
    let checkout_metrics =
        Arc::new(CheckoutMetrics::new().context("failed to register prometheus metrics")?);

    // --- API server ---
    let api_router = api::create_router(api::AppState {
        checkout,
        metrics: Arc::clone(&checkout_metrics),
    });
    let api_addr = format!("{}:{}", args.bind, args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("checkout API listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&checkout_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            res.context("API server error")?;
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            res.context("metrics server error")?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("tillpoint-node stopped");
    Ok(())
}

/// Runs a payment session: prints each descriptor on stdout and logs each
/// settlement, until Ctrl+C or a fatal error.
async fn watch(args: cli::WatchArgs, format: LogFormat) -> Result<()> {
    logging::init_logging(DEFAULT_LOG_FILTER, format).context("failed to initialize logging")?;

    let ledger = Arc::new(
        RpcLedger::new(&args.rpc_url)
            .with_context(|| format!("failed to create RPC client for {}", args.rpc_url))?,
    );
    let config = SessionConfig {
        callback_url: args.callback_url,
        poller: PollerConfig {
            interval: Duration::from_millis(args.interval_ms),
            lookup_timeout: Duration::from_millis(args.lookup_timeout_ms),
            commitment: args.commitment,
        },
    };

    let (controller, handle, mut events) =
        SessionController::new(config, ledger, Arc::new(OsReferenceGenerator))
            .context("failed to start payment session")?;
    tracing::info!(session = %handle.id(), rpc_url = %args.rpc_url, "watching for payments");
    let session = tokio::spawn(controller.run());

    let report = async {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::RequestIssued {
                    reference,
                    descriptor,
                } => {
                    tracing::debug!(%reference, "new payment request");
                    println!("{}", descriptor);
                }
                SessionEvent::Settled {
                    reference,
                    evidence,
                } => {
                    let when = evidence
                        .block_time
                        .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "unknown".into());
                    tracing::info!(
                        %reference,
                        signature = %evidence.signature,
                        slot = evidence.slot,
                        block_time = %when,
                        "payment confirmed"
                    );
                }
                SessionEvent::Failed { .. } => {}
            }
        }
    };

    tokio::select! {
        _ = report => {}
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, stopping session");
            handle.shutdown();
        }
    }

    match session.await.context("session task panicked")? {
        Ok(()) => Ok(()),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(e).context("payment session failed"),
    }
}

/// Prints a fresh reference, plus its descriptor if a callback URL is given.
fn print_reference(args: cli::ReferenceArgs) -> Result<()> {
    let reference = OsReferenceGenerator
        .generate()
        .context("failed to generate reference")?;
    println!("{}", reference);
    if let Some(url) = args.callback_url {
        let descriptor = checkout::encode(&url, &reference)
            .with_context(|| format!("failed to encode descriptor for {}", url))?;
        println!("{}", descriptor);
    }
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("tillpoint-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc          {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that signal is simply never delivered.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
