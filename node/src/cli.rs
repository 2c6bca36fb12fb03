//! # CLI Interface
//!
//! Defines the command-line argument structure for `tillpoint-node` using
//! `clap` derive. Supports four subcommands: `serve`, `watch`, `reference`,
//! and `version`. Every flag can also be set through a `TILLPOINT_*`
//! environment variable.

use clap::{Parser, Subcommand};

use tillpoint_protocol::config::{
    Commitment, DEFAULT_HTTP_PORT, DEFAULT_ICON, DEFAULT_LABEL, DEFAULT_MESSAGE,
    DEFAULT_METRICS_PORT, DEFAULT_RPC_URL, DEFAULT_TRANSFER_LAMPORTS,
};
use tillpoint_protocol::Pubkey;

use crate::logging::LogFormat;

/// Tillpoint checkout node.
///
/// Serves transaction requests to wallets and watches the ledger for the
/// payments they produce.
#[derive(Parser, Debug)]
#[command(
    name = "tillpoint-node",
    about = "Tillpoint checkout server and confirmation watcher",
    version,
    propagate_version = true
)]
pub struct TillpointCli {
    /// Log output format.
    #[arg(long, global = true, value_enum, env = "TILLPOINT_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the checkout API.
    Serve(ServeArgs),
    /// Run a payment session: print a descriptor, wait for the payment,
    /// rotate, repeat until Ctrl+C.
    Watch(WatchArgs),
    /// Print a fresh reference (and its descriptor, given a callback URL).
    Reference(ReferenceArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind both listeners to.
    #[arg(long, env = "TILLPOINT_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the checkout API.
    #[arg(long, env = "TILLPOINT_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "TILLPOINT_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Ledger JSON-RPC endpoint used for checkpoint hashes.
    #[arg(long, env = "TILLPOINT_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Use a throwaway in-process ledger instead of `--rpc-url`.
    #[arg(long, env = "TILLPOINT_IN_MEMORY")]
    pub in_memory: bool,

    /// Base58 address receiving payments.
    ///
    /// When omitted, each transaction pays a freshly generated address.
    /// Fine for a demo, useless for a shop.
    #[arg(long, env = "TILLPOINT_RECIPIENT")]
    pub recipient: Option<Pubkey>,

    /// Amount charged per checkout, in lamports.
    #[arg(long, env = "TILLPOINT_LAMPORTS", default_value_t = DEFAULT_TRANSFER_LAMPORTS)]
    pub lamports: u64,

    /// Label shown by the wallet.
    #[arg(long, env = "TILLPOINT_LABEL", default_value = DEFAULT_LABEL)]
    pub label: String,

    /// Icon URL shown by the wallet.
    #[arg(long, env = "TILLPOINT_ICON", default_value = DEFAULT_ICON)]
    pub icon: String,

    /// Message shown to the payer before approval.
    #[arg(long, env = "TILLPOINT_MESSAGE", default_value = DEFAULT_MESSAGE)]
    pub message: String,
}

/// Arguments for the `watch` subcommand.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Checkout endpoint the descriptors point at, e.g.
    /// `https://shop.example/api/checkout`.
    #[arg(long, env = "TILLPOINT_CALLBACK_URL")]
    pub callback_url: String,

    /// Ledger JSON-RPC endpoint polled for settlements.
    #[arg(long, env = "TILLPOINT_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Milliseconds between lookups.
    #[arg(long, env = "TILLPOINT_POLL_INTERVAL_MS", default_value_t = 1_500)]
    pub interval_ms: u64,

    /// Upper bound on a single lookup, in milliseconds.
    #[arg(long, env = "TILLPOINT_LOOKUP_TIMEOUT_MS", default_value_t = 10_000)]
    pub lookup_timeout_ms: u64,

    /// Commitment a payment must reach: processed, confirmed, or finalized.
    #[arg(long, env = "TILLPOINT_COMMITMENT", default_value = "confirmed", value_parser = parse_commitment)]
    pub commitment: Commitment,
}

/// Arguments for the `reference` subcommand.
#[derive(Parser, Debug)]
pub struct ReferenceArgs {
    /// Also print the descriptor for this checkout endpoint.
    #[arg(long, env = "TILLPOINT_CALLBACK_URL")]
    pub callback_url: Option<String>,
}

fn parse_commitment(s: &str) -> Result<Commitment, String> {
    Commitment::parse(s).ok_or_else(|| format!("unknown commitment level: {}", s))
}
