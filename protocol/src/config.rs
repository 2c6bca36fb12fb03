//! # Protocol Configuration & Constants
//!
//! Every magic number in Tillpoint lives here. If you're hardcoding a
//! constant somewhere else, move it here first.
//!
//! Wire-format constants (key lengths, program ids, packet size) are the
//! ledger's and come from `solana-sdk`. What remains here are tunables with
//! sensible defaults.

use solana_sdk::native_token::LAMPORTS_PER_SOL;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Checkout Defaults
// ---------------------------------------------------------------------------

/// Nominal amount charged per checkout: 0.001 SOL.
pub const DEFAULT_TRANSFER_LAMPORTS: u64 = LAMPORTS_PER_SOL / 1_000;

/// Label shown by a wallet when it first resolves the descriptor.
pub const DEFAULT_LABEL: &str = "Store Name";

/// Icon shown by a wallet next to the label.
pub const DEFAULT_ICON: &str = "https://solana.com/src/img/branding/solanaLogoMark.svg";

/// Message shown to the payer before they approve the transaction.
pub const DEFAULT_MESSAGE: &str = "Message To User Before Approving Transaction Here";

/// URI scheme wrapping a transaction-request link.
pub const DESCRIPTOR_SCHEME: &str = "solana";

/// Query parameter carrying the reference on the checkout link.
pub const REFERENCE_QUERY_PARAM: &str = "reference";

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Interval between confirmation lookups. Not correctness-critical: a
/// slower interval only delays confirmation, it never misses one.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1_500);

/// Upper bound on a single lookup. A tick that exceeds this counts as a
/// transient failure and the next tick is scheduled normally.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Page size for signature lookups against a JSON-RPC ledger.
pub const SIGNATURE_PAGE_LIMIT: usize = 1_000;

/// Capacity of the session event channel.
pub const SESSION_EVENT_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Default ledger JSON-RPC endpoint. Devnet, because nobody should be
/// pointing a demo checkout at mainnet by accident.
pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";

/// Timeout for a single JSON-RPC HTTP round trip.
pub const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default HTTP port for the checkout API.
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9742;

/// Ledger commitment level a settlement must reach before it counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Commitment {
    /// Seen by the node, may still be rolled back.
    Processed,
    /// Voted on by a supermajority. The usual point-of-sale choice.
    #[default]
    Confirmed,
    /// Rooted. Slowest, safest.
    Finalized,
}

impl Commitment {
    /// The string the JSON-RPC API expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }

    /// Parse a commitment level. Returns `None` for anything unrecognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "processed" => Some(Self::Processed),
            "confirmed" => Some(Self::Confirmed),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
