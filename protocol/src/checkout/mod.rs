//! # Checkout (Transaction Requests)
//!
//! The merchant half of the protocol. A wallet that scans a descriptor
//! talks to the checkout endpoint twice:
//!
//! 1. **GET**: fetch a label and icon to show the user.
//! 2. **POST** `{ account }` with `?reference=...`: receive an unsigned
//!    transaction paying the merchant, with the reference embedded as a
//!    read-only account so the payment can be found later.
//!
//! [`CheckoutService`] implements both halves independently of any HTTP
//! framework; the node binary only maps its results onto status codes.
//! [`descriptor`] builds the `solana:` URI that points a wallet here.

pub mod descriptor;
pub mod error;
pub mod service;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::config::{DEFAULT_ICON, DEFAULT_LABEL, DEFAULT_MESSAGE, DEFAULT_TRANSFER_LAMPORTS};

pub use descriptor::{encode, parse_descriptor, reference_from_link, DescriptorError};
pub use error::{CheckoutError, InputError, InputField, ReservedAccount};
pub use service::CheckoutService;

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Body of a successful GET.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub label: String,
    pub icon: String,
}

/// Body of a POST. `account` is optional so a missing field can be
/// reported with the protocol's own error message instead of a generic
/// deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRequest {
    #[serde(default)]
    pub account: Option<String>,
}

/// Body of a successful POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostResponse {
    /// Base64 of the serialized, unsigned transaction.
    pub transaction: String,
    /// Shown to the payer before they approve.
    pub message: String,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Merchant-facing checkout settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Label returned on GET.
    pub label: String,
    /// Icon URL returned on GET.
    pub icon: String,
    /// Message returned alongside each built transaction.
    pub message: String,
    /// Address receiving payments. When unset, every transaction pays a
    /// freshly generated throwaway address, which only makes sense for demos.
    pub recipient: Option<Pubkey>,
    /// Amount charged per checkout.
    pub lamports: u64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            icon: DEFAULT_ICON.to_string(),
            message: DEFAULT_MESSAGE.to_string(),
            recipient: None,
            lamports: DEFAULT_TRANSFER_LAMPORTS,
        }
    }
}
