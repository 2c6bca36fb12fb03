//! # Correlation References
//!
//! A [`Reference`] is the single-use token that ties a checkout request to
//! the settlement that eventually lands on the ledger. The checkout service
//! embeds it as a read-only account key in the transaction it builds; the
//! poller then asks the ledger for any transaction touching that key.
//!
//! ## Why randomness matters
//!
//! Confirmation is "some transaction references this key". If an attacker
//! could predict the next reference, they could land a dust transaction
//! carrying it and fake a settlement. References therefore come straight
//! from the OS CSPRNG (256 bits), and a broken entropy source is a hard
//! error rather than a fallback to something weaker.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use solana_sdk::pubkey::{ParsePubkeyError, Pubkey, PUBKEY_BYTES};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The OS entropy source could not produce bytes.
#[derive(Debug, Error)]
#[error("entropy source unavailable: {0}")]
pub struct EntropyUnavailable(pub String);

/// An opaque, address-shaped correlation token.
///
/// Wraps a [`Pubkey`] so it can be dropped straight into an account list,
/// but is its own type so a reference is never confused with a payer.
///
/// Serializes as its base58 string, the form it takes in query strings.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference(Pubkey);

impl Reference {
    /// Wraps an existing address as a reference.
    pub const fn from_pubkey(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }

    /// Parses a base58 reference, as received in a `reference` query param.
    pub fn from_base58(s: &str) -> Result<Self, ParsePubkeyError> {
        Pubkey::from_str(s).map(Self)
    }

    /// The address form, for embedding into an account list.
    pub fn pubkey(&self) -> Pubkey {
        self.0
    }

    /// Base58 representation.
    pub fn to_base58(&self) -> String {
        self.0.to_string()
    }
}

impl FromStr for Reference {
    type Err = ParsePubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({})", self.0)
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(de::Error::custom)
    }
}

/// Source of fresh references.
///
/// The session controller owns one of these. Production code uses
/// [`OsReferenceGenerator`]; tests substitute scripted sequences.
pub trait ReferenceGenerator: Send + Sync {
    /// Produces a reference never handed out before.
    fn generate(&self) -> Result<Reference, EntropyUnavailable>;
}

/// Draws 32 bytes from the operating system's CSPRNG per reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsReferenceGenerator;

impl ReferenceGenerator for OsReferenceGenerator {
    fn generate(&self) -> Result<Reference, EntropyUnavailable> {
        let mut bytes = [0u8; PUBKEY_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| EntropyUnavailable(e.to_string()))?;
        Ok(Reference(Pubkey::new_from_array(bytes)))
    }
}
