// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Tillpoint Protocol: Core Library
//!
//! Reference-correlated payment requests: a merchant hands out unsigned
//! transactions tagged with a single-use reference, and a client watches the
//! ledger until a settlement carrying that reference shows up.
//!
//! ## Architecture
//!
//! The library is split along the two halves of the protocol, with the
//! shared plumbing underneath:
//!
//! - **reference**: Unguessable correlation tokens from the OS CSPRNG.
//! - **checkout**: GET metadata, POST transaction building, descriptors.
//! - **session**: Confirmation polling and reference rotation.
//! - **ledger**: The two ledger calls everything depends on, plus
//!   JSON-RPC and in-memory implementations.
//! - **transaction**: The checkout transfer and its wire encoding.
//! - **config**: Protocol constants and defaults.
//!
//! Addresses, hashes, signatures and keypairs are `solana-sdk`'s and are
//! re-exported at the crate root.
//!
//! ## Design Philosophy
//!
//! 1. A settlement is never reported that did not happen.
//! 2. A settlement that might still happen is never given up on.
//! 3. The merchant never signs anything. The wallet does.
//! 4. If it touches money, it has tests. Plural.

pub mod checkout;
pub mod config;
pub mod ledger;
pub mod reference;
pub mod session;
pub mod transaction;

pub use solana_sdk::hash::Hash;
pub use solana_sdk::pubkey::Pubkey;
pub use solana_sdk::signature::{Keypair, Signature, Signer};
