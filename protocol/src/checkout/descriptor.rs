//! Transaction-request descriptors.
//!
//! A descriptor is what ends up in the QR code: the checkout link, with the
//! current reference in its query string, percent-encoded behind the
//! `solana:` scheme so a wallet knows to fetch it rather than open it.
//!
//! ```text
//! solana:https%3A%2F%2Fshop.example%2Fcheckout%3Freference%3D7xKX...
//! ```
//!
//! A descriptor is stale the moment its reference rotates; encode a new
//! one instead of patching an old one.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use url::Url;

use crate::config::{DESCRIPTOR_SCHEME, REFERENCE_QUERY_PARAM};
use crate::reference::Reference;

/// Everything except the characters `encodeURIComponent` leaves alone, so
/// wallets decode the link exactly as browsers would.
const LINK: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("invalid callback url: {0}")]
    InvalidUrl(String),

    #[error("callback url must be http or https, got {0}")]
    UnsupportedScheme(String),

    #[error("not a solana: descriptor")]
    NotADescriptor,

    #[error("link does not carry a valid reference")]
    MissingReference,
}

fn parse_link(link: &str) -> Result<Url, DescriptorError> {
    let url = Url::parse(link).map_err(|e| DescriptorError::InvalidUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DescriptorError::UnsupportedScheme(other.to_string())),
    }
}

/// Encodes a descriptor pointing at `base_url` for `reference`.
///
/// Existing query parameters survive; an existing `reference` parameter is
/// replaced rather than duplicated.
pub fn encode(base_url: &str, reference: &Reference) -> Result<String, DescriptorError> {
    let mut url = parse_link(base_url)?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != REFERENCE_QUERY_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(REFERENCE_QUERY_PARAM, &reference.to_base58());

    Ok(format!(
        "{}:{}",
        DESCRIPTOR_SCHEME,
        utf8_percent_encode(url.as_str(), LINK)
    ))
}

/// Resolves a descriptor back to the link a wallet would fetch.
pub fn parse_descriptor(descriptor: &str) -> Result<Url, DescriptorError> {
    let encoded = descriptor
        .strip_prefix(DESCRIPTOR_SCHEME)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or(DescriptorError::NotADescriptor)?;
    let link = percent_decode_str(encoded)
        .decode_utf8()
        .map_err(|e| DescriptorError::InvalidUrl(e.to_string()))?;
    parse_link(&link)
}

/// Extracts the reference from a resolved link.
pub fn reference_from_link(link: &Url) -> Result<Reference, DescriptorError> {
    link.query_pairs()
        .find(|(k, _)| k == REFERENCE_QUERY_PARAM)
        .and_then(|(_, v)| Reference::from_base58(&v).ok())
        .ok_or(DescriptorError::MissingReference)
}
