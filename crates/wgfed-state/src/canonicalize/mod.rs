//! Strict document parsing and canonical JSON for state signing.
//!
//! The signed message of a state envelope is the JCS (RFC 8785) form of its
//! `data` mapping. Producer and verifier must agree on that form byte for
//! byte, so input documents are restricted to values with exactly one
//! canonical representation.
//!
//! # Strict subset
//!
//! Rejected in YAML:
//! - Anchors and aliases (`&name`, `*name`)
//! - Tags (`!!str`, `!custom`)
//! - Multiple documents
//!
//! Rejected in YAML and JSON:
//! - Duplicate keys
//! - Floats (only integers allowed)
//! - Integers outside ±2^53
//! - Non-string keys
//!
//! # Limits
//!
//! - Max depth: 50
//! - Max keys per mapping: 10,000
//! - Max string length: 1MB
//! - Max total size: 10MB

mod errors;
mod json;
mod yaml;

#[cfg(test)]
mod tests;

pub use errors::{
    CanonicalizeError, CanonicalizeResult, MAX_DEPTH, MAX_KEYS_PER_MAPPING, MAX_SAFE_INTEGER,
    MAX_STRING_LENGTH, MAX_TOTAL_SIZE, MIN_SAFE_INTEGER,
};
pub use json::{parse_json_strict, to_canonical_jcs_bytes, to_canonical_string};
pub use yaml::parse_yaml_strict;

pub(crate) use json::check_limits;

use serde_json::Value as JsonValue;

/// `sha256:{hex}` over the JCS bytes of a value.
///
/// Equals the `state_digest` logged when a state verifies, so stored
/// documents can be matched against logs. Never a trust decision.
pub fn canonical_digest(value: &JsonValue) -> CanonicalizeResult<String> {
    let bytes = to_canonical_jcs_bytes(value)?;
    Ok(crate::digest::sha256_prefixed(&bytes))
}
