//! Deterministic cache-key derivation.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::CacheError;

/// Hex characters of the SHA-256 digest kept in the key.
const DIGEST_LEN: usize = 16;

/// Named call parameters for a cached operation.
///
/// Parameters are kept sorted by name, so insertion order never affects the
/// derived key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheParams {
    params: BTreeMap<String, Value>,
}

impl CacheParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter. Fails if `value` cannot be serialized, so a bad input
    /// never yields an unstable key.
    pub fn with(mut self, name: impl Into<String>, value: &impl Serialize) -> Result<Self, CacheError> {
        let name = name.into();
        let value = serde_json::to_value(value).map_err(|err| CacheError::KeySerialization {
            param: name.clone(),
            reason: err.to_string(),
        })?;
        self.params.insert(name, value);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Canonical text form: `name=json` pairs joined by `&`, sorted by name.
    pub fn canonical(&self) -> String {
        self.params
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Build `"{namespace}:{digest}"` for `params`.
pub fn derive_key(namespace: &str, params: &CacheParams) -> String {
    let digest = Sha256::digest(params.canonical().as_bytes());
    let mut hex = String::with_capacity(DIGEST_LEN);
    for byte in digest.iter().take(DIGEST_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    format!("{namespace}:{hex}")
}
