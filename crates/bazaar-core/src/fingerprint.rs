//! Request fingerprints.
//!
//! A fingerprint is the blake3 digest of a request's capability and the
//! canonical form of its effective parameters. Two requests that differ only
//! in key order, in surrounding/internal whitespace, or in how an integral
//! number is written (`1` and `1.0`) hash the same; any substantive
//! difference (capability, numeric value, words, case) does not.
//!
//! The digest is computed over a self-describing byte stream rather than a
//! JSON rendering, so it does not depend on map iteration order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::capability::Capability;
use crate::types::{Parameters, ServiceRequest};

const DOMAIN_TAG: &[u8] = b"bazaar.fingerprint.v1";

/// Trims a string and collapses internal whitespace runs to a single space.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Content hash used as the provider-side dedup key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Computes the fingerprint of a capability and parameter set.
    #[must_use]
    pub fn compute(capability: &Capability, parameters: &Parameters) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN_TAG);
        write_str(&mut hasher, capability.as_str());
        write_object(&mut hasher, parameters);
        Self(*hasher.finalize().as_bytes())
    }

    /// Computes the fingerprint of a request's effective parameters.
    #[must_use]
    pub fn of_request(request: &ServiceRequest) -> Self {
        Self::compute(request.capability(), request.effective_parameters())
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the lowercase hex encoding of the digest.
    #[must_use]
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Parses a fingerprint from its hex encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not 64 hex characters.
    pub fn from_hex(hex: &str) -> Result<Self, blake3::HexError> {
        blake3::Hash::from_hex(hex).map(|hash| Self(*hash.as_bytes()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Fingerprint({})", &hex[..16])
    }
}

impl FromStr for Fingerprint {
    type Err = blake3::HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

fn write_len(hasher: &mut blake3::Hasher, len: usize) {
    hasher.update(&(len as u64).to_le_bytes());
}

fn write_str(hasher: &mut blake3::Hasher, text: &str) {
    let normalized = normalize_text(text);
    write_len(hasher, normalized.len());
    hasher.update(normalized.as_bytes());
}

fn write_object(hasher: &mut blake3::Hasher, object: &Parameters) {
    let mut entries: Vec<(String, &Value)> =
        object.iter().map(|(k, v)| (normalize_text(k), v)).collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    hasher.update(b"o");
    write_len(hasher, entries.len());
    for (key, value) in entries {
        write_str(hasher, &key);
        write_value(hasher, value);
    }
}

/// Integral floats below 2^63 in magnitude are written as integers.
#[allow(clippy::cast_possible_truncation)]
fn canonical_number(n: &serde_json::Number) -> String {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    match n.as_f64() {
        Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < LIMIT => (f as i64).to_string(),
        _ => n.to_string(),
    }
}

fn write_value(hasher: &mut blake3::Hasher, value: &Value) {
    match value {
        Value::Null => {
            hasher.update(b"n");
        }
        Value::Bool(b) => {
            hasher.update(if *b { b"t" } else { b"f" });
        }
        Value::Number(n) => {
            hasher.update(b"d");
            write_str(hasher, &canonical_number(n));
        }
        Value::String(s) => {
            hasher.update(b"s");
            write_str(hasher, s);
        }
        Value::Array(items) => {
            hasher.update(b"a");
            write_len(hasher, items.len());
            for item in items {
                write_value(hasher, item);
            }
        }
        Value::Object(object) => write_object(hasher, object),
    }
}
