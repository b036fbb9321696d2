//! Deterministic cache-key derivation.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Namespace every cache entry lives under
pub const CACHE_NAMESPACE: &str = "cache:";

/// Identifier of the key hash, reported by cache stats
pub const HASH_FUNCTION_ID: &str = "djb2-fnv1a-xor-base36";

const DJB2_SEED: u32 = 5381;
const FNV_OFFSET: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Canonicalized request parameters feeding a cache key.
///
/// Names are kept sorted. Values that fail to serialize, or serialize to
/// `null` (an absent `Option`), are dropped, so they never change the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheParams {
    entries: BTreeMap<String, Value>,
}

impl CacheParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter
    #[must_use]
    pub fn with<V: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &V) -> Self {
        self.insert(name, value);
        self
    }

    /// Add a parameter in place. Returns whether it was kept.
    pub fn insert<V: Serialize + ?Sized>(&mut self, name: impl Into<String>, value: &V) -> bool {
        match serde_json::to_value(value) {
            Ok(Value::Null) | Err(_) => false,
            Ok(value) => {
                self.entries.insert(name.into(), value);
                true
            }
        }
    }

    /// Build from any struct or map serializing to a JSON object.
    ///
    /// Anything that is not an object yields empty params.
    pub fn from_serializable<S: Serialize + ?Sized>(source: &S) -> Self {
        let mut params = Self::new();
        if let Ok(Value::Object(map)) = serde_json::to_value(source) {
            for (name, value) in map {
                if !value.is_null() {
                    params.entries.insert(name, value);
                }
            }
        }
        params
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Stable textual form: compact JSON with sorted names at every level.
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_default()
    }
}

/// Derive the store key for `logical_key` under `prefix`.
///
/// With parameters the digest covers `"{logical_key}:{canonical}"`, so the
/// logical name is hashed as well as kept in clear in the key.
pub fn derive_key(logical_key: &str, prefix: &str, params: &CacheParams) -> String {
    if params.is_empty() {
        format!("{CACHE_NAMESPACE}{prefix}{logical_key}")
    } else {
        let digest = combined_hash(&format!("{logical_key}:{}", params.canonical()));
        format!("{CACHE_NAMESPACE}{prefix}{logical_key}:{digest}")
    }
}

/// Fast non-cryptographic 8-character digest.
///
/// Runs djb2 and FNV-1a side by side over the UTF-16 code units of `input`,
/// XORs the absolute values of both (as signed 32-bit) and renders the result
/// in base 36, left-padded with zeros.
pub fn combined_hash(input: &str) -> String {
    let mut djb2 = DJB2_SEED;
    let mut fnv = FNV_OFFSET;

    for unit in input.encode_utf16() {
        let c = u32::from(unit);
        djb2 = djb2.wrapping_mul(33).wrapping_add(c);
        fnv = (fnv ^ c).wrapping_mul(FNV_PRIME);
    }

    let combined = (djb2 as i32).unsigned_abs() ^ (fnv as i32).unsigned_abs();
    format!("{:0>8}", to_base36(combined))
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::with_capacity(7);
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
