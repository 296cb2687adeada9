//! Canonical JSON and SHA-256 checksums.
//!
//! Checksums are computed over a canonical serialization so that key order
//! and float spelling never change a digest:
//! - object keys sorted by UTF-16 code units (RFC 8785 §3.2.3)
//! - integer-valued floats written as integers
//! - NaN/Infinity rejected

use serde::Serialize;
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use crate::domain::error::{Result, SpecbenchError};

fn utf16_key(key: &str) -> Vec<u16> {
    key.encode_utf16().collect()
}

fn canonicalize(value: &Value) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(k, _)| utf16_key(k));

            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v)?);
            }
            Ok(Value::Object(sorted))
        }
        Value::Array(items) => Ok(Value::Array(
            items.iter().map(canonicalize).collect::<Result<Vec<_>>>()?,
        )),
        Value::Number(n) if n.is_f64() => {
            let f = n.as_f64().unwrap_or(f64::NAN);
            if !f.is_finite() {
                return Err(SpecbenchError::Storage(
                    "NaN/Infinity not permitted in canonical JSON".to_string(),
                ));
            }
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Ok(Value::Number(Number::from(f as i64)))
            } else {
                Ok(Value::Number(n.clone()))
            }
        }
        other => Ok(other.clone()),
    }
}

/// Canonical compact JSON text of `value`.
pub fn canonical_json(value: &Value) -> Result<String> {
    let canonical = canonicalize(value)?;
    Ok(serde_json::to_string(&canonical)?)
}

/// SHA-256 hex digest of the canonical form of `value`.
pub fn compute_digest(value: &Value) -> Result<String> {
    let canonical = canonical_json(value)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// Serialize `item` to JSON and digest its canonical form.
pub fn checksum_of<T: Serialize + ?Sized>(item: &T) -> Result<String> {
    let value = serde_json::to_value(item)?;
    compute_digest(&value)
}

/// SHA-256 hex digest of raw bytes (side-file content checks).
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
