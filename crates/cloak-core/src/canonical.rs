//! Canonical CBOR encoding and typed message digests.
//!
//! Every signed structure (input proofs, public decryption attestations,
//! user decryption authorizations) is hashed from its RFC 8949 Core
//! Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats
//!
//! A typed message is the map `{domain, message, type}` where `domain` names
//! the verifying context and `type` names the message schema. The digest is
//! Blake3 in derive-key mode with a per-type context, so a signature over one
//! message type can never be replayed as another.

use ciborium::value::Value;

use crate::crypto::Blake3Hash;
use crate::error::CoreError;
use crate::types::{Address, HandleId};

/// Verifying context of a typed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Domain {
    /// Create a new domain.
    pub fn new(name: &str, version: &str, chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            chain_id,
            verifying_contract,
        }
    }

    fn to_value(&self) -> Value {
        Value::Map(vec![
            (text("name"), text(&self.name)),
            (text("version"), text(&self.version)),
            (text("chain_id"), uint(self.chain_id)),
            (text("verifying_contract"), address(&self.verifying_contract)),
        ])
    }
}

/// A typed, named message ready for hashing.
#[derive(Debug, Clone)]
pub struct TypedMessage {
    type_name: &'static str,
    fields: Vec<(Value, Value)>,
}

impl TypedMessage {
    /// Start a message of the given type.
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            fields: Vec::new(),
        }
    }

    /// Add a field. Field order does not affect the encoding.
    pub fn field(mut self, name: &str, value: Value) -> Self {
        self.fields.push((text(name), value));
        self
    }

    /// The message type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Canonical bytes of `{domain, message, type}`.
    pub fn canonical_bytes(&self, domain: &Domain) -> Result<Vec<u8>, CoreError> {
        let envelope = Value::Map(vec![
            (text("domain"), domain.to_value()),
            (text("message"), Value::Map(self.fields.clone())),
            (text("type"), text(self.type_name)),
        ]);
        encode_canonical(&envelope)
    }

    /// Domain-separated digest of the message.
    pub fn digest(&self, domain: &Domain) -> Result<Blake3Hash, CoreError> {
        let bytes = self.canonical_bytes(domain)?;
        let context = format!("cloak typed message v1 {}", self.type_name);
        Ok(Blake3Hash::derive(&context, &bytes))
    }
}

/// Text value.
pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// Unsigned integer value.
pub fn uint(n: u64) -> Value {
    Value::Integer(n.into())
}

/// Byte string value.
pub fn bytes(b: &[u8]) -> Value {
    Value::Bytes(b.to_vec())
}

/// Address as a 20-byte string.
pub fn address(a: &Address) -> Value {
    bytes(a.as_bytes())
}

/// Handle as a 32-byte string.
pub fn handle(h: &HandleId) -> Value {
    bytes(h.as_bytes())
}

/// Encode a CBOR value to canonical bytes.
pub fn encode_canonical(value: &Value) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr)?,
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => return Err(CoreError::UnsupportedCanonical("float")),
        _ => return Err(CoreError::UnsupportedCanonical("tag or simple value")),
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // -1 encodes as 0, -2 as 1, ...
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) -> Result<(), CoreError> {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item)?;
    }
    Ok(())
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded bytes; duplicate keys are rejected.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<(), CoreError> {
    let mut pairs: Vec<(Vec<u8>, &Value)> = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    if pairs.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(CoreError::UnsupportedCanonical("duplicate map key"));
    }

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}
