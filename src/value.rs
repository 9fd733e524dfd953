//! Type & Value Codec.
//!
//! The four primitive kinds are identified by the first character of a
//! column or parameter name: `i` (int64), `f` (float64), `t` (text), `b`
//! (bytes). The naming convention is load-bearing: it is the sole source of
//! type information at the replication boundary and is preserved verbatim
//! across nodes.

use crate::{Error, Result};
use base64::Engine;
use std::collections::BTreeMap;

/// A typed value bound to a named, kind-prefixed parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Null,
}

impl Value {
    fn runtime_kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Null => "null",
        }
    }
}

/// An ordered, kind-checked parameter map. Key order is not semantically
/// significant; `BTreeMap` gives us the sorted iteration the segment codec
/// wants for free.
pub type Params = BTreeMap<String, Value>;

fn kind_of(name: &str) -> Result<char> {
    match name.chars().next() {
        Some(c @ ('i' | 'f' | 't' | 'b')) => Ok(c),
        _ => Err(Error::UnknownKind(name.to_string())),
    }
}

/// Validates a caller-supplied parameter map against the kind-prefix
/// convention. Null values bypass type checking. `Value::Bytes` is accepted
/// for a `b` parameter either as raw bytes, or (to support CLI stdin JSON,
/// where byte strings necessarily arrive as base64 text) as `Value::Text`
/// carrying base64, which is decoded here.
pub fn validate(values: BTreeMap<String, Value>) -> Result<Params> {
    let mut params = Params::new();

    for (k, v) in values {
        let kind = kind_of(&k)?;

        let v = match (kind, v) {
            (_, Value::Null) => Value::Null,
            ('i', v @ Value::Int(_)) => v,
            ('f', v @ Value::Int(_)) | ('f', v @ Value::Float(_)) => match v {
                Value::Int(i) => Value::Float(i as f64),
                other => other,
            },
            ('t', v @ Value::Text(_)) => v,
            ('b', v @ Value::Bytes(_)) => v,
            ('b', Value::Text(text)) => {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(&text)
                    .map_err(|_| Error::TypeMismatch {
                        field: k.clone(),
                        expected: 'b',
                        got: "text (invalid base64)",
                    })?;
                Value::Bytes(decoded)
            }
            (expected, other) => {
                return Err(Error::TypeMismatch {
                    field: k,
                    expected,
                    got: other.runtime_kind(),
                })
            }
        };

        params.insert(k, v);
    }

    Ok(params)
}

/// Maps a validated parameter map into its JSON wire representation: every
/// non-null `b` value becomes base64 text, everything else passes through
/// unchanged. Used only by the segment codec when building the bytes that go
/// to the object store.
///
/// `serde_json::Number` has no representation for `NaN`/`±Infinity`, so a
/// non-finite `f` value is rejected here rather than silently encoded as
/// JSON `null` — that would make it indistinguishable from an actual null on
/// decode and corrupt the value across the replication boundary.
pub fn encode_params_for_segment(
    params: &Params,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    params
        .iter()
        .map(|(k, v)| {
            let json = match v {
                Value::Int(i) => serde_json::Value::from(*i),
                Value::Float(f) => serde_json::Number::from_f64(*f)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| Error::TypeMismatch {
                        field: k.clone(),
                        expected: 'f',
                        got: "non-finite float (NaN/Infinity)",
                    })?,
                Value::Text(s) => serde_json::Value::String(s.clone()),
                Value::Bytes(b) => serde_json::Value::String(
                    base64::engine::general_purpose::STANDARD.encode(b),
                ),
                Value::Null => serde_json::Value::Null,
            };
            Ok((k.clone(), json))
        })
        .collect()
}

/// Inverse of `encode_params_for_segment`, with a post-decode kind
/// assertion. A mismatch here means the segment is corrupt or was produced
/// by a foreign writer; it is always a fatal, non-retryable condition for
/// the caller (see `Error::InvalidSegment`).
pub fn decode_params_from_segment(
    obj: &serde_json::Map<String, serde_json::Value>,
) -> std::result::Result<Params, String> {
    let mut params = Params::new();

    for (k, v) in obj {
        let kind = k.chars().next().ok_or_else(|| "empty parameter name".to_string())?;

        let value = match (kind, v) {
            (_, serde_json::Value::Null) => Value::Null,
            ('i', serde_json::Value::Number(n)) => {
                let i = n
                    .as_i64()
                    .ok_or_else(|| format!("parameter {k} is not an integer: {n}"))?;
                Value::Int(i)
            }
            ('f', serde_json::Value::Number(n)) => {
                let f = n
                    .as_f64()
                    .ok_or_else(|| format!("parameter {k} is not a float: {n}"))?;
                Value::Float(f)
            }
            ('t', serde_json::Value::String(s)) => Value::Text(s.clone()),
            ('b', serde_json::Value::String(s)) => {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .map_err(|e| format!("parameter {k} is not valid base64: {e}"))?;
                Value::Bytes(decoded)
            }
            ('i' | 'f' | 't' | 'b', other) => {
                return Err(format!(
                    "parameter {k} (kind '{kind}') has the wrong JSON shape: {other}"
                ))
            }
            (_, _) => return Err(format!("parameter {k} has an unrecognized kind prefix")),
        };

        params.insert(k.clone(), value);
    }

    Ok(params)
}
