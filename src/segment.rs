//! Segment Codec.
//!
//! A segment is the ordered list of `(sql, params)` pairs that make up one
//! committed transaction. The wire form is a JSON array of two-element
//! arrays `[sql_text, params_object]`, with parameter keys sorted and a
//! fixed four-space indent, so segments are human-inspectable sitting in
//! the object store. Readers must accept any key order and whitespace;
//! only `encode` is opinionated about formatting.

use crate::value::{decode_params_from_segment, encode_params_for_segment, Params};
use crate::{Error, Result};
use serde::Serialize;

/// One `(sql_text, parameter_map)` pair, as accumulated in a session's
/// pending list and persisted in a segment.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRecord {
    pub sql: String,
    pub params: Params,
}

/// An ordered sequence of statement records sharing a single LSN. Empty
/// segments are never produced by the replication engine.
pub type Segment = Vec<StatementRecord>;

/// Encodes a segment into its canonical JSON wire form: sorted parameter
/// keys (free from `Params` being a `BTreeMap`), four-space indent.
pub fn encode(segment: &Segment) -> Result<Vec<u8>> {
    let array: Vec<serde_json::Value> = segment
        .iter()
        .map(|record| {
            Ok(serde_json::Value::Array(vec![
                serde_json::Value::String(record.sql.clone()),
                serde_json::Value::Object(encode_params_for_segment(&record.params)?),
            ]))
        })
        .collect::<Result<_>>()?;

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde_json::Value::Array(array)
        .serialize(&mut ser)
        .map_err(|e| Error::Other(format!("failed to serialize segment: {e}")))?;
    Ok(buf)
}

/// Decodes a segment from its JSON wire form, applying the post-decode kind
/// assertion on every parameter. Any shape or kind mismatch is reported as a
/// plain-text reason, since at this layer there is no LSN to attach it to;
/// the caller (the replication engine's `sync`, which does know the LSN)
/// wraps it into `Error::InvalidSegment`.
pub fn decode(bytes: &[u8]) -> std::result::Result<Segment, String> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| format!("not valid JSON: {e}"))?;

    let array = value
        .as_array()
        .ok_or_else(|| "expected a top-level JSON array".to_string())?;

    array
        .iter()
        .map(|entry| {
            let pair = entry
                .as_array()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| "expected a 2-element [sql, params] array".to_string())?;

            let sql = pair[0]
                .as_str()
                .ok_or_else(|| "sql_text must be a JSON string".to_string())?
                .to_string();

            let params_obj = pair[1]
                .as_object()
                .ok_or_else(|| "params must be a JSON object".to_string())?;

            let params = decode_params_from_segment(params_obj)?;

            Ok(StatementRecord { sql, params })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;

    fn sample() -> Segment {
        let mut params = Params::new();
        params.insert("ikey".into(), Value::Int(7));
        params.insert("tname".into(), Value::Text("a".into()));
        vec![StatementRecord {
            sql: "insert into users(ikey, tname) values(:ikey, :tname)".into(),
            params,
        }]
    }

    #[test]
    fn encode_produces_four_space_indented_json() {
        let bytes = encode(&sample()).unwrap();
        insta::assert_snapshot!(String::from_utf8(bytes).unwrap(), @r###"
        [
            [
                "insert into users(ikey, tname) values(:ikey, :tname)",
                {
                    "ikey": 7,
                    "tname": "a"
                }
            ]
        ]
        "###);
    }

    #[test]
    fn round_trips_value_and_order() {
        let segment = sample();
        let bytes = encode(&segment).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, segment);
    }

    #[test]
    fn blob_round_trips_exact_bytes() {
        let mut params = Params::new();
        params.insert("ikey".into(), Value::Int(7));
        params.insert("bpayload".into(), Value::Bytes(vec![0x00, 0xff, 0x10]));
        let segment = vec![StatementRecord {
            sql: "insert into blobs(ikey, bpayload) values(:ikey, :bpayload)".into(),
            params,
        }];

        let bytes = encode(&segment).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"AP8Q\""));

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, segment);
    }

    #[test]
    fn keys_are_sorted_and_indent_is_four_spaces() {
        let mut params = Params::new();
        params.insert("tzzz".into(), Value::Text("z".into()));
        params.insert("taaa".into(), Value::Text("a".into()));
        let segment = vec![StatementRecord {
            sql: "select 1".into(),
            params,
        }];

        let bytes = encode(&segment).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let aaa = text.find("\"taaa\"").unwrap();
        let zzz = text.find("\"tzzz\"").unwrap();
        assert!(aaa < zzz, "taaa must be serialized before tzzz");
        assert!(text.contains("\n    "));
    }

    #[test]
    fn decode_rejects_non_array_top_level() {
        let err = decode(br#"{"not": "an array"}"#).unwrap_err();
        assert!(err.contains("top-level JSON array"));
    }

    #[test]
    fn decode_accepts_any_key_order_and_whitespace() {
        let bytes = br#"[["select 1", {"tname": "a", "ikey": 7}]]"#;
        let decoded = decode(bytes).unwrap();
        assert_eq!(decoded, sample());
    }
}
