//! Component B: transforms a decoded `RespValue` into a host value, per the mapping table in
//! §4.2. This is the "fused" half of the decode path: by the time a `RespValue::BulkString`
//! reaches here it is already an owned `Bytes` slice of the old read buffer (§9's default "(a)
//! copy eagerly" — the copy happened once, in `Codec::decode`), so materializing never touches
//! the connection's buffer again, satisfying invariant §3.4.

use super::value::RespValue;
use crate::error::{classify_error_line, Result};
use bytes::Bytes;

/// A materialized RESP value in the host's vocabulary. No variant borrows from the connection
/// read buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Text(String),
    Bytes(Bytes),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    /// `Array` and `Set` (§4.2: "Set -> sequence") both materialize here; nothing downstream
    /// needs to distinguish an ordered array from an unordered set once it is host-side.
    Array(Vec<HostValue>),
    /// Flat alternating `[key, value, key, value, ...]`, preserving wire order and duplicate
    /// keys exactly as seen (§4.2: "callers that expect a true mapping convert client-side").
    Map(Vec<HostValue>),
    /// RESP3 out-of-band push message, tagged so a caller can distinguish it from a reply to
    /// its own request.
    Push(Vec<HostValue>),
    Verbatim { format: String, text: String },
    Null,
}

impl HostValue {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HostValue::Bytes(b) => Some(b),
            HostValue::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            HostValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

/// Holds the decode configuration described in §4.2's table and applies it while walking a
/// decoded `RespValue` tree exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct Materializer {
    pub decode_responses: bool,
}

impl Materializer {
    pub fn new(decode_responses: bool) -> Self {
        Materializer { decode_responses }
    }

    /// Maps one decoded value per §4.2. A server `Error` is classified (§4.8) and returned as
    /// `Err` rather than a successful `HostValue` (§3 invariant 5).
    pub fn materialize(&self, value: RespValue) -> Result<HostValue> {
        match value {
            RespValue::Error(text) => {
                let line = String::from_utf8_lossy(&text);
                Err(classify_error_line(&line))
            }
            RespValue::SimpleString(s) => Ok(HostValue::Text(String::from_utf8_lossy(&s).into_owned())),
            RespValue::Integer(i) => Ok(HostValue::Integer(i)),
            RespValue::BulkString(bytes) => Ok(self.bulk(bytes)),
            RespValue::Array(items) => self.materialize_seq(items).map(HostValue::Array),
            RespValue::Set(items) => self.materialize_seq(items).map(HostValue::Array),
            RespValue::Push(items) => self.materialize_seq(items).map(HostValue::Push),
            RespValue::Map(pairs) => {
                let mut flat = Vec::with_capacity(pairs.len() * 2);
                for (k, v) in pairs {
                    flat.push(self.materialize(k)?);
                    flat.push(self.materialize(v)?);
                }
                Ok(HostValue::Map(flat))
            }
            RespValue::Double(d) => Ok(HostValue::Double(d)),
            RespValue::Boolean(b) => Ok(HostValue::Boolean(b)),
            RespValue::BigNumber(text) => Ok(HostValue::Text(String::from_utf8_lossy(&text).into_owned())),
            RespValue::VerbatimString { format, payload } => Ok(HostValue::Verbatim {
                format: String::from_utf8_lossy(&format).into_owned(),
                text: String::from_utf8_lossy(&payload).into_owned(),
            }),
            RespValue::Null => Ok(HostValue::Null),
        }
    }

    fn materialize_seq(&self, items: Vec<RespValue>) -> Result<Vec<HostValue>> {
        items.into_iter().map(|v| self.materialize(v)).collect()
    }

    fn bulk(&self, bytes: Bytes) -> HostValue {
        if self.decode_responses {
            match String::from_utf8(bytes.to_vec()) {
                Ok(text) => HostValue::Text(text),
                Err(invalid) => HostValue::Bytes(Bytes::from(invalid.into_bytes())),
            }
        } else {
            HostValue::Bytes(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PyrsedisError;

    #[test]
    fn bulk_string_decodes_to_bytes_by_default() {
        let m = Materializer::new(false);
        assert_eq!(m.materialize(RespValue::bulk("hello")).unwrap(), HostValue::Bytes(Bytes::from_static(b"hello")));
    }

    #[test]
    fn bulk_string_decodes_to_text_when_configured() {
        let m = Materializer::new(true);
        assert_eq!(
            m.materialize(RespValue::bulk("hello")).unwrap(),
            HostValue::Text("hello".to_string())
        );
    }

    #[test]
    fn invalid_utf8_falls_back_to_bytes_even_when_decode_responses_is_set() {
        let m = Materializer::new(true);
        let invalid = vec![0xff, 0xfe, 0x00];
        let v = m.materialize(RespValue::BulkString(Bytes::from(invalid.clone()))).unwrap();
        assert_eq!(v, HostValue::Bytes(Bytes::from(invalid)));
    }

    #[test]
    fn null_bulk_materializes_to_null() {
        assert_eq!(Materializer::default().materialize(RespValue::Null).unwrap(), HostValue::Null);
    }

    #[test]
    fn array_materializes_recursively() {
        let m = Materializer::new(true);
        let v = m
            .materialize(RespValue::Array(vec![RespValue::Integer(1), RespValue::bulk("x")]))
            .unwrap();
        assert_eq!(v, HostValue::Array(vec![HostValue::Integer(1), HostValue::Text("x".into())]));
    }

    #[test]
    fn map_flattens_to_alternating_pairs() {
        let m = Materializer::new(true);
        let v = m
            .materialize(RespValue::Map(vec![(RespValue::bulk("f"), RespValue::bulk("v"))]))
            .unwrap();
        assert_eq!(v, HostValue::Map(vec![HostValue::Text("f".into()), HostValue::Text("v".into())]));
    }

    #[test]
    fn error_reply_is_classified_and_returned_as_err() {
        let m = Materializer::default();
        let err = m.materialize(RespValue::error("WRONGTYPE bad")).unwrap_err();
        assert!(matches!(err, PyrsedisError::Redis(_)));
    }
}
