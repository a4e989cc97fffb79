//! RESP value tree (§3 Data Model). Extends `entangled90-rdis`'s five-variant `RESP` enum with
//! the RESP3 kinds (`Map`, `Set`, `Double`, `Boolean`, `BigNumber`, `VerbatimString`, `Push`).
//!
//! Bulk payloads and simple-string text are `bytes::Bytes`: cheap to clone, and a slice of the
//! connection read buffer can be promoted into one without copying at the moment it is sliced
//! out (`Bytes::copy_from_slice` for the zero-copy-then-own transition described in §9).

use bytes::Bytes;

/// A single decoded RESP2/RESP3 value.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(Bytes),
    Error(Bytes),
    Integer(i64),
    BulkString(Bytes),
    Array(Vec<RespValue>),
    Map(Vec<(RespValue, RespValue)>),
    Set(Vec<RespValue>),
    Double(f64),
    Boolean(bool),
    BigNumber(Bytes),
    VerbatimString { format: [u8; 3], payload: Bytes },
    Push(Vec<RespValue>),
    Null,
}

impl RespValue {
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// The raw server error text, if this is an `Error` reply. Used by the router before
    /// classification (§4.8) so the RESP layer never needs to know about error kinds.
    pub fn as_error_text(&self) -> Option<&str> {
        match self {
            RespValue::Error(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn simple_string(text: impl Into<Vec<u8>>) -> Self {
        RespValue::SimpleString(Bytes::from(text.into()))
    }

    pub fn bulk(bytes: impl Into<Vec<u8>>) -> Self {
        RespValue::BulkString(Bytes::from(bytes.into()))
    }

    pub fn error(text: impl Into<Vec<u8>>) -> Self {
        RespValue::Error(Bytes::from(text.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_roundtrips() {
        let v = RespValue::error("WRONGTYPE bad type");
        assert!(v.is_error());
        assert_eq!(v.as_error_text(), Some("WRONGTYPE bad type"));
    }

    #[test]
    fn non_error_has_no_error_text() {
        assert_eq!(RespValue::Integer(4).as_error_text(), None);
    }
}
