//! Component G: single-pass decoder for the FalkorDB compact `GRAPH.QUERY` reply (§4.7).
//!
//! Grounded on the same recursive-descent shape as `resp::codec`'s `decode_value`: a plain
//! recursive function walking an already-materialized `RespValue` tree (the graph reply is
//! small relative to a RESP read buffer, so there is no streaming concern here, only recursion
//! depth, bounded the same way as the wire decoder).

use super::cell::{Cell, ColumnHeader, GraphReply};
use crate::error::{GraphError, PyrsedisError, Result};
use crate::resp::RespValue;
use bytes::Bytes;

const MAX_DEPTH: usize = 128;

/// What went wrong decoding one cell, distinguished from a hard `GraphError::Malformed` so the
/// caller can tell "id not yet in cache" from "the payload shape itself is broken" and retry
/// only the former after a registry refresh (§9 "Graph registry invalidation").
enum Signal {
    Malformed(String),
    Miss { kind: &'static str, id: i64 },
}

type Step<T> = std::result::Result<T, Signal>;

/// Registry snapshots a decode attempt runs against: plain slices so the caller controls when
/// (and whether) a refresh happens between attempts.
pub(crate) struct RegistrySnapshot<'a> {
    pub property_keys: &'a [String],
    pub labels: &'a [String],
    pub relationship_types: &'a [String],
}

/// Attempts one full decode of `value` against `snapshot`. Returns `Ok(GraphReply)` on success,
/// or the missing id's `(kind, id)` so the caller can refresh that one registry and retry.
pub(crate) fn try_decode(value: &RespValue, snapshot: &RegistrySnapshot) -> std::result::Result<GraphReply, (PyrsedisError, Option<(&'static str, i64)>)> {
    match decode_top(value, snapshot) {
        Ok(reply) => Ok(reply),
        Err(Signal::Malformed(reason)) => Err((PyrsedisError::Graph(GraphError::Malformed(reason)), None)),
        Err(Signal::Miss { kind, id }) => Err((
            PyrsedisError::Graph(GraphError::Malformed(format!("unresolved {kind} id {id}"))),
            Some((kind, id)),
        )),
    }
}

fn decode_top(value: &RespValue, snapshot: &RegistrySnapshot) -> Step<GraphReply> {
    let top = as_array(value)?;
    if top.len() != 3 {
        return Err(Signal::Malformed(format!(
            "expected a 3-element [header, rows, stats] reply, got {} elements",
            top.len()
        )));
    }
    let header = decode_header(&top[0])?;
    let rows = decode_rows(&top[1], snapshot)?;
    let stats = decode_stats(&top[2])?;
    Ok(GraphReply { header, rows, stats })
}

fn decode_header(value: &RespValue) -> Step<Vec<ColumnHeader>> {
    as_array(value)?
        .iter()
        .map(|col| {
            let pair = as_array(col)?;
            if pair.len() != 2 {
                return Err(Signal::Malformed("header column must be [type_code, name]".into()));
            }
            let kind = match as_int(&pair[0])? {
                0 => "unknown",
                1 => "scalar",
                2 => "node",
                3 => "relation",
                other => return Err(Signal::Malformed(format!("unknown header column type code {other}"))),
            };
            let name = String::from_utf8_lossy(as_bulk(&pair[1])?).into_owned();
            Ok(ColumnHeader { kind, name })
        })
        .collect()
}

fn decode_rows(value: &RespValue, snapshot: &RegistrySnapshot) -> Step<Vec<Vec<Cell>>> {
    as_array(value)?
        .iter()
        .map(|row| {
            as_array(row)?
                .iter()
                .map(|cell| decode_cell(cell, snapshot, 0))
                .collect()
        })
        .collect()
}

fn decode_stats(value: &RespValue) -> Step<Vec<String>> {
    as_array(value)?
        .iter()
        .map(|s| Ok(String::from_utf8_lossy(as_bulk(s)?).into_owned()))
        .collect()
}

fn decode_cell(value: &RespValue, snapshot: &RegistrySnapshot, depth: usize) -> Step<Cell> {
    let pair = as_array(value)?;
    if pair.len() != 2 {
        return Err(Signal::Malformed("cell must be [type_code, payload]".into()));
    }
    let type_code = as_int(&pair[0])?;
    decode_typed(type_code, &pair[1], snapshot, depth)
}

/// Shared by `decode_cell` (generic `[type_code, payload]` cells) and property decoding, whose
/// wire shape already splits `type_code` and `payload` apart (§4.7 "Property encoding").
fn decode_typed(type_code: i64, payload: &RespValue, snapshot: &RegistrySnapshot, depth: usize) -> Step<Cell> {
    if depth > MAX_DEPTH {
        return Err(Signal::Malformed("graph cell nesting exceeded the recursion cap".into()));
    }
    match type_code {
        1 => Ok(Cell::Null),
        2 => Ok(Cell::String(as_bulk(payload)?.clone())),
        3 => Ok(Cell::Integer(as_int(payload)?)),
        4 => {
            let text = as_bulk(payload)?;
            match text.as_ref() {
                b"true" => Ok(Cell::Boolean(true)),
                b"false" => Ok(Cell::Boolean(false)),
                _ => Err(Signal::Malformed("boolean cell payload was neither 'true' nor 'false'".into())),
            }
        }
        5 => {
            let text = std::str::from_utf8(as_bulk(payload)?)
                .map_err(|_| Signal::Malformed("double cell payload was not valid UTF-8".into()))?;
            parse_double(text).map(Cell::Double)
        }
        6 => as_array(payload)?
            .iter()
            .map(|c| decode_cell(c, snapshot, depth + 1))
            .collect::<Step<Vec<Cell>>>()
            .map(Cell::Array),
        7 => decode_edge(payload, snapshot, depth),
        8 => decode_node(payload, snapshot, depth),
        9 => decode_path(payload, snapshot, depth),
        10 => decode_map(payload, snapshot, depth),
        11 => decode_point(payload),
        12 => decode_vector(payload),
        other => Err(Signal::Malformed(format!("unknown graph cell type code {other}"))),
    }
}

fn decode_node(payload: &RespValue, snapshot: &RegistrySnapshot, depth: usize) -> Step<Cell> {
    let fields = as_array(payload)?;
    if fields.len() != 3 {
        return Err(Signal::Malformed("node payload must be [id, label_ids, properties]".into()));
    }
    let id = as_int(&fields[0])?;
    let labels = as_array(&fields[1])?
        .iter()
        .map(|l| resolve(snapshot.labels, as_int(l)?, "label").map(str::to_string))
        .collect::<Step<Vec<String>>>()?;
    let properties = decode_properties(&fields[2], snapshot, depth)?;
    Ok(Cell::Node { id, labels, properties })
}

fn decode_edge(payload: &RespValue, snapshot: &RegistrySnapshot, depth: usize) -> Step<Cell> {
    let fields = as_array(payload)?;
    if fields.len() != 5 {
        return Err(Signal::Malformed("edge payload must be [id, type_id, src_id, dst_id, properties]".into()));
    }
    let id = as_int(&fields[0])?;
    let kind = resolve(snapshot.relationship_types, as_int(&fields[1])?, "relationship type")?.to_string();
    let src_id = as_int(&fields[2])?;
    let dst_id = as_int(&fields[3])?;
    let properties = decode_properties(&fields[4], snapshot, depth)?;
    Ok(Cell::Edge { id, kind, src_id, dst_id, properties })
}

fn decode_path(payload: &RespValue, snapshot: &RegistrySnapshot, depth: usize) -> Step<Cell> {
    let fields = as_array(payload)?;
    if fields.len() != 2 {
        return Err(Signal::Malformed("path payload must be [nodes, edges]".into()));
    }
    let nodes = as_array(&fields[0])?
        .iter()
        .map(|n| decode_cell(n, snapshot, depth + 1))
        .collect::<Step<Vec<Cell>>>()?;
    let edges = as_array(&fields[1])?
        .iter()
        .map(|e| decode_cell(e, snapshot, depth + 1))
        .collect::<Step<Vec<Cell>>>()?;
    Ok(Cell::Path { nodes, edges })
}

fn decode_map(payload: &RespValue, snapshot: &RegistrySnapshot, depth: usize) -> Step<Cell> {
    let items = as_array(payload)?;
    if items.len() % 2 != 0 {
        return Err(Signal::Malformed("map payload must have an even number of elements".into()));
    }
    items
        .iter()
        .map(|c| decode_cell(c, snapshot, depth + 1))
        .collect::<Step<Vec<Cell>>>()
        .map(Cell::Map)
}

fn decode_point(payload: &RespValue) -> Step<Cell> {
    let fields = as_array(payload)?;
    if fields.len() != 2 {
        return Err(Signal::Malformed("point payload must be [lat, lon]".into()));
    }
    Ok(Cell::Point {
        lat: as_double(&fields[0])?,
        lon: as_double(&fields[1])?,
    })
}

fn decode_vector(payload: &RespValue) -> Step<Cell> {
    as_array(payload)?.iter().map(as_double).collect::<Step<Vec<f64>>>().map(Cell::Vector)
}

fn decode_properties(payload: &RespValue, snapshot: &RegistrySnapshot, depth: usize) -> Step<Vec<(String, Cell)>> {
    as_array(payload)?
        .iter()
        .map(|prop| {
            let fields = as_array(prop)?;
            if fields.len() != 3 {
                return Err(Signal::Malformed("property must be [key_id, value_type_code, value]".into()));
            }
            let key = resolve(snapshot.property_keys, as_int(&fields[0])?, "property key")?.to_string();
            let value = decode_typed(as_int(&fields[1])?, &fields[2], snapshot, depth + 1)?;
            Ok((key, value))
        })
        .collect()
}

fn resolve<'a>(names: &'a [String], id: i64, kind: &'static str) -> Step<&'a str> {
    if id < 0 {
        return Err(Signal::Malformed(format!("negative {kind} id {id}")));
    }
    names.get(id as usize).map(String::as_str).ok_or(Signal::Miss { kind, id })
}

fn parse_double(text: &str) -> Step<f64> {
    match text {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" => Ok(f64::NAN),
        _ => text.parse().map_err(|_| Signal::Malformed(format!("invalid double literal '{text}'"))),
    }
}

fn as_double(value: &RespValue) -> Step<f64> {
    match value {
        RespValue::Double(d) => Ok(*d),
        RespValue::BulkString(b) => {
            let text = std::str::from_utf8(b).map_err(|_| Signal::Malformed("non-UTF8 double payload".into()))?;
            parse_double(text)
        }
        RespValue::Integer(i) => Ok(*i as f64),
        other => Err(Signal::Malformed(format!("expected a double-like value, got {other:?}"))),
    }
}

fn as_array(value: &RespValue) -> Step<&[RespValue]> {
    match value {
        RespValue::Array(items) => Ok(items),
        other => Err(Signal::Malformed(format!("expected an array, got {other:?}"))),
    }
}

fn as_int(value: &RespValue) -> Step<i64> {
    match value {
        RespValue::Integer(i) => Ok(*i),
        RespValue::BulkString(b) => std::str::from_utf8(b)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Signal::Malformed("expected an integer-like value".into())),
        other => Err(Signal::Malformed(format!("expected an integer, got {other:?}"))),
    }
}

fn as_bulk(value: &RespValue) -> Step<&Bytes> {
    match value {
        RespValue::BulkString(b) | RespValue::SimpleString(b) => Ok(b),
        other => Err(Signal::Malformed(format!("expected a bulk string, got {other:?}"))),
    }
}

/// Parses the single-column reply of `CALL db.propertyKeys()` / `db.labels()` /
/// `db.relationshipTypes()` into an id-ordered name list (§4.7 "Registry resolution": the
/// server returns these already ordered by id).
pub(crate) fn decode_name_rows(value: &RespValue) -> Result<Vec<String>> {
    let empty = RegistrySnapshot { property_keys: &[], labels: &[], relationship_types: &[] };
    let reply = decode_top(value, &empty).map_err(|s| match s {
        Signal::Malformed(reason) => PyrsedisError::Graph(GraphError::Malformed(reason)),
        Signal::Miss { kind, id } => PyrsedisError::Graph(GraphError::Malformed(format!(
            "registry listing query unexpectedly referenced {kind} id {id}"
        ))),
    })?;
    reply
        .rows
        .into_iter()
        .map(|row| match row.into_iter().next() {
            Some(Cell::String(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Some(other) => Err(PyrsedisError::Graph(GraphError::Malformed(format!(
                "expected a string cell in a registry listing row, got {other:?}"
            )))),
            None => Err(PyrsedisError::Graph(GraphError::Malformed("empty registry listing row".into()))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::RespValue as V;

    fn string_cell(s: &str) -> V {
        V::Array(vec![V::Integer(2), V::bulk(s)])
    }

    fn header() -> V {
        V::Array(vec![V::Array(vec![V::Integer(1), V::bulk("n.id")])])
    }

    #[test]
    fn decodes_scalar_row_without_touching_any_registry() {
        let reply = V::Array(vec![header(), V::Array(vec![V::Array(vec![V::Array(vec![V::Integer(3), V::Integer(7)])])]), V::Array(vec![])]);
        let snapshot = RegistrySnapshot { property_keys: &[], labels: &[], relationship_types: &[] };
        let decoded = try_decode(&reply, &snapshot).unwrap();
        assert_eq!(decoded.header[0].kind, "scalar");
        assert_eq!(decoded.rows, vec![vec![Cell::Integer(7)]]);
    }

    #[test]
    fn node_with_known_label_decodes_fully() {
        let node_payload = V::Array(vec![
            V::Integer(9),
            V::Array(vec![V::Integer(0)]),
            V::Array(vec![V::Array(vec![V::Integer(0), V::Integer(2), V::bulk("alice")])]),
        ]);
        let cell = V::Array(vec![V::Integer(8), node_payload]);
        let reply = V::Array(vec![
            V::Array(vec![V::Array(vec![V::Integer(2), V::bulk("n")])]),
            V::Array(vec![V::Array(vec![cell])]),
            V::Array(vec![]),
        ]);
        let labels = vec!["Person".to_string()];
        let keys = vec!["name".to_string()];
        let snapshot = RegistrySnapshot { property_keys: &keys, labels: &labels, relationship_types: &[] };
        let decoded = try_decode(&reply, &snapshot).unwrap();
        match &decoded.rows[0][0] {
            Cell::Node { id, labels, properties } => {
                assert_eq!(*id, 9);
                assert_eq!(labels, &["Person".to_string()]);
                assert_eq!(properties, &[("name".to_string(), Cell::String(Bytes::from_static(b"alice")))]);
            }
            other => panic!("expected a node cell, got {other:?}"),
        }
    }

    #[test]
    fn unresolved_label_id_is_reported_as_a_miss() {
        let node_payload = V::Array(vec![V::Integer(1), V::Array(vec![V::Integer(5)]), V::Array(vec![])]);
        let cell = V::Array(vec![V::Integer(8), node_payload]);
        let reply = V::Array(vec![V::Array(vec![]), V::Array(vec![V::Array(vec![cell])]), V::Array(vec![])]);
        let snapshot = RegistrySnapshot { property_keys: &[], labels: &[], relationship_types: &[] };
        let (_, miss) = try_decode(&reply, &snapshot).unwrap_err();
        assert_eq!(miss, Some(("label", 5)));
    }

    #[test]
    fn decode_name_rows_extracts_ordered_strings() {
        let reply = V::Array(vec![
            V::Array(vec![]),
            V::Array(vec![V::Array(vec![string_cell("name")]), V::Array(vec![string_cell("age")])]),
            V::Array(vec![]),
        ]);
        assert_eq!(decode_name_rows(&reply).unwrap(), vec!["name".to_string(), "age".to_string()]);
    }
}
