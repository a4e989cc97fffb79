//! Typed cell tree produced by the compact graph decoder (§3 Graph Result Cell).

use bytes::Bytes;

/// One decoded value from a FalkorDB compact `GRAPH.QUERY` reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    String(Bytes),
    Integer(i64),
    Boolean(bool),
    Double(f64),
    Array(Vec<Cell>),
    /// Flat alternating `[key, value, key, value, ...]`, matching the host `Map` shape used
    /// elsewhere in this crate (§4.2) rather than introducing a second mapping convention.
    Map(Vec<Cell>),
    Node {
        id: i64,
        labels: Vec<String>,
        properties: Vec<(String, Cell)>,
    },
    Edge {
        id: i64,
        kind: String,
        src_id: i64,
        dst_id: i64,
        properties: Vec<(String, Cell)>,
    },
    Path {
        nodes: Vec<Cell>,
        edges: Vec<Cell>,
    },
    Point {
        lat: f64,
        lon: f64,
    },
    Vector(Vec<f64>),
}

/// One resolved header column: the column kind (`unknown`/`scalar`/`node`/`relation`) paired
/// with its raw name, per §4.7's header codes 0-3.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnHeader {
    pub kind: &'static str,
    pub name: String,
}

/// The full decoded reply: resolved header, typed rows, and the server's trailing stats lines.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphReply {
    pub header: Vec<ColumnHeader>,
    pub rows: Vec<Vec<Cell>>,
    pub stats: Vec<String>,
}
