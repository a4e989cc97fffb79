//! Error taxonomy (component H).
//!
//! Every fallible operation in this crate returns `Result<T, PyrsedisError>`. The hierarchy is a
//! root -> {transport, server, client, graph} split so that a caller (or a host-language binding)
//! can match on coarse categories without string-sniffing messages.

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PyrsedisError>;

/// Root error type. Transport variants (`Connection`, `Timeout`, `Protocol`) mark the
/// originating connection broken; the rest leave it healthy (see `PyrsedisError::is_transport`).
#[derive(Debug, Error)]
pub enum PyrsedisError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Redis(#[from] RedisError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("cluster redirect: {0}")]
    Cluster(String),

    #[error("sentinel error: {0}")]
    Sentinel(String),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("invalid connection url: {0}")]
    Url(String),
}

/// Replies to the `RedisError` branch of the hierarchy: the server answered with `-ERR...`
/// and the connection remains usable.
#[derive(Debug, Error)]
pub enum RedisError {
    #[error("{0}")]
    Response(ServerMessage),

    #[error("{0}")]
    WrongType(ServerMessage),

    #[error("{0}")]
    ReadOnly(ServerMessage),

    #[error("{0}")]
    NoScript(ServerMessage),

    #[error("{0}")]
    Busy(ServerMessage),

    #[error("{0}")]
    ClusterDown(ServerMessage),

    #[error("{0}")]
    Authentication(ServerMessage),
}

/// Graph decoding failures (component G): a bad payload shape or an id that is still out of
/// range after a registry refresh. The connection is healthy; only the decode is aborted.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("malformed compact graph reply: {0}")]
    Malformed(String),

    #[error("unknown {kind} id {id} in graph '{graph}' (registry refreshed once)")]
    UnresolvedId {
        graph: String,
        kind: &'static str,
        id: i64,
    },

    #[error("registry refresh for graph '{graph}' failed: {reason}")]
    RegistryRefresh { graph: String, reason: String },
}

/// The verbatim `-PREFIX rest of message` text from the server, kept alongside the classified
/// kind so messages are never lost to classification (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage(pub String);

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PyrsedisError {
    /// Transport errors disqualify the connection that produced them from returning to the
    /// pool (§3 invariant 5 / §7). Server, client and graph errors leave it healthy.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PyrsedisError::Connection(_) | PyrsedisError::Timeout(_) | PyrsedisError::Protocol(_)
        )
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        PyrsedisError::Connection(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        PyrsedisError::Timeout(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        PyrsedisError::Protocol(msg.into())
    }
}

/// Classifies a server `-PREFIX rest...` error line into the taxonomy (§4.8). Splits on the
/// first space; an unrecognised prefix degrades to `RedisError::Response` without losing text.
pub fn classify_error_line(line: &str) -> PyrsedisError {
    let mut parts = line.splitn(2, ' ');
    let prefix = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("");
    let msg = ServerMessage(line.to_string());
    let _ = rest; // kept in `msg` verbatim; `rest` only exists to document the split point.

    let redis_err = match prefix {
        "WRONGTYPE" => RedisError::WrongType(msg),
        "NOSCRIPT" => RedisError::NoScript(msg),
        "READONLY" => RedisError::ReadOnly(msg),
        "BUSY" => RedisError::Busy(msg),
        "CLUSTERDOWN" => RedisError::ClusterDown(msg),
        "MOVED" | "ASK" => return PyrsedisError::Cluster(line.to_string()),
        "NOAUTH" | "WRONGPASS" => RedisError::Authentication(msg),
        _ => RedisError::Response(msg),
    };
    PyrsedisError::Redis(redis_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_prefixes() {
        let cases: &[(&str, fn(&PyrsedisError) -> bool)] = &[
            ("WRONGTYPE Operation against a key holding the wrong kind of value", |e| {
                matches!(e, PyrsedisError::Redis(RedisError::WrongType(_)))
            }),
            ("NOSCRIPT No matching script", |e| {
                matches!(e, PyrsedisError::Redis(RedisError::NoScript(_)))
            }),
            ("READONLY You can't write against a read only replica", |e| {
                matches!(e, PyrsedisError::Redis(RedisError::ReadOnly(_)))
            }),
            ("BUSY Redis is busy running a script", |e| {
                matches!(e, PyrsedisError::Redis(RedisError::Busy(_)))
            }),
            ("CLUSTERDOWN The cluster is down", |e| {
                matches!(e, PyrsedisError::Redis(RedisError::ClusterDown(_)))
            }),
            ("MOVED 3999 127.0.0.1:6381", |e| {
                matches!(e, PyrsedisError::Cluster(_))
            }),
            ("ASK 3999 127.0.0.1:6381", |e| {
                matches!(e, PyrsedisError::Cluster(_))
            }),
            ("NOAUTH Authentication required", |e| {
                matches!(e, PyrsedisError::Redis(RedisError::Authentication(_)))
            }),
            ("WRONGPASS invalid username-password pair", |e| {
                matches!(e, PyrsedisError::Redis(RedisError::Authentication(_)))
            }),
            ("ERR unknown command 'FOO'", |e| {
                matches!(e, PyrsedisError::Redis(RedisError::Response(_)))
            }),
        ];
        for (line, check) in cases {
            let err = classify_error_line(line);
            assert!(check(&err), "misclassified: {line} -> {err:?}");
        }
    }

    #[test]
    fn preserves_message_text() {
        let err = classify_error_line("WRONGTYPE Operation against a key holding the wrong kind of value");
        assert!(err.to_string().contains("WRONGTYPE"));
        assert!(err.to_string().contains("Operation against a key"));
    }

    #[test]
    fn only_transport_variants_mark_broken() {
        assert!(PyrsedisError::connection("x").is_transport());
        assert!(PyrsedisError::timeout("x").is_transport());
        assert!(PyrsedisError::protocol("x").is_transport());
        assert!(!classify_error_line("BUSY nope").is_transport());
        assert!(!PyrsedisError::Graph(GraphError::Malformed("x".into())).is_transport());
    }
}
