//! Components C, D, E: the transport, its pool, and the standalone router built on top.

pub mod connection;
pub mod pool;
pub mod router;

pub use connection::Connection;
pub use pool::{Pool, PooledConnection};
pub use router::Router;
