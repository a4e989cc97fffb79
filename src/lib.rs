//! `pyrsedis-core`: the wire layer of a Redis/FalkorDB client. This crate implements RESP2/RESP3
//! encoding and streaming decoding, a pooled blocking-over-async connection layer, pipelining,
//! and the FalkorDB compact graph-result decoder. Command wrappers (`SET`, `HGETALL`, ...) and
//! any host-language binding are layered on top of `Client::execute_command` elsewhere.

pub mod client;
pub mod config;
pub mod error;
pub mod graph;
pub mod net;
pub mod pipeline;
pub mod resp;
pub mod runtime;

pub use client::Client;
pub use config::Config;
pub use error::{PyrsedisError, Result};
