//! Component A+B: the wire codec and the value materializer fused on top of it.

pub mod codec;
pub mod materialize;
pub mod value;

pub use codec::{Codec, DecodeOutcome};
pub use materialize::{HostValue, Materializer};
pub use value::RespValue;
