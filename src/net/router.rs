//! Component E: standalone request routing (§4.5).
//!
//! A thin layer over the pool: acquire, send, materialize, release. This is where a decoded
//! server `Error` reply turns into a raised `Result::Err` (§3 invariant 5) before the caller
//! ever sees a `HostValue`.

use crate::error::Result;
use crate::net::pool::Pool;
use crate::resp::{Codec, HostValue, Materializer, RespValue};

/// Single entry point for both one-shot commands and pre-batched pipelines. Stateless beyond
/// the `Pool` and `Materializer` it wraps, so it is cheap to clone alongside `Client`.
#[derive(Clone)]
pub struct Router {
    pool: Pool,
    materializer: Materializer,
}

impl Router {
    pub fn new(pool: Pool, materializer: Materializer) -> Router {
        Router { pool, materializer }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Encodes `args` as one frame, round-trips it on a pooled connection, and materializes the
    /// reply (§4.5). A classified server error surfaces as `Err` without touching the pool's
    /// live/idle bookkeeping beyond the normal acquire/release.
    pub async fn execute<A: AsRef<[u8]>>(&self, args: &[A]) -> Result<HostValue> {
        let frame = Codec::encode_frame(args);
        let mut conn = self.pool.acquire().await?;
        let mut replies = conn.send_pipeline(&[frame]).await?;
        let value = replies.pop().expect("send_pipeline returns one reply per frame");
        self.materializer.materialize(value)
    }

    /// Like `execute`, but returns the undecoded `RespValue` instead of materializing it. Used
    /// by the graph decoder (§4.7), which needs the raw reply tree, not a host value.
    pub async fn execute_raw<A: AsRef<[u8]>>(&self, args: &[A]) -> Result<RespValue> {
        let frame = Codec::encode_frame(args);
        let mut conn = self.pool.acquire().await?;
        let mut replies = conn.send_pipeline(&[frame]).await?;
        let value = replies.pop().expect("send_pipeline returns one reply per frame");
        if let Some(text) = value.as_error_text() {
            return Err(crate::error::classify_error_line(text));
        }
        Ok(value)
    }

    /// Submits every frame in `frames` on one connection and materializes each reply in order
    /// (§4.6: `Pipeline::execute` delegates here). A raised error for one frame does not stop
    /// the others from being materialized; each position gets its own `Result`.
    pub async fn pipeline_execute(&self, frames: Vec<Vec<u8>>) -> Result<Vec<Result<HostValue>>> {
        let mut conn = self.pool.acquire().await?;
        let replies = conn.send_pipeline(&frames).await?;
        Ok(replies
            .into_iter()
            .map(|v: RespValue| self.materializer.materialize(v))
            .collect())
    }
}
