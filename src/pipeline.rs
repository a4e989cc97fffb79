//! Component F: client-side request batching (§4.6).
//!
//! Mirrors `entangled90-rdis`'s `ClientReq::Pipeline` accumulation shape, generalized from "a vector
//! of already-decoded commands" to "a growable vector of pre-encoded frames": callers append
//! argument arrays, `execute()` submits them as one round-trip via the `Router`, and the
//! pending frames are cleared on return.

use crate::error::Result;
use crate::net::Router;
use crate::resp::{Codec, HostValue};

/// An append-only batch of request frames. Not thread-safe (§4.6/§5): build and execute one
/// `Pipeline` from a single thread; different `Pipeline` instances may run concurrently.
pub struct Pipeline {
    router: Router,
    frames: Vec<Vec<u8>>,
}

impl Pipeline {
    pub(crate) fn new(router: Router) -> Pipeline {
        Pipeline {
            router,
            frames: Vec::new(),
        }
    }

    /// Appends one command's argument array to the batch without encoding or sending it yet.
    pub fn command<A: AsRef<[u8]>>(&mut self, args: &[A]) -> &mut Self {
        self.frames.push(Codec::encode_frame(args));
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Clears the pending batch without sending it.
    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Submits the whole batch as one round-trip and returns each reply's materialized result
    /// in append order (§3 invariant: "the k-th reply corresponds to fₖ"), clearing the batch
    /// on return regardless of outcome.
    pub async fn execute(&mut self) -> Result<Vec<Result<HostValue>>> {
        let frames = std::mem::take(&mut self.frames);
        self.router.pipeline_execute(frames).await
    }
}
