//! Component K: the async/sync bridge (§9 "Async/sync bridge", §4.11).
//!
//! A single-threaded Tokio runtime lives on a dedicated OS thread, in the shape of
//! `entangled90-rdis`'s `RedisEngine::start_loop` (spawned via `std::thread::spawn`, fed over an
//! `mpsc` channel) and `brocaar-redis-rs`'s `mpsc`/`oneshot` request dispatch. Every public blocking method boxes an
//! async closure, ships it to that thread, and blocks the *calling* OS thread on a plain
//! `std::sync::mpsc` completion — not a Tokio primitive, because the caller is, by definition,
//! not inside the runtime and must be able to block without polling anything.

use log::{debug, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::sync::mpsc as tokio_mpsc;

use crate::error::{PyrsedisError, Result};

type BoxedJob = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Owns the dedicated runtime thread. Cloning is cheap (an `mpsc::Sender` clone); every
/// `Client`/`Pool` holds one `Runtime` and shares it across connections.
#[derive(Clone)]
pub struct Runtime {
    jobs: tokio_mpsc::UnboundedSender<BoxedJob>,
}

impl Runtime {
    /// Spawns the dedicated thread and its current-thread executor. The thread runs until the
    /// last `Runtime` handle (and therefore the last `jobs` sender) is dropped.
    pub fn start() -> Runtime {
        let (tx, mut rx) = tokio_mpsc::unbounded_channel::<BoxedJob>();
        thread::Builder::new()
            .name("pyrsedis-io".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to start pyrsedis I/O runtime");
                rt.block_on(async move {
                    debug!("pyrsedis I/O runtime started");
                    while let Some(job) = rx.recv().await {
                        tokio::task::spawn(job);
                    }
                    debug!("pyrsedis I/O runtime shutting down: no senders remain");
                });
            })
            .expect("failed to spawn pyrsedis I/O thread");
        Runtime { jobs: tx }
    }

    /// Submits `fut` to the runtime thread and blocks the *calling* thread until it completes.
    /// This is the suspension-point boundary from §5: while `fut` awaits a socket or the pool
    /// semaphore, this calling thread is parked on `rx.recv()`, not spinning.
    pub fn block_on<F>(&self, fut: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (done_tx, done_rx) = std_mpsc::channel();
        let job: BoxedJob = Box::pin(async move {
            let result = fut.await;
            // The receiver may have been dropped (e.g. the caller panicked while waiting,
            // unwinding past `done_rx`); nothing to recover from on the runtime side.
            let _ = done_tx.send(result);
        });
        self.jobs
            .send(job)
            .map_err(|_| PyrsedisError::connection("I/O runtime is no longer running"))?;
        done_rx.recv().map_err(|_| {
            warn!("runtime task dropped its completion sender without sending a result");
            PyrsedisError::connection("I/O runtime task ended without a result")
        })
    }
}
