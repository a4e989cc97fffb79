//! Component D: bounded pool of `Connection`s (§4.4).
//!
//! The hot critical section (idle LIFO + `live` counter) is guarded by `parking_lot::Mutex`,
//! grounded on `skytable-skytable` server's use of `parking_lot` for its own short-held locks.
//! Admission control is a `tokio::sync::Semaphore` with `max_size` permits: acquiring a permit
//! is the suspension point from §5, and the permit travels with the checked-out connection
//! until `release` (or drop) gives it back.

use crate::config::Config;
use crate::error::{PyrsedisError, Result};
use crate::net::connection::Connection;
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;

struct IdleEntry {
    connection: Connection,
    inserted_at: Instant,
}

struct Shared {
    idle: Mutex<Vec<IdleEntry>>,
    live: Mutex<usize>,
    semaphore: Semaphore,
    config: Config,
    max_size: usize,
    next_generation: AtomicU64,
}

/// A bounded set of connections to one server, shared by clone across every caller thread
/// (§5: "the top-level client is safe for concurrent use").
#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    pub fn new(config: Config) -> Pool {
        let max_size = config.max_connections.max(1);
        Pool {
            shared: Arc::new(Shared {
                idle: Mutex::new(Vec::new()),
                live: Mutex::new(0),
                semaphore: Semaphore::new(max_size),
                config,
                max_size,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Checks out a connection, creating one if the idle list is empty and `live < max_size`
    /// (§4.4's algorithm). The whole attempt, including any retries from a lost race against
    /// another acquirer, is bounded by one `pool_timeout` deadline; exceeding it raises
    /// `TimeoutError` rather than blocking forever.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        timeout(self.shared.config.pool_timeout, self.acquire_inner())
            .await
            .map_err(|_| PyrsedisError::timeout("timed out waiting for a pool permit"))?
    }

    async fn acquire_inner(&self) -> Result<PooledConnection> {
        loop {
            let permit = self
                .shared
                .semaphore
                .acquire()
                .await
                .expect("pool semaphore is never closed");
            permit.forget(); // permit is returned explicitly by `release`, not by RAII here.

            if let Some(entry) = self.pop_idle() {
                if self.is_stale(&entry) {
                    debug!("evicting idle connection#{} past max_idle_age", entry.connection.generation());
                    self.decrement_live();
                    self.shared.semaphore.add_permits(1);
                    continue;
                }
                return Ok(PooledConnection {
                    pool: self.clone(),
                    connection: Some(entry.connection),
                });
            }

            if !self.try_reserve_live() {
                // Another thread raced us between the idle pop miss and this lock; nothing to
                // do but give the permit back and retry, which waits for the next release.
                self.shared.semaphore.add_permits(1);
                continue;
            }

            let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
            match Connection::connect(&self.shared.config, generation).await {
                Ok(connection) => {
                    return Ok(PooledConnection {
                        pool: self.clone(),
                        connection: Some(connection),
                    })
                }
                Err(e) => {
                    self.decrement_live();
                    self.shared.semaphore.add_permits(1);
                    return Err(e);
                }
            }
        }
    }

    /// Atomically checks `live < max_size` and increments if so, returning whether it did.
    /// Kept as a plain synchronous fn (no `.await` in scope) so the lock guard never needs
    /// to be `Send` across a suspension point.
    fn try_reserve_live(&self) -> bool {
        let mut live = self.shared.live.lock();
        if *live >= self.shared.max_size {
            return false;
        }
        *live += 1;
        true
    }

    fn pop_idle(&self) -> Option<IdleEntry> {
        self.shared.idle.lock().pop()
    }

    fn is_stale(&self, entry: &IdleEntry) -> bool {
        match self.shared.config.max_idle_age {
            Some(max_age) => entry.inserted_at.elapsed() > max_age,
            None => false,
        }
    }

    fn decrement_live(&self) {
        let mut live = self.shared.live.lock();
        *live = live.saturating_sub(1);
    }

    /// Returns a connection to the pool: broken connections are dropped and `live` decremented;
    /// healthy ones go back on the idle LIFO (§4.4: "warmest connection first"). The permit is
    /// returned exactly once here regardless of health.
    fn release(&self, connection: Connection) {
        if connection.is_broken() {
            debug!(
                "dropping broken connection#{}: {}",
                connection.generation(),
                connection.last_error().unwrap_or("unknown reason")
            );
            self.decrement_live();
        } else {
            self.shared.idle.lock().push(IdleEntry {
                connection,
                inserted_at: Instant::now(),
            });
        }
        self.shared.semaphore.add_permits(1);
    }

    /// Number of connections sitting idle right now (§4.10 observability).
    pub fn idle_count(&self) -> usize {
        self.shared.idle.lock().len()
    }

    /// Permits not currently checked out (§4.10 observability): `max_size - live_checked_out`.
    pub fn available(&self) -> usize {
        self.shared.semaphore.available_permits()
    }
}

/// RAII handle returned by `Pool::acquire`. On drop the underlying `Connection` is returned to
/// the pool (§9 "Connection lifecycle without a GC"); there is no way to retain the connection
/// past the handle's lifetime since `Connection` is only ever reachable through `DerefMut`.
pub struct PooledConnection {
    pool: Pool,
    connection: Option<Connection>,
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.connection.as_ref().expect("connection taken only on drop")
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection.as_mut().expect("connection taken only on drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        } else {
            warn!("PooledConnection dropped twice; this should be unreachable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            max_connections: 2,
            pool_timeout: Duration::from_millis(200),
            connect_timeout: Duration::from_millis(200),
            ..Config::default()
        }
    }

    #[test]
    fn idle_and_available_start_empty() {
        let pool = Pool::new(test_config());
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn acquire_against_unreachable_host_times_out_or_fails_and_frees_the_permit() {
        let mut cfg = test_config();
        cfg.host = "192.0.2.1".to_string();
        cfg.port = 1;
        cfg.connect_timeout = Duration::from_millis(100);
        let pool = Pool::new(cfg);
        let before = pool.available();
        let result = pool.acquire().await;
        assert!(result.is_err());
        assert_eq!(pool.available(), before, "failed create must return its permit");
    }
}
