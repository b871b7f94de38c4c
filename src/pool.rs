//! # Connection Pool
//!
//! Bounded-capacity pool handing out exclusive transport connections to the
//! transaction engine.
//!
//! The GCS2 wire protocol has no request-ID correlation, so two interleaved
//! transactions on one physical link would produce ambiguous reply
//! attribution. The pool is therefore the serialization point: with the
//! default capacity of one connection per controller, every transaction —
//! including a long `WAC ONT?` motion wait — holds the link exclusively and
//! concurrent callers queue on `acquire`.
//!
//! Connections are returned with an error tag. A tagged return means the
//! connection died or was abandoned mid-protocol (unread reply, unknown
//! framing state); such connections are discarded and the next `acquire`
//! dials a fresh one through the [`Connector`]. Only cleanly released
//! connections are recycled.
//!
//! ```rust,no_run
//! use voltage_gcs::pool::ConnectionPool;
//! use voltage_gcs::transport::TcpConnector;
//! use std::time::Duration;
//!
//! # async fn example() -> voltage_gcs::GcsResult<()> {
//! let connector = TcpConnector::from_address("192.168.100.21:50000")?;
//! let pool = ConnectionPool::new(1, Duration::from_secs(30), Box::new(connector));
//!
//! let conn = pool.acquire().await?;
//! // ... perform one transaction ...
//! pool.release(conn, None).await;
//! assert_eq!(pool.checked_out(), 0);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{GcsError, GcsResult};
use crate::transport::{Connector, GcsTransport};

/// Bounded pool of transport connections with error-tagged release
pub struct ConnectionPool {
    connector: Box<dyn Connector>,
    capacity: usize,
    acquire_timeout: Duration,
    /// Permits track free slots; a permit is consumed for the whole
    /// checkout and restored on release, even when dialing failed.
    permits: Semaphore,
    idle: Mutex<Vec<Box<dyn GcsTransport>>>,
    idle_count: AtomicUsize,
    checked_out: AtomicUsize,
    acquired_total: AtomicU64,
    dialed_total: AtomicU64,
    discarded_total: AtomicU64,
    exhausted_total: AtomicU64,
}

impl ConnectionPool {
    /// Create a pool with the given capacity and acquire timeout
    ///
    /// Capacity 1 (the default for a controller) serializes all
    /// transactions against the device.
    pub fn new(capacity: usize, acquire_timeout: Duration, connector: Box<dyn Connector>) -> Self {
        let capacity = capacity.max(1);
        Self {
            connector,
            capacity,
            acquire_timeout,
            permits: Semaphore::new(capacity),
            idle: Mutex::new(Vec::with_capacity(capacity)),
            idle_count: AtomicUsize::new(0),
            checked_out: AtomicUsize::new(0),
            acquired_total: AtomicU64::new(0),
            dialed_total: AtomicU64::new(0),
            discarded_total: AtomicU64::new(0),
            exhausted_total: AtomicU64::new(0),
        }
    }

    /// Acquire an exclusive connection
    ///
    /// Blocks until a slot frees up, then hands out an idle connection or
    /// dials a fresh one through the connector.
    ///
    /// # Errors
    ///
    /// * `GcsError::PoolExhausted` - no slot freed up within the acquire timeout
    /// * `GcsError::Connection` - the connector could not establish a link
    pub async fn acquire(&self) -> GcsResult<Box<dyn GcsTransport>> {
        let permit = match timeout(self.acquire_timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(GcsError::pool_exhausted("pool has been closed"));
            }
            Err(_) => {
                self.exhausted_total.fetch_add(1, Ordering::Relaxed);
                return Err(GcsError::pool_exhausted(format!(
                    "{}/{} connections to {} still in use after {:?}",
                    self.checked_out(),
                    self.capacity,
                    self.connector.describe(),
                    self.acquire_timeout
                )));
            }
        };
        permit.forget();

        let recycled = {
            let mut idle = self.idle.lock().await;
            idle.pop()
        };

        let conn = match recycled {
            Some(conn) => {
                self.idle_count.fetch_sub(1, Ordering::Relaxed);
                conn
            }
            None => match self.connector.connect().await {
                Ok(conn) => {
                    self.dialed_total.fetch_add(1, Ordering::Relaxed);
                    debug!("dialed fresh connection to {}", self.connector.describe());
                    conn
                }
                Err(err) => {
                    // The slot stays usable for the next caller.
                    self.permits.add_permits(1);
                    return Err(err);
                }
            },
        };

        self.checked_out.fetch_add(1, Ordering::SeqCst);
        self.acquired_total.fetch_add(1, Ordering::Relaxed);
        Ok(conn)
    }

    /// Return a connection, tagged with the error that ended the transaction
    ///
    /// A `Some` tag discards the physical connection: a link that errored
    /// mid-transaction must not be trusted again without revalidation, and
    /// the cheapest revalidation for a line protocol is a fresh dial. A
    /// `None` tag recycles the connection for the next transaction.
    pub async fn release(&self, mut conn: Box<dyn GcsTransport>, error: Option<&GcsError>) {
        match error {
            Some(err) => {
                self.discarded_total.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "discarding connection to {} after error: {}",
                    self.connector.describe(),
                    err
                );
                let _ = conn.close().await;
            }
            None if conn.is_connected() => {
                let mut idle = self.idle.lock().await;
                idle.push(conn);
                self.idle_count.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.discarded_total.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.checked_out.fetch_sub(1, Ordering::SeqCst);
        self.permits.add_permits(1);
    }

    /// Number of connections currently checked out
    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::SeqCst)
    }

    /// Pool capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            checked_out: self.checked_out.load(Ordering::SeqCst),
            idle: self.idle_count.load(Ordering::Relaxed),
            acquired: self.acquired_total.load(Ordering::Relaxed),
            dialed: self.dialed_total.load(Ordering::Relaxed),
            discarded: self.discarded_total.load(Ordering::Relaxed),
            exhausted: self.exhausted_total.load(Ordering::Relaxed),
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub capacity: usize,
    pub checked_out: usize,
    pub idle: usize,
    /// Successful acquisitions over the pool lifetime
    pub acquired: u64,
    /// Fresh connections dialed through the connector
    pub dialed: u64,
    /// Connections dropped instead of recycled
    pub discarded: u64,
    /// Acquire attempts that timed out waiting for a slot
    pub exhausted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use crate::transport::TransportStats;

    /// Loopback transport that is always "connected"
    #[derive(Debug)]
    struct NullTransport {
        connected: bool,
    }

    #[async_trait]
    impl GcsTransport for NullTransport {
        async fn send_line(&mut self, _line: &str) -> GcsResult<()> {
            Ok(())
        }

        async fn recv_line(&mut self) -> GcsResult<String> {
            Ok(String::new())
        }

        fn set_deadline(&mut self, _deadline: Duration) {}

        fn deadline(&self) -> Duration {
            Duration::from_secs(1)
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn close(&mut self) -> GcsResult<()> {
            self.connected = false;
            Ok(())
        }

        fn stats(&self) -> TransportStats {
            TransportStats::default()
        }
    }

    struct NullConnector {
        fail_next: Arc<AtomicBool>,
    }

    impl NullConnector {
        fn new() -> Self {
            Self {
                fail_next: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl Connector for NullConnector {
        async fn connect(&self) -> GcsResult<Box<dyn GcsTransport>> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(GcsError::connection("simulated dial failure"));
            }
            Ok(Box::new(NullTransport { connected: true }))
        }

        fn describe(&self) -> String {
            "null://".to_string()
        }
    }

    #[tokio::test]
    async fn test_clean_release_recycles() {
        let pool = ConnectionPool::new(1, Duration::from_secs(1), Box::new(NullConnector::new()));

        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.checked_out(), 1);
        pool.release(conn, None).await;
        assert_eq!(pool.checked_out(), 0);

        let conn = pool.acquire().await.unwrap();
        pool.release(conn, None).await;

        let stats = pool.stats();
        assert_eq!(stats.dialed, 1);
        assert_eq!(stats.acquired, 2);
        assert_eq!(stats.discarded, 0);
        assert_eq!(stats.idle, 1);
    }

    #[tokio::test]
    async fn test_tagged_release_discards() {
        let pool = ConnectionPool::new(1, Duration::from_secs(1), Box::new(NullConnector::new()));

        let conn = pool.acquire().await.unwrap();
        let err = GcsError::timeout("read reply", 100);
        pool.release(conn, Some(&err)).await;
        assert_eq!(pool.checked_out(), 0);
        assert_eq!(pool.stats().discarded, 1);

        // Next acquire dials a replacement.
        let conn = pool.acquire().await.unwrap();
        pool.release(conn, None).await;
        assert_eq!(pool.stats().dialed, 2);
    }

    #[tokio::test]
    async fn test_capacity_one_serializes() {
        let pool = Arc::new(ConnectionPool::new(
            1,
            Duration::from_millis(50),
            Box::new(NullConnector::new()),
        ));

        let held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, GcsError::PoolExhausted { .. }));
        assert_eq!(pool.stats().exhausted, 1);

        pool.release(held, None).await;
        let conn = pool.acquire().await.unwrap();
        pool.release(conn, None).await;
    }

    #[tokio::test]
    async fn test_dial_failure_does_not_leak_slot() {
        let connector = NullConnector::new();
        let fail_next = connector.fail_next.clone();
        let pool = ConnectionPool::new(1, Duration::from_millis(50), Box::new(connector));

        fail_next.store(true, Ordering::SeqCst);
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, GcsError::Connection { .. }));
        assert_eq!(pool.checked_out(), 0);

        // The slot must still be usable after the failed dial.
        let conn = pool.acquire().await.unwrap();
        pool.release(conn, None).await;
        assert_eq!(pool.checked_out(), 0);
    }
}
