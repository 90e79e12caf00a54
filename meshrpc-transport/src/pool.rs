//! Connection pool keyed by peer address (spec §4.5).

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use meshrpc_core::{Error, Result};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, instrument};

use crate::endpoint::Transport;

pub type BoxedFactory =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = Result<Transport>> + Send>> + Send + Sync>;

#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    pub max_idle: usize,
    pub max_active: usize,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_idle: 8,
            max_active: 32,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

struct Idle {
    transport: Arc<Transport>,
    parked_at: Instant,
}

struct AddressPool {
    idle: VecDeque<Idle>,
    semaphore: Arc<Semaphore>,
}

/// Pools connections per remote address, bounding both idle connections
/// (`max_idle`) and total concurrently-checked-out connections
/// (`max_active`, enforced by a `Semaphore`).
pub struct Pool {
    config: PoolConfig,
    factory: BoxedFactory,
    per_address: Mutex<HashMap<String, AddressPool>>,
    closed: std::sync::atomic::AtomicBool,
}

impl Pool {
    pub fn new(config: PoolConfig, factory: BoxedFactory) -> Self {
        Pool {
            config,
            factory,
            per_address: Mutex::new(HashMap::new()),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(Error::PoolClosed);
        }
        Ok(())
    }

    /// Acquire a transport for `address`, reusing an idle one if a live,
    /// non-expired one is parked, else dialing a new one through the
    /// factory once under the address's `max_active` semaphore.
    #[instrument(skip(self))]
    pub async fn get(&self, address: &str) -> Result<Arc<Transport>> {
        self.ensure_open()?;

        let semaphore = {
            let mut map = self.per_address.lock().await;
            let entry = map.entry(address.to_string()).or_insert_with(|| AddressPool {
                idle: VecDeque::new(),
                semaphore: Arc::new(Semaphore::new(self.config.max_active)),
            });

            while let Some(idle) = entry.idle.pop_front() {
                if idle.parked_at.elapsed() > self.config.idle_timeout {
                    debug!(address, "dropping expired idle connection");
                    entry.semaphore.add_permits(1);
                    continue;
                }
                return Ok(idle.transport);
            }
            entry.semaphore.clone()
        };

        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolExhausted)?;
        permit.forget();

        match (self.factory)(address.to_string()).await {
            Ok(transport) => Ok(Arc::new(transport)),
            Err(e) => {
                semaphore.add_permits(1);
                Err(e)
            }
        }
    }

    /// Return a transport to the idle queue for reuse. Drops it (and
    /// releases its `max_active` permit) if the pool is closed, the
    /// transport is dead, or `max_idle` is already full.
    #[instrument(skip(self, transport))]
    pub async fn put(&self, address: &str, transport: Arc<Transport>) {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return;
        }
        if transport.state() == crate::endpoint::HeartbeatState::Dead {
            self.release_permit(address).await;
            return;
        }

        let mut map = self.per_address.lock().await;
        if let Some(entry) = map.get_mut(address) {
            if entry.idle.len() >= self.config.max_idle {
                drop(map);
                self.release_permit(address).await;
                return;
            }
            entry.idle.push_back(Idle {
                transport,
                parked_at: Instant::now(),
            });
        }
    }

    async fn release_permit(&self, address: &str) {
        let map = self.per_address.lock().await;
        if let Some(entry) = map.get(address) {
            entry.semaphore.add_permits(1);
        }
    }

    /// Close the pool: reject future `get`s and drop every idle
    /// connection. Checked-out connections already held by callers are
    /// unaffected until they call `put`, at which point they are dropped.
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        let mut map = self.per_address.lock().await;
        for (_, entry) in map.iter_mut() {
            for idle in entry.idle.drain(..) {
                let _ = idle.transport.close().await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::{TcpListener, TcpStream};

    async fn loopback_factory_and_addr() -> (BoxedFactory, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let _ = Transport::new(stream);
            }
        });
        let addr_string = addr.to_string();
        let factory: BoxedFactory = Arc::new(move |address: String| {
            Box::pin(async move {
                let stream = TcpStream::connect(&address)
                    .await
                    .map_err(|e| Error::LinkFailure(e.to_string()))?;
                Transport::new(stream)
            })
        });
        (factory, addr_string)
    }

    #[tokio::test]
    async fn get_dials_when_idle_is_empty() {
        let (factory, addr) = loopback_factory_and_addr().await;
        let pool = Pool::new(PoolConfig::default(), factory);
        let transport = pool.get(&addr).await.unwrap();
        assert_eq!(transport.peer_addr().is_empty(), false);
    }

    #[tokio::test]
    async fn put_then_get_reuses_connection() {
        let (factory, addr) = loopback_factory_and_addr().await;
        let pool = Pool::new(PoolConfig::default(), factory);

        let first = pool.get(&addr).await.unwrap();
        let first_peer = first.peer_addr().to_string();
        pool.put(&addr, first).await;

        let second = pool.get(&addr).await.unwrap();
        assert_eq!(second.peer_addr(), first_peer);
    }

    #[tokio::test]
    async fn get_after_close_is_pool_closed() {
        let (factory, addr) = loopback_factory_and_addr().await;
        let pool = Pool::new(PoolConfig::default(), factory);
        pool.close().await.unwrap();
        let err = pool.get(&addr).await.unwrap_err();
        assert!(matches!(err, Error::PoolClosed));
    }

    #[tokio::test]
    async fn max_active_bounds_concurrent_dials() {
        let (factory, addr) = loopback_factory_and_addr().await;
        let pool = Pool::new(
            PoolConfig {
                max_idle: 8,
                max_active: 1,
                idle_timeout: Duration::from_secs(60),
            },
            factory,
        );

        let first = pool.get(&addr).await.unwrap();
        let dialed = Arc::new(AtomicUsize::new(0));
        let dialed_clone = dialed.clone();
        let pool_clone: &Pool = &pool;
        let second_addr = addr.clone();
        let second = tokio::time::timeout(Duration::from_millis(50), async {
            let t = pool_clone.get(&second_addr).await;
            dialed_clone.fetch_add(1, Ordering::SeqCst);
            t
        })
        .await;
        assert!(second.is_err(), "second get should block while max_active=1 is held");
        drop(first);
    }
}
