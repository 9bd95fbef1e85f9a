use crate::error::ApiError;
use crate::token_bucket::TokenBucket;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_RPS: f64 = 2.0;
pub const DEFAULT_BURST: u32 = 4;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Admission controller settings
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Tokens refilled per second
    pub rps: f64,
    /// Bucket capacity
    pub burst: u32,
    pub enabled: bool,
    /// Clients unseen for longer than this are dropped by the sweeper
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rps: DEFAULT_RPS,
            burst: DEFAULT_BURST,
            enabled: true,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Per-client bucket plus the last time the client was seen
#[derive(Debug)]
struct ClientState {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Per-client-IP token bucket limiter.
///
/// Cloning is cheap and every clone shares the same registry. The registry
/// mutex is held only for the lookup-or-create, consume and last-seen update
/// of a single call, or for one sweep; it is never held across an await.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: Arc<LimiterConfig>,
    clients: Arc<Mutex<HashMap<IpAddr, ClientState>>>,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config: Arc::new(config),
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Admit or reject one request from `client`.
    ///
    /// A disabled limiter admits everything without touching the registry.
    pub fn allow(&self, client: IpAddr) -> bool {
        if !self.config.enabled {
            return true;
        }
        self.allow_at(client, Instant::now())
    }

    fn allow_at(&self, client: IpAddr, now: Instant) -> bool {
        let mut clients = self.lock();
        let state = clients.entry(client).or_insert_with(|| ClientState {
            bucket: TokenBucket::new_at(self.config.burst, self.config.rps, now),
            last_seen: now,
        });
        state.last_seen = now;
        state.bucket.try_consume_at(1, now)
    }

    /// How long `client` has to wait for its next token, if it has to wait at all
    pub fn retry_after(&self, client: IpAddr) -> Option<Duration> {
        if !self.config.enabled {
            return None;
        }
        let mut clients = self.lock();
        clients
            .get_mut(&client)
            .and_then(|state| state.bucket.time_until_available(1))
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    /// Drop every client idle for longer than the configured timeout.
    /// Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let idle_timeout = self.config.idle_timeout;
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, state| now.saturating_duration_since(state.last_seen) <= idle_timeout);
        before - clients.len()
    }

    /// Start the periodic idle sweep. The task exits once `shutdown` flips to
    /// `true` or its sender is dropped.
    pub fn spawn_sweeper(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.config.sweep_interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        if evicted > 0 {
                            tracing::debug!(
                                target: "reelvault::rate_limiter",
                                evicted,
                                remaining = limiter.tracked_clients(),
                                "Evicted idle clients"
                            );
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!(target: "reelvault::rate_limiter", "Idle sweeper stopped");
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, ClientState>> {
        // A panic while holding the lock cannot leave a bucket half-updated,
        // so a poisoned registry is still usable.
        match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Client identity for a remote address: the IP with any port stripped.
pub fn client_identity(remote_addr: &str) -> Result<IpAddr, ApiError> {
    let remote_addr = remote_addr.trim();
    if let Ok(addr) = remote_addr.parse::<SocketAddr>() {
        return Ok(addr.ip());
    }
    remote_addr
        .parse::<IpAddr>()
        .map_err(|_| ApiError::Internal(format!("malformed client address {remote_addr:?}")))
}
