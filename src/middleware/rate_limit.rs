//! Rate limiting middleware
//!
//! Token-bucket bandwidth limiting applied to every block moved over a data
//! channel.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::trace;

/// Upper bound on how long a single `acquire` may sleep.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);

struct Bucket {
    /// Available bytes; negative while callers are in debt.
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket refilled at `rate` bytes per second, holding at most one
/// second worth of burst.
pub struct BandwidthLimiter {
    rate: u64,
    max_delay: Duration,
    bucket: Mutex<Bucket>,
}

impl BandwidthLimiter {
    /// A `bytes_per_sec` of 0 disables limiting.
    pub fn new(bytes_per_sec: u64) -> Self {
        Self::with_max_delay(bytes_per_sec, DEFAULT_MAX_DELAY)
    }

    pub fn with_max_delay(bytes_per_sec: u64, max_delay: Duration) -> Self {
        Self {
            rate: bytes_per_sec,
            max_delay,
            bucket: Mutex::new(Bucket {
                tokens: bytes_per_sec as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn is_unlimited(&self) -> bool {
        self.rate == 0
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Takes `bytes` from the bucket and returns how long the caller must wait.
    pub fn reserve(&self, bytes: usize) -> Duration {
        if self.is_unlimited() {
            return Duration::ZERO;
        }
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let capacity = self.rate as f64;
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * capacity).min(capacity);
        bucket.last_refill = now;
        bucket.tokens -= bytes as f64;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / capacity).min(self.max_delay)
        }
    }

    pub async fn acquire(&self, bytes: usize) {
        let delay = self.reserve(bytes);
        if !delay.is_zero() {
            trace!("Throttling {bytes} bytes for {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Server-wide limiter combined with an optional per-session one.
#[derive(Clone)]
pub struct RateLimit {
    global: Arc<BandwidthLimiter>,
    session: Option<Arc<BandwidthLimiter>>,
}

impl RateLimit {
    pub fn new(global: Arc<BandwidthLimiter>, session_bps: u64) -> Self {
        let session = (session_bps > 0).then(|| Arc::new(BandwidthLimiter::new(session_bps)));
        Self { global, session }
    }

    pub fn unlimited() -> Self {
        Self {
            global: Arc::new(BandwidthLimiter::unlimited()),
            session: None,
        }
    }

    pub async fn acquire(&self, bytes: usize) {
        self.global.acquire(bytes).await;
        if let Some(session) = &self.session {
            session.acquire(bytes).await;
        }
    }
}
