//! Per-visitor rate limiting and put-count tracking.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::VisitorConfig;
use crate::security::limiter::ResourceLimiter;

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// State kept for one client address.
#[derive(Debug)]
struct Visitor {
    bucket: TokenBucket,
    puts: Arc<ResourceLimiter>,
    last_seen: Instant,
}

/// Registry of visitors keyed by client address.
///
/// Entries are created on first contact and only ever removed by
/// [`VisitorRegistry::prune`], which the janitor calls on each sweep.
#[derive(Debug)]
pub struct VisitorRegistry {
    visitors: Mutex<HashMap<IpAddr, Visitor>>,
    refill_rate: f64,
    burst: f64,
    put_limit: u64,
}

impl VisitorRegistry {
    pub fn new(config: &VisitorConfig) -> Self {
        Self {
            visitors: Mutex::new(HashMap::new()),
            refill_rate: config.requests_per_second,
            burst: f64::from(config.burst.max(1)),
            put_limit: config.put_limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, Visitor>> {
        self.visitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch<'a>(
        &self,
        visitors: &'a mut HashMap<IpAddr, Visitor>,
        addr: IpAddr,
        now: Instant,
    ) -> &'a mut Visitor {
        let visitor = visitors.entry(addr).or_insert_with(|| Visitor {
            bucket: TokenBucket::new(self.burst, now),
            puts: Arc::new(ResourceLimiter::new(self.put_limit)),
            last_seen: now,
        });
        visitor.last_seen = now;
        visitor
    }

    /// Put-count limiter for `addr`, creating the visitor if needed.
    pub fn put_limiter(&self, addr: IpAddr) -> Arc<ResourceLimiter> {
        let mut visitors = self.lock();
        self.touch(&mut visitors, addr, Instant::now()).puts.clone()
    }

    /// Take one token from the visitor's bucket. Never blocks.
    pub fn allow(&self, addr: IpAddr) -> bool {
        self.allow_at(addr, Instant::now())
    }

    fn allow_at(&self, addr: IpAddr, now: Instant) -> bool {
        let mut visitors = self.lock();
        let visitor = self.touch(&mut visitors, addr, now);
        visitor.bucket.try_acquire(self.burst, self.refill_rate, now)
    }

    /// Forget visitors idle for longer than `idle`. Returns how many were removed.
    pub fn prune(&self, idle: Duration) -> usize {
        self.prune_at(idle, Instant::now())
    }

    fn prune_at(&self, idle: Duration, now: Instant) -> usize {
        let mut visitors = self.lock();
        let before = visitors.len();
        visitors.retain(|_, v| now.saturating_duration_since(v.last_seen) <= idle);
        before - visitors.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
