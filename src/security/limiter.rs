//! Bounded counters for entry count, stored bytes and per-visitor puts.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Returned when an [`ResourceLimiter::add`] would exceed the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("limit reached")]
pub struct LimitReached;

/// Atomic counter with an optional hard cap (0 = unlimited).
#[derive(Debug, Default)]
pub struct ResourceLimiter {
    value: AtomicU64,
    limit: u64,
}

impl ResourceLimiter {
    pub fn new(limit: u64) -> Self {
        Self {
            value: AtomicU64::new(0),
            limit,
        }
    }

    /// Increment by `n` unless that would exceed the cap, in which case
    /// nothing changes.
    pub fn add(&self, n: u64) -> Result<(), LimitReached> {
        self.value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.checked_add(n)?;
                if self.limit > 0 && next > self.limit {
                    None
                } else {
                    Some(next)
                }
            })
            .map(|_| ())
            .map_err(|_| LimitReached)
    }

    /// Roll back a previous `add`. Saturates at zero.
    pub fn sub(&self, n: u64) {
        let _ = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(n))
            });
    }

    /// Authoritative overwrite, used by the sweep.
    pub fn set(&self, n: u64) {
        self.value.store(n, Ordering::Release);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_add_within_limit() {
        let limiter = ResourceLimiter::new(10);
        assert!(limiter.add(4).is_ok());
        assert!(limiter.add(6).is_ok());
        assert_eq!(limiter.value(), 10);
    }

    #[test]
    fn test_add_over_limit_leaves_value() {
        let limiter = ResourceLimiter::new(10);
        limiter.add(8).unwrap();
        assert_eq!(limiter.add(3), Err(LimitReached));
        assert_eq!(limiter.value(), 8);
    }

    #[test]
    fn test_unlimited() {
        let limiter = ResourceLimiter::new(0);
        limiter.add(u64::MAX / 2).unwrap();
        limiter.add(u64::MAX / 2).unwrap();
        assert_eq!(limiter.limit(), 0);
    }

    #[test]
    fn test_sub_and_set() {
        let limiter = ResourceLimiter::new(5);
        limiter.add(5).unwrap();
        limiter.sub(2);
        assert_eq!(limiter.value(), 3);
        limiter.sub(10);
        assert_eq!(limiter.value(), 0);

        // set ignores the cap; the sweep reports ground truth
        limiter.set(9);
        assert_eq!(limiter.value(), 9);
        assert!(limiter.add(1).is_err());
    }

    #[test]
    fn test_concurrent_adds_respect_cap() {
        let limiter = Arc::new(ResourceLimiter::new(100));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..50).filter(|_| limiter.add(1).is_ok()).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 100);
        assert_eq!(limiter.value(), 100);
    }
}
