//! TTL cache entry.

use std::time::Duration;

use tokio::time::Instant;

/// A cached value with the time it was fetched.
///
/// Timestamps use [`tokio::time::Instant`] so freshness interacts correctly
/// with a paused test clock.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached value.
    pub value: T,
    fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    /// Cache a value fetched now.
    pub fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }

    /// Whether the entry is younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }

    /// Mark the entry as fetched now without replacing the value.
    pub fn refresh(&mut self) {
        self.fetched_at = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_exactly_at_the_ttl() {
        let entry = CacheEntry::new(42);
        let ttl = Duration::from_secs(300);
        assert!(entry.is_fresh(ttl));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(entry.is_fresh(ttl));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!entry.is_fresh(ttl));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_restarts_the_clock() {
        let mut entry = CacheEntry::new("v");
        let ttl = Duration::from_secs(10);

        tokio::time::advance(Duration::from_secs(9)).await;
        entry.refresh();
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(entry.is_fresh(ttl));
    }
}
