//! FileBot configuration.

use crate::date::YearPivot;
use crate::retry::RetryPolicy;
use std::time::Duration;

/// Configuration for a [`crate::FileBot`] instance.
#[derive(Debug, Clone)]
pub struct FileBotConfig {
    /// Retry policy applied to every store call.
    pub retry: RetryPolicy,

    /// Maximum ids returned by a single cross-reference lookup.
    pub xref_match_limit: usize,

    /// Maximum matches returned by a prefix search.
    pub prefix_search_limit: usize,

    /// Two-digit-year pivot for external date parsing.
    pub year_pivot: YearPivot,

    /// How long to wait for a record or header lock.
    pub lock_timeout: Duration,

    /// Wrap each write in a backend transaction when one is available.
    pub transactional_writes: bool,

    /// Upper bound on `order` calls in any single traversal.
    pub traversal_cap: usize,
}

impl Default for FileBotConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            xref_match_limit: 100,
            prefix_search_limit: 50,
            year_pivot: YearPivot::default(),
            lock_timeout: Duration::from_secs(30),
            transactional_writes: false,
            traversal_cap: 1_000_000,
        }
    }
}

impl FileBotConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the cross-reference lookup cap.
    #[must_use]
    pub const fn xref_match_limit(mut self, limit: usize) -> Self {
        self.xref_match_limit = limit;
        self
    }

    /// Sets the prefix search cap.
    #[must_use]
    pub const fn prefix_search_limit(mut self, limit: usize) -> Self {
        self.prefix_search_limit = limit;
        self
    }

    /// Sets the two-digit-year pivot.
    #[must_use]
    pub const fn year_pivot(mut self, pivot: YearPivot) -> Self {
        self.year_pivot = pivot;
        self
    }

    /// Sets the lock timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets whether writes use backend transactions.
    #[must_use]
    pub const fn transactional_writes(mut self, enabled: bool) -> Self {
        self.transactional_writes = enabled;
        self
    }

    /// Sets the traversal cap.
    #[must_use]
    pub const fn traversal_cap(mut self, cap: usize) -> Self {
        self.traversal_cap = cap;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = FileBotConfig::default();
        assert_eq!(config.xref_match_limit, 100);
        assert_eq!(config.prefix_search_limit, 50);
        assert_eq!(config.year_pivot.value(), 30);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!config.transactional_writes);
    }

    #[test]
    fn builder() {
        let config = FileBotConfig::new()
            .xref_match_limit(10)
            .lock_timeout(Duration::from_millis(5))
            .transactional_writes(true)
            .retry(RetryPolicy::no_retry());
        assert_eq!(config.xref_match_limit, 10);
        assert_eq!(config.lock_timeout, Duration::from_millis(5));
        assert!(config.transactional_writes);
        assert_eq!(config.retry.max_attempts, 1);
    }
}
