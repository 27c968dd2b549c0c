//! Per-host limiter state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

/// State for a single host.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Caps in-flight requests to this host.
    pub semaphore: Arc<Semaphore>,
    /// Earliest instant the next request may start.
    pub next_slot: Option<Instant>,
    /// Extra spacing added after rate-limit responses.
    pub penalty: Duration,
    /// Total requests made.
    pub total_requests: u64,
    /// Total rate limit hits.
    pub rate_limit_hits: u64,
}

impl DomainState {
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
            next_slot: None,
            penalty: Duration::ZERO,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    /// Reserve the next start slot given a minimum interval, returning how
    /// long the caller must wait before starting.
    pub fn reserve(&mut self, interval: Duration, now: Instant) -> Duration {
        let spacing = interval + self.penalty;
        let start = match self.next_slot {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        self.next_slot = Some(start + spacing);
        self.total_requests += 1;
        start - now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_spaces_requests() {
        let mut state = DomainState::new(4);
        let now = Instant::now();
        let interval = Duration::from_millis(500);

        assert_eq!(state.reserve(interval, now), Duration::ZERO);
        assert_eq!(state.reserve(interval, now), Duration::from_millis(500));
        assert_eq!(state.reserve(interval, now), Duration::from_millis(1000));
        assert_eq!(state.total_requests, 3);
    }

    #[test]
    fn test_reserve_without_interval_never_waits() {
        let mut state = DomainState::new(1);
        let now = Instant::now();
        for _ in 0..5 {
            assert_eq!(state.reserve(Duration::ZERO, now), Duration::ZERO);
        }
    }
}
