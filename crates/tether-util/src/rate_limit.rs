//! Rate limiting utilities

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::ClientId;

/// Sliding-window rate limiter.
///
/// Each client may issue at most `max_requests` requests within any
/// `window`. Timestamps older than the window are discarded on every check.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    history: HashMap<ClientId, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            history: HashMap::new(),
        }
    }

    /// Convenience constructor for the common "N per minute" policy
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Record a request if the client is under its limit.
    ///
    /// Returns `true` if allowed, `false` if rate limited.
    pub fn check(&mut self, client_id: &ClientId) -> bool {
        self.check_at(client_id, Instant::now())
    }

    fn check_at(&mut self, client_id: &ClientId, now: Instant) -> bool {
        let window = self.window;
        let requests = self.history.entry(client_id.clone()).or_default();

        while let Some(oldest) = requests.front() {
            if now.duration_since(*oldest) >= window {
                requests.pop_front();
            } else {
                break;
            }
        }

        if requests.len() >= self.max_requests {
            return false;
        }

        requests.push_back(now);
        true
    }

    /// Requests the client may still make in the current window
    pub fn remaining(&self, client_id: &ClientId) -> usize {
        let now = Instant::now();
        let used = self
            .history
            .get(client_id)
            .map(|r| r.iter().filter(|t| now.duration_since(**t) < self.window).count())
            .unwrap_or(0);
        self.max_requests.saturating_sub(used)
    }

    pub fn limit(&self) -> usize {
        self.max_requests
    }

    /// Forget a disconnected client
    pub fn remove_client(&mut self, client_id: &ClientId) {
        self.history.remove(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_within_window() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(60));
        let client = ClientId::new();

        assert!(limiter.check(&client));
        assert!(limiter.check(&client));
        assert!(limiter.check(&client));
        assert!(!limiter.check(&client));
        assert_eq!(limiter.remaining(&client), 0);
    }

    #[test]
    fn window_slides() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(60));
        let client = ClientId::new();
        let start = Instant::now();

        assert!(limiter.check_at(&client, start));
        assert!(limiter.check_at(&client, start + Duration::from_secs(30)));
        assert!(!limiter.check_at(&client, start + Duration::from_secs(59)));

        // First request has aged out
        assert!(limiter.check_at(&client, start + Duration::from_secs(61)));
        assert!(!limiter.check_at(&client, start + Duration::from_secs(62)));
    }

    #[test]
    fn clients_are_independent() {
        let mut limiter = RateLimiter::per_minute(1);
        let a = ClientId::new();
        let b = ClientId::new();

        assert!(limiter.check(&a));
        assert!(!limiter.check(&a));
        assert!(limiter.check(&b));

        limiter.remove_client(&a);
        assert_eq!(limiter.remaining(&a), 1);
    }
}
