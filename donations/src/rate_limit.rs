use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by tenant.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// A `limit` of 0 disables limiting.
    pub fn new(limit: u32, window: Duration) -> Self {
        RateLimiter {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        RateLimiter::new(limit, Duration::from_secs(60))
    }

    /// Counts one request for `key`; false once the window's budget is spent.
    pub fn check(&self, key: &str, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }

        let mut windows = self.windows.lock();
        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        if window.count >= self.limit {
            return false;
        }
        window.count += 1;
        true
    }

    /// Drops windows that have already ended. Returns how many were removed.
    pub fn prune(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before - windows.len()
    }

    pub fn tracked(&self) -> usize {
        self.windows.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_resets_each_window() {
        let limiter = RateLimiter::per_minute(2);
        let t0 = Instant::now();
        assert!(limiter.check("a", t0));
        assert!(limiter.check("a", t0));
        assert!(!limiter.check("a", t0 + Duration::from_secs(30)));
        // Other tenants have their own budget.
        assert!(limiter.check("b", t0));
        assert!(limiter.check("a", t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_disables() {
        let limiter = RateLimiter::per_minute(0);
        let now = Instant::now();
        assert!((0..1000).all(|_| limiter.check("a", now)));
        assert_eq!(limiter.tracked(), 0);
    }

    #[test]
    fn test_prune_removes_finished_windows() {
        let limiter = RateLimiter::per_minute(5);
        let t0 = Instant::now();
        limiter.check("a", t0);
        limiter.check("b", t0 + Duration::from_secs(30));
        assert_eq!(limiter.prune(t0 + Duration::from_secs(61)), 1);
        assert_eq!(limiter.tracked(), 1);
    }
}
