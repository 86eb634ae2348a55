//! Rate limiting primitives for bounding call rates to external systems.
//!
//! Three interchangeable algorithms share the [`RateLimit`] contract, and a
//! composite stacks several named limiters (per-second/minute/hour style)
//! so a request passes only when every constituent allows it.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Snapshot of a limiter's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterStatus {
    /// Requests currently available without waiting.
    pub remaining: u64,
    /// Configured ceiling.
    pub limit: u64,
    /// Time until capacity is next replenished.
    pub reset_after: Duration,
}

/// Common contract for rate limiting algorithms.
pub trait RateLimit: Send + Sync {
    /// Attempts to consume one permit. Returns false when the limit is hit.
    fn try_acquire(&self) -> bool;

    /// True when a call to [`RateLimit::try_acquire`] would currently
    /// succeed, without consuming anything.
    fn would_allow(&self) -> bool;

    /// Estimated wait until a permit becomes available. Zero when a permit
    /// is available now.
    fn wait_time(&self) -> Duration;

    /// Current state snapshot.
    fn status(&self) -> LimiterStatus;

    /// Resets the limiter to its initial state.
    fn reset(&self);
}

struct TokenBucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket: capacity C refilled at R tokens per period P.
///
/// Refill is lazy, computed from elapsed time on each check; tokens are
/// capped at capacity.
pub struct TokenBucket {
    capacity: f64,
    refill_amount: f64,
    refill_period: Duration,
    state: Mutex<TokenBucketState>,
}

impl TokenBucket {
    pub fn new(capacity: u64, refill_amount: u64, refill_period: Duration) -> Self {
        Self {
            capacity: capacity as f64,
            refill_amount: refill_amount as f64,
            refill_period,
            state: Mutex::new(TokenBucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut TokenBucketState) {
        let elapsed = state.last_refill.elapsed();
        if elapsed.is_zero() {
            return;
        }
        let added = self.refill_amount * elapsed.as_secs_f64()
            / self.refill_period.as_secs_f64();
        state.tokens = (state.tokens + added).min(self.capacity);
        state.last_refill = Instant::now();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TokenBucketState> {
        // A poisoned lock only means another caller panicked mid-check;
        // the state itself stays valid.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RateLimit for TokenBucket {
    fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn would_allow(&self) -> bool {
        let mut state = self.lock();
        self.refill(&mut state);
        state.tokens >= 1.0
    }

    fn wait_time(&self) -> Duration {
        let mut state = self.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            return Duration::ZERO;
        }
        let deficit = 1.0 - state.tokens;
        let secs = deficit * self.refill_period.as_secs_f64() / self.refill_amount;
        Duration::from_secs_f64(secs)
    }

    fn status(&self) -> LimiterStatus {
        let mut state = self.lock();
        self.refill(&mut state);
        LimiterStatus {
            remaining: state.tokens as u64,
            limit: self.capacity as u64,
            reset_after: if state.tokens >= self.capacity {
                Duration::ZERO
            } else {
                self.refill_period
            },
        }
    }

    fn reset(&self) {
        let mut state = self.lock();
        state.tokens = self.capacity;
        state.last_refill = Instant::now();
    }
}

/// Sliding window: a rolling timestamp list pruned to the trailing window.
pub struct SlidingWindow {
    limit: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>) {
        let now = Instant::now();
        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        self.timestamps.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RateLimit for SlidingWindow {
    fn try_acquire(&self) -> bool {
        let mut timestamps = self.lock();
        self.prune(&mut timestamps);
        if timestamps.len() < self.limit {
            timestamps.push_back(Instant::now());
            true
        } else {
            false
        }
    }

    fn would_allow(&self) -> bool {
        let mut timestamps = self.lock();
        self.prune(&mut timestamps);
        timestamps.len() < self.limit
    }

    fn wait_time(&self) -> Duration {
        let mut timestamps = self.lock();
        self.prune(&mut timestamps);
        if timestamps.len() < self.limit {
            return Duration::ZERO;
        }
        match timestamps.front() {
            Some(oldest) => self.window.saturating_sub(oldest.elapsed()),
            None => Duration::ZERO,
        }
    }

    fn status(&self) -> LimiterStatus {
        let mut timestamps = self.lock();
        self.prune(&mut timestamps);
        let used = timestamps.len();
        LimiterStatus {
            remaining: (self.limit - used) as u64,
            limit: self.limit as u64,
            reset_after: timestamps
                .front()
                .map(|oldest| self.window.saturating_sub(oldest.elapsed()))
                .unwrap_or(Duration::ZERO),
        }
    }

    fn reset(&self) {
        self.lock().clear();
    }
}

struct FixedWindowState {
    window_index: u64,
    count: usize,
}

/// Fixed window: an integer window index advances with time and resets the
/// counter.
pub struct FixedWindow {
    limit: usize,
    window: Duration,
    epoch: Instant,
    state: Mutex<FixedWindowState>,
}

impl FixedWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            epoch: Instant::now(),
            state: Mutex::new(FixedWindowState {
                window_index: 0,
                count: 0,
            }),
        }
    }

    fn current_index(&self) -> u64 {
        (self.epoch.elapsed().as_nanos() / self.window.as_nanos().max(1)) as u64
    }

    fn roll(&self, state: &mut FixedWindowState) {
        let index = self.current_index();
        if index != state.window_index {
            state.window_index = index;
            state.count = 0;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FixedWindowState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn time_to_next_window(&self) -> Duration {
        let elapsed = self.epoch.elapsed();
        let window_nanos = self.window.as_nanos().max(1);
        let into_window = elapsed.as_nanos() % window_nanos;
        Duration::from_nanos((window_nanos - into_window) as u64)
    }
}

impl RateLimit for FixedWindow {
    fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        self.roll(&mut state);
        if state.count < self.limit {
            state.count += 1;
            true
        } else {
            false
        }
    }

    fn would_allow(&self) -> bool {
        let mut state = self.lock();
        self.roll(&mut state);
        state.count < self.limit
    }

    fn wait_time(&self) -> Duration {
        let mut state = self.lock();
        self.roll(&mut state);
        if state.count < self.limit {
            Duration::ZERO
        } else {
            self.time_to_next_window()
        }
    }

    fn status(&self) -> LimiterStatus {
        let mut state = self.lock();
        self.roll(&mut state);
        LimiterStatus {
            remaining: (self.limit - state.count) as u64,
            limit: self.limit as u64,
            reset_after: self.time_to_next_window(),
        }
    }

    fn reset(&self) {
        let mut state = self.lock();
        state.window_index = self.current_index();
        state.count = 0;
    }
}

/// Stacks multiple named limiters. A request is allowed only when all
/// constituents allow it; the reported wait time is the maximum among the
/// limiters that deny.
pub struct CompositeLimiter {
    limiters: Vec<(String, Box<dyn RateLimit>)>,
    // Serializes check-then-commit so a passing check cannot be raced into
    // a partial consume.
    gate: Mutex<()>,
}

impl CompositeLimiter {
    pub fn new() -> Self {
        Self {
            limiters: Vec::new(),
            gate: Mutex::new(()),
        }
    }

    pub fn with_limiter(mut self, name: impl Into<String>, limiter: Box<dyn RateLimit>) -> Self {
        self.limiters.push((name.into(), limiter));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Attempts to consume one permit from every constituent. Consumes from
    /// none when any constituent would deny.
    pub fn try_request(&self) -> bool {
        let _gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        if self.limiters.iter().any(|(_, l)| !l.would_allow()) {
            return false;
        }
        for (name, limiter) in &self.limiters {
            if !limiter.try_acquire() {
                // Should not happen under the gate; surface it if it does.
                tracing::warn!(limiter = %name, "composite limiter constituent denied after passing check");
                return false;
            }
        }
        true
    }

    /// Maximum wait among currently denying constituents.
    pub fn wait_time(&self) -> Duration {
        self.limiters
            .iter()
            .filter(|(_, l)| !l.would_allow())
            .map(|(_, l)| l.wait_time())
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Status snapshot per named constituent.
    pub fn status(&self) -> Vec<(String, LimiterStatus)> {
        self.limiters
            .iter()
            .map(|(name, l)| (name.clone(), l.status()))
            .collect()
    }

    pub fn reset(&self) {
        for (_, limiter) in &self.limiters {
            limiter.reset();
        }
    }
}

impl Default for CompositeLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket_exhaustion() {
        let bucket = TokenBucket::new(3, 1, Duration::from_secs(60));
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        assert!(bucket.wait_time() > Duration::ZERO);
    }

    #[test]
    fn test_token_bucket_refill_capped_at_capacity() {
        let bucket = TokenBucket::new(2, 100, Duration::from_millis(1));
        assert!(bucket.try_acquire());
        std::thread::sleep(Duration::from_millis(10));
        let status = bucket.status();
        assert!(status.remaining <= 2, "tokens exceeded capacity");
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_token_bucket_lazy_refill() {
        let bucket = TokenBucket::new(1, 1, Duration::from_millis(20));
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        std::thread::sleep(Duration::from_millis(40));
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_sliding_window_allows_until_limit() {
        let window = SlidingWindow::new(2, Duration::from_secs(60));
        assert!(window.try_acquire());
        assert!(window.try_acquire());
        assert!(!window.try_acquire());
        assert_eq!(window.status().remaining, 0);
    }

    #[test]
    fn test_sliding_window_prunes_old_entries() {
        let window = SlidingWindow::new(1, Duration::from_millis(20));
        assert!(window.try_acquire());
        assert!(!window.try_acquire());
        std::thread::sleep(Duration::from_millis(40));
        assert!(window.try_acquire());
    }

    #[test]
    fn test_fixed_window_resets_on_advance() {
        let window = FixedWindow::new(2, Duration::from_millis(25));
        assert!(window.try_acquire());
        assert!(window.try_acquire());
        assert!(!window.try_acquire());
        std::thread::sleep(Duration::from_millis(50));
        assert!(window.try_acquire());
    }

    #[test]
    fn test_fixed_window_wait_time_bounded_by_window() {
        let window = FixedWindow::new(1, Duration::from_millis(100));
        assert!(window.try_acquire());
        let wait = window.wait_time();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(100));
    }

    #[test]
    fn test_reset_restores_capacity() {
        let bucket = TokenBucket::new(1, 1, Duration::from_secs(60));
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        bucket.reset();
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_composite_requires_all() {
        let composite = CompositeLimiter::new()
            .with_limiter(
                "per_second",
                Box::new(TokenBucket::new(10, 10, Duration::from_secs(1))),
            )
            .with_limiter(
                "per_minute",
                Box::new(FixedWindow::new(2, Duration::from_secs(60))),
            );

        assert!(composite.try_request());
        assert!(composite.try_request());
        // per_minute is exhausted even though per_second has capacity.
        assert!(!composite.try_request());
        assert!(composite.wait_time() > Duration::ZERO);
    }

    #[test]
    fn test_composite_denial_consumes_nothing() {
        let composite = CompositeLimiter::new()
            .with_limiter(
                "wide",
                Box::new(SlidingWindow::new(10, Duration::from_secs(60))),
            )
            .with_limiter(
                "narrow",
                Box::new(SlidingWindow::new(1, Duration::from_secs(60))),
            );

        assert!(composite.try_request());
        assert!(!composite.try_request());

        // The wide limiter must have recorded only the allowed request.
        let status = composite.status();
        let wide = &status.iter().find(|(n, _)| n == "wide").unwrap().1;
        assert_eq!(wide.remaining, 9);
    }

    #[test]
    fn test_composite_wait_time_is_max_of_deniers() {
        let composite = CompositeLimiter::new()
            .with_limiter(
                "short",
                Box::new(FixedWindow::new(1, Duration::from_millis(50))),
            )
            .with_limiter(
                "long",
                Box::new(SlidingWindow::new(1, Duration::from_secs(60))),
            );

        assert!(composite.try_request());
        assert!(!composite.try_request());
        // The long window dominates the wait estimate.
        assert!(composite.wait_time() > Duration::from_secs(30));
    }
}
