//! Rate limiting for the HTTP surface.
//!
//! Per-client and global limits using the governor crate. Per-client
//! limiter state lives in an LRU cache so an attacker flooding with unique
//! client ids cannot grow server memory without bound.

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use lru::LruCache;
use std::{
    num::{NonZeroU32, NonZeroUsize},
    sync::{Arc, Mutex},
    time::Duration,
};
use thiserror::Error;
use tracing::warn;

/// Default per-client request limit (requests per window).
pub const DEFAULT_RATE_PER_CLIENT: u32 = 120;

/// Default global request limit (requests per window).
pub const DEFAULT_RATE_GLOBAL: u32 = 5000;

/// Default rate limit window.
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Default maximum tracked clients.
pub const DEFAULT_MAX_CLIENTS: usize = 10_000;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Rate limit rejection reasons.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("per-client rate limit exceeded")]
    PerClientLimitExceeded,

    #[error("global rate limit exceeded")]
    GlobalLimitExceeded,
}

/// Per-client API rate limiter with a global ceiling.
///
/// Both limits must pass for a request to be allowed. Clients are keyed by
/// tenant id; least-recently-seen clients are evicted once `max_clients`
/// is reached.
#[derive(Clone)]
pub struct ApiRateLimiter {
    per_client: Arc<Mutex<LruCache<String, Arc<DirectLimiter>>>>,
    global: Arc<DirectLimiter>,
    per_client_limit: u32,
    window: Duration,
}

impl ApiRateLimiter {
    /// Creates a limiter with default settings.
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_RATE_PER_CLIENT,
            DEFAULT_RATE_GLOBAL,
            Duration::from_secs(DEFAULT_WINDOW_SECS),
            DEFAULT_MAX_CLIENTS,
        )
    }

    /// Creates a limiter with explicit limits.
    ///
    /// # Panics
    ///
    /// Panics if any limit is zero or the window is zero; limits come from
    /// static configuration, not request input.
    pub fn with_config(
        per_client_limit: u32,
        global_limit: u32,
        window: Duration,
        max_clients: usize,
    ) -> Self {
        let global_quota = Quota::with_period(window)
            .expect("rate limit window must be > 0")
            .allow_burst(NonZeroU32::new(global_limit).expect("global limit must be > 0"));
        let cache_size = NonZeroUsize::new(max_clients).expect("max clients must be > 0");

        Self {
            per_client: Arc::new(Mutex::new(LruCache::new(cache_size))),
            global: Arc::new(RateLimiter::direct(global_quota)),
            per_client_limit,
            window,
        }
    }

    /// Checks whether a request from the given client should be allowed.
    pub fn check(&self, client: &str) -> Result<(), RateLimitError> {
        if self.global.check().is_err() {
            warn!(client = %client, "global rate limit exceeded");
            return Err(RateLimitError::GlobalLimitExceeded);
        }

        let limiter = self.get_or_create(client);
        if limiter.check().is_err() {
            warn!(
                client = %client,
                limit = self.per_client_limit,
                window_secs = self.window.as_secs(),
                "per-client rate limit exceeded"
            );
            return Err(RateLimitError::PerClientLimitExceeded);
        }

        Ok(())
    }

    fn get_or_create(&self, client: &str) -> Arc<DirectLimiter> {
        let mut cache = self
            .per_client
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if let Some(limiter) = cache.get(client) {
            return limiter.clone();
        }

        let quota = Quota::with_period(self.window)
            .expect("rate limit window must be > 0")
            .allow_burst(
                NonZeroU32::new(self.per_client_limit).expect("per-client limit must be > 0"),
            );
        let limiter = Arc::new(RateLimiter::direct(quota));
        cache.push(client.to_string(), limiter.clone());
        limiter
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.per_client
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for ApiRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
