//! Rate-limited provider - decorator gating every model call on a token bucket.
//!
//! The bucket starts empty and refills continuously at
//! `requests_per_second`, never holding more than `max_bucket_size` tokens.
//! A caller that finds the bucket empty sleeps `check_every` and tries
//! again, so the first request after startup waits roughly
//! `1 / requests_per_second` seconds.
//!
//! # Example
//!
//! ```rust,ignore
//! use chatrelay::providers::{OllamaProvider, RateLimitedProvider, TokenBucket};
//!
//! let inner = OllamaProvider::new("llama3", "http://localhost:11434");
//! let provider = RateLimitedProvider::new(Box::new(inner), TokenBucket::new(0.25, 0.1, 10.0));
//! ```

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimiterConfig;
use crate::error::Result;
use crate::session::Turn;

use super::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition};

#[derive(Debug)]
struct BucketState {
    available: f64,
    last_refill: Instant,
}

/// In-memory token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    requests_per_second: f64,
    check_every: Duration,
    max_bucket_size: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(requests_per_second: f64, check_every_secs: f64, max_bucket_size: f64) -> Self {
        Self {
            requests_per_second,
            check_every: Duration::from_secs_f64(check_every_secs.max(0.001)),
            max_bucket_size: max_bucket_size.max(1.0),
            state: Mutex::new(BucketState {
                available: 0.0,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &RateLimiterConfig) -> Self {
        Self::new(
            config.requests_per_second,
            config.check_every_secs,
            config.max_bucket_size,
        )
    }

    /// Refill up to `now` and take one token if available.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.available =
            (state.available + elapsed * self.requests_per_second).min(self.max_bucket_size);
        state.last_refill = now;

        if state.available >= 1.0 {
            state.available -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        let started = Instant::now();
        while !self.try_acquire() {
            tokio::time::sleep(self.check_every).await;
        }
        let waited = started.elapsed();
        if waited >= self.check_every {
            debug!(waited_ms = waited.as_millis() as u64, "Rate limiter delayed model call");
        }
    }
}

/// A decorator provider that waits on a [`TokenBucket`] before each call.
pub struct RateLimitedProvider {
    inner: Box<dyn LLMProvider>,
    bucket: TokenBucket,
}

impl std::fmt::Debug for RateLimitedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedProvider")
            .field("inner", &self.inner.name())
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl RateLimitedProvider {
    pub fn new(inner: Box<dyn LLMProvider>, bucket: TokenBucket) -> Self {
        Self { inner, bucket }
    }
}

#[async_trait]
impl LLMProvider for RateLimitedProvider {
    async fn chat(
        &self,
        turns: Vec<Turn>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        self.bucket.acquire().await;
        self.inner.chat(turns, tools, options).await
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.inner.count_tokens(text)
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
