//! Rate limiting for the public HTTP endpoints.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

use crate::http::ApiError;

const DEFAULT_PER_SECOND: NonZeroU32 = match NonZeroU32::new(5) {
    Some(n) => n,
    None => panic!("zero rate"),
};
const DEFAULT_BURST: NonZeroU32 = match NonZeroU32::new(20) {
    Some(n) => n,
    None => panic!("zero burst"),
};

/// Process-wide token bucket.
#[derive(Clone)]
pub struct RequestRateLimiter {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RequestRateLimiter {
    /// `per_second` is the sustained rate, `burst_size` the bucket depth.
    /// Zero values fall back to 5/s and 20.
    pub fn new(per_second: u32, burst_size: u32) -> Self {
        let per_second = NonZeroU32::new(per_second).unwrap_or(DEFAULT_PER_SECOND);
        let burst_size = NonZeroU32::new(burst_size).unwrap_or(DEFAULT_BURST);

        let quota = Quota::per_second(per_second).allow_burst(burst_size);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Take one token. Fails with [`ApiError::RateLimited`] when empty.
    pub fn check(&self) -> Result<(), ApiError> {
        self.limiter.check().map_err(|_| {
            tracing::warn!("Rate limit exceeded");
            ApiError::RateLimited
        })
    }
}

impl Default for RequestRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_PER_SECOND.get(), DEFAULT_BURST.get())
    }
}

/// axum middleware answering 429 once the bucket is empty.
pub async fn rate_limit(
    State(limiter): State<RequestRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    limiter.check()?;
    Ok(next.run(request).await)
}
