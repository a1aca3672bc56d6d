/// Rate Limiting System
use crate::{
    config::RateLimitConfig,
    error::{PocketError, PocketResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{keyed::DefaultKeyedStateStore, InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;
type KeyedLimiter = GovernorLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

fn non_zero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
    /// OTP sends, keyed by recipient email
    otp: Arc<KeyedLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let auth_quota = Quota::per_second(non_zero(config.authenticated_rps));
        let unauth_quota = Quota::per_second(non_zero(config.unauthenticated_rps));
        let otp_quota = Quota::per_minute(non_zero(config.otp_per_minute));

        Self {
            enabled: config.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
            otp: Arc::new(GovernorLimiter::keyed(otp_quota)),
        }
    }

    fn check_direct(&self, limiter: &DirectLimiter) -> PocketResult<()> {
        if !self.enabled {
            return Ok(());
        }
        limiter.check().map_err(|_| PocketError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        })
    }

    /// Check rate limit for authenticated user
    pub fn check_authenticated(&self) -> PocketResult<()> {
        self.check_direct(&self.authenticated)
    }

    /// Check rate limit for unauthenticated user
    pub fn check_unauthenticated(&self) -> PocketResult<()> {
        self.check_direct(&self.unauthenticated)
    }

    /// Check the per-recipient OTP send limit
    pub fn check_otp(&self, email: &str) -> PocketResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.otp
            .check_key(&email.to_ascii_lowercase())
            .map_err(|_| PocketError::RateLimitExceeded {
                retry_after: Duration::from_secs(60),
            })
    }

    /// Drop per-email state that has fully replenished
    pub fn prune(&self) -> usize {
        self.otp.retain_recent();
        self.otp.len()
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, PocketError> {
    let path = request.uri().path();
    if path.starts_with("/health") || path == "/metrics" {
        return Ok(next.run(request).await);
    }

    // Check if user is authenticated (has Authorization header)
    let has_auth_header = request.headers().get("authorization").is_some();

    if has_auth_header {
        ctx.rate_limiter.check_authenticated()?;
    } else {
        ctx.rate_limiter.check_unauthenticated()?;
    }

    Ok(next.run(request).await)
}
