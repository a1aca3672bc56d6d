/// Background task implementations
use crate::{context::AppContext, error::PocketResult};

/// Delete passcode challenges that expired more than a day ago
pub async fn cleanup_expired_otps(ctx: &AppContext) -> PocketResult<u64> {
    ctx.otp_manager.cleanup_expired().await
}

/// Drop stale lockout rows and idle rate-limit keys
pub async fn cleanup_lockouts(ctx: &AppContext) -> PocketResult<u64> {
    let removed = ctx.lockout.cleanup_stale().await?;

    let tracked = ctx.rate_limiter.prune();
    tracing::debug!(tracked_emails = tracked, "Pruned passcode rate limiter");

    Ok(removed)
}

/// Health check - verify all systems are operational
pub async fn health_check(ctx: &AppContext) -> PocketResult<()> {
    // Check database connectivity
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;

    Ok(())
}
