/// Login lockout
///
/// Counts failed password attempts per formatted phone number. Reaching the
/// threshold locks the phone out of password login for a fixed duration;
/// a successful login clears the counter.
use crate::{
    config::LockoutConfig,
    db::models::LoginAttempt,
    error::{PocketError, PocketResult},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

/// Result of recording a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Attempts left before lockout
    Remaining(u32),
    /// Threshold reached; locked until the given instant
    Locked(DateTime<Utc>),
}

/// Error returned while a phone is locked until `until`
pub fn locked_out(until: DateTime<Utc>, now: DateTime<Utc>) -> PocketError {
    let retry_after = (until - now).to_std().unwrap_or_default();
    let minutes = retry_after.as_secs().div_ceil(60).max(1);
    PocketError::LockedOut {
        retry_after,
        message: format!(
            "Too many failed attempts. Please try again in {} minute{}.",
            minutes,
            if minutes == 1 { "" } else { "s" }
        ),
    }
}

/// Server-side login lockout tracker
pub struct LoginLockout {
    db: SqlitePool,
    max_attempts: u32,
    duration: Duration,
}

impl LoginLockout {
    pub fn new(db: SqlitePool, config: &LockoutConfig) -> Self {
        Self {
            db,
            max_attempts: config.max_attempts,
            duration: Duration::seconds(config.duration as i64),
        }
    }

    async fn get(&self, phone: &str) -> PocketResult<Option<LoginAttempt>> {
        let row = sqlx::query_as::<_, LoginAttempt>(
            "SELECT phone, attempts, locked_until, updated_at FROM login_attempts WHERE phone = ?1",
        )
        .bind(phone)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    /// Fail with `LockedOut` while the phone is locked
    ///
    /// An elapsed lock is cleared so the next failure starts a fresh count.
    pub async fn check(&self, phone: &str) -> PocketResult<()> {
        let Some(attempt) = self.get(phone).await? else {
            return Ok(());
        };

        if let Some(until) = attempt.locked_until {
            let now = Utc::now();
            if until > now {
                return Err(locked_out(until, now));
            }

            self.reset(phone).await?;
        }

        Ok(())
    }

    /// Record a failed attempt
    pub async fn record_failure(&self, phone: &str) -> PocketResult<FailureOutcome> {
        let now = Utc::now();

        let attempts: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO login_attempts (phone, attempts, updated_at) VALUES (?1, 1, ?2)
            ON CONFLICT(phone) DO UPDATE SET attempts = attempts + 1, updated_at = ?2
            RETURNING attempts
            "#,
        )
        .bind(phone)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        let attempts = attempts.max(0) as u32;

        if attempts >= self.max_attempts {
            let until = now + self.duration;
            sqlx::query("UPDATE login_attempts SET locked_until = ?1 WHERE phone = ?2")
                .bind(until)
                .bind(phone)
                .execute(&self.db)
                .await?;

            tracing::warn!(phone, attempts, "Login locked out after repeated failures");
            return Ok(FailureOutcome::Locked(until));
        }

        Ok(FailureOutcome::Remaining(self.max_attempts - attempts))
    }

    /// Clear the counter after a successful login
    pub async fn reset(&self, phone: &str) -> PocketResult<()> {
        sqlx::query("DELETE FROM login_attempts WHERE phone = ?1")
            .bind(phone)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Remove rows that are neither locked nor touched within the lockout window
    pub async fn cleanup_stale(&self) -> PocketResult<u64> {
        let now = Utc::now();
        let cutoff = now - self.duration;
        let result = sqlx::query(
            r#"
            DELETE FROM login_attempts
            WHERE (locked_until IS NULL AND updated_at < ?1)
               OR (locked_until IS NOT NULL AND locked_until < ?2)
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}
