/// OTP challenge bookkeeping
use crate::{
    config::OtpConfig,
    db::models::OtpChallenge,
    error::{PocketError, PocketResult},
    otp::{generate_code, IssuedOtp, OtpPurpose, OtpSigner, OtpVerdict},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Issues passcodes and tracks which ones have been verified and used
pub struct OtpManager {
    db: SqlitePool,
    signer: OtpSigner,
    ttl: Duration,
    max_attempts: i64,
}

impl OtpManager {
    pub fn new(db: SqlitePool, config: &OtpConfig) -> PocketResult<Self> {
        Ok(Self {
            db,
            signer: OtpSigner::new(&config.secret)?,
            ttl: Duration::seconds(config.ttl as i64),
            max_attempts: i64::from(config.max_attempts),
        })
    }

    /// Generate a passcode for `email` and record the challenge
    pub async fn issue(&self, email: &str, purpose: OtpPurpose) -> PocketResult<IssuedOtp> {
        let code = generate_code();
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let otp_hash = self.signer.hash(&code, expires_at.timestamp_millis());

        sqlx::query(
            r#"
            INSERT INTO otp_challenges (id, otp_hash, email, purpose, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&otp_hash)
        .bind(email)
        .bind(purpose.as_str())
        .bind(expires_at)
        .bind(now)
        .execute(&self.db)
        .await?;

        tracing::debug!(purpose = purpose.as_str(), "Issued OTP challenge");

        Ok(IssuedOtp {
            code,
            otp_hash,
            expires_at,
        })
    }

    /// Stateless check of a code against the hash and expiry the client holds
    pub fn check(
        &self,
        otp: &str,
        otp_hash: &str,
        expires_at_millis: i64,
        now: DateTime<Utc>,
    ) -> OtpVerdict {
        self.signer.check(otp, otp_hash, expires_at_millis, now)
    }

    /// Whether the challenge with this hash has used up its wrong guesses
    pub async fn attempts_exhausted(&self, otp_hash: &str) -> PocketResult<bool> {
        let attempts: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(failed_attempts) FROM otp_challenges WHERE otp_hash = ?1",
        )
        .bind(otp_hash.to_ascii_lowercase())
        .fetch_one(&self.db)
        .await?;

        Ok(attempts.is_some_and(|n| n >= self.max_attempts))
    }

    /// Count a wrong code against the challenge with this hash
    pub async fn record_failure(&self, otp_hash: &str) -> PocketResult<()> {
        sqlx::query(
            r#"
            UPDATE otp_challenges SET failed_attempts = failed_attempts + 1
            WHERE otp_hash = ?1 AND verified_at IS NULL AND consumed_at IS NULL
            "#,
        )
        .bind(otp_hash.to_ascii_lowercase())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Mark the unexpired challenge with this hash as verified
    ///
    /// Returns false when no open challenge exists (e.g. it was issued by
    /// another deployment, or its wrong guesses ran out).
    pub async fn mark_verified(&self, otp_hash: &str) -> PocketResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE otp_challenges SET verified_at = ?1
            WHERE otp_hash = ?2 AND verified_at IS NULL AND consumed_at IS NULL
              AND expires_at > ?1 AND failed_attempts < ?3
            "#,
        )
        .bind(now)
        .bind(otp_hash.to_ascii_lowercase())
        .bind(self.max_attempts)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Consume a verified challenge for `email` and `purpose`
    ///
    /// Runs on the caller's connection so the challenge is only spent if the
    /// caller's transaction commits. A challenge can be consumed once, and
    /// only before it expires.
    pub async fn consume(
        &self,
        conn: &mut SqliteConnection,
        email: &str,
        purpose: OtpPurpose,
        otp_hash: &str,
    ) -> PocketResult<()> {
        let now = Utc::now();
        let otp_hash = otp_hash.to_ascii_lowercase();

        let challenge = sqlx::query_as::<_, OtpChallenge>(
            r#"
            SELECT id, otp_hash, email, purpose, expires_at, verified_at, consumed_at,
                   created_at, failed_attempts
            FROM otp_challenges
            WHERE email = ?1 AND purpose = ?2 AND otp_hash = ?3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(purpose.as_str())
        .bind(&otp_hash)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| PocketError::Validation("Please verify your email first".to_string()))?;

        if challenge.verified_at.is_none() {
            return Err(PocketError::Validation(
                "Please verify your email first".to_string(),
            ));
        }

        if challenge.consumed_at.is_some() {
            return Err(PocketError::Validation(
                "This verification code has already been used".to_string(),
            ));
        }

        if now > challenge.expires_at {
            return Err(PocketError::Validation("OTP has expired".to_string()));
        }

        let result = sqlx::query(
            "UPDATE otp_challenges SET consumed_at = ?1 WHERE id = ?2 AND consumed_at IS NULL",
        )
        .bind(now)
        .bind(&challenge.id)
        .execute(&mut *conn)
        .await?;

        // Lost a race with a concurrent request presenting the same challenge
        if result.rows_affected() == 0 {
            return Err(PocketError::Validation(
                "This verification code has already been used".to_string(),
            ));
        }

        Ok(())
    }

    /// Delete challenges that expired more than a day ago
    pub async fn cleanup_expired(&self) -> PocketResult<u64> {
        let cutoff = Utc::now() - Duration::days(1);
        let result = sqlx::query("DELETE FROM otp_challenges WHERE expires_at < ?1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    fn config(ttl: u64) -> OtpConfig {
        OtpConfig {
            ttl,
            secret: "otp-test-key-0123456789abcdefghijkl".to_string(),
            max_attempts: 3,
            display_offset_minutes: 330,
        }
    }

    async fn setup(ttl: u64) -> (OtpManager, SqlitePool) {
        let db = memory_pool().await;
        (OtpManager::new(db.clone(), &config(ttl)).unwrap(), db)
    }

    async fn consume(
        manager: &OtpManager,
        db: &SqlitePool,
        email: &str,
        purpose: OtpPurpose,
        otp_hash: &str,
    ) -> PocketResult<()> {
        let mut conn = db.acquire().await.unwrap();
        manager.consume(&mut *conn, email, purpose, otp_hash).await
    }

    #[tokio::test]
    async fn test_issue_verify_consume() {
        let (manager, db) = setup(900).await;
        let issued = manager
            .issue("asha@example.com", OtpPurpose::VerifyEmail)
            .await
            .unwrap();

        assert_eq!(
            manager.check(&issued.code, &issued.otp_hash, issued.expires_at_millis(), Utc::now()),
            OtpVerdict::Valid
        );

        // Unverified challenge cannot be consumed
        assert!(consume(&manager, &db, "asha@example.com", OtpPurpose::VerifyEmail, &issued.otp_hash)
            .await
            .is_err());

        assert!(manager.mark_verified(&issued.otp_hash).await.unwrap());
        consume(&manager, &db, "asha@example.com", OtpPurpose::VerifyEmail, &issued.otp_hash)
            .await
            .unwrap();

        // Single use
        let err = consume(&manager, &db, "asha@example.com", OtpPurpose::VerifyEmail, &issued.otp_hash)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already been used"));
    }

    #[tokio::test]
    async fn test_consume_requires_matching_email_and_purpose() {
        let (manager, db) = setup(900).await;
        let issued = manager
            .issue("asha@example.com", OtpPurpose::VerifyEmail)
            .await
            .unwrap();
        manager.mark_verified(&issued.otp_hash).await.unwrap();

        assert!(consume(&manager, &db, "ravi@example.com", OtpPurpose::VerifyEmail, &issued.otp_hash)
            .await
            .is_err());
        assert!(consume(&manager, &db, "asha@example.com", OtpPurpose::ResetPassword, &issued.otp_hash)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_rolled_back_consume_leaves_challenge_usable() {
        let (manager, db) = setup(900).await;
        let issued = manager
            .issue("asha@example.com", OtpPurpose::VerifyEmail)
            .await
            .unwrap();
        manager.mark_verified(&issued.otp_hash).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        manager
            .consume(&mut *tx, "asha@example.com", OtpPurpose::VerifyEmail, &issued.otp_hash)
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        consume(&manager, &db, "asha@example.com", OtpPurpose::VerifyEmail, &issued.otp_hash)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wrong_guesses_burn_the_challenge() {
        let (manager, _db) = setup(900).await;
        let issued = manager
            .issue("asha@example.com", OtpPurpose::ResetPassword)
            .await
            .unwrap();

        for _ in 0..2 {
            manager.record_failure(&issued.otp_hash).await.unwrap();
        }
        assert!(!manager.attempts_exhausted(&issued.otp_hash).await.unwrap());

        manager.record_failure(&issued.otp_hash).await.unwrap();
        assert!(manager.attempts_exhausted(&issued.otp_hash).await.unwrap());

        // Even the right code no longer opens it
        assert!(!manager.mark_verified(&issued.otp_hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_challenge_not_verified() {
        let (manager, _db) = setup(0).await;
        let issued = manager
            .issue("asha@example.com", OtpPurpose::ResetPassword)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!manager.mark_verified(&issued.otp_hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let (manager, db) = setup(900).await;
        manager
            .issue("asha@example.com", OtpPurpose::VerifyEmail)
            .await
            .unwrap();

        let old = Utc::now() - Duration::days(2);
        sqlx::query(
            "INSERT INTO otp_challenges (id, otp_hash, email, purpose, expires_at, created_at)
             VALUES ('old', 'abc', 'old@example.com', 'verify_email', ?1, ?1)",
        )
        .bind(old)
        .execute(&db)
        .await
        .unwrap();

        assert_eq!(manager.cleanup_expired().await.unwrap(), 1);
    }
}
