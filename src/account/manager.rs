/// User manager implementation using runtime queries
use crate::{
    account::{
        ChangePasswordRequest, CheckUserRequest, CheckUserResponse, LinkFamilyRequest,
        LoginRequest, Profile, RegisterRequest, ResetPasswordRequest, SessionClaims,
        SessionResponse, UnlinkFamilyRequest, ValidatedSession,
    },
    config::ServerConfig,
    db::models::{LinkedAccount, User},
    error::{PocketError, PocketResult},
    lockout::{locked_out, FailureOutcome, LoginLockout},
    metrics,
    otp::{OtpManager, OtpPurpose},
    password::PasswordHasher,
    phone::format_phone,
    sanitize::{sanitize_email, sanitize_string},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

const USER_COLUMNS: &str = "phone, name, email, password_hash, created_at, session_id";

/// User manager service
pub struct UserManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    hasher: PasswordHasher,
    otp: Arc<OtpManager>,
    lockout: Arc<LoginLockout>,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Map a failed user insert to the conflict the caller lost
///
/// SQLite names the column in the message, e.g.
/// `UNIQUE constraint failed: users.email`.
fn registration_error(err: sqlx::Error) -> PocketError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            if db_err.message().contains("users.email") {
                PocketError::Conflict(
                    "Email address already registered to another account".to_string(),
                )
            } else {
                PocketError::Conflict("Phone number already registered".to_string())
            }
        }
        _ => PocketError::Database(err),
    }
}

impl UserManager {
    /// Create a new user manager
    pub fn new(
        db: SqlitePool,
        config: Arc<ServerConfig>,
        otp: Arc<OtpManager>,
        lockout: Arc<LoginLockout>,
    ) -> Self {
        let hasher = PasswordHasher::new(config.authentication.bcrypt_cost);
        Self {
            db,
            config,
            hasher,
            otp,
            lockout,
        }
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Format a user-entered phone with the configured country code
    pub fn format_phone(&self, raw: &str) -> PocketResult<String> {
        format_phone(raw, &self.config.service.default_country_code)
    }

    async fn find_user(&self, phone: &str) -> PocketResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE phone = ?1",
            USER_COLUMNS
        ))
        .bind(phone)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    async fn require_user(&self, phone: &str) -> PocketResult<User> {
        self.find_user(phone)
            .await?
            .ok_or_else(|| PocketError::NotFound("User not found.".to_string()))
    }

    async fn email_owner(&self, email: &str) -> PocketResult<Option<String>> {
        let phone = sqlx::query_scalar::<_, String>("SELECT phone FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;

        Ok(phone)
    }

    /// Verify a password and rehash legacy digests on success
    async fn verify_password(&self, user: &User, password: &str) -> PocketResult<bool> {
        if !self.hasher.verify(password, &user.password_hash).await? {
            return Ok(false);
        }

        if PasswordHasher::needs_upgrade(&user.password_hash) {
            // A legacy digest may belong to a password shorter than the
            // current minimum; leave those alone rather than fail the login
            match self.hasher.hash(password).await {
                Ok(new_hash) => {
                    sqlx::query("UPDATE users SET password_hash = ?1 WHERE phone = ?2")
                        .bind(&new_hash)
                        .bind(&user.phone)
                        .execute(&self.db)
                        .await?;
                    tracing::info!(phone = %user.phone, "Upgraded legacy password hash to bcrypt");
                }
                Err(e) => tracing::warn!(phone = %user.phone, "Legacy hash not upgraded: {}", e),
            }
        }

        Ok(true)
    }

    /// Check whether a phone (and optionally an email) is already registered
    pub async fn check_user_exists(
        &self,
        request: &CheckUserRequest,
    ) -> PocketResult<CheckUserResponse> {
        let phone = self.format_phone(&request.phone)?;
        let email = request
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());

        if let Some(user) = self.find_user(&phone).await? {
            if let Some(email) = &email {
                if !user.email.eq_ignore_ascii_case(email) {
                    return Ok(CheckUserResponse {
                        exists: true,
                        email_mismatch: Some(true),
                        error: Some("Email does not match the registered account".to_string()),
                        ..Default::default()
                    });
                }
            }

            return Ok(CheckUserResponse {
                exists: true,
                error: Some("Phone number already registered".to_string()),
                name: Some(user.name),
                email: Some(user.email),
                phone: Some(phone),
                ..Default::default()
            });
        }

        if let Some(email) = &email {
            if self.email_owner(email).await?.is_some() {
                return Ok(CheckUserResponse {
                    exists: true,
                    error: Some(
                        "Email address already registered to another account".to_string(),
                    ),
                    ..Default::default()
                });
            }
        }

        Ok(CheckUserResponse {
            exists: false,
            phone: Some(phone),
            ..Default::default()
        })
    }

    /// Register a new user and log them in
    pub async fn register(&self, request: RegisterRequest) -> PocketResult<SessionResponse> {
        request.validate()?;

        let phone = self.format_phone(&request.phone)?;
        let name = sanitize_string(&request.name);
        if name.chars().count() < 2 {
            return Err(PocketError::Validation(
                "Name must be at least 2 characters".to_string(),
            ));
        }
        let email = sanitize_email(&request.email)
            .ok_or_else(|| PocketError::Validation("Invalid email format".to_string()))?;

        if self.find_user(&phone).await?.is_some() {
            return Err(PocketError::Conflict(
                "Phone number already registered".to_string(),
            ));
        }
        if self.email_owner(&email).await?.is_some() {
            return Err(PocketError::Conflict(
                "Email address already registered to another account".to_string(),
            ));
        }

        let password_hash = self.hasher.hash(&request.password).await?;

        // The passcode is only spent if the user row is written
        let mut tx = self.db.begin().await?;
        self.otp
            .consume(&mut *tx, &email, OtpPurpose::VerifyEmail, &request.otp_hash)
            .await?;

        sqlx::query(
            "INSERT INTO users (phone, name, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&phone)
        .bind(&name)
        .bind(&email)
        .bind(&password_hash)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(registration_error)?;

        tx.commit().await?;

        metrics::REGISTRATIONS_TOTAL.inc();
        tracing::info!(phone = %phone, "Registered new user");

        self.start_session(&phone).await
    }

    /// Authenticate with phone and password, replacing any existing session
    pub async fn login(&self, request: &LoginRequest) -> PocketResult<SessionResponse> {
        let phone = self.format_phone(&request.phone)?;

        if let Err(e) = self.lockout.check(&phone).await {
            metrics::record_login("locked");
            return Err(e);
        }

        let Some(user) = self.find_user(&phone).await? else {
            metrics::record_login("unknown_user");
            return Err(PocketError::NotFound(
                "User not found. Please register first.".to_string(),
            ));
        };

        if !self.verify_password(&user, &request.password).await? {
            metrics::record_login("wrong_password");
            return match self.lockout.record_failure(&phone).await? {
                FailureOutcome::Remaining(n) => Err(PocketError::Authentication(format!(
                    "Incorrect password. {} attempt{} remaining.",
                    n,
                    if n == 1 { "" } else { "s" }
                ))),
                FailureOutcome::Locked(until) => Err(locked_out(until, Utc::now())),
            };
        }

        self.lockout.reset(&phone).await?;
        metrics::record_login("success");

        tracing::info!(phone = %phone, "User logged in");

        self.start_session(&phone).await
    }

    /// Rotate the session id and issue a token for it
    async fn start_session(&self, phone: &str) -> PocketResult<SessionResponse> {
        let session_id = Uuid::new_v4().to_string();

        sqlx::query("UPDATE users SET session_id = ?1 WHERE phone = ?2")
            .bind(&session_id)
            .bind(phone)
            .execute(&self.db)
            .await?;

        let access_jwt = self.generate_access_token(phone, &session_id)?;
        let user = self.get_profile(phone).await?;

        Ok(SessionResponse { access_jwt, user })
    }

    /// Generate access JWT token
    fn generate_access_token(&self, phone: &str, session_id: &str) -> PocketResult<String> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: phone.to_string(),
            sid: session_id.to_string(),
            iat: now,
            exp: now + self.config.authentication.session_ttl as i64,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| PocketError::Jwt(format!("Failed to generate token: {}", e)))?;

        Ok(token)
    }

    /// Validate access token against the user's current session
    pub async fn validate_access_token(&self, token: &str) -> PocketResult<ValidatedSession> {
        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| PocketError::Authentication("Invalid or expired session".to_string()))?;
        let claims = data.claims;

        let stored: Option<Option<String>> =
            sqlx::query_scalar("SELECT session_id FROM users WHERE phone = ?1")
                .bind(&claims.sub)
                .fetch_optional(&self.db)
                .await?;

        match stored {
            None => Err(PocketError::Authentication(
                "Invalid or expired session".to_string(),
            )),
            Some(Some(current)) if current == claims.sid => Ok(ValidatedSession {
                phone: claims.sub,
                session_id: claims.sid,
            }),
            Some(_) => Err(PocketError::SessionSuperseded),
        }
    }

    /// Heartbeat: is this token still the active session?
    pub async fn session_is_valid(&self, token: &str) -> PocketResult<bool> {
        match self.validate_access_token(token).await {
            Ok(_) => Ok(true),
            Err(PocketError::Authentication(_) | PocketError::SessionSuperseded) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Log out, unless another login already replaced this session
    pub async fn logout(&self, session: &ValidatedSession) -> PocketResult<()> {
        sqlx::query("UPDATE users SET session_id = NULL WHERE phone = ?1 AND session_id = ?2")
            .bind(&session.phone)
            .bind(&session.session_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Set a new password using a verified reset passcode
    ///
    /// All sessions are ended.
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> PocketResult<()> {
        request.validate()?;

        let phone = self.format_phone(&request.phone)?;
        let user = self.require_user(&phone).await?;
        let password_hash = self.hasher.hash(&request.new_password).await?;

        let mut tx = self.db.begin().await?;
        self.otp
            .consume(&mut *tx, &user.email, OtpPurpose::ResetPassword, &request.otp_hash)
            .await?;

        sqlx::query("UPDATE users SET password_hash = ?1, session_id = NULL WHERE phone = ?2")
            .bind(&password_hash)
            .bind(&phone)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.lockout.reset(&phone).await?;

        tracing::info!(phone = %phone, "Password reset");
        Ok(())
    }

    /// Profile with linked accounts
    pub async fn get_profile(&self, phone: &str) -> PocketResult<Profile> {
        let user = self.require_user(phone).await?;
        let linked_accounts = self.linked_accounts(phone).await?;

        Ok(Profile {
            name: user.name,
            phone: user.phone,
            email: user.email,
            created_at: user.created_at,
            linked_accounts,
        })
    }

    /// Change the display name
    pub async fn update_profile(&self, phone: &str, name: &str) -> PocketResult<Profile> {
        let name = sanitize_string(name);
        if name.is_empty() {
            return Err(PocketError::Validation("Name cannot be empty.".to_string()));
        }

        let result = sqlx::query("UPDATE users SET name = ?1 WHERE phone = ?2")
            .bind(&name)
            .bind(phone)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PocketError::NotFound("User not found.".to_string()));
        }

        self.get_profile(phone).await
    }

    /// Change password after checking the old one
    pub async fn change_password(
        &self,
        phone: &str,
        request: ChangePasswordRequest,
    ) -> PocketResult<()> {
        request.validate()?;

        let user = self.require_user(phone).await?;
        if !self.verify_password(&user, &request.old_password).await? {
            return Err(PocketError::Validation("Incorrect old password.".to_string()));
        }

        let password_hash = self.hasher.hash(&request.new_password).await?;
        sqlx::query("UPDATE users SET password_hash = ?1 WHERE phone = ?2")
            .bind(&password_hash)
            .bind(phone)
            .execute(&self.db)
            .await?;

        tracing::info!(phone = %phone, "Password changed");
        Ok(())
    }

    /// Delete the user record
    ///
    /// Links to and from the user go with it; documents are left in place.
    pub async fn delete_account(&self, phone: &str, password: &str) -> PocketResult<()> {
        let user = self.require_user(phone).await?;
        if !self.verify_password(&user, password).await? {
            return Err(PocketError::Validation("Incorrect password.".to_string()));
        }

        sqlx::query("DELETE FROM users WHERE phone = ?1")
            .bind(phone)
            .execute(&self.db)
            .await?;
        self.lockout.reset(phone).await?;

        tracing::info!(phone = %phone, "Account deleted");
        Ok(())
    }

    /// Linked accounts in the order they were added
    pub async fn linked_accounts(&self, owner: &str) -> PocketResult<Vec<LinkedAccount>> {
        let accounts = sqlx::query_as::<_, LinkedAccount>(
            r#"
            SELECT linked_phone, display_name, linked_at
            FROM linked_accounts
            WHERE owner_phone = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.db)
        .await?;

        Ok(accounts)
    }

    /// Link another user's account, proven by their email and password
    ///
    /// Wrong passwords count toward the family member's login lockout.
    pub async fn link_family_member(
        &self,
        owner: &str,
        request: &LinkFamilyRequest,
    ) -> PocketResult<Vec<LinkedAccount>> {
        let email = request.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(PocketError::Validation(
                "Email address is required.".to_string(),
            ));
        }

        let target_phone = self.format_phone(&request.phone)?;
        if target_phone == owner {
            return Err(PocketError::Validation(
                "You cannot link your own account.".to_string(),
            ));
        }

        let target = self.find_user(&target_phone).await?.ok_or_else(|| {
            PocketError::NotFound("Family member account not found.".to_string())
        })?;

        self.lockout.check(&target_phone).await?;

        if !target.email.eq_ignore_ascii_case(&email) {
            return Err(PocketError::Validation(
                "Email does not match the registered account.".to_string(),
            ));
        }

        if !self.verify_password(&target, &request.password).await? {
            if let FailureOutcome::Locked(until) =
                self.lockout.record_failure(&target_phone).await?
            {
                return Err(locked_out(until, Utc::now()));
            }
            return Err(PocketError::Validation(
                "Incorrect password for family member.".to_string(),
            ));
        }
        self.lockout.reset(&target_phone).await?;

        let display_name = request
            .nickname
            .as_deref()
            .map(sanitize_string)
            .filter(|n| !n.is_empty())
            .or_else(|| Some(target.name.clone()).filter(|n| !n.is_empty()))
            .unwrap_or_else(|| "Family Member".to_string());

        sqlx::query(
            r#"
            INSERT INTO linked_accounts (owner_phone, linked_phone, display_name, linked_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(owner)
        .bind(&target_phone)
        .bind(&display_name)
        .bind(Utc::now())
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PocketError::Conflict("This member is already linked.".to_string())
            } else {
                PocketError::Database(e)
            }
        })?;

        tracing::info!(owner = %owner, linked = %target_phone, "Linked family member");

        self.linked_accounts(owner).await
    }

    /// Remove a linked account after checking the caller's password
    pub async fn unlink_family_member(
        &self,
        owner: &str,
        request: &UnlinkFamilyRequest,
    ) -> PocketResult<Vec<LinkedAccount>> {
        let user = self.require_user(owner).await?;
        if !self.verify_password(&user, &request.password).await? {
            return Err(PocketError::Validation("Incorrect password.".to_string()));
        }

        let target_phone = self.format_phone(&request.phone)?;
        let result =
            sqlx::query("DELETE FROM linked_accounts WHERE owner_phone = ?1 AND linked_phone = ?2")
                .bind(owner)
                .bind(&target_phone)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(PocketError::NotFound(
                "Family member not found in your list.".to_string(),
            ));
        }

        tracing::info!(owner = %owner, unlinked = %target_phone, "Unlinked family member");

        self.linked_accounts(owner).await
    }
}
