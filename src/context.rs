/// Application context and dependency injection
use crate::{
    account::UserManager,
    blob_store::BlobStore,
    config::ServerConfig,
    db,
    documents::DocumentManager,
    error::{PocketError, PocketResult},
    lockout::LoginLockout,
    mailer::Mailer,
    otp::OtpManager,
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};

/// Timeout for outbound calls to EmailJS and Cloudinary
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(30);

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub user_manager: Arc<UserManager>,
    pub document_manager: Arc<DocumentManager>,
    pub otp_manager: Arc<OtpManager>,
    pub lockout: Arc<LoginLockout>,
    pub rate_limiter: Arc<RateLimiter>,
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> PocketResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        Self::with_pool(config, db).await
    }

    /// Build the services on top of an existing, migrated pool
    pub async fn with_pool(config: ServerConfig, db: SqlitePool) -> PocketResult<Self> {
        let config = Arc::new(config);

        let http = reqwest::Client::builder()
            .timeout(OUTBOUND_TIMEOUT)
            .user_agent(concat!("cloudpocket/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PocketError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let otp_manager = Arc::new(OtpManager::new(db.clone(), &config.otp)?);
        let lockout = Arc::new(LoginLockout::new(db.clone(), &config.lockout));

        let user_manager = Arc::new(UserManager::new(
            db.clone(),
            config.clone(),
            otp_manager.clone(),
            lockout.clone(),
        ));

        let blob_store = BlobStore::from_config(&config, http.clone()).await?;
        let document_manager = Arc::new(DocumentManager::new(db.clone(), blob_store));

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        let mailer = Arc::new(Mailer::new(&config.email, http)?);
        if !mailer.is_configured() {
            tracing::warn!("No email transport configured; OTP emails will not be delivered");
        }

        Ok(Self {
            config,
            db,
            user_manager,
            document_manager,
            otp_manager,
            lockout,
            rate_limiter,
            mailer,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> PocketResult<()> {
        let mut dirs = vec![config.storage.data_directory.clone()];
        if let Some(parent) = config.storage.database.parent() {
            dirs.push(parent.to_path_buf());
        }

        for dir in dirs {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                    PocketError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
                })?;
            }
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> &str {
        &self.config.service.public_url
    }
}
