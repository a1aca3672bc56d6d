/// Configuration management for the CloudPocket server
use crate::error::{PocketError, PocketResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub otp: OtpConfig,
    pub lockout: LockoutConfig,
    pub email: EmailConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Public base URL used when building links to disk-served files
    pub public_url: String,
    /// Prefix applied to 10-digit phone numbers
    pub default_country_code: String,
    pub upload_limit: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub blobstore: BlobstoreConfig,
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlobstoreConfig {
    Disk {
        location: PathBuf,
    },
    Cloudinary {
        cloud_name: String,
        upload_preset: String,
    },
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Session token lifetime in seconds
    pub session_ttl: u64,
    pub bcrypt_cost: u32,
}

/// One-time passcode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfig {
    /// Passcode lifetime in seconds
    pub ttl: u64,
    /// Key for passcode hashes; defaults to the JWT secret
    #[serde(skip_serializing)]
    pub secret: String,
    /// Wrong codes allowed per challenge before it is burned
    pub max_attempts: u32,
    /// Offset from UTC, in minutes, used to render the expiry time in emails
    pub display_offset_minutes: i32,
}

/// Login lockout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutConfig {
    pub max_attempts: u32,
    /// Lockout duration in seconds
    pub duration: u64,
}

/// Email delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EmailConfig {
    Smtp {
        smtp_url: String,
        from_address: String,
    },
    EmailJs {
        service_id: String,
        template_id: String,
        public_key: String,
        endpoint: String,
    },
    Disabled,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    /// Requests per minute for the OTP send endpoint
    pub otp_per_minute: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> PocketResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("POCKET_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("POCKET_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| PocketError::Validation("Invalid port number".to_string()))?;
        let public_url = env::var("POCKET_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));
        let default_country_code =
            env::var("POCKET_DEFAULT_COUNTRY_CODE").unwrap_or_else(|_| "+91".to_string());
        let upload_limit = env_or("POCKET_UPLOAD_LIMIT", 10 * 1024 * 1024);

        let data_directory: PathBuf = env::var("POCKET_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("POCKET_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("cloudpocket.sqlite"));

        let blobstore = if let Ok(cloud_name) = env::var("POCKET_CLOUDINARY_CLOUD_NAME") {
            BlobstoreConfig::Cloudinary {
                cloud_name,
                upload_preset: env::var("POCKET_CLOUDINARY_UPLOAD_PRESET").map_err(|_| {
                    PocketError::Validation("Cloudinary upload preset required".to_string())
                })?,
            }
        } else {
            BlobstoreConfig::Disk {
                location: env::var("POCKET_BLOBSTORE_DISK_LOCATION")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("blobs")),
            }
        };

        let jwt_secret = env::var("POCKET_JWT_SECRET")
            .map_err(|_| PocketError::Validation("JWT secret required".to_string()))?;
        let session_ttl = env_or("POCKET_SESSION_TTL", 7 * 24 * 3600);
        let bcrypt_cost = env_or("POCKET_BCRYPT_COST", 12);

        let otp_ttl = env_or("POCKET_OTP_TTL", 15 * 60);
        let display_offset_minutes = env_or("POCKET_OTP_DISPLAY_OFFSET_MINUTES", 330);
        let otp_secret = env::var("POCKET_OTP_SECRET").unwrap_or_else(|_| jwt_secret.clone());
        let otp_max_attempts = env_or("POCKET_OTP_MAX_ATTEMPTS", 5);

        let max_attempts = env_or("POCKET_LOGIN_MAX_ATTEMPTS", 5);
        let lockout_duration = env_or("POCKET_LOGIN_LOCKOUT_SECONDS", 5 * 60);

        let email = if let Ok(smtp_url) = env::var("POCKET_EMAIL_SMTP_URL") {
            EmailConfig::Smtp {
                smtp_url,
                from_address: env::var("POCKET_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            }
        } else if let Ok(service_id) = env::var("POCKET_EMAILJS_SERVICE_ID") {
            EmailConfig::EmailJs {
                service_id: service_id.trim().to_string(),
                template_id: env::var("POCKET_EMAILJS_TEMPLATE_ID")
                    .map(|v| v.trim().to_string())
                    .map_err(|_| {
                        PocketError::Validation("EmailJS template id required".to_string())
                    })?,
                public_key: env::var("POCKET_EMAILJS_PUBLIC_KEY")
                    .map(|v| v.trim().to_string())
                    .map_err(|_| {
                        PocketError::Validation("EmailJS public key required".to_string())
                    })?,
                endpoint: env::var("POCKET_EMAILJS_ENDPOINT").unwrap_or_else(|_| {
                    "https://api.emailjs.com/api/v1.0/email/send".to_string()
                }),
            }
        } else {
            EmailConfig::Disabled
        };

        let rate_limit = RateLimitConfig {
            enabled: env_or("POCKET_RATE_LIMITS_ENABLED", true),
            authenticated_rps: env_or("POCKET_RATE_LIMIT_AUTHENTICATED_RPS", 50),
            unauthenticated_rps: env_or("POCKET_RATE_LIMIT_UNAUTHENTICATED_RPS", 10),
            otp_per_minute: env_or("POCKET_RATE_LIMIT_OTP_PER_MINUTE", 10),
        };

        let log_level = env::var("POCKET_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        let log_json = env::var("POCKET_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                default_country_code,
                upload_limit,
            },
            storage: StorageConfig {
                data_directory,
                database,
                blobstore,
            },
            authentication: AuthConfig {
                jwt_secret,
                session_ttl,
                bcrypt_cost,
            },
            otp: OtpConfig {
                ttl: otp_ttl,
                secret: otp_secret,
                max_attempts: otp_max_attempts,
                display_offset_minutes,
            },
            lockout: LockoutConfig {
                max_attempts,
                duration: lockout_duration,
            },
            email,
            rate_limit,
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> PocketResult<()> {
        if self.service.hostname.is_empty() {
            return Err(PocketError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(PocketError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if !(4..=31).contains(&self.authentication.bcrypt_cost) {
            return Err(PocketError::Validation(
                "bcrypt cost must be between 4 and 31".to_string(),
            ));
        }

        if self.otp.secret.len() < 32 {
            return Err(PocketError::Validation(
                "OTP secret must be at least 32 characters".to_string(),
            ));
        }

        if self.otp.max_attempts == 0 {
            return Err(PocketError::Validation(
                "OTP max attempts must be at least 1".to_string(),
            ));
        }

        if self.lockout.max_attempts == 0 {
            return Err(PocketError::Validation(
                "Login max attempts must be at least 1".to_string(),
            ));
        }

        if !self.service.default_country_code.starts_with('+') {
            return Err(PocketError::Validation(
                "Default country code must start with '+'".to_string(),
            ));
        }

        Ok(())
    }

    /// Minimal configuration for tests, rooted at `data_directory`
    pub fn for_tests(data_directory: PathBuf) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8080,
                public_url: "http://localhost:8080".to_string(),
                default_country_code: "+91".to_string(),
                upload_limit: 1024 * 1024,
            },
            storage: StorageConfig {
                database: data_directory.join("test.sqlite"),
                blobstore: BlobstoreConfig::Disk {
                    location: data_directory.join("blobs"),
                },
                data_directory,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only-0123456789".to_string(),
                session_ttl: 3600,
                bcrypt_cost: 4,
            },
            otp: OtpConfig {
                ttl: 15 * 60,
                secret: "otp-test-key-0123456789abcdefghijkl".to_string(),
                max_attempts: 5,
                display_offset_minutes: 330,
            },
            lockout: LockoutConfig {
                max_attempts: 5,
                duration: 5 * 60,
            },
            email: EmailConfig::Disabled,
            rate_limit: RateLimitConfig {
                enabled: false,
                authenticated_rps: 1000,
                unauthenticated_rps: 1000,
                otp_per_minute: 1000,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }
}
