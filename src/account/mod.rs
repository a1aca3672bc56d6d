/// Account management system
///
/// Handles user registration, login, the single active session per user,
/// profile changes, and linked family accounts.

mod manager;

pub use manager::UserManager;

use crate::db::models::LinkedAccount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Existence check request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckUserRequest {
    pub phone: String,
    pub email: Option<String>,
}

/// Existence check result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckUserResponse {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_mismatch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub phone: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    /// Hash of the verified registration passcode
    #[validate(length(min = 1, message = "Please verify your email first"))]
    pub otp_hash: String,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

/// Password reset request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub phone: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
    #[validate(length(min = 1, message = "Please verify your email first"))]
    pub otp_hash: String,
}

/// Profile update request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
}

/// Password change request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Account deletion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

/// Link a family member's account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkFamilyRequest {
    pub phone: String,
    #[serde(default)]
    pub email: String,
    /// The family member's own password
    pub password: String,
    pub nickname: Option<String>,
}

/// Remove a linked family member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlinkFamilyRequest {
    pub phone: String,
    /// The caller's password
    pub password: String,
}

/// Profile as returned to its owner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub linked_accounts: Vec<LinkedAccount>,
}

/// Session response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub access_jwt: String,
    pub user: Profile,
}

/// Claims carried in a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Formatted phone
    pub sub: String,
    /// Session id, compared against the stored one on every request
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

/// Validated session from bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSession {
    pub phone: String,
    pub session_id: String,
}
