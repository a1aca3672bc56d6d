/// Database row models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// User record, keyed by formatted phone number
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub phone: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    /// Identifier of the only valid session; replaced on every login
    pub session_id: Option<String>,
}

/// Reference from one user to another whose documents they may read
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccount {
    #[sqlx(rename = "linked_phone")]
    pub phone: String,
    #[sqlx(rename = "display_name")]
    pub name: String,
    pub linked_at: DateTime<Utc>,
}

/// Document record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_phone: String,
    pub name: String,
    pub original_name: String,
    pub url: String,
    /// Backend-specific key used to delete the stored blob
    pub storage_key: String,
    pub file_type: String,
    pub size_bytes: i64,
    #[sqlx(try_from = "String")]
    pub category: Category,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Size label in the form the dashboard shows, e.g. `12.3KB`
    pub fn size_label(&self) -> String {
        format!("{:.1}KB", self.size_bytes as f64 / 1024.0)
    }
}

/// Issued OTP awaiting (or past) verification
#[derive(Debug, Clone, FromRow)]
pub struct OtpChallenge {
    pub id: String,
    pub otp_hash: String,
    pub email: String,
    pub purpose: String,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub failed_attempts: i64,
}

/// Failed login counter for one phone
#[derive(Debug, Clone, FromRow)]
pub struct LoginAttempt {
    pub phone: String,
    pub attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Document category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Identity,
    Education,
    Medical,
    Financial,
    Vehicle,
    Work,
    Property,
    #[serde(rename = "Government Schemes")]
    GovernmentSchemes,
    Legal,
    Travel,
    Utility,
    Personal,
    Subscriptions,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::Identity,
        Category::Education,
        Category::Medical,
        Category::Financial,
        Category::Vehicle,
        Category::Work,
        Category::Property,
        Category::GovernmentSchemes,
        Category::Legal,
        Category::Travel,
        Category::Utility,
        Category::Personal,
        Category::Subscriptions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Identity => "Identity",
            Category::Education => "Education",
            Category::Medical => "Medical",
            Category::Financial => "Financial",
            Category::Vehicle => "Vehicle",
            Category::Work => "Work",
            Category::Property => "Property",
            Category::GovernmentSchemes => "Government Schemes",
            Category::Legal => "Legal",
            Category::Travel => "Travel",
            Category::Utility => "Utility",
            Category::Personal => "Personal",
            Category::Subscriptions => "Subscriptions",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

impl TryFrom<String> for Category {
    type Error = UnknownCategory;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
