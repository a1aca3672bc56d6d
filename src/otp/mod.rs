/// One-time passcodes
///
/// A passcode is six decimal digits. Only a keyed HMAC-SHA256 of the code and
/// its expiry leaves the server: the client holds `(otpHash, expiresAt)` and
/// sends them back with the code the user typed. Without the server key the
/// hash cannot be matched to a code offline, and a changed `expiresAt` no
/// longer verifies. Every issued passcode is also recorded as a challenge so
/// that registration and password reset can require a verified one.

mod manager;

pub use manager::OtpManager;

use crate::error::{PocketError, PocketResult};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// What a passcode is allowed to authorise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    VerifyEmail,
    ResetPassword,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::VerifyEmail => "verify_email",
            OtpPurpose::ResetPassword => "reset_password",
        }
    }

    /// Map the `action` field of a send request to a purpose
    pub fn from_action(action: Option<&str>) -> Self {
        match action {
            Some("reset") | Some("reset_password") | Some("forgot") => OtpPurpose::ResetPassword,
            _ => OtpPurpose::VerifyEmail,
        }
    }
}

/// A freshly generated passcode
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub code: String,
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl IssuedOtp {
    /// Expiry in milliseconds since the Unix epoch, as sent to clients
    pub fn expires_at_millis(&self) -> i64 {
        self.expires_at.timestamp_millis()
    }
}

/// Outcome of checking a passcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpVerdict {
    Valid,
    Invalid,
    Expired,
}

/// Generate a 6-digit passcode from the OS CSPRNG
pub fn generate_code() -> String {
    let n = OsRng.next_u32();
    (100_000 + n % 900_000).to_string()
}

/// Signs and checks passcode hashes with the server's OTP key
#[derive(Clone)]
pub struct OtpSigner {
    mac: HmacSha256,
}

impl OtpSigner {
    pub fn new(secret: &str) -> PocketResult<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| PocketError::Internal(format!("Invalid OTP key: {}", e)))?;
        Ok(Self { mac })
    }

    fn keyed(&self, code: &str, expires_at_millis: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(code.as_bytes());
        mac.update(b":");
        mac.update(expires_at_millis.to_string().as_bytes());
        mac
    }

    /// Lowercase hex HMAC-SHA256 over the code and its expiry
    pub fn hash(&self, code: &str, expires_at_millis: i64) -> String {
        hex::encode(self.keyed(code, expires_at_millis).finalize().into_bytes())
    }

    /// Check a passcode against its hash and expiry
    ///
    /// Expiry is checked first, so an expired code is reported as expired even
    /// when it is also wrong.
    pub fn check(
        &self,
        otp: &str,
        otp_hash: &str,
        expires_at_millis: i64,
        now: DateTime<Utc>,
    ) -> OtpVerdict {
        if now.timestamp_millis() > expires_at_millis {
            return OtpVerdict::Expired;
        }

        let Ok(expected) = hex::decode(otp_hash.trim()) else {
            return OtpVerdict::Invalid;
        };

        // verify_slice compares in constant time
        match self
            .keyed(otp.trim(), expires_at_millis)
            .verify_slice(&expected)
        {
            Ok(()) => OtpVerdict::Valid,
            Err(_) => OtpVerdict::Invalid,
        }
    }
}

/// Render an expiry instant as a 12-hour clock time at a fixed UTC offset
pub fn format_expiry(expires_at: DateTime<Utc>, offset_minutes: i32) -> String {
    match chrono::FixedOffset::east_opt(offset_minutes * 60) {
        Some(offset) => offset
            .from_utc_datetime(&expires_at.naive_utc())
            .format("%-I:%M %p")
            .to_string(),
        None => expires_at.format("%-I:%M %p").to_string(),
    }
}
