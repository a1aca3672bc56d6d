/// Password and passcode endpoints
///
/// These four routes predate the rest of the API and keep their original
/// wire format: camelCase JSON and a bare `{"error": "..."}` body on failure,
/// including `405` for any method other than POST.
use crate::{
    context::AppContext,
    error::PocketError,
    metrics,
    otp::{self, OtpPurpose, OtpVerdict},
    password::PasswordHasher,
    sanitize::{is_valid_email, sanitize_email},
};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Map, Value};

/// Error body in the `{"error": ...}` form
#[derive(Debug)]
pub struct VerifyError {
    status: StatusCode,
    body: Value,
}

impl VerifyError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": message }),
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "error": "Internal server error" }),
        }
    }
}

impl IntoResponse for VerifyError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<PocketError> for VerifyError {
    fn from(err: PocketError) -> Self {
        match err {
            PocketError::Validation(message) => VerifyError::bad_request(&message),
            PocketError::RateLimitExceeded { .. } => VerifyError {
                status: StatusCode::TOO_MANY_REQUESTS,
                body: json!({ "error": "Too many requests. Please try again later." }),
            },
            other => {
                tracing::error!("Verification endpoint error: {}", other);
                VerifyError::internal()
            }
        }
    }
}

type VerifyResult = Result<Json<Value>, VerifyError>;

/// Build verification routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/api/hash-password",
            post(hash_password).fallback(method_not_allowed),
        )
        .route(
            "/api/verify-password",
            post(verify_password).fallback(method_not_allowed),
        )
        .route("/api/send-otp", post(send_otp).fallback(method_not_allowed))
        .route(
            "/api/verify-otp",
            post(verify_otp).fallback(method_not_allowed),
        )
}

async fn method_not_allowed() -> VerifyError {
    VerifyError {
        status: StatusCode::METHOD_NOT_ALLOWED,
        body: json!({ "error": "Method not allowed" }),
    }
}

/// Parse the body as a JSON object; anything else reads as empty
fn body_object(body: &Bytes) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// A present, non-empty string field
fn string_field<'a>(body: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    body.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// `POST /api/hash-password`
async fn hash_password(State(ctx): State<AppContext>, body: Bytes) -> VerifyResult {
    let body = body_object(&body);
    let password = string_field(&body, "password")
        .ok_or_else(|| VerifyError::bad_request("Password is required"))?;

    PasswordHasher::check_strength(password)?;
    let hash = ctx.user_manager.hasher().hash(password).await?;

    Ok(Json(json!({ "hash": hash })))
}

/// `POST /api/verify-password`
async fn verify_password(State(ctx): State<AppContext>, body: Bytes) -> VerifyResult {
    let body = body_object(&body);
    let password = string_field(&body, "password")
        .ok_or_else(|| VerifyError::bad_request("Password is required"))?;
    let hash = string_field(&body, "hash")
        .ok_or_else(|| VerifyError::bad_request("Hash is required"))?;

    let valid = ctx.user_manager.hasher().verify(password, hash).await?;

    Ok(Json(json!({ "valid": valid })))
}

/// `POST /api/send-otp`
async fn send_otp(State(ctx): State<AppContext>, body: Bytes) -> VerifyResult {
    let body = body_object(&body);
    let email = string_field(&body, "email")
        .ok_or_else(|| VerifyError::bad_request("Email is required"))?;
    // The address is checked exactly as sent; only then normalized for storage
    let email = Some(email)
        .filter(|e| is_valid_email(e))
        .and_then(sanitize_email)
        .ok_or_else(|| VerifyError::bad_request("Invalid email format"))?;
    let purpose = OtpPurpose::from_action(body.get("action").and_then(Value::as_str));

    ctx.rate_limiter.check_otp(&email)?;

    let issued = ctx.otp_manager.issue(&email, purpose).await?;
    let expiry_display = otp::format_expiry(issued.expires_at, ctx.config.otp.display_offset_minutes);

    if let Err(e) = ctx
        .mailer
        .send_otp_email(&email, &issued.code, &expiry_display)
        .await
    {
        tracing::error!("Failed to send OTP email: {}", e);
        return Err(VerifyError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "error": "Failed to send OTP email" }),
        });
    }

    metrics::record_otp_sent(purpose.as_str());

    Ok(Json(json!({
        "success": true,
        "otpHash": issued.otp_hash,
        "expiresAt": issued.expires_at_millis(),
        "message": "OTP sent successfully",
    })))
}

/// `POST /api/verify-otp`
///
/// The keyed hash and expiry are checked against the request alone; the
/// stored challenge only counts wrong codes and records a match so
/// registration or reset can consume it.
async fn verify_otp(State(ctx): State<AppContext>, body: Bytes) -> VerifyResult {
    let body = body_object(&body);
    let code =
        string_field(&body, "otp").ok_or_else(|| VerifyError::bad_request("OTP is required"))?;
    let otp_hash = string_field(&body, "otpHash")
        .ok_or_else(|| VerifyError::bad_request("OTP hash is required"))?;
    let expires_at = body
        .get("expiresAt")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .filter(|v| *v != 0)
        .ok_or_else(|| VerifyError::bad_request("Expiry time is required"))?;

    if ctx.otp_manager.attempts_exhausted(otp_hash).await? {
        metrics::record_otp_verification("exhausted");
        return Err(VerifyError {
            status: StatusCode::BAD_REQUEST,
            body: json!({
                "error": "Too many incorrect attempts. Please request a new code.",
                "valid": false
            }),
        });
    }

    match ctx.otp_manager.check(code, otp_hash, expires_at, Utc::now()) {
        OtpVerdict::Expired => {
            metrics::record_otp_verification("expired");
            Err(VerifyError {
                status: StatusCode::BAD_REQUEST,
                body: json!({ "error": "OTP has expired", "expired": true }),
            })
        }
        OtpVerdict::Invalid => {
            metrics::record_otp_verification("invalid");
            ctx.otp_manager.record_failure(otp_hash).await?;
            Err(VerifyError {
                status: StatusCode::BAD_REQUEST,
                body: json!({ "error": "Invalid OTP", "valid": false }),
            })
        }
        OtpVerdict::Valid => {
            metrics::record_otp_verification("valid");
            if !ctx.otp_manager.mark_verified(otp_hash).await? {
                tracing::debug!("Verified OTP has no open challenge");
            }
            Ok(Json(json!({ "valid": true, "message": "OTP verified successfully" })))
        }
    }
}
