/// Authentication extractors and utilities
use crate::{account::ValidatedSession, context::AppContext, error::PocketError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Authenticated context - extracts and validates the session from the request
///
/// Rejects with `SessionSuperseded` when the account has logged in elsewhere.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub phone: String,
    pub session: ValidatedSession,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = PocketError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| PocketError::Authentication("Missing authorization header".to_string()))?;

        let session = state.user_manager.validate_access_token(&token).await?;
        let phone = session.phone.clone();

        Ok(AuthContext { phone, session })
    }
}
