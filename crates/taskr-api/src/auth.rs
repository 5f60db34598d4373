//! Bearer-credential authentication.
//!
//! Credentials are resolved against the configured API key table with a
//! constant-time comparison. The resulting [`Identity`] is the only source
//! of owner ids downstream; path parameters merely get checked against it.

use axum::extract::FromRequestParts;
use axum::http::{StatusCode, request::Parts};
use axum::response::{IntoResponse, Response};

use crate::AppState;

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct Identity {
    pub owner_id: String,
    /// Optional; never synthesized when the credential carries none.
    pub email: Option<String>,
}

#[derive(Debug)]
pub enum AuthError {
    MissingCredential,
    InvalidCredential,
    AccessDenied,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingCredential => (
                StatusCode::UNAUTHORIZED,
                "Missing or invalid authorization header",
            ),
            AuthError::InvalidCredential => (StatusCode::UNAUTHORIZED, "Invalid credential"),
            AuthError::AccessDenied => (StatusCode::FORBIDDEN, "Access denied: user_id mismatch"),
        };
        (status, message).into_response()
    }
}

/// Constant-time string comparison to prevent timing attacks.
///
/// Leaks the length of the shorter string, which is acceptable for API keys
/// where lengths are not secret.
fn constant_time_compare(a: &str, b: &str) -> bool {
    let mut result = (a.len() ^ b.len()) as u8;

    let min_len = std::cmp::min(a.len(), b.len());
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    for i in 0..min_len {
        result |= a_bytes[i] ^ b_bytes[i];
    }

    result == 0
}

/// Resolve a bearer credential to an identity.
pub fn authenticate(state: &AppState, bearer: &str) -> Result<Identity, AuthError> {
    let mut found: Option<Identity> = None;
    for entry in &state.config.api_keys {
        // No early exit: scan the whole table to keep timing uniform.
        if constant_time_compare(&entry.key, bearer) && found.is_none() {
            found = Some(Identity {
                owner_id: entry.owner_id.clone(),
                email: entry.email.clone(),
            });
        }
    }
    found.ok_or(AuthError::InvalidCredential)
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingCredential)?;

        let bearer = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MissingCredential)?;

        authenticate(state, bearer)
    }
}

impl Identity {
    /// The path-level owner id must match the authenticated identity.
    pub fn verify_owner(&self, user_id: &str) -> Result<(), AuthError> {
        if self.owner_id == user_id {
            Ok(())
        } else {
            Err(AuthError::AccessDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::constant_time_compare;

    #[test]
    fn equal_strings_compare_true() {
        assert!(constant_time_compare("secret-key", "secret-key"));
    }

    #[test]
    fn different_strings_compare_false() {
        assert!(!constant_time_compare("secret-key", "secret-kez"));
        assert!(!constant_time_compare("short", "longer-string"));
        assert!(!constant_time_compare("", "x"));
    }
}
