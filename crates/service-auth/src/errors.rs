//! Auth error types.
//!
//! Two channels leave this crate. Policy rejections (bad tokens, failed
//! authorization) are plain values, see [`crate::RejectReason`]. Everything in
//! this module is an infrastructure failure: it is logged for the operator
//! and never echoed to a client. [`ApiError`] is the only type that turns
//! either channel into an HTTP response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failure reported by an integrator-supplied [`crate::AuthProvider`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    /// Create a provider error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message supplied by the provider.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ProviderError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ProviderError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Infrastructure failures of the auth subsystem.
///
/// `Clone` so that one failed refresh can be handed to every caller that
/// joined it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Provider failed to return a key set.
    #[error("Provider failed to refresh keys: {0}")]
    KeyRefresh(ProviderError),

    /// Provider returned a key set containing an unusable key.
    #[error("Key is invalid: {0}")]
    InvalidSigningKey(String),

    /// Provider failed to return an access token.
    #[error("Provider failed to refresh access token: {0}")]
    TokenRefresh(ProviderError),

    /// Provider returned an empty access token.
    #[error("An access token was expected but not received")]
    MissingAccessToken,

    /// The caller's wait for a coalesced token refresh ran out.
    #[error("Timeout waiting for token refresh")]
    RefreshTimeout,

    /// A cached key's PEM material could not be turned into a verification key.
    #[error("Failed to parse RSA public key from key material: {0}")]
    KeyMaterial(String),

    /// Signature verification failed for a reason that is not the caller's fault.
    #[error("Token verification failed unexpectedly: {0}")]
    Verification(String),

    /// Provider failed while evaluating an authorization requirement.
    #[error("Provider failed to authorize request: {0}")]
    Authorization(ProviderError),

    /// The outbound HTTP request could not be built or sent.
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// Background task failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(err: tokio::task::JoinError) -> Self {
        AuthError::Internal(format!("refresh task failed: {err}"))
    }
}

/// HTTP-facing error for guarded endpoints.
///
/// Maps to:
/// - Unauthorized: 401 with the client-safe reason
/// - Forbidden: 403 with a fixed message
/// - Internal: 500 with a generic message (details are logged, not returned)
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Internal server error")]
    Internal(#[source] AuthError),
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match self {
            ApiError::Unauthorized(reason) => {
                let message = if reason.is_empty() {
                    "unauthorized".to_string()
                } else {
                    format!("unauthorized: {reason}")
                };
                ("UNAUTHORIZED", message)
            }
            ApiError::Forbidden(message) => ("FORBIDDEN", message.to_string()),
            ApiError::Internal(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "auth.errors", error = %err, "Request failed with internal error");
                ("INTERNAL_ERROR", "internal server error".to_string())
            }
        };

        let body = ErrorResponse {
            error: ErrorDetail { code, message },
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer error=\"invalid_token\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unauthorized_carries_reason_and_challenge() {
        let response = ApiError::Unauthorized("token is expired".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get("WWW-Authenticate").is_some());

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert_eq!(body["error"]["message"], "unauthorized: token is expired");
    }

    #[tokio::test]
    async fn test_internal_hides_detail() {
        let err = AuthError::KeyMaterial("bad base64 in -----BEGIN PUBLIC KEY-----".to_string());
        let response = ApiError::Internal(err).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "internal server error");
        assert!(!body.to_string().contains("BEGIN PUBLIC KEY"));
    }

    #[tokio::test]
    async fn test_forbidden_has_fixed_message() {
        let response = ApiError::Forbidden("forbidden").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get("WWW-Authenticate").is_none());

        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "forbidden");
    }

    #[test]
    fn test_provider_error_conversions() {
        let from_str: ProviderError = "backend down".into();
        let from_string: ProviderError = String::from("backend down").into();
        assert_eq!(from_str, from_string);
        assert_eq!(from_str.message(), "backend down");

        let err = AuthError::KeyRefresh(from_str);
        assert_eq!(err.to_string(), "Provider failed to refresh keys: backend down");
    }
}
