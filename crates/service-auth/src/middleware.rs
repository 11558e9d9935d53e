//! Axum guard for protected routes.
//!
//! Every request passes, in order:
//! 1. authentication of the bearer token (401 with the reason on rejection)
//! 2. for service-only guards, the provider's service check (403)
//! 3. authorization against the union of the guard's requirements (403)
//!
//! Infrastructure failures at any step are 500 with a generic body.
//!
//! A guard holds an `Arc<Auth>`, so a protected route cannot be mounted
//! without a configured provider.

use crate::auth::Auth;
use crate::errors::ApiError;
use crate::outcome::AuthOutcome;
use crate::requirement::AuthRequirement;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// Message for requests rejected by a service-only guard.
pub const FORBIDDEN_SERVICES_ONLY: &str = "forbidden: restricted to services";

/// Message for requests rejected by the provider's authorization policy.
pub const FORBIDDEN: &str = "forbidden";

/// State for [`require_auth`].
#[derive(Clone)]
pub struct AuthGuard {
    auth: Arc<Auth>,
    requirements: Arc<[AuthRequirement]>,
    service_only: bool,
}

impl AuthGuard {
    /// Guard for any authenticated caller that satisfies `requirements`.
    pub fn authenticated(auth: Arc<Auth>, requirements: impl Into<Vec<AuthRequirement>>) -> Self {
        let requirements: Vec<AuthRequirement> = requirements.into();
        Self {
            auth,
            requirements: requirements.into(),
            service_only: false,
        }
    }

    /// Guard that additionally restricts the route to service callers.
    pub fn services_only(auth: Arc<Auth>, requirements: impl Into<Vec<AuthRequirement>>) -> Self {
        Self {
            service_only: true,
            ..Self::authenticated(auth, requirements)
        }
    }

    #[must_use]
    pub fn requirements(&self) -> &[AuthRequirement] {
        &self.requirements
    }

    #[must_use]
    pub fn is_service_only(&self) -> bool {
        self.service_only
    }
}

/// Authentication and authorization middleware.
///
/// Mount with `axum::middleware::from_fn_with_state(guard, require_auth)`.
///
/// # Response
///
/// - 401 `unauthorized: <reason>` with `WWW-Authenticate` for rejected tokens
/// - 403 for non-service callers on service-only routes, or denied policy
/// - 500 when validation or the provider fails
#[instrument(skip_all, name = "auth.middleware.require_auth")]
pub async fn require_auth(
    State(guard): State<AuthGuard>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (parts, body) = req.into_parts();

    match guard
        .auth
        .authenticate(&parts.headers)
        .await
        .map_err(ApiError::Internal)?
    {
        AuthOutcome::Authenticated => {}
        AuthOutcome::Rejected(reason) => {
            tracing::debug!(target: "auth.middleware", reason = %reason, "Request rejected: not authenticated");
            return Err(ApiError::Unauthorized(reason.as_str().to_string()));
        }
    }

    if guard.service_only && !guard.auth.is_service_request(&parts) {
        tracing::debug!(target: "auth.middleware", "Request rejected: not a service caller");
        return Err(ApiError::Forbidden(FORBIDDEN_SERVICES_ONLY));
    }

    let authorized = guard
        .auth
        .authorize(&parts, &guard.requirements)
        .await
        .map_err(ApiError::Internal)?;
    if !authorized {
        tracing::debug!(target: "auth.middleware", "Request rejected: not authorized");
        return Err(ApiError::Forbidden(FORBIDDEN));
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}
