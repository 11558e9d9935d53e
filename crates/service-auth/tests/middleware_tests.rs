//! Route guard integration tests.
//!
//! Mounts `require_auth` on a small axum router and drives it with
//! `tower::ServiceExt::oneshot`.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use auth_test_utils::{
    test_signing_key, MockAuthProvider, TestTokenBuilder, SERVICE_CALLER_HEADER,
};
use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::from_fn_with_state,
    response::Response,
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use service_auth::{require_auth, Auth, AuthConfig, AuthGuard, AuthRequirement};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

async fn setup(provider: MockAuthProvider) -> (Arc<Auth>, Arc<MockAuthProvider>) {
    let provider = Arc::new(provider.with_keys(vec![test_signing_key("k1")]));
    let auth = Auth::new(provider.clone(), AuthConfig::default(), &CancellationToken::new()).unwrap();
    auth.refresh_keys().await.unwrap();
    (auth, provider)
}

fn router(guard: AuthGuard) -> Router {
    Router::new()
        .route("/protected", get(|| async { "secret" }))
        .layer(from_fn_with_state(guard, require_auth))
}

fn request(token: Option<&str>, service: bool) -> Request<Body> {
    let mut builder = Request::builder().uri("/protected");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    if service {
        builder = builder.header(SERVICE_CALLER_HEADER, "1");
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_authorized_request_reaches_handler() {
    let (auth, provider) = setup(MockAuthProvider::new()).await;
    let app = router(AuthGuard::authenticated(auth, Vec::new()));

    let token = TestTokenBuilder::new().sign();
    let response = app.oneshot(request(Some(&token), false)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"secret");
    assert_eq!(provider.authorize_count(), 1);
}

#[tokio::test]
async fn test_missing_header_is_unauthorized_with_reason() {
    let (auth, provider) = setup(MockAuthProvider::new()).await;
    let app = router(AuthGuard::authenticated(auth, Vec::new()));

    let response = app.oneshot(request(None, false)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("WWW-Authenticate").unwrap(),
        "Bearer error=\"invalid_token\""
    );
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert_eq!(
        body["error"]["message"],
        "unauthorized: missing authorization header"
    );
    assert_eq!(provider.authorize_count(), 0);
}

#[tokio::test]
async fn test_expired_token_is_unauthorized() {
    let (auth, _) = setup(MockAuthProvider::new()).await;
    let app = router(AuthGuard::authenticated(auth, Vec::new()));

    let token = TestTokenBuilder::new().expires_in(-60).sign();
    let response = app.oneshot(request(Some(&token), false)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "unauthorized: token is expired");
}

#[tokio::test]
async fn test_service_only_route_rejects_non_service_caller() {
    let (auth, provider) = setup(MockAuthProvider::new()).await;
    let app = router(AuthGuard::services_only(auth, Vec::new()));

    let token = TestTokenBuilder::new().sign();
    let response = app.oneshot(request(Some(&token), false)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "forbidden: restricted to services");
    assert_eq!(provider.authorize_count(), 0);
}

#[tokio::test]
async fn test_service_only_route_admits_service_caller() {
    let (auth, _) = setup(MockAuthProvider::new()).await;
    let app = router(AuthGuard::services_only(auth, Vec::new()));

    let token = TestTokenBuilder::new().sign();
    let response = app.oneshot(request(Some(&token), true)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_denied_policy_is_forbidden() {
    let (auth, _) = setup(MockAuthProvider::new().denying()).await;
    let app = router(AuthGuard::authenticated(auth, Vec::new()));

    let token = TestTokenBuilder::new().sign();
    let response = app.oneshot(request(Some(&token), false)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "forbidden");
}

#[tokio::test]
async fn test_provider_failure_is_internal_error() {
    let (auth, provider) = setup(MockAuthProvider::new()).await;
    provider.fail_authorize(Some("policy store unreachable"));
    let app = router(AuthGuard::authenticated(auth, Vec::new()));

    let token = TestTokenBuilder::new().sign();
    let response = app.oneshot(request(Some(&token), false)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "internal server error");
    assert!(!body.to_string().contains("policy store"));
}

#[tokio::test]
async fn test_requirements_are_combined_for_provider() {
    let (auth, provider) = setup(MockAuthProvider::new()).await;
    let requirements = vec![
        AuthRequirement::new().with_any_role(["admin"]),
        AuthRequirement::new()
            .with_any_role(["operator"])
            .with_all_permissions(["meetings:write"]),
    ];
    let app = router(AuthGuard::authenticated(auth, requirements));

    let token = TestTokenBuilder::new().sign();
    let response = app.oneshot(request(Some(&token), false)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let combined = provider.last_requirement().unwrap();
    assert_eq!(
        combined,
        AuthRequirement::new()
            .with_any_role(["admin", "operator"])
            .with_all_permissions(["meetings:write"])
    );
}
