//! HTTP client that authenticates outbound requests.
//!
//! # Security
//!
//! - Every request carries `Authorization: Bearer <access token>`, replacing
//!   any value the caller set
//! - The header value is marked sensitive so it is not printed by `Debug`
//! - Tokens come from the coalesced refresh, so a burst of requests with an
//!   expired token causes one provider call

use crate::auth::Auth;
use crate::errors::AuthError;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, RequestBuilder, Response};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Default per-request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default connect timeout.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// `reqwest` client wrapper that attaches the service's access token.
#[derive(Clone)]
pub struct AuthClient {
    auth: Arc<Auth>,
    client: Client,
}

impl AuthClient {
    /// Create a client with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Transport` if the HTTP client cannot be built.
    pub fn new(auth: Arc<Auth>) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "auth.client", error = %e, "Failed to build HTTP client");
                AuthError::Transport(e.to_string())
            })?;

        Ok(Self::with_client(auth, client))
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn with_client(auth: Arc<Auth>, client: Client) -> Self {
        Self { auth, client }
    }

    /// Start building a request. Send it with [`AuthClient::send`].
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Build and execute a request created by this client.
    ///
    /// # Errors
    ///
    /// See [`AuthClient::execute`].
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, AuthError> {
        let request = builder.build().map_err(|e| {
            warn!(target: "auth.client", error = %e, "Failed to build outbound request");
            AuthError::Transport(e.to_string())
        })?;
        self.execute(request).await
    }

    /// Attach a valid access token and execute the request.
    ///
    /// # Errors
    ///
    /// - `AuthError::RefreshTimeout` - no token within the configured wait
    /// - `AuthError::TokenRefresh` / `AuthError::MissingAccessToken` - refresh failed
    /// - `AuthError::Transport` - the request could not be sent
    #[instrument(skip_all, fields(method = %request.method(), url = %request.url()))]
    pub async fn execute(&self, mut request: Request) -> Result<Response, AuthError> {
        let token = self.auth.access_token().await?;
        if token.is_empty() {
            return Err(AuthError::MissingAccessToken);
        }

        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.token.expose_secret()))
            .map_err(|_| {
                error!(target: "auth.client", "Access token is not a valid header value");
                AuthError::Transport("access token is not a valid header value".to_string())
            })?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        self.client.execute(request).await.map_err(|e| {
            warn!(target: "auth.client", error = %e, "Outbound request failed");
            AuthError::Transport(e.to_string())
        })
    }
}
