//! Service authentication library.
//!
//! Validates inbound bearer tokens against a rotating set of provider-issued
//! signing keys, and keeps an outbound access token fresh across concurrent
//! use. Policy and key/token issuance are delegated to an integrator-supplied
//! [`AuthProvider`].
//!
//! # Architecture
//!
//! ```text
//! inbound:  middleware -> Auth::authenticate -> JwtValidator -> KeyCache
//! outbound: AuthClient -> Auth::access_token -> singleflight -> AccessTokenCache
//! background: lifecycle scheduler -> Auth::refresh_keys / token refresh
//! ```
//!
//! # Modules
//!
//! - `auth` - The [`Auth`] facade and refresh operations
//! - `bearer` - `Authorization` header parsing
//! - `client` - Authenticated `reqwest` client
//! - `config` - Timings from environment
//! - `errors` - Infrastructure errors and HTTP mapping
//! - `keys` - Signing key cache and await-key protocol
//! - `lifecycle` - Background refresh scheduler
//! - `middleware` - Axum route guard
//! - `outcome` - Client-safe rejection reasons
//! - `provider` - The provider contract
//! - `requirement` - Authorization requirements
//! - `singleflight` - Refresh coalescing
//! - `token` - Outbound access token cache
//! - `validator` - JWT validation

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod bearer;
pub mod client;
pub mod config;
pub mod errors;
pub mod keys;
pub mod lifecycle;
pub mod middleware;
pub mod outcome;
pub mod provider;
pub mod requirement;
pub mod singleflight;
pub mod token;
pub mod validator;

pub use auth::Auth;
pub use bearer::{extract_bearer_token, parse_claims_from_headers, ClaimsError};
pub use client::AuthClient;
pub use config::{AuthConfig, ConfigError};
pub use errors::{ApiError, AuthError, ProviderError};
pub use keys::{KeyCache, SigningKey};
pub use lifecycle::LifecycleState;
pub use middleware::{require_auth, AuthGuard};
pub use outcome::{AuthOutcome, RejectReason};
pub use provider::{AuthProvider, KeyRefresh, TokenRefresh};
pub use requirement::AuthRequirement;
pub use token::{AccessToken, AccessTokenCache};
pub use validator::JwtValidator;
