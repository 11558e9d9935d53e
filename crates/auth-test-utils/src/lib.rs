//! # Auth Test Utilities
//!
//! Shared test utilities for the `service-auth` crate.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed RSA keypairs)
//! - Test data builders (`TestTokenBuilder`, `raw_token`)
//! - A scriptable provider (`MockAuthProvider`)
//! - Custom assertions (`OutcomeAssertions` trait)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let provider = Arc::new(MockAuthProvider::new().with_keys(vec![test_signing_key("k1")]));
//!     let auth = Auth::new(provider, AuthConfig::default(), &CancellationToken::new())?;
//!     auth.refresh_keys().await?;
//!
//!     let token = TestTokenBuilder::new().with_kid("k1").sign();
//!     auth.validate_token(&token).await.assert_authenticated();
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;
pub mod mock_provider;
pub mod token_builders;

// Re-export commonly used items
pub use assertions::*;
pub use crypto_fixtures::*;
pub use mock_provider::*;
pub use token_builders::*;
