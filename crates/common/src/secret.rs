//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for bearer tokens and any other
//! credential the services hold. `SecretString` redacts itself in `Debug`, so
//! a struct deriving `Debug` that contains one is safe to log.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct OutboundCredential {
//!     audience: String,
//!     token: SecretString,
//! }
//!
//! let credential = OutboundCredential {
//!     audience: "billing".to_string(),
//!     token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! // Safe: token is redacted
//! println!("{:?}", credential);
//!
//! // Reading the value must be explicit
//! let token: &str = credential.token.expose_secret();
//! ```
//!
//! Use `SecretString` for:
//! - Access tokens presented to other services
//! - Bearer tokens received from callers
//! - Client secrets and API keys

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
