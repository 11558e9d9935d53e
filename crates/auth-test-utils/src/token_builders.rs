//! Builder patterns for test token construction
//!
//! Provides a fluent API for signed RS256 tokens plus helpers for the
//! malformed and mis-signed tokens that validation tests need.

use crate::crypto_fixtures::{TestKeyPair, TEST_KID};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

/// Builder for signed test JWTs
///
/// Defaults: `kid = "k1"`, signed with keypair A, issued now, expiring in
/// one hour.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .with_kid("k2")
///     .for_subject("svc-billing")
///     .expires_in(3600)
///     .sign();
/// ```
pub struct TestTokenBuilder {
    kid: Option<String>,
    sub: String,
    exp: Option<i64>,
    iat: Option<i64>,
    nbf: Option<i64>,
    extra: Vec<(String, Value)>,
    key_pair: TestKeyPair,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            kid: Some(TEST_KID.to_string()),
            sub: "test-subject".to_string(),
            exp: Some((now + Duration::hours(1)).timestamp()),
            iat: Some(now.timestamp()),
            nbf: None,
            extra: Vec::new(),
            key_pair: TestKeyPair::A,
        }
    }

    /// Set the `kid` header
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    /// Omit the `kid` header
    pub fn without_kid(mut self) -> Self {
        self.kid = None;
        self
    }

    /// Set the subject
    pub fn for_subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Omit the `exp` claim
    pub fn without_exp(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set issued-at to `seconds` from now (positive for the future)
    pub fn issued_in(mut self, seconds: i64) -> Self {
        self.iat = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set not-before to `seconds` from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Add an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.push((name.to_string(), value));
        self
    }

    /// Sign with a different fixed keypair
    pub fn signed_by(mut self, key_pair: TestKeyPair) -> Self {
        self.key_pair = key_pair;
        self
    }

    /// Build the claims as a JSON value
    pub fn claims(&self) -> Value {
        let mut claims = json!({ "sub": self.sub });
        let map = claims.as_object_mut().expect("claims is an object");
        if let Some(exp) = self.exp {
            map.insert("exp".to_string(), json!(exp));
        }
        if let Some(iat) = self.iat {
            map.insert("iat".to_string(), json!(iat));
        }
        if let Some(nbf) = self.nbf {
            map.insert("nbf".to_string(), json!(nbf));
        }
        for (name, value) in &self.extra {
            map.insert(name.clone(), value.clone());
        }
        claims
    }

    /// Sign as RS256 with the configured keypair
    pub fn sign(self) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.kid.clone();

        let key = EncodingKey::from_rsa_pem(self.key_pair.private_pem().as_bytes())
            .expect("fixture private key parses");
        encode(&header, &self.claims(), &key).expect("RS256 signing succeeds")
    }

    /// Sign as HS256 with a shared secret, keeping the `kid` header.
    ///
    /// Used to exercise algorithm substitution against an RSA key.
    pub fn sign_hs256(self, secret: &[u8]) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = self.kid.clone();

        encode(&header, &self.claims(), &EncodingKey::from_secret(secret))
            .expect("HS256 signing succeeds")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble a token from raw header and claims JSON with a dummy signature.
///
/// For header shapes `jsonwebtoken` refuses to produce, such as a missing
/// `alg`.
pub fn raw_token(header: &Value, claims: &Value) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode("signature")
    )
}
