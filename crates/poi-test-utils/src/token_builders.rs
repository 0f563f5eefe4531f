//! Builder patterns for test tokens.
//!
//! Tokens are signed with the fixture RSA key from `common::testing`, so
//! they verify against [`common::testing::rsa_public_jwk`].

use chrono::{Duration, Utc};
use common::jwt::Claims;
use common::testing::{sign_claims, FIXTURE_KID};
use serde_json::{json, Value};

/// Builder for signed test tokens.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .issued_by("https://idp.example/")
///     .for_subject("alice")
///     .expires_in(3600)
///     .sign();
/// ```
pub struct TestTokenBuilder {
    kid: String,
    iss: Option<String>,
    sub: String,
    exp: Option<Value>,
    iat: i64,
    extra: Claims,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults (fixture kid, 1 hour expiry).
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            kid: FIXTURE_KID.to_string(),
            iss: None,
            sub: "test-subject".to_string(),
            exp: Some(json!((now + Duration::seconds(3600)).timestamp())),
            iat: now.timestamp(),
            extra: Claims::new(),
        }
    }

    /// Set the issuer claim
    pub fn issued_by(mut self, iss: &str) -> Self {
        self.iss = Some(iss.to_string());
        self
    }

    /// Set the `kid` header
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = kid.to_string();
        self
    }

    /// Set the subject
    pub fn for_subject(mut self, sub: &str) -> Self {
        self.sub = sub.to_string();
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some(json!((Utc::now() + Duration::seconds(seconds)).timestamp()));
        self
    }

    /// Set `exp` to an arbitrary JSON value
    pub fn with_raw_exp(mut self, exp: Value) -> Self {
        self.exp = Some(exp);
        self
    }

    /// Omit the `exp` claim
    pub fn without_exp(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Add an extra claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON map
    pub fn claims(&self) -> Claims {
        let mut claims = Claims::new();
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("iat".to_string(), json!(self.iat));
        if let Some(iss) = &self.iss {
            claims.insert("iss".to_string(), json!(iss));
        }
        if let Some(exp) = &self.exp {
            claims.insert("exp".to_string(), exp.clone());
        }
        claims.extend(self.extra.clone());
        claims
    }

    /// Sign with the fixture key and return the compact token.
    pub fn sign(self) -> String {
        sign_claims(self.claims(), &self.kid).expect("fixture key should sign")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
