//! JWK and JWKS wire types.
//!
//! Deserialized from the identity provider's `/.well-known/jwks.json`
//! document. Absent and empty fields are omitted when serialized, so a key
//! read from the cache serializes to the same JSON it was added with.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single JSON Web Key.
///
/// `iss` is a non-standard field used to scope cached keys to the issuer
/// whose JWKS document they were fetched from.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key use (`sig` for signing keys).
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Key type (`RSA`, `EC`, `OKP`, `oct`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kty: String,

    /// Key ID. A key with an empty `kid` is never cached.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kid: String,

    /// Issuer the key belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub iss: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Symmetric key value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// Private exponent. Its presence marks a private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,

    /// X.509 certificate chain (base64 DER).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,
}

impl Jwk {
    /// Whether the key carries private material.
    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }
}

/// Custom Debug implementation that redacts private key material.
impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |field: &Option<String>| field.as_ref().map(|_| "[REDACTED]");

        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("kid", &self.kid)
            .field("iss", &self.iss)
            .field("alg", &self.alg)
            .field("use", &self.key_use)
            .field("crv", &self.crv)
            .field("n", &self.n)
            .field("e", &self.e)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("k", &redact(&self.k))
            .field("d", &redact(&self.d))
            .field("p", &redact(&self.p))
            .field("q", &redact(&self.q))
            .field("dp", &redact(&self.dp))
            .field("dq", &redact(&self.dq))
            .field("qi", &redact(&self.qi))
            .field("x5c", &self.x5c.as_ref().map(Vec::len))
            .finish()
    }
}

/// A JWKS document: an ordered list of keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}
