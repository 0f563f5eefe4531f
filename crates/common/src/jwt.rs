//! JWT utilities shared across POI services.
//!
//! This module provides [`Token`], a thin wrapper around a compact JWS
//! (`header.claims.signature`) that supports:
//! - Unverified parsing with a size limit
//! - Header and claim lookups rendered as strings
//! - Verification against a single JWK or a whole JWKS document
//! - Claim upserts and RS256 re-signing
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - `Token::parse_unverified` does NOT verify the signature; nothing read
//!   from an unverified token may be trusted except as a key lookup hint
//! - Only RS256 is accepted for verification and signing
//! - The raw token never appears in `Debug` output
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{Token, HEADER_KID, CLAIM_ISS};
//!
//! let token = Token::parse_unverified(raw)?;
//! let kid = token.header_value(HEADER_KID);
//! let iss = token.claim_value(CLAIM_ISS);
//!
//! // After resolving the key for (kid, iss)
//! token.is_valid(&raw_jwk)?;
//! ```

use crate::secret::{ExposeSecret, SecretString};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens above this size are rejected before any base64 or JSON work is
/// done. Typical RS256 access tokens are well under 2KB.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Header field carrying the signing algorithm.
pub const HEADER_ALG: &str = "alg";

/// Header field carrying the key ID.
pub const HEADER_KID: &str = "kid";

/// Claim carrying the issuer.
pub const CLAIM_ISS: &str = "iss";

/// Claim carrying the expiration time (Unix epoch seconds).
pub const CLAIM_EXP: &str = "exp";

/// JSON object holding a token's claims.
pub type Claims = Map<String, Value>;

// =============================================================================
// Error Types
// =============================================================================

/// Errors produced while parsing, verifying or signing a [`Token`].
///
/// `TooLarge` and `Malformed` are parse failures; `Verification` covers
/// unusable key material as well as signature and structural failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("token exceeds {MAX_JWT_SIZE_BYTES} bytes")]
    TooLarge,

    /// Segment structure, base64 or JSON of the token is invalid.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The token could not be verified against the supplied key material.
    #[error("token verification failed: {0}")]
    Verification(String),

    /// The private key could not be parsed or signing failed.
    #[error("token signing failed: {0}")]
    Signing(String),
}

// =============================================================================
// Algorithms
// =============================================================================

/// Signature algorithms supported for verification and signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 using SHA-256.
    Rs256,
}

impl SignatureAlgorithm {
    /// The JOSE name of the algorithm as it appears in the `alg` header.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureAlgorithm::Rs256 => "RS256",
        }
    }

    /// Resolve an `alg` header value, returning `None` for anything unsupported.
    #[must_use]
    pub fn from_header(alg: &str) -> Option<Self> {
        match alg {
            "RS256" => Some(SignatureAlgorithm::Rs256),
            _ => None,
        }
    }

    fn algorithm(self) -> Algorithm {
        match self {
            SignatureAlgorithm::Rs256 => Algorithm::RS256,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Token
// =============================================================================

/// A compact-serialized JWT.
///
/// Created unverified by [`Token::parse_unverified`]. The verification
/// result of [`Token::is_valid`] is never cached; every call re-verifies.
#[derive(Clone)]
pub struct Token {
    header: Map<String, Value>,
    claims: Claims,
    raw: String,
}

/// Custom Debug implementation that never prints the raw token or claim values.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("header", &self.header)
            .field("claims", &self.claims.keys().collect::<Vec<_>>())
            .field("raw", &"[REDACTED]")
            .finish()
    }
}

impl Token {
    /// Parse a compact token without verifying its signature.
    ///
    /// # Errors
    ///
    /// - `TooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
    /// - `Malformed` - Not three segments, a segment is not base64url, the
    ///   header or claims are not JSON objects, or the header has no `alg`
    pub fn parse_unverified(raw: &str) -> Result<Self, TokenError> {
        // Check token size first (DoS prevention)
        if raw.len() > MAX_JWT_SIZE_BYTES {
            tracing::debug!(
                target: "common.jwt",
                token_size = raw.len(),
                max_size = MAX_JWT_SIZE_BYTES,
                "Token rejected: size exceeds maximum allowed"
            );
            return Err(TokenError::TooLarge);
        }

        let mut segments = raw.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            return Err(TokenError::Malformed(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let header = decode_json_segment(header_b64, "header")?;
        let claims = decode_json_segment(claims_b64, "claims")?;

        URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT signature base64");
            TokenError::Malformed("signature is not base64url".to_string())
        })?;

        if !header.get(HEADER_ALG).is_some_and(Value::is_string) {
            tracing::debug!(target: "common.jwt", "Token rejected: header carries no alg");
            return Err(TokenError::Malformed("header carries no alg".to_string()));
        }

        Ok(Self {
            header,
            claims,
            raw: raw.to_string(),
        })
    }

    /// The compact form this token was parsed from.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Look up a header field rendered as a string.
    ///
    /// Integers render as decimal, floats are rounded to an integer,
    /// strings pass through. Any other JSON type yields `None`.
    #[must_use]
    pub fn header_value(&self, key: &str) -> Option<String> {
        render_value(&self.header, key)
    }

    /// Look up a claim rendered as a string (same rules as [`Token::header_value`]).
    #[must_use]
    pub fn claim_value(&self, key: &str) -> Option<String> {
        render_value(&self.claims, key)
    }

    /// All claims of the token.
    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Verify the token against raw key material.
    ///
    /// `raw_key_material` may be a JWKS document (`{"keys":[...]}`) or a
    /// single JWK. Keys whose `kid` differs from the token's `kid` are
    /// skipped. Expiry is NOT checked here; `nbf` is, when present.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Verification` if the key material is malformed,
    /// the token's algorithm is unsupported, or no key verifies the token.
    pub fn is_valid(&self, raw_key_material: &str) -> Result<(), TokenError> {
        let key_set = parse_key_material(raw_key_material)?;

        let algorithm = self
            .header
            .get(HEADER_ALG)
            .and_then(Value::as_str)
            .and_then(SignatureAlgorithm::from_header)
            .ok_or_else(|| {
                tracing::debug!(target: "common.jwt", "Token uses an unsupported algorithm");
                TokenError::Verification("unsupported signing algorithm".to_string())
            })?;
        let kid = self.header.get(HEADER_KID).and_then(Value::as_str);

        let mut validation = Validation::new(algorithm.algorithm());
        validation.validate_exp = false;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let mut last_error = None;
        for jwk in key_set.keys.iter().filter(|jwk| kid_matches(jwk, kid)) {
            let key = match DecodingKey::from_jwk(jwk) {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!(target: "common.jwt", error = %e, "Skipping unusable JWK");
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            match jsonwebtoken::decode::<Claims>(&self.raw, &key, &validation) {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::debug!(target: "common.jwt", error = %e, "Key did not verify token");
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(TokenError::Verification(last_error.unwrap_or_else(|| {
            "no key in the set matches the token".to_string()
        })))
    }

    /// Add claims, overwriting existing ones with the same name.
    ///
    /// Claims not present in `claims` are left untouched.
    pub fn set_claims(&mut self, claims: Claims) {
        self.claims.extend(claims);
    }

    /// Sign the token's header and claims, returning a new compact token.
    ///
    /// Every header field is carried over; `alg` is replaced and `kid` is
    /// set when provided. The token itself is not modified.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if the private key is empty or cannot
    /// be parsed as an RSA PEM (PKCS#1 or PKCS#8), or if signing fails.
    pub fn sign(
        &self,
        private_key_pem: &SecretString,
        algorithm: SignatureAlgorithm,
        kid: Option<&str>,
    ) -> Result<String, TokenError> {
        let pem = private_key_pem.expose_secret();
        if pem.is_empty() {
            tracing::error!(target: "common.jwt", "Private key is empty");
            return Err(TokenError::Signing("private key is empty".to_string()));
        }

        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            tracing::error!(target: "common.jwt", error = %e, "Failed to parse private key PEM");
            TokenError::Signing(format!("private key could not be parsed: {e}"))
        })?;

        let mut header = self.header.clone();
        header.insert(
            HEADER_ALG.to_string(),
            Value::String(algorithm.as_str().to_string()),
        );
        if let Some(kid) = kid.filter(|kid| !kid.is_empty()) {
            header.insert(HEADER_KID.to_string(), Value::String(kid.to_string()));
        }

        let signing_input = format!(
            "{}.{}",
            encode_json_segment(&header)?,
            encode_json_segment(&self.claims)?
        );

        let signature =
            jsonwebtoken::crypto::sign(signing_input.as_bytes(), &key, algorithm.algorithm())
                .map_err(|e| {
                    tracing::error!(target: "common.jwt", error = %e, "Signing token failed");
                    TokenError::Signing(e.to_string())
                })?;

        Ok(format!("{signing_input}.{signature}"))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn decode_json_segment(segment: &str, name: &str) -> Result<Map<String, Value>, TokenError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", segment = name, error = %e, "Failed to decode JWT segment base64");
        TokenError::Malformed(format!("{name} is not base64url"))
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", segment = name, error = %e, "Failed to parse JWT segment JSON");
        TokenError::Malformed(format!("{name} is not a JSON object"))
    })
}

fn encode_json_segment(map: &Map<String, Value>) -> Result<String, TokenError> {
    let json = serde_json::to_vec(map).map_err(|e| TokenError::Signing(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn render_value(map: &Map<String, Value>, key: &str) -> Option<String> {
    let Some(value) = map.get(key) else {
        tracing::debug!(target: "common.jwt", key = %key, "Key not present in token");
        return None;
    };

    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| format!("{f:.0}"))
            }
        }
        other => {
            tracing::debug!(target: "common.jwt", key = %key, value = %other, "Value cannot be rendered as string");
            None
        }
    }
}

fn parse_key_material(raw: &str) -> Result<JwkSet, TokenError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Key material is not JSON");
        TokenError::Verification("key material is not JSON".to_string())
    })?;

    let key_set = if value.get("keys").is_some() {
        serde_json::from_value::<JwkSet>(value)
    } else {
        serde_json::from_value::<Jwk>(value).map(|jwk| JwkSet { keys: vec![jwk] })
    };

    key_set.map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Key material is not a JWK");
        TokenError::Verification(format!("key material is not a JWK: {e}"))
    })
}

fn kid_matches(jwk: &Jwk, kid: Option<&str>) -> bool {
    match (kid, jwk.common.key_id.as_deref()) {
        (Some(wanted), Some(candidate)) => wanted == candidate,
        _ => true,
    }
}

// =============================================================================
// Tests
// =============================================================================
