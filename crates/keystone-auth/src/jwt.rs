//! HS256 token codec.
//!
//! Tokens are JWTs signed with a single shared secret. Decoding is pinned to
//! HS256: a token whose header declares any other algorithm is rejected
//! before its signature is considered, which closes the algorithm-confusion
//! hole (`alg: none`, or an asymmetric algorithm verified with the HMAC key).
//!
//! Expiry is checked against the wall clock at decode time with no leeway.
//!
//! # Example
//!
//! ```ignore
//! use chrono::Duration;
//! use keystone_auth::{TokenKind, decode_token, encode_token};
//!
//! let (token, expires) = encode_token("user-id", TokenKind::Access, Duration::minutes(30), secret)?;
//! let claims = decode_token(&token, secret)?;
//! assert_eq!(claims.kind, TokenKind::Access);
//! ```

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::claims::{Claims, TokenKind};
use crate::error::TokenError;

pub const ALGORITHM: Algorithm = Algorithm::HS256;

fn validation() -> Validation {
    let mut validation = Validation::new(ALGORITHM);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation
}

/// Signs a token for `subject` that expires `ttl` from now.
///
/// Returns the encoded token and its expiry time.
///
/// # Errors
///
/// Returns [`TokenError::Internal`] if signing fails.
pub fn encode_token(
    subject: &str,
    kind: TokenKind,
    ttl: Duration,
    secret: &str,
) -> Result<(String, DateTime<Utc>), TokenError> {
    let issued_at = Utc::now();
    let expires_at = issued_at + ttl;

    let claims = Claims {
        sub: subject.to_string(),
        kind,
        iat: issued_at.timestamp(),
        exp: expires_at.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::new(ALGORITHM),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| TokenError::Internal(anyhow!("failed to sign {} token: {}", kind, e)))?;

    Ok((token, expires_at))
}

/// Verifies the signature and expiry of `token` and returns its claims.
///
/// # Errors
///
/// - [`TokenError::InvalidSignature`] for a bad signature or an unexpected algorithm
/// - [`TokenError::Expired`] once the current time passes `exp`
/// - [`TokenError::Malformed`] for anything that is not a well-formed token
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, TokenError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName => TokenError::InvalidSignature,
        _ => TokenError::Malformed,
    })
}

/// Like [`decode_token`], but also requires the token to be of `expected` kind.
pub fn verify_token_kind(
    token: &str,
    expected: TokenKind,
    secret: &str,
) -> Result<Claims, TokenError> {
    let claims = decode_token(token, secret)?;

    if claims.kind != expected {
        return Err(TokenError::KindMismatch {
            expected,
            actual: claims.kind,
        });
    }

    Ok(claims)
}
