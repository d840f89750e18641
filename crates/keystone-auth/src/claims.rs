//! Claim structures carried inside every signed token.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Purpose a token was minted for. A token is only ever accepted by the
/// operation matching its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    Access,
    Refresh,
    ResetPassword,
    VerifyEmail,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::ResetPassword => "reset-password",
            TokenKind::VerifyEmail => "verify-email",
        }
    }

    /// Kinds that are persisted and can be looked up or revoked.
    pub fn is_stateful(self) -> bool {
        !matches!(self, TokenKind::Access)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(TokenKind::Access),
            "refresh" => Ok(TokenKind::Refresh),
            "reset-password" => Ok(TokenKind::ResetPassword),
            "verify-email" => Ok(TokenKind::VerifyEmail),
            other => Err(format!("unknown token kind {other:?}")),
        }
    }
}

/// JWT payload.
///
/// - `sub`: subject identity (user id)
/// - `kind`: serialized as `type`
/// - `iat` / `exp`: Unix timestamps in seconds
/// - `jti`: random id so tokens minted in the same second never collide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(serde_json::to_string(&TokenKind::ResetPassword).unwrap(), r#""reset-password""#);
        assert_eq!(serde_json::to_string(&TokenKind::VerifyEmail).unwrap(), r#""verify-email""#);
        for kind in [
            TokenKind::Access,
            TokenKind::Refresh,
            TokenKind::ResetPassword,
            TokenKind::VerifyEmail,
        ] {
            assert_eq!(kind.as_str().parse::<TokenKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_only_access_is_stateless() {
        assert!(!TokenKind::Access.is_stateful());
        assert!(TokenKind::Refresh.is_stateful());
        assert!(TokenKind::ResetPassword.is_stateful());
    }

    #[test]
    fn test_claims_use_type_key() {
        let claims = Claims {
            sub: "user-1".to_string(),
            kind: TokenKind::Refresh,
            iat: 1_700_000_000,
            exp: 1_700_000_600,
            jti: "abc".to_string(),
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["type"], "refresh");
        assert_eq!(json["sub"], "user-1");
    }
}
