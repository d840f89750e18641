use thiserror::Error;

use crate::claims::TokenKind;

/// Why a token could not be issued or was not accepted.
///
/// Every variant except [`TokenError::Internal`] is a rejection of the
/// presented credential. Callers outside the service boundary must collapse
/// rejections into one generic message; see [`TokenError::is_rejection`].
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is malformed")]
    Malformed,

    #[error("expected a {expected} token, got {actual}")]
    KindMismatch {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("token not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl TokenError {
    pub fn is_rejection(&self) -> bool {
        !matches!(self, TokenError::Internal(_))
    }
}
