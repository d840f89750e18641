use chrono::{DateTime, Utc};
use keystone_auth::TokenKind;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

/// A persisted refresh, reset-password or verify-email token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub id: Uuid,
    /// The encoded token string exactly as handed to the client.
    pub value: String,
    pub subject_id: Uuid,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl<'r> FromRow<'r, PgRow> for TokenRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        let kind = kind.parse::<TokenKind>().map_err(|e| sqlx::Error::ColumnDecode {
            index: "kind".to_string(),
            source: e.into(),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            value: row.try_get("token")?,
            subject_id: row.try_get("user_id")?,
            kind,
            expires_at: row.try_get("expires_at")?,
            revoked: row.try_get("revoked")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewTokenRecord {
    pub value: String,
    pub subject_id: Uuid,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
}
