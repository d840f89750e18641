//! Persistence for stateful tokens (refresh, reset-password, verify-email).
//!
//! Access tokens are never stored. Every other token is recorded on issue
//! and must still be present when it is presented, which is what makes
//! logout, rotation and password reset able to revoke a credential that is
//! otherwise cryptographically valid.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use keystone_auth::TokenKind;
use keystone_models::{NewTokenRecord, TokenRecord};
use sqlx::PgPool;
use uuid::Uuid;

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create(&self, token: NewTokenRecord) -> anyhow::Result<TokenRecord>;

    /// Looks up a live (unrevoked, unexpired) record by its exact token string and kind.
    async fn find(&self, value: &str, kind: TokenKind) -> anyhow::Result<Option<TokenRecord>>;

    /// Deletes one record. Returns `false` if it was already gone, so of two
    /// concurrent deletes of the same record exactly one sees `true`.
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn delete_by_subject_and_kind(
        &self,
        subject_id: Uuid,
        kind: TokenKind,
    ) -> anyhow::Result<u64>;

    /// Marks a record revoked without deleting it.
    async fn revoke(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn delete_expired(&self) -> anyhow::Result<u64>;
}

const TOKEN_COLUMNS: &str = "id, token, user_id, kind, expires_at, revoked, created_at";

pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn create(&self, token: NewTokenRecord) -> anyhow::Result<TokenRecord> {
        let record = sqlx::query_as::<_, TokenRecord>(&format!(
            "INSERT INTO tokens (id, token, user_id, kind, expires_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&token.value)
        .bind(token.subject_id)
        .bind(token.kind.as_str())
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find(&self, value: &str, kind: TokenKind) -> anyhow::Result<Option<TokenRecord>> {
        let record = sqlx::query_as::<_, TokenRecord>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens \
             WHERE token = $1 AND kind = $2 AND revoked = FALSE AND expires_at > NOW()"
        ))
        .bind(value)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_subject_and_kind(
        &self,
        subject_id: Uuid,
        kind: TokenKind,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE user_id = $1 AND kind = $2")
            .bind(subject_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn revoke(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE tokens SET revoked = TRUE WHERE id = $1 AND revoked = FALSE")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at <= NOW() OR revoked = TRUE")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Process-local store keyed by token string.
#[derive(Default)]
pub struct InMemoryTokenStore {
    records: Mutex<HashMap<String, TokenRecord>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, TokenRecord>>> {
        self.records
            .lock()
            .map_err(|_| anyhow!("token store lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.records().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn create(&self, token: NewTokenRecord) -> anyhow::Result<TokenRecord> {
        let record = TokenRecord {
            id: Uuid::new_v4(),
            value: token.value,
            subject_id: token.subject_id,
            kind: token.kind,
            expires_at: token.expires_at,
            revoked: false,
            created_at: Utc::now(),
        };

        let mut records = self.records()?;
        if records.contains_key(&record.value) {
            return Err(anyhow!("duplicate token value"));
        }
        records.insert(record.value.clone(), record.clone());
        Ok(record)
    }

    async fn find(&self, value: &str, kind: TokenKind) -> anyhow::Result<Option<TokenRecord>> {
        let now = Utc::now();
        Ok(self
            .records()?
            .get(value)
            .filter(|r| r.kind == kind && !r.revoked && !r.is_expired_at(now))
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|_, r| r.id != id);
        Ok(records.len() < before)
    }

    async fn delete_by_subject_and_kind(
        &self,
        subject_id: Uuid,
        kind: TokenKind,
    ) -> anyhow::Result<u64> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|_, r| !(r.subject_id == subject_id && r.kind == kind));
        Ok((before - records.len()) as u64)
    }

    async fn revoke(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut records = self.records()?;
        match records.values_mut().find(|r| r.id == id && !r.revoked) {
            Some(record) => {
                record.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_expired(&self) -> anyhow::Result<u64> {
        let now = Utc::now();
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|_, r| !r.revoked && !r.is_expired_at(now));
        Ok((before - records.len()) as u64)
    }
}
