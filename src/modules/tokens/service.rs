use std::sync::Arc;

use anyhow::anyhow;
use chrono::Duration;
use keystone_auth::{Claims, TokenError, TokenKind, encode_token, verify_token_kind};
use keystone_config::JwtConfig;
use keystone_models::{AuthTokens, NewTokenRecord, TokenGrant, TokenRecord};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::store::TokenStore;

/// Issues, verifies, rotates and revokes tokens.
///
/// Access tokens are stateless and only ever checked by signature and
/// expiry. Refresh, reset-password and verify-email tokens are also
/// recorded in the [`TokenStore`] and are accepted only while that record
/// exists.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    config: JwtConfig,
}

impl TokenService {
    pub fn new(store: Arc<dyn TokenStore>, config: JwtConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn ttl_for(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => Duration::minutes(self.config.access_expiration_minutes),
            TokenKind::Refresh => Duration::days(self.config.refresh_expiration_days),
            TokenKind::ResetPassword => {
                Duration::minutes(self.config.reset_password_expiration_minutes)
            }
            TokenKind::VerifyEmail => Duration::minutes(self.config.verify_email_expiration_minutes),
        }
    }

    /// Signature, expiry and kind check for a bearer credential. No I/O.
    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        verify_token_kind(token, TokenKind::Access, &self.config.secret)
    }

    #[instrument(skip(self))]
    pub async fn issue_auth_token_pair(&self, subject_id: Uuid) -> Result<AuthTokens, TokenError> {
        let subject = subject_id.to_string();

        let (access, access_expires) = encode_token(
            &subject,
            TokenKind::Access,
            self.ttl_for(TokenKind::Access),
            &self.config.secret,
        )?;
        let refresh = self
            .issue_stored(subject_id, TokenKind::Refresh, self.ttl_for(TokenKind::Refresh))
            .await?;

        Ok(AuthTokens {
            access: TokenGrant {
                token: access,
                expires: access_expires,
            },
            refresh,
        })
    }

    /// Issues a persisted reset-password or verify-email token.
    #[instrument(skip(self))]
    pub async fn issue_single_use_token(
        &self,
        subject_id: Uuid,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<TokenGrant, TokenError> {
        if !matches!(kind, TokenKind::ResetPassword | TokenKind::VerifyEmail) {
            return Err(TokenError::Internal(anyhow!(
                "{kind} tokens are not single-use"
            )));
        }

        self.issue_stored(subject_id, kind, ttl).await
    }

    async fn issue_stored(
        &self,
        subject_id: Uuid,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<TokenGrant, TokenError> {
        let (token, expires) = encode_token(&subject_id.to_string(), kind, ttl, &self.config.secret)?;

        self.store
            .create(NewTokenRecord {
                value: token.clone(),
                subject_id,
                kind,
                expires_at: expires,
            })
            .await?;

        Ok(TokenGrant { token, expires })
    }

    /// Two-phase verification: the codec check, then the store lookup by the
    /// literal token string and kind.
    #[instrument(skip(self, token))]
    pub async fn verify(
        &self,
        token: &str,
        expected_kind: TokenKind,
    ) -> Result<TokenRecord, TokenError> {
        let result = self.verify_inner(token, expected_kind).await;
        if let Err(err) = &result {
            debug!(kind = %expected_kind, error = %err, "Token verification failed");
        }
        result
    }

    async fn verify_inner(
        &self,
        token: &str,
        expected_kind: TokenKind,
    ) -> Result<TokenRecord, TokenError> {
        let claims = verify_token_kind(token, expected_kind, &self.config.secret)?;

        let record = self
            .store
            .find(token, expected_kind)
            .await?
            .ok_or(TokenError::NotFound)?;

        if record.subject_id.to_string() != claims.sub {
            return Err(TokenError::Malformed);
        }

        Ok(record)
    }

    /// Exchanges a refresh token for a new pair. The old record is deleted
    /// before the new pair is issued; if another rotation of the same token
    /// won the delete, this one fails with [`TokenError::NotFound`].
    #[instrument(skip(self, old_refresh_token))]
    pub async fn rotate_refresh(&self, old_refresh_token: &str) -> Result<AuthTokens, TokenError> {
        let record = self.verify(old_refresh_token, TokenKind::Refresh).await?;

        if !self.store.delete(record.id).await? {
            debug!(subject_id = %record.subject_id, "Refresh token already consumed");
            return Err(TokenError::NotFound);
        }

        self.issue_auth_token_pair(record.subject_id).await
    }

    /// Verifies a single-use token and deletes its record in the same call.
    /// Of any number of concurrent redemptions of one token, only the caller
    /// whose delete removed the record gets it back; the rest see
    /// [`TokenError::NotFound`].
    #[instrument(skip(self, token))]
    pub async fn consume(&self, token: &str, kind: TokenKind) -> Result<TokenRecord, TokenError> {
        let record = self.verify(token, kind).await?;

        if !self.store.delete(record.id).await? {
            debug!(subject_id = %record.subject_id, %kind, "Token already consumed");
            return Err(TokenError::NotFound);
        }

        Ok(record)
    }

    /// Logout: verifies a refresh token and marks it revoked. The record
    /// itself is removed by the next [`purge_expired`](Self::purge_expired).
    #[instrument(skip(self, refresh_token))]
    pub async fn revoke_refresh(&self, refresh_token: &str) -> Result<(), TokenError> {
        let record = self.verify(refresh_token, TokenKind::Refresh).await?;

        if !self.store.revoke(record.id).await? {
            return Err(TokenError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn invalidate_all_of_kind(
        &self,
        subject_id: Uuid,
        kind: TokenKind,
    ) -> Result<u64, TokenError> {
        let removed = self.store.delete_by_subject_and_kind(subject_id, kind).await?;
        debug!(removed, "Invalidated tokens");
        Ok(removed)
    }

    pub async fn purge_expired(&self) -> Result<u64, TokenError> {
        Ok(self.store.delete_expired().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tokens::store::InMemoryTokenStore;

    const SECRET: &str = "token-service-test-secret";

    fn service() -> TokenService {
        TokenService::new(Arc::new(InMemoryTokenStore::new()), JwtConfig::new(SECRET))
    }

    #[tokio::test]
    async fn test_pair_persists_only_refresh() {
        let store = Arc::new(InMemoryTokenStore::new());
        let service = TokenService::new(store.clone(), JwtConfig::new(SECRET));
        let subject = Uuid::new_v4();

        let tokens = service.issue_auth_token_pair(subject).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(service.verify_access(&tokens.access.token).unwrap().sub, subject.to_string());
        let record = service.verify(&tokens.refresh.token, TokenKind::Refresh).await.unwrap();
        assert_eq!(record.subject_id, subject);
        assert!(tokens.refresh.expires > tokens.access.expires);
    }

    #[tokio::test]
    async fn test_access_token_rejected_where_refresh_expected() {
        let service = service();
        let tokens = service.issue_auth_token_pair(Uuid::new_v4()).await.unwrap();

        assert!(matches!(
            service.verify(&tokens.access.token, TokenKind::Refresh).await,
            Err(TokenError::KindMismatch { .. })
        ));
        assert!(service.verify_access(&tokens.refresh.token).is_err());
    }

    #[tokio::test]
    async fn test_valid_signature_but_unknown_to_store() {
        let service = service();
        let (token, _) = encode_token(
            &Uuid::new_v4().to_string(),
            TokenKind::Refresh,
            Duration::days(1),
            SECRET,
        )
        .unwrap();

        assert!(matches!(
            service.verify(&token, TokenKind::Refresh).await,
            Err(TokenError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_rotation_is_single_use() {
        let service = service();
        let tokens = service.issue_auth_token_pair(Uuid::new_v4()).await.unwrap();

        let rotated = service.rotate_refresh(&tokens.refresh.token).await.unwrap();
        assert_ne!(rotated.refresh.token, tokens.refresh.token);

        assert!(matches!(
            service.rotate_refresh(&tokens.refresh.token).await,
            Err(TokenError::NotFound)
        ));
        assert!(service.verify(&rotated.refresh.token, TokenKind::Refresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let service = service();
        let tokens = service.issue_auth_token_pair(Uuid::new_v4()).await.unwrap();

        let (a, b) = tokio::join!(
            service.rotate_refresh(&tokens.refresh.token),
            service.rotate_refresh(&tokens.refresh.token)
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    }

    #[tokio::test]
    async fn test_single_use_kinds_only() {
        let service = service();
        let subject = Uuid::new_v4();

        assert!(
            service
                .issue_single_use_token(subject, TokenKind::Refresh, Duration::minutes(5))
                .await
                .is_err()
        );

        let grant = service
            .issue_single_use_token(subject, TokenKind::VerifyEmail, Duration::minutes(5))
            .await
            .unwrap();
        assert!(service.verify(&grant.token, TokenKind::VerifyEmail).await.is_ok());
        assert!(service.verify(&grant.token, TokenKind::ResetPassword).await.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_all_of_kind() {
        let service = service();
        let subject = Uuid::new_v4();
        let ttl = service.ttl_for(TokenKind::ResetPassword);

        let first = service
            .issue_single_use_token(subject, TokenKind::ResetPassword, ttl)
            .await
            .unwrap();
        let second = service
            .issue_single_use_token(subject, TokenKind::ResetPassword, ttl)
            .await
            .unwrap();
        let refresh = service.issue_auth_token_pair(subject).await.unwrap().refresh;

        let removed = service
            .invalidate_all_of_kind(subject, TokenKind::ResetPassword)
            .await
            .unwrap();

        assert_eq!(removed, 2);
        for grant in [first, second] {
            assert!(matches!(
                service.verify(&grant.token, TokenKind::ResetPassword).await,
                Err(TokenError::NotFound)
            ));
        }
        assert!(service.verify(&refresh.token, TokenKind::Refresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_refresh_twice() {
        let service = service();
        let tokens = service.issue_auth_token_pair(Uuid::new_v4()).await.unwrap();

        service.revoke_refresh(&tokens.refresh.token).await.unwrap();
        assert!(matches!(
            service.revoke_refresh(&tokens.refresh.token).await,
            Err(TokenError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let service = service();
        let grant = service
            .issue_single_use_token(Uuid::new_v4(), TokenKind::ResetPassword, Duration::minutes(5))
            .await
            .unwrap();

        service.consume(&grant.token, TokenKind::ResetPassword).await.unwrap();

        assert!(matches!(
            service.consume(&grant.token, TokenKind::ResetPassword).await,
            Err(TokenError::NotFound)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_has_one_winner() {
        let service = service();
        let grant = service
            .issue_single_use_token(Uuid::new_v4(), TokenKind::VerifyEmail, Duration::minutes(5))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let token = grant.token.clone();
                tokio::spawn(async move { service.consume(&token, TokenKind::VerifyEmail).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_ttls_follow_config() {
        let service = service();
        assert_eq!(service.ttl_for(TokenKind::Access), Duration::minutes(30));
        assert_eq!(service.ttl_for(TokenKind::Refresh), Duration::days(30));
        assert_eq!(service.ttl_for(TokenKind::ResetPassword), Duration::minutes(10));
    }
}
