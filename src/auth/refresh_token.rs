/// Refresh Token Management
///
/// Every issued refresh credential is recorded per user so it can be
/// checked and revoked. Records hold:
/// - a bcrypt digest of the credential's SHA-256 fingerprint (never plaintext)
/// - the credential's expiry and a revoked flag
///
/// Validity is checked by comparing the presented credential against each
/// live digest held for the user, so cost grows with the number of
/// concurrent sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::password::PasswordHasher;
use crate::error::{AppError, DatabaseError};

/// One stored refresh credential
#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub credential_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
}

/// Row-level access to the refresh-token table.
///
/// Each method is a single atomic statement or transaction.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert(&self, record: &RefreshRecord) -> Result<(), AppError>;

    /// Records for `user_id` that are neither revoked nor expired at `now`
    async fn find_active(&self, user_id: Uuid, now: DateTime<Utc>)
        -> Result<Vec<RefreshRecord>, AppError>;

    /// Revoke every live record of the user, returning how many changed
    async fn revoke_all(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, AppError>;

    /// Revoke one record if it is still live. `false` means another caller
    /// got there first.
    async fn revoke(&self, id: Uuid) -> Result<bool, AppError>;

    /// Revoke `old_id` and insert `replacement` in one transaction. `false`
    /// means `old_id` was no longer live and nothing was written.
    async fn rotate(&self, old_id: Uuid, replacement: &RefreshRecord) -> Result<bool, AppError>;

    /// Delete records that are expired at `now` or revoked
    async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// SHA-256 hex fingerprint of a credential.
///
/// Signed credentials exceed bcrypt's 72-byte input window, so the adaptive
/// hash is applied to this fixed-length digest instead.
fn fingerprint(credential: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hashing, deadlines and revocation on top of a `RefreshTokenRepository`
#[derive(Clone)]
pub struct RefreshTokenStore {
    repository: Arc<dyn RefreshTokenRepository>,
    hasher: PasswordHasher,
    timeout: Duration,
}

impl RefreshTokenStore {
    pub fn new(
        repository: Arc<dyn RefreshTokenRepository>,
        hasher: PasswordHasher,
        timeout: Duration,
    ) -> Self {
        Self {
            repository,
            hasher,
            timeout,
        }
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    operation = operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Refresh token store call exceeded its deadline"
                );
                Err(DatabaseError::Timeout(operation).into())
            }
        }
    }

    /// Build a fresh record for `credential`, hashing off the async workers
    async fn seal(
        &self,
        user_id: Uuid,
        credential: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshRecord, AppError> {
        let hasher = self.hasher;
        let print = fingerprint(credential);
        let credential_hash = tokio::task::spawn_blocking(move || hasher.hash(&print))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))??;

        Ok(RefreshRecord {
            id: Uuid::new_v4(),
            user_id,
            credential_hash,
            expires_at,
            created_at: Utc::now(),
            revoked: false,
        })
    }

    /// Record a newly issued refresh credential
    pub async fn persist(
        &self,
        user_id: Uuid,
        credential: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let record = self.seal(user_id, credential, expires_at).await?;

        self.with_deadline("persist", self.repository.insert(&record))
            .await?;

        tracing::debug!(user_id = %user_id, record_id = %record.id, "Refresh token recorded");
        Ok(())
    }

    /// Find the live record matching `credential`, if any
    pub async fn find_matching(
        &self,
        user_id: Uuid,
        credential: &str,
    ) -> Result<Option<RefreshRecord>, AppError> {
        let records = self
            .with_deadline("find_active", self.repository.find_active(user_id, Utc::now()))
            .await?;

        if records.is_empty() {
            return Ok(None);
        }

        let hasher = self.hasher;
        let print = fingerprint(credential);
        tokio::task::spawn_blocking(move || {
            records
                .into_iter()
                .find(|record| hasher.verify(&record.credential_hash, &print))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))
    }

    /// Whether `credential` is backed by a live record for `user_id`
    pub async fn is_valid(&self, user_id: Uuid, credential: &str) -> Result<bool, AppError> {
        Ok(self.find_matching(user_id, credential).await?.is_some())
    }

    /// Revoke a single record; `false` when it was already revoked
    pub async fn revoke(&self, record_id: Uuid) -> Result<bool, AppError> {
        self.with_deadline("revoke", self.repository.revoke(record_id))
            .await
    }

    /// Replace a live record with one for `credential`.
    ///
    /// `false` when `old_record_id` was already revoked or expired. On any
    /// error the old record is left as it was.
    pub async fn rotate(
        &self,
        old_record_id: Uuid,
        user_id: Uuid,
        credential: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let record = self.seal(user_id, credential, expires_at).await?;

        let rotated = self
            .with_deadline("rotate", self.repository.rotate(old_record_id, &record))
            .await?;

        if rotated {
            tracing::debug!(
                user_id = %user_id,
                revoked = %old_record_id,
                record_id = %record.id,
                "Refresh token rotated"
            );
        }
        Ok(rotated)
    }

    /// Revoke every live session of the user
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self
            .with_deadline("revoke_all", self.repository.revoke_all(user_id, Utc::now()))
            .await?;

        tracing::info!(user_id = %user_id, revoked = revoked, "All refresh tokens revoked for user");
        Ok(revoked)
    }

    /// Drop expired and revoked records
    pub async fn sweep(&self) -> Result<u64, AppError> {
        let removed = self
            .with_deadline("sweep", self.repository.sweep(Utc::now()))
            .await?;

        tracing::info!(removed = removed, "Refresh token sweep completed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryRefreshTokens;
    use chrono::Duration as ChronoDuration;

    const TEST_COST: u32 = 4;

    fn store_with(repository: Arc<InMemoryRefreshTokens>) -> RefreshTokenStore {
        RefreshTokenStore::new(
            repository,
            PasswordHasher::new(TEST_COST),
            Duration::from_secs(5),
        )
    }

    fn in_a_week() -> DateTime<Utc> {
        Utc::now() + ChronoDuration::days(7)
    }

    #[test]
    fn test_fingerprint() {
        let token = "header.payload.signature";
        let print = fingerprint(token);

        assert_eq!(print, fingerprint(token));
        assert_ne!(print, fingerprint("header.payload.signaturf"));
        assert_eq!(print.len(), 64);
    }

    #[tokio::test]
    async fn test_persist_never_stores_plaintext() {
        let repository = Arc::new(InMemoryRefreshTokens::default());
        let store = store_with(repository.clone());
        let user_id = Uuid::new_v4();

        store
            .persist(user_id, "a.refresh.credential", in_a_week())
            .await
            .expect("Failed to persist");

        let records = repository.snapshot();
        assert_eq!(records.len(), 1);
        assert_ne!(records[0].credential_hash, "a.refresh.credential");
        assert!(!records[0].credential_hash.contains("a.refresh.credential"));
        assert!(records[0].credential_hash.starts_with("$2"));
        assert!(!records[0].revoked);
    }

    #[tokio::test]
    async fn test_is_valid_matches_only_the_issued_credential() {
        let store = store_with(Arc::new(InMemoryRefreshTokens::default()));
        let user_id = Uuid::new_v4();

        store.persist(user_id, "first.credential.sig", in_a_week()).await.unwrap();

        assert!(store.is_valid(user_id, "first.credential.sig").await.unwrap());
        assert!(!store.is_valid(user_id, "other.credential.sig").await.unwrap());
        assert!(!store.is_valid(Uuid::new_v4(), "first.credential.sig").await.unwrap());
    }

    #[tokio::test]
    async fn test_long_credentials_sharing_a_prefix_are_distinct() {
        let store = store_with(Arc::new(InMemoryRefreshTokens::default()));
        let user_id = Uuid::new_v4();
        let prefix = "x".repeat(100);

        store
            .persist(user_id, &format!("{}-one", prefix), in_a_week())
            .await
            .unwrap();

        assert!(!store.is_valid(user_id, &format!("{}-two", prefix)).await.unwrap());
    }

    #[tokio::test]
    async fn test_multiple_sessions_per_user() {
        let store = store_with(Arc::new(InMemoryRefreshTokens::default()));
        let user_id = Uuid::new_v4();

        store.persist(user_id, "laptop.session.sig", in_a_week()).await.unwrap();
        store.persist(user_id, "phone.session.sig", in_a_week()).await.unwrap();

        assert!(store.is_valid(user_id, "laptop.session.sig").await.unwrap());
        assert!(store.is_valid(user_id, "phone.session.sig").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_record_is_invalid() {
        let store = store_with(Arc::new(InMemoryRefreshTokens::default()));
        let user_id = Uuid::new_v4();

        store
            .persist(user_id, "stale.credential.sig", Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();

        assert!(!store.is_valid(user_id, "stale.credential.sig").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all() {
        let store = store_with(Arc::new(InMemoryRefreshTokens::default()));
        let user_id = Uuid::new_v4();
        let other_user = Uuid::new_v4();

        store.persist(user_id, "laptop.session.sig", in_a_week()).await.unwrap();
        store.persist(user_id, "phone.session.sig", in_a_week()).await.unwrap();
        store.persist(other_user, "other.session.sig", in_a_week()).await.unwrap();

        assert_eq!(store.revoke_all(user_id).await.unwrap(), 2);

        assert!(!store.is_valid(user_id, "laptop.session.sig").await.unwrap());
        assert!(!store.is_valid(user_id, "phone.session.sig").await.unwrap());
        assert!(store.is_valid(other_user, "other.session.sig").await.unwrap());

        // Nothing left to revoke
        assert_eq!(store.revoke_all(user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_revoke_single_record_once() {
        let store = store_with(Arc::new(InMemoryRefreshTokens::default()));
        let user_id = Uuid::new_v4();

        store.persist(user_id, "laptop.session.sig", in_a_week()).await.unwrap();
        let record = store
            .find_matching(user_id, "laptop.session.sig")
            .await
            .unwrap()
            .expect("record should match");

        assert!(store.revoke(record.id).await.unwrap());
        assert!(!store.revoke(record.id).await.unwrap());
        assert!(!store.is_valid(user_id, "laptop.session.sig").await.unwrap());
    }

    #[tokio::test]
    async fn test_rotate_replaces_record_once() {
        let store = store_with(Arc::new(InMemoryRefreshTokens::default()));
        let user_id = Uuid::new_v4();

        store.persist(user_id, "first.session.sig", in_a_week()).await.unwrap();
        let record = store
            .find_matching(user_id, "first.session.sig")
            .await
            .unwrap()
            .expect("record should match");

        assert!(store
            .rotate(record.id, user_id, "second.session.sig", in_a_week())
            .await
            .unwrap());
        assert!(!store.is_valid(user_id, "first.session.sig").await.unwrap());
        assert!(store.is_valid(user_id, "second.session.sig").await.unwrap());

        // A replay of the old record writes nothing
        assert!(!store
            .rotate(record.id, user_id, "third.session.sig", in_a_week())
            .await
            .unwrap());
        assert!(!store.is_valid(user_id, "third.session.sig").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_and_revoked() {
        let repository = Arc::new(InMemoryRefreshTokens::default());
        let store = store_with(repository.clone());
        let active_user = Uuid::new_v4();
        let revoked_user = Uuid::new_v4();

        store.persist(active_user, "live.session.sig", in_a_week()).await.unwrap();
        store
            .persist(active_user, "old.session.sig", Utc::now() - ChronoDuration::hours(1))
            .await
            .unwrap();
        store.persist(revoked_user, "gone.session.sig", in_a_week()).await.unwrap();
        store.revoke_all(revoked_user).await.unwrap();

        assert_eq!(store.sweep().await.unwrap(), 2);
        assert_eq!(repository.snapshot().len(), 1);
        assert!(store.is_valid(active_user, "live.session.sig").await.unwrap());
    }

    struct StalledRepository;

    #[async_trait]
    impl RefreshTokenRepository for StalledRepository {
        async fn insert(&self, _record: &RefreshRecord) -> Result<(), AppError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn find_active(
            &self,
            _user_id: Uuid,
            _now: DateTime<Utc>,
        ) -> Result<Vec<RefreshRecord>, AppError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        async fn revoke_all(&self, _user_id: Uuid, _now: DateTime<Utc>) -> Result<u64, AppError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0)
        }

        async fn revoke(&self, _id: Uuid) -> Result<bool, AppError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(false)
        }

        async fn rotate(&self, _old_id: Uuid, _replacement: &RefreshRecord) -> Result<bool, AppError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(false)
        }

        async fn sweep(&self, _now: DateTime<Utc>) -> Result<u64, AppError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_stalled_store_times_out() {
        let store = RefreshTokenStore::new(
            Arc::new(StalledRepository),
            PasswordHasher::new(TEST_COST),
            Duration::from_millis(50),
        );
        let user_id = Uuid::new_v4();

        let result = store.is_valid(user_id, "any.credential.sig").await;
        assert!(matches!(
            result,
            Err(AppError::Database(DatabaseError::Timeout("find_active")))
        ));

        let result = store.revoke_all(user_id).await;
        assert!(matches!(
            result,
            Err(AppError::Database(DatabaseError::Timeout("revoke_all")))
        ));

        let result = store.persist(user_id, "any.credential.sig", in_a_week()).await;
        assert!(matches!(
            result,
            Err(AppError::Database(DatabaseError::Timeout("persist")))
        ));
    }
}
