use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::auth::{IdentityDirectory, RefreshRecord, RefreshTokenRepository, UserAccount};
use crate::error::AppError;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("In-memory store lock poisoned".to_string()))
}

/// Refresh-token table held in process memory
#[derive(Default)]
pub struct InMemoryRefreshTokens {
    records: Mutex<Vec<RefreshRecord>>,
}

impl InMemoryRefreshTokens {
    /// Copy of every stored record, revoked and expired ones included
    pub fn snapshot(&self) -> Vec<RefreshRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RefreshTokenRepository for InMemoryRefreshTokens {
    async fn insert(&self, record: &RefreshRecord) -> Result<(), AppError> {
        let mut records = lock(&self.records)?;
        if records.iter().any(|r| r.credential_hash == record.credential_hash) {
            return Err(AppError::Internal("Duplicate refresh token hash".to_string()));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshRecord>, AppError> {
        Ok(lock(&self.records)?
            .iter()
            .filter(|r| r.user_id == user_id && !r.revoked && r.expires_at > now)
            .cloned()
            .collect())
    }

    async fn revoke_all(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut revoked = 0;
        for record in lock(&self.records)?
            .iter_mut()
            .filter(|r| r.user_id == user_id && !r.revoked && r.expires_at > now)
        {
            record.revoked = true;
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, AppError> {
        let mut records = lock(&self.records)?;
        match records.iter_mut().find(|r| r.id == id && !r.revoked) {
            Some(record) => {
                record.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn rotate(&self, old_id: Uuid, replacement: &RefreshRecord) -> Result<bool, AppError> {
        let mut records = lock(&self.records)?;
        let now = Utc::now();

        // Validate the insert before touching the old record
        if records
            .iter()
            .any(|r| r.credential_hash == replacement.credential_hash)
        {
            return Err(AppError::Internal("Duplicate refresh token hash".to_string()));
        }

        match records
            .iter_mut()
            .find(|r| r.id == old_id && !r.revoked && r.expires_at > now)
        {
            Some(old) => old.revoked = true,
            None => return Ok(false),
        }
        records.push(replacement.clone());
        Ok(true)
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut records = lock(&self.records)?;
        let before = records.len();
        records.retain(|r| !r.revoked && r.expires_at > now);
        Ok((before - records.len()) as u64)
    }
}

/// User directory held in process memory, keyed by account id
#[derive(Default)]
pub struct InMemoryDirectory {
    accounts: Mutex<HashMap<Uuid, UserAccount>>,
    logins: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl InMemoryDirectory {
    pub fn with_accounts(accounts: impl IntoIterator<Item = UserAccount>) -> Self {
        Self {
            accounts: Mutex::new(accounts.into_iter().map(|a| (a.id, a)).collect()),
            logins: Mutex::new(HashMap::new()),
        }
    }

    pub fn upsert(&self, account: UserAccount) -> Result<(), AppError> {
        lock(&self.accounts)?.insert(account.id, account);
        Ok(())
    }

    pub fn last_login(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.logins
            .lock()
            .ok()
            .and_then(|logins| logins.get(&user_id).copied())
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, AppError> {
        Ok(lock(&self.accounts)?
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserAccount>, AppError> {
        Ok(lock(&self.accounts)?.get(&user_id).cloned())
    }

    async fn record_login(&self, user_id: Uuid) -> Result<(), AppError> {
        lock(&self.logins)?.insert(user_id, Utc::now());
        Ok(())
    }
}
