use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{IdentityDirectory, RefreshRecord, RefreshTokenRepository, Role, UserAccount};
use crate::error::{AppError, DatabaseError};

/// `refresh_tokens` table access
#[derive(Clone)]
pub struct PgRefreshTokens {
    pool: PgPool,
}

impl PgRefreshTokens {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenRepository for PgRefreshTokens {
    async fn insert(&self, record: &RefreshRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at, is_revoked)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.credential_hash)
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(record.revoked)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshRecord>, AppError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, DateTime<Utc>, DateTime<Utc>, bool)>(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at, is_revoked
            FROM refresh_tokens
            WHERE user_id = $1 AND expires_at > $2 AND is_revoked = false
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, user_id, credential_hash, expires_at, created_at, revoked)| RefreshRecord {
                id,
                user_id,
                credential_hash,
                expires_at,
                created_at,
                revoked,
            })
            .collect())
    }

    async fn revoke_all(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE user_id = $2 AND expires_at > $1 AND is_revoked = false
            "#,
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE id = $2 AND is_revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn rotate(&self, old_id: Uuid, replacement: &RefreshRecord) -> Result<bool, AppError> {
        let now = Utc::now();
        let mut transaction = self.pool.begin().await?;

        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE id = $2 AND is_revoked = false AND expires_at > $1
            "#,
        )
        .bind(now)
        .bind(old_id)
        .execute(&mut transaction)
        .await?;

        if revoked.rows_affected() != 1 {
            transaction.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at, is_revoked)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(replacement.id)
        .bind(replacement.user_id)
        .bind(&replacement.credential_hash)
        .bind(replacement.expires_at)
        .bind(replacement.created_at)
        .bind(replacement.revoked)
        .execute(&mut transaction)
        .await?;

        // Dropping an uncommitted transaction rolls it back
        transaction.commit().await?;
        Ok(true)
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1 OR is_revoked = true")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Read access to the `users` table
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type UserRow = (Uuid, String, String, String, String, bool, DateTime<Utc>);

fn into_account(row: UserRow) -> Result<UserAccount, AppError> {
    let (id, name, email, password_hash, role, is_active, created_at) = row;
    let role = role
        .parse::<Role>()
        .map_err(|e| DatabaseError::CorruptRow(format!("user {}: {}", id, e)))?;

    Ok(UserAccount {
        id,
        name,
        email,
        password_hash,
        role,
        is_active,
        created_at,
    })
}

#[async_trait]
impl IdentityDirectory for PgDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, password_hash, role, is_active, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_account).transpose()
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserAccount>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, password_hash, role, is_active, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_account).transpose()
    }

    async fn record_login(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
