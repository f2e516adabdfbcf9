/// Session lifecycle: login, refresh and logout
///
/// A session moves Anonymous -> Authenticated on login, stays Authenticated
/// across refreshes (new access credential each time), and ends once its
/// refresh record is revoked or its credentials expire. Only a new login
/// starts another one.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::claims::TokenKind;
use crate::auth::identity::{IdentityDirectory, PublicUser, UserAccount};
use crate::auth::jwt::TokenCodec;
use crate::auth::password::PasswordHasher;
use crate::auth::refresh_token::RefreshTokenStore;
use crate::error::{AppError, AuthError};

/// Hashed at startup so an unknown email costs as much as a wrong password
const FALLBACK_SECRET: &str = "bookwork-no-such-account";

/// Credentials handed to the client after login. Never persisted as a unit.
#[derive(Debug, Clone)]
pub struct SessionCredentialPair {
    pub access_credential: String,
    pub refresh_credential: String,
    pub access_lifetime_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub credentials: SessionCredentialPair,
    pub access_expires_at: DateTime<Utc>,
    pub user: PublicUser,
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub access_credential: String,
    pub access_expires_at: DateTime<Utc>,
    /// Present only when refresh credentials rotate on use
    pub refresh_credential: Option<String>,
}

#[derive(Clone)]
pub struct SessionManager {
    codec: Arc<TokenCodec>,
    hasher: PasswordHasher,
    store: RefreshTokenStore,
    directory: Arc<dyn IdentityDirectory>,
    rotate_refresh_tokens: bool,
    fallback_digest: Arc<str>,
}

impl SessionManager {
    pub fn new(
        codec: Arc<TokenCodec>,
        hasher: PasswordHasher,
        store: RefreshTokenStore,
        directory: Arc<dyn IdentityDirectory>,
    ) -> Self {
        let fallback_digest = hasher.hash(FALLBACK_SECRET).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to prepare fallback password digest");
            String::new()
        });

        Self {
            codec,
            hasher,
            store,
            directory,
            rotate_refresh_tokens: false,
            fallback_digest: fallback_digest.into(),
        }
    }

    /// Revoke the presented refresh credential and hand out a new one on every refresh
    pub fn with_rotation(mut self, rotate: bool) -> Self {
        self.rotate_refresh_tokens = rotate;
        self
    }

    pub fn codec(&self) -> Arc<TokenCodec> {
        self.codec.clone()
    }

    pub fn store(&self) -> &RefreshTokenStore {
        &self.store
    }

    /// Authenticate with email and password.
    ///
    /// Unknown email, inactive account and wrong password are indistinguishable
    /// to the caller. Every path pays for one bcrypt verification.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AppError> {
        let account = self.directory.find_by_email(email).await?;

        let digest = match &account {
            Some(account) => account.password_hash.clone(),
            None => self.fallback_digest.to_string(),
        };
        let password_matches = self.verify_password(digest, password).await?;

        let account = match account {
            Some(account) if !account.is_active => {
                tracing::warn!(user_id = %account.id, "Login attempt on inactive account");
                return Err(AuthError::InvalidCredentials.into());
            }
            Some(account) if password_matches => account,
            Some(account) => {
                tracing::warn!(user_id = %account.id, "Login attempt with wrong password");
                return Err(AuthError::InvalidCredentials.into());
            }
            None => {
                tracing::warn!("Login attempt for unknown email");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let identity = account.identity();
        let access_lifetime = self.codec.lifetime(TokenKind::Access);
        let (access_credential, access_claims) =
            self.codec.issue(&identity, TokenKind::Access, access_lifetime)?;
        let (refresh_credential, refresh_claims) = self.codec.issue(
            &identity,
            TokenKind::Refresh,
            self.codec.lifetime(TokenKind::Refresh),
        )?;

        self.store
            .persist(account.id, &refresh_credential, refresh_claims.expires_at())
            .await?;

        if let Err(e) = self.directory.record_login(account.id).await {
            tracing::warn!(user_id = %account.id, error = %e, "Failed to record last login");
        }

        tracing::info!(user_id = %account.id, role = %account.role, "User logged in");

        Ok(LoginOutcome {
            credentials: SessionCredentialPair {
                access_credential,
                refresh_credential,
                access_lifetime_seconds: access_lifetime.num_seconds(),
            },
            access_expires_at: access_claims.expires_at(),
            user: account.public(),
        })
    }

    async fn verify_password(&self, digest: String, password: &str) -> Result<bool, AppError> {
        let hasher = self.hasher;
        let password = password.to_string();

        tokio::task::spawn_blocking(move || hasher.verify(&digest, &password))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))
    }

    /// Exchange a refresh credential for a new access credential
    pub async fn refresh(&self, refresh_credential: &str) -> Result<RefreshOutcome, AppError> {
        let claims = self
            .codec
            .validate_kind(refresh_credential, TokenKind::Refresh)?;

        let record = self
            .store
            .find_matching(claims.user_id, refresh_credential)
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id = %claims.user_id, "Refresh with unknown or revoked token");
                AppError::from(AuthError::TokenRevoked)
            })?;

        let account = self.active_account(claims.user_id).await?;
        let identity = account.identity();

        let refresh_credential = if self.rotate_refresh_tokens {
            let (credential, new_claims) = self.codec.issue(
                &identity,
                TokenKind::Refresh,
                self.codec.lifetime(TokenKind::Refresh),
            )?;

            // Revoke and replace in one transaction; only one concurrent caller wins
            let rotated = self
                .store
                .rotate(record.id, account.id, &credential, new_claims.expires_at())
                .await?;
            if !rotated {
                tracing::warn!(user_id = %claims.user_id, "Refresh token replayed during rotation");
                return Err(AuthError::TokenRevoked.into());
            }
            Some(credential)
        } else {
            None
        };

        let (access_credential, access_claims) = self.codec.issue(
            &identity,
            TokenKind::Access,
            self.codec.lifetime(TokenKind::Access),
        )?;

        tracing::info!(
            user_id = %account.id,
            rotated = refresh_credential.is_some(),
            "Token refreshed"
        );

        Ok(RefreshOutcome {
            access_credential,
            access_expires_at: access_claims.expires_at(),
            refresh_credential,
        })
    }

    /// End every session of the credential's owner.
    ///
    /// When `caller` is given, the credential must belong to that user.
    pub async fn logout(&self, refresh_credential: &str, caller: Option<Uuid>) -> Result<u64, AppError> {
        let claims = self.codec.validate(refresh_credential)?;

        if let Some(caller) = caller {
            if caller != claims.user_id {
                tracing::warn!(
                    caller = %caller,
                    owner = %claims.user_id,
                    "Logout with another user's token"
                );
                return Err(AuthError::SessionMismatch.into());
            }
        }

        let revoked = self.store.revoke_all(claims.user_id).await?;
        tracing::info!(user_id = %claims.user_id, sessions = revoked, "User logged out");
        Ok(revoked)
    }

    /// The caller's account, provided it still exists and is active
    pub async fn active_account(&self, user_id: Uuid) -> Result<UserAccount, AppError> {
        match self.directory.find_by_id(user_id).await? {
            Some(account) if account.is_active => Ok(account),
            _ => {
                tracing::warn!(user_id = %user_id, "Credential for missing or inactive account");
                Err(AuthError::InvalidCredentials.into())
            }
        }
    }
}
