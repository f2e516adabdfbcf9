/// Session credential claims
///
/// The payload of a signed credential: who it speaks for, which role the
/// holder had at issuance, what the credential may be used for, and the
/// registered JWT time claims (RFC 7519).

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::identity::{Identity, Role};

/// What a credential may be exchanged for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Issuer
    pub iss: String,
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique credential id; keeps credentials minted in the same second distinct
    pub jti: String,
}

impl Claims {
    /// Build claims valid from now for `lifetime`
    pub fn new(identity: &Identity, kind: TokenKind, issuer: &str, lifetime: Duration) -> Self {
        let now = Utc::now().timestamp();
        Self {
            user_id: identity.user_id,
            email: identity.email.clone(),
            role: identity.role,
            kind,
            iss: issuer.to_string(),
            sub: identity.user_id.to_string(),
            iat: now,
            nbf: now,
            exp: now + lifetime.num_seconds(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.exp < Utc::now().timestamp()
    }

    pub fn expires_at(&self) -> chrono::DateTime<Utc> {
        chrono::DateTime::<Utc>::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}
