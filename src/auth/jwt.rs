/// Session credential signing and validation
///
/// Credentials are compact HS256 JWTs. The verifier pins the algorithm,
/// issuer and time window; nothing in the credential header is trusted.

use chrono::Duration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::{Claims, TokenKind};
use crate::auth::identity::Identity;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, TokenError};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Signs and parses session credentials with a process-wide secret.
///
/// Built once at startup from `JwtSettings`; the secret is never mutated
/// afterwards.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl TokenCodec {
    pub fn new(config: &JwtSettings) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            access_lifetime: Duration::seconds(config.access_token_expiry),
            refresh_lifetime: Duration::seconds(config.refresh_token_expiry),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Configured lifetime for credentials of `kind`
    pub fn lifetime(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_lifetime,
            TokenKind::Refresh => self.refresh_lifetime,
        }
    }

    /// Issue a credential for `identity` valid from now for `lifetime`
    pub fn issue(
        &self,
        identity: &Identity,
        kind: TokenKind,
        lifetime: Duration,
    ) -> Result<(String, Claims), TokenError> {
        let claims = Claims::new(identity, kind, &self.issuer, lifetime);
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    /// Sign prepared claims as-is
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a credential and reconstruct its claims
    ///
    /// # Errors
    /// `Malformed`, `SignatureInvalid`, `IssuerMismatch`, `Expired` or
    /// `NotYetValid`. Callers surface all of them as the same generic message.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let err = match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                    ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                        TokenError::SignatureInvalid
                    }
                    ErrorKind::InvalidIssuer => TokenError::IssuerMismatch,
                    _ => TokenError::Malformed,
                };
                tracing::debug!(error = %e, "JWT validation error");
                err
            })
    }

    /// Validate and require a specific credential kind
    pub fn validate_kind(
        &self,
        token: &str,
        expected: TokenKind,
    ) -> Result<Claims, AppError> {
        let claims = self.validate(token)?;
        if claims.kind != expected {
            tracing::warn!(
                user_id = %claims.user_id,
                presented = claims.kind.as_str(),
                expected = expected.as_str(),
                "Credential used for the wrong purpose"
            );
            return Err(AuthError::WrongTokenKind.into());
        }
        Ok(claims)
    }
}
