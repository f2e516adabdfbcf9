/// Access-credential gate
///
/// Reads `Authorization: Bearer <credential>`, validates it as an access
/// credential and injects the caller's identity into request extensions for
/// handlers to read through `web::ReqData<AuthenticatedUser>`. No storage
/// is touched here.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{Role, TokenCodec, TokenKind};
use crate::error::{AppError, AuthError};

/// Identity attached to a request that passed the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Pull the credential out of an `Authorization` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    let mut parts = header.split(' ');

    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedAuthHeader),
    }
}

/// Check a credential the way the gate does
pub fn authenticate(codec: &TokenCodec, header: Option<&str>) -> Result<AuthenticatedUser, AppError> {
    let token = bearer_token(header)?;
    let claims = codec.validate_kind(token, TokenKind::Access)?;

    Ok(AuthenticatedUser {
        user_id: claims.user_id,
        email: claims.email,
        role: claims.role,
    })
}

/// Middleware for routes that require an access credential
pub struct AuthGate {
    codec: Arc<TokenCodec>,
}

impl AuthGate {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthGateService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthGateService {
            service: Rc::new(service),
            codec: self.codec.clone(),
        }))
    }
}

pub struct AuthGateService<S> {
    service: Rc<S>,
    codec: Arc<TokenCodec>,
}

impl<S, B> Service<ServiceRequest> for AuthGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match authenticate(&self.codec, header) {
            Ok(user) => {
                tracing::debug!(
                    user_id = %user.user_id,
                    role = %user.role,
                    "Access credential accepted"
                );
                req.extensions_mut().insert(user);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => {
                tracing::warn!(path = %req.path(), error = %e, "Request rejected by auth gate");
                Box::pin(async move { Err(e.into()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::configuration::JwtSettings;
    use chrono::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new(&JwtSettings {
            secret: "gate-test-secret-with-at-least-32-characters".to_string(),
            access_token_expiry: 1800,
            refresh_token_expiry: 604800,
            issuer: "bookwork-api".to_string(),
        })
    }

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "member@bookwork.com".to_string(),
            role: Role::Member,
            active: true,
        }
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
        assert_eq!(bearer_token(None), Err(AuthError::MissingToken));
        assert_eq!(bearer_token(Some("")), Err(AuthError::MalformedAuthHeader));
        assert_eq!(bearer_token(Some("Bearer")), Err(AuthError::MalformedAuthHeader));
        assert_eq!(bearer_token(Some("Bearer ")), Err(AuthError::MalformedAuthHeader));
        assert_eq!(bearer_token(Some("bearer abc")), Err(AuthError::MalformedAuthHeader));
        assert_eq!(bearer_token(Some("Basic dXNlcjpwYXNz")), Err(AuthError::MalformedAuthHeader));
        assert_eq!(bearer_token(Some("Bearer a b")), Err(AuthError::MalformedAuthHeader));
    }

    #[test]
    fn test_access_credential_passes() {
        let codec = codec();
        let identity = identity();
        let (token, _) = codec
            .issue(&identity, TokenKind::Access, Duration::minutes(30))
            .unwrap();

        let user = authenticate(&codec, Some(&format!("Bearer {}", token))).unwrap();
        assert_eq!(user.user_id, identity.user_id);
        assert_eq!(user.email, identity.email);
        assert_eq!(user.role, Role::Member);
    }

    #[test]
    fn test_refresh_credential_is_refused() {
        let codec = codec();
        let (token, _) = codec
            .issue(&identity(), TokenKind::Refresh, Duration::days(7))
            .unwrap();

        let result = authenticate(&codec, Some(&format!("Bearer {}", token)));
        assert!(matches!(result, Err(AppError::Auth(AuthError::WrongTokenKind))));
    }

    #[test]
    fn test_expired_credential_is_refused() {
        let codec = codec();
        let (token, _) = codec
            .issue(&identity(), TokenKind::Access, Duration::seconds(-1))
            .unwrap();

        let result = authenticate(&codec, Some(&format!("Bearer {}", token)));
        assert!(matches!(result, Err(AppError::Token(_))));
    }
}
