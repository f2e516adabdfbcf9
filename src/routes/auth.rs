/// Authentication Routes
///
/// Login, credential refresh, logout and access-credential validation.

use actix_web::{web, HttpResponse};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::auth::{PublicUser, SessionManager};
use crate::error::{AppError, ErrorContext};
use crate::middleware::AuthenticatedUser;
use crate::validators::{validate_login, validate_refresh_token};

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request carrying a refresh credential
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

/// Successful login
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub user: PublicUser,
    pub expires_at: String,
}

/// Successful refresh; `refreshToken` is present only when rotation is on
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    pub expires_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub user: PublicUser,
}

/// POST /api/auth/login
///
/// # Errors
/// - 400: Missing fields or malformed email
/// - 401: Unknown email, inactive account or wrong password (one message for all)
/// - 500: Store failure
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let email = validate_login(&form.email, &form.password).map_err(|e| context.record(e.into()))?;

    let outcome = sessions
        .login(&email, &form.password)
        .await
        .map_err(|e| context.record(e))?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %outcome.user.id,
        "Login succeeded"
    );

    Ok(HttpResponse::Ok().json(LoginResponse {
        token: outcome.credentials.access_credential,
        refresh_token: outcome.credentials.refresh_credential,
        user: outcome.user,
        expires_at: outcome
            .access_expires_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    }))
}

/// POST /api/auth/refresh
///
/// # Errors
/// - 400: No refresh credential in the body
/// - 401: Invalid, expired or revoked refresh credential, or inactive account
/// - 403: An access credential was presented
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let credential = validate_refresh_token(&form.refresh_token).map_err(|e| context.record(e.into()))?;

    let outcome = sessions
        .refresh(credential)
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(RefreshResponse {
        token: outcome.access_credential,
        expires_at: outcome
            .access_expires_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        refresh_token: outcome.refresh_credential,
    }))
}

/// POST /api/auth/logout
///
/// **Requires a valid access credential.** Revokes every refresh credential
/// of the caller; the one in the body must belong to the caller.
///
/// # Errors
/// - 400: No refresh credential in the body
/// - 401: Invalid refresh credential
/// - 403: Refresh credential belongs to another user
pub async fn logout(
    user: web::ReqData<AuthenticatedUser>,
    form: web::Json<RefreshRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let user = user.into_inner();
    let context = ErrorContext::new("user_logout").with_user_id(user.user_id.to_string());

    let credential = validate_refresh_token(&form.refresh_token).map_err(|e| context.record(e.into()))?;

    sessions
        .logout(credential, Some(user.user_id))
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(LogoutResponse {
        message: "Successfully logged out".to_string(),
    }))
}

/// POST /api/auth/validate
///
/// **Requires a valid access credential.** Returns the caller's current
/// account as stored.
pub async fn validate(
    user: web::ReqData<AuthenticatedUser>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_validate").with_user_id(user.user_id.to_string());

    let account = sessions
        .active_account(user.user_id)
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(ValidateResponse {
        valid: true,
        user: account.public(),
    }))
}
