/// Error Handling Module
///
/// Every failure inside the authentication core ends up as an `AppError`.
/// The module covers:
/// 1. Domain-specific error types (validation, auth, token, database)
/// 2. A unified application error with `From` conversions for `?`
/// 3. HTTP response mapping with server-side logging
/// 4. Error context enrichment for structured logs
///
/// Client-facing messages are deliberately generic: which check failed is
/// only ever written to the log, keyed by the request id.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Malformed request body or header (always a client mistake)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(&'static str),
    TooShort(&'static str, usize),
    TooLong(&'static str, usize),
    InvalidFormat(&'static str),
    MissingFields(String),
    InvalidJson(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::MissingFields(msg) => write!(f, "{}", msg),
            ValidationError::InvalidJson(_) => write!(f, "Invalid JSON format"),
        }
    }
}

impl StdError for ValidationError {}

/// Failures while signing or parsing a session credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    Malformed,
    SignatureInvalid,
    IssuerMismatch,
    Expired,
    NotYetValid,
    Signing(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "Malformed credential"),
            TokenError::SignatureInvalid => write!(f, "Credential signature is invalid"),
            TokenError::IssuerMismatch => write!(f, "Credential issuer does not match"),
            TokenError::Expired => write!(f, "Credential has expired"),
            TokenError::NotYetValid => write!(f, "Credential is not yet valid"),
            TokenError::Signing(msg) => write!(f, "Credential signing failed: {}", msg),
        }
    }
}

impl StdError for TokenError {}

/// Authentication and authorization errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    MissingToken,
    MalformedAuthHeader,
    TokenRevoked,
    WrongTokenKind,
    SessionMismatch,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::MissingToken => write!(f, "Missing authorization header"),
            AuthError::MalformedAuthHeader => write!(f, "Invalid authorization header format"),
            AuthError::TokenRevoked => write!(f, "Refresh token not found or revoked"),
            AuthError::WrongTokenKind => write!(f, "Invalid token type"),
            AuthError::SessionMismatch => write!(f, "Token does not belong to the caller"),
        }
    }
}

impl StdError for AuthError {}

/// Storage collaborator errors
#[derive(Debug)]
pub enum DatabaseError {
    QueryExecution(String),
    ConnectionPool(String),
    Timeout(&'static str),
    CorruptRow(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::Timeout(op) => write!(f, "Store call timed out: {}", op),
            DatabaseError::CorruptRow(msg) => write!(f, "Unexpected row content: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Auth(AuthError),
    Token(TokenError),
    Database(DatabaseError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Token(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Token(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            other => AppError::Database(DatabaseError::QueryExecution(other.to_string())),
        }
    }
}

/// ============================================================================
/// 3. HTTP RESPONSE MAPPING
/// ============================================================================

/// Error body shared by every failing endpoint and by the auth gate
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub error: String,
    /// Human-readable, non-revealing message
    pub message: String,
    pub status_code: u16,
    /// Correlates the response with the server-side log line
    pub request_id: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: String, message: String, status_code: u16, request_id: String) -> Self {
        Self {
            error,
            message,
            status_code,
            request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl AppError {
    fn code_and_message(&self) -> (&'static str, String) {
        match self {
            AppError::Validation(e) => ("VALIDATION_ERROR", e.to_string()),
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => ("UNAUTHORIZED", "Invalid credentials".into()),
                AuthError::MissingToken | AuthError::MalformedAuthHeader => {
                    ("UNAUTHORIZED", e.to_string())
                }
                AuthError::TokenRevoked => ("UNAUTHORIZED", "Invalid or expired token".into()),
                AuthError::WrongTokenKind => ("FORBIDDEN", e.to_string()),
                AuthError::SessionMismatch => ("FORBIDDEN", e.to_string()),
            },
            AppError::Token(TokenError::Signing(_)) => {
                ("INTERNAL_ERROR", "Internal server error".into())
            }
            AppError::Token(_) => ("UNAUTHORIZED", "Invalid or expired token".into()),
            AppError::Database(_) | AppError::Internal(_) => {
                ("INTERNAL_ERROR", "Internal server error".into())
            }
        }
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let status = ResponseError::status_code(self);
        let (code, message) = self.code_and_message();

        let body = ErrorResponse::new(
            code.to_string(),
            message,
            status.as_u16(),
            request_id.to_string(),
        );

        (status, body)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = ?e, "Validation error");
            }
            AppError::Auth(AuthError::InvalidCredentials) => {
                tracing::warn!(request_id = request_id, "Invalid credentials attempt");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Token(TokenError::Signing(msg)) => {
                tracing::error!(request_id = request_id, error = %msg, "Credential signing failed");
            }
            AppError::Token(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Credential rejected");
            }
            AppError::Database(e) => {
                tracing::error!(request_id = request_id, error = %e, "Database error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, body) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(e) => match e {
                AuthError::WrongTokenKind | AuthError::SessionMismatch => StatusCode::FORBIDDEN,
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Token(TokenError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// ============================================================================
/// 4. ERROR CONTEXT ENRICHMENT
/// ============================================================================

/// Per-operation context for structured logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Log a failure with the operation context attached, then hand it back
    pub fn record(&self, error: AppError) -> AppError {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match &error {
            AppError::Database(_) | AppError::Internal(_) | AppError::Token(TokenError::Signing(_)) => {
                tracing::error!(error = %error, context = %context, "Operation failed");
            }
            _ => {
                tracing::warn!(error = %error, context = %context, "Operation rejected");
            }
        }

        error
    }
}
