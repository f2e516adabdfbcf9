use actix_web::dev::Server;
use actix_web::{error::JsonPayloadError, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{
    IdentityDirectory, PasswordHasher, RefreshTokenRepository, RefreshTokenStore, SessionManager,
    TokenCodec,
};
use crate::configuration::Settings;
use crate::error::{AppError, ValidationError};
use crate::middleware::{AuthGate, RequestLogger};
use crate::routes::{health_check, login, logout, refresh, validate};

/// Wire the session manager from settings and its two storage collaborators
pub fn build_session_manager(
    settings: &Settings,
    directory: Arc<dyn IdentityDirectory>,
    repository: Arc<dyn RefreshTokenRepository>,
) -> SessionManager {
    let codec = Arc::new(TokenCodec::new(&settings.jwt));
    let store = RefreshTokenStore::new(
        repository,
        PasswordHasher::new(settings.session.refresh_hash_cost),
        settings.session.store_timeout(),
    );

    SessionManager::new(
        codec,
        PasswordHasher::new(settings.session.password_hash_cost),
        store,
        directory,
    )
    .with_rotation(settings.session.rotate_refresh_tokens)
}

/// Periodically drop expired and revoked refresh records
pub fn spawn_refresh_token_sweeper(
    store: RefreshTokenStore,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        // First tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            match store.sweep().await {
                Ok(removed) => tracing::info!(removed = removed, "Refresh token sweep finished"),
                Err(e) => tracing::error!(error = %e, "Refresh token sweep failed"),
            }
        }
    })
}

fn json_error_handler(err: JsonPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::debug!(error = %err, "Rejected request body");
    AppError::from(ValidationError::InvalidJson(err.to_string())).into()
}

pub fn run(listener: TcpListener, sessions: SessionManager) -> Result<Server, std::io::Error> {
    let codec = sessions.codec();
    let sessions = web::Data::new(sessions);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)
            .app_data(sessions.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/auth")
                    // Public routes
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    // Routes behind the access-credential gate
                    .service(
                        web::scope("")
                            .wrap(AuthGate::new(codec.clone()))
                            .route("/validate", web::post().to(validate))
                            .route("/logout", web::post().to(logout)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
