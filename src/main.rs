use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use bookwork_auth::configuration::get_configuration;
use bookwork_auth::db::{PgDirectory, PgRefreshTokens};
use bookwork_auth::startup::{build_session_manager, run, spawn_refresh_token_sweeper};
use bookwork_auth::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!(
                environment = ?config.application.environment,
                rotate_refresh_tokens = config.session.rotate_refresh_tokens,
                "Configuration loaded successfully"
            );
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .acquire_timeout(configuration.session.store_timeout())
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    tracing::info!("Database connection pool created successfully");

    let sessions = build_session_manager(
        &configuration,
        Arc::new(PgDirectory::new(pool.clone())),
        Arc::new(PgRefreshTokens::new(pool)),
    );

    let _sweeper = spawn_refresh_token_sweeper(
        sessions.store().clone(),
        configuration.session.sweep_interval(),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, sessions)?.await
}
