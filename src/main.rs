use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sweet_shop::{
    AppState, InMemoryRepository,
    config::{AppConfig, Env, StoreBackend},
    create_router, password,
    repository::{PostgresRepository, Repository, RepositoryState},
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, the store (Postgres with migrations, or in-memory)
/// and the HTTP server, in that order. Any failure before the server starts aborts the process.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load().unwrap_or_else(|e| panic!("FATAL: invalid configuration: {e}"));

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sweet_shop=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Store Initialization
    let repo = match config.store {
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(config.store_timeout)
                .connect(&config.db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("FATAL: Failed to run database migrations.");

            Arc::new(PostgresRepository::new(pool, config.store_timeout)) as RepositoryState
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; all data is lost on exit");
            Arc::new(InMemoryRepository::new()) as RepositoryState
        }
    };

    // 4. Optional admin bootstrap
    if let Some((email, plaintext)) = &config.bootstrap_admin {
        ensure_admin(repo.as_ref(), email, plaintext).await;
    }

    // 5. Router and Server Startup
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(repo, config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: cannot bind {bind_addr}: {e}"));

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly");
}

/// Creates the configured admin account unless the email is already registered. An existing
/// account is left exactly as it is.
async fn ensure_admin(repo: &dyn Repository, email: &str, plaintext: &str) {
    match repo.find_user_by_email(email).await {
        Ok(Some(_)) => tracing::info!("admin account already present"),
        Ok(None) => {
            let created = match password::hash_password(plaintext) {
                Ok(hash) => repo.create_user(email, &hash, true).await,
                Err(e) => Err(e),
            };
            match created {
                Ok(user) => tracing::info!(user_id = user.id, "admin account created"),
                Err(e) => tracing::error!("admin bootstrap failed: {e}"),
            }
        }
        Err(e) => tracing::error!("admin bootstrap lookup failed: {e}"),
    }
}
