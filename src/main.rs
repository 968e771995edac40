//! RustPress Web Auth server
//!
//! Serves the login, registration and dashboard pages. Users live in
//! Postgres when `DATABASE_URL` is set and in memory otherwise.

use rustpress_web_auth::{
    create_routes, AuthConfig, AuthState, MemoryCsrfStore, MemorySessionStore, MemoryUserStore,
    PgUserStore, UserStore,
};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How often expired sessions and stale CSRF bindings are swept from memory
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AuthConfig::from_env();
    config.validate().context("invalid configuration")?;

    let users: Arc<dyn UserStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&database_url)
                .await
                .context("failed to connect to database")?;

            let store = PgUserStore::new(pool);
            store.migrate().await.context("failed to run migrations")?;
            Arc::new(store)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, users are kept in memory");
            Arc::new(MemoryUserStore::new())
        }
    };

    let sessions = Arc::new(MemorySessionStore::new());
    let tokens = Arc::new(MemoryCsrfStore::new());
    tokio::spawn(sweep(sessions.clone(), tokens.clone(), config.session_lifetime));

    let state = AuthState::builder(config, users)
        .sessions(sessions)
        .csrf_tokens(tokens)
        .build()
        .context("failed to build application state")?;
    let app = create_routes(state);

    let addr = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Anonymous CSRF bindings live as long as an unremembered session would
async fn sweep(sessions: Arc<MemorySessionStore>, tokens: Arc<MemoryCsrfStore>, token_ttl: i64) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let removed = sessions.purge_expired().await;
        if removed > 0 {
            tracing::debug!(removed, "Expired sessions purged");
        }
        let removed = tokens.purge(token_ttl, &sessions).await;
        if removed > 0 {
            tracing::debug!(removed, "Stale CSRF bindings purged");
        }
    }
}
