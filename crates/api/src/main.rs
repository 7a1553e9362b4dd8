//! AniMuse API server entry point

use animuse_api::{routes::create_router, AppState, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let pool = animuse_shared::db::create_pool(&config.database_url, config.database_max_connections)
        .await?;
    animuse_shared::db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    let state = AppState::new(pool, config)?;

    spawn_refresh_token_sweep(state.clone());

    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&state.config.bind_address).await?;
    tracing::info!(
        address = %state.config.bind_address,
        environment = ?state.config.environment,
        "animuse-api listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

/// Hourly sweep of expired refresh tokens. Reads already filter on expiry;
/// this reclaims the rows.
fn spawn_refresh_token_sweep(state: AppState) {
    use animuse_api::auth::CredentialStore;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match state.store.delete_expired_refresh_tokens().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged expired refresh tokens"),
                Err(e) => tracing::error!(error = %e, "Refresh token sweep failed"),
            }
        }
    });
}
