//! Demo server: catalog administration and module records over HTTP.
//!
//! Run: `cargo run --example server` with DATABASE_URL set (a `.env` file works).
//! Requests identify the actor with X-Actor-Id, X-Actor-Name and X-Actor-Roles.

use metamodule::{
    catalog_routes, common_routes_with_ready, connect, ensure_database_exists, ensure_sys_tables,
    record_routes, AppState, EngineConfig,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("metamodule=info")),
        )
        .init();

    let config = EngineConfig::from_env()?;
    ensure_database_exists(&config.database_url).await?;
    let pool = connect(&config).await?;
    let state = AppState::new(pool, config);
    ensure_sys_tables(&state).await?;

    let app = common_routes_with_ready(state.clone())
        .merge(catalog_routes(state.clone()))
        .merge(record_routes(state));
    let addr = std::env::var("METAMODULE_LISTEN").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("metamodule listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
