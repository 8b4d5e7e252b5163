mod auth;
mod config;
mod db;
mod error;
mod extractors;
mod photos;
mod routes;
mod state;
mod storage;
mod users;
mod validation;
mod votes;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Config};
use crate::photos::SqlitePhotoRepository;
use crate::state::AppState;
use crate::storage::UploadStore;
use crate::users::SqliteUserRepository;
use crate::votes::VoteCoordinator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;

    // Initialize database
    let pool = db::create_pool(config.db_path())?;
    db::run_migrations(&pool)?;

    // Wire up repositories; the upload store doubles as the file cleaner
    // for deleted photos.
    let uploads = Arc::new(UploadStore::new(config.uploads_path()));
    let photos = Arc::new(SqlitePhotoRepository::new(pool.clone(), uploads.clone()));
    let users = Arc::new(SqliteUserRepository::new(pool.clone()));
    let votes = Arc::new(VoteCoordinator::new(pool.clone()));

    let state = AppState {
        db: pool,
        config: config.clone(),
        photos,
        users,
        votes,
        uploads,
    };

    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
