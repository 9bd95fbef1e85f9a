use anyhow::Result;
use reelvault::config::Config;
use reelvault::memory::InMemoryMovieRepository;
use reelvault::postgres::PgMovieRepository;
use reelvault::repository::MovieRepository;
use reelvault::server::Server;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("reelvault={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting reelvault service");
    tracing::info!(
        "Configuration: port={}, env={}, limiter_enabled={}, limiter_rps={}, limiter_burst={}",
        config.port,
        config.environment,
        config.limiter_enabled,
        config.limiter_rps,
        config.limiter_burst
    );

    let movies: Arc<dyn MovieRepository> = match config.database() {
        Some(db) => Arc::new(
            PgMovieRepository::connect(&db)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?,
        ),
        None => {
            tracing::warn!("DB_DSN not set, running with an in-memory store");
            Arc::new(InMemoryMovieRepository::new())
        }
    };

    Server::new(&config, movies)
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
