use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedmovie_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, Cache, PgStore},
    services::{
        collaborative::CollaborativeSource,
        llm::{advisors_from_config, fill_source_from_config},
        providers::TmdbProvider,
        GenerationPipeline, JobTracker, OpinionSource, PipelineDeps,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("feedmovie_api=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    let (cache, cache_handle) = Cache::connect(&config.redis_url)?;

    let http_client = reqwest::Client::new();
    let tmdb = Arc::new(TmdbProvider::new(
        http_client.clone(),
        Some(cache),
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
    ));
    let store = Arc::new(PgStore::new(pool));
    let collaborative: Arc<dyn OpinionSource> = Arc::new(CollaborativeSource::new(tmdb.clone()));

    let pipeline = GenerationPipeline::new(PipelineDeps {
        ratings: store.clone(),
        recommendations: store.clone(),
        tracker: JobTracker::new(store),
        metadata: tmdb,
        advisors: advisors_from_config(&config, &http_client),
        collaborative: Some(collaborative),
        fill: fill_source_from_config(&config, &http_client),
        settings: config.pipeline_settings(),
    });

    let app = create_router(AppState::new(Arc::new(pipeline)));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_handle.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
