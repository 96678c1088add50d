use std::sync::Arc;

use analytics_orchestrator::{provider, routes, AnalyticsPipeline, AppConfig, AppState, LanguageModel};
use anyhow::{Context, Result};
use datastore::{PgDatasetStore, PgHistoryStore};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    // --- Postgres ---
    let pg_pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&cfg.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("Failed to run migrations")?;

    let model = provider::from_config(&cfg.llm)?;

    // --- Startup health checks (fail fast) ---
    startup_checks(&cfg, &pg_pool, model.as_ref()).await?;

    let pipeline = AnalyticsPipeline::new(
        Arc::new(PgDatasetStore::new(pg_pool.clone())),
        Arc::new(PgHistoryStore::new(pg_pool.clone())),
        model.clone(),
        cfg.pipeline.clone(),
    );
    let app_state = Arc::new(AppState::new(pipeline, model.info()));
    let app = routes::build_router(app_state, cfg.max_upload_bytes);

    let addr = &cfg.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("orchestrator listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn startup_checks(cfg: &AppConfig, pg_pool: &PgPool, model: &dyn LanguageModel) -> Result<()> {
    check_postgres(pg_pool).await?;
    info!("postgres: ok");

    tokio::fs::create_dir_all(&cfg.pipeline.upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", cfg.pipeline.upload_dir.display()))?;
    info!(dir = %cfg.pipeline.upload_dir.display(), "uploads: ok");

    // Only the general chat branch needs the model; datasets keep working without it.
    let p = model.info();
    match model.ping().await {
        Ok(()) => info!(provider = %p.name, model = %p.model, "language model: ok"),
        Err(e) => warn!(provider = %p.name, error = %e, "language model: unreachable at startup"),
    }

    Ok(())
}

async fn check_postgres(pg_pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pg_pool)
        .await
        .context("Postgres ping failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("shutdown signal listener failed: {e}");
        std::future::pending::<()>().await;
    }
    info!("orchestrator shutting down");
}
