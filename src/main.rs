use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use yieldcore::engine::Auditor;
use yieldcore::orchestration::{spawn_batch_loops, BatchRunner};
use yieldcore::{api, config::Config, db::init_db, Repository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .context("failed to initialize database")?;

    let repo = Arc::new(Repository::new(pool));
    let runner = Arc::new(BatchRunner::new(
        repo.clone(),
        Duration::from_millis(config.position_timeout_ms),
    ));
    let auditor = Arc::new(Auditor::new(repo.clone()));

    if config.scheduler_enabled {
        spawn_batch_loops(runner.clone(), &config);
    }

    let app = api::create_router(api::AppState::new(repo, runner, auditor));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
