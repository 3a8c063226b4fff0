use anyhow::Result;
use master::{build_router, Engine, EngineConfig};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "doctrans_master=debug,master=debug,tower_http=info,axum=info";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    let config = EngineConfig::from_env();
    let translator = config.build_translator()?;
    let bind_addr = config.bind_addr.clone();
    info!(
        "almacenamiento en {}, workers por tarea en [{}, {}], {} intentos por segmento",
        config.storage_dir.display(),
        config.min_concurrency,
        config.max_concurrency,
        config.retry.max_attempts
    );

    let app = build_router(Engine::new(config, translator));

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
