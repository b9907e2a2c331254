use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use milky_rag::{
    FileStoreAdmin, GeminiClient, GeminiFileSearch, GenerationService, IndexingService,
    QueryPipeline, RagConfig, RecordStore,
};
use milky_service::{router, AppState};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = RagConfig::from_env()?;
    let client = GeminiClient::with_base_url(config.api_key.clone(), config.base_url.clone())?;
    let remote = Arc::new(GeminiFileSearch::new(
        client,
        config.store_name.clone(),
        config.model.clone(),
    ));
    let indexer: Arc<dyn IndexingService> = remote.clone();
    let generator: Arc<dyn GenerationService> = remote;

    let store = RecordStore::open(&config.index_file)?;
    let admin = FileStoreAdmin::open(
        store,
        indexer,
        config.upload_dir.clone(),
        config.poll_settings(),
    )?;
    let query = QueryPipeline::new(generator).with_system_prompt(config.system_prompt.clone());
    let app = router(AppState::new(admin, query), config.max_upload_bytes);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "listening" = %addr,
        store = %config.store_name,
        model = %config.model,
        "milky service started"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
    }
}
