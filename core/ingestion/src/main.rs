use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voice_journal_ingestion::{
    router, AnalysisWorker, AppState, Database, MaxAttempts, SegmentExtractor, ServiceConfig,
    StorageCoordinator,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Voice Journal Ingestion Service v{}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::from_env()?;

    // Create directory if it doesn't exist
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::new(&config.db_path)?;
    info!("Database initialized at: {}", config.db_path.display());

    let store = Arc::new(StorageCoordinator::new(db, config.storage));
    let extractor = Arc::new(SegmentExtractor::new(config.extraction));

    let (tx, rx) = mpsc::unbounded_channel();
    let worker = AnalysisWorker::new(store.clone(), extractor.clone(), rx);
    tokio::spawn(worker.run());

    let state = AppState {
        store,
        extractor,
        retry_policy: MaxAttempts(config.max_retries),
        outcomes: tx,
    };

    let app = router(state).layer(TraceLayer::new_for_http());

    info!("Starting HTTP server on {}", config.listen_addr);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
