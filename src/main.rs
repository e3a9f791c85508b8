use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenv::dotenv;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chaingraph::api::{self, AppState};
use chaingraph::db::{self, GraphStore, InMemoryGraphStore, SurrealGraphStore};
use chaingraph::services::config::{IngestConfig, StoreBackend};
use chaingraph::services::pipeline::IngestionPipeline;
use chaingraph::services::storage::FileStager;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    // Inicializar logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chaingraph=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting chaingraph ingestion service...");

    let config = IngestConfig::from_env();
    info!(
        "Config: scratch_dir={:?}, batch_size={}, max_upload_bytes={}, store={:?}",
        config.scratch_dir, config.batch_size, config.max_upload_bytes, config.store_backend
    );

    let store = connect_store(config.store_backend).await?;

    // Directorio de staging
    let stager = FileStager::from_config(&config);
    stager
        .init()
        .await
        .context("Failed to create scratch directory")?;

    let pipeline = IngestionPipeline::new(stager, store, config.batch_size);
    let port = config.server_port;
    let state = Arc::new(AppState { config, pipeline });

    // CORS permisivo para desarrollo
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    // El orden de los layers es de abajo hacia arriba
    let app = api::create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("chaingraph API server starting on http://{}", addr);
    api::print_routes();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("chaingraph shut down gracefully");

    Ok(())
}

/// Crea el almacén de grafos configurado
async fn connect_store(backend: StoreBackend) -> Result<Arc<dyn GraphStore>> {
    match backend {
        StoreBackend::Surreal => {
            let db_config = db::DbConfig::from_env()?;
            let conn = db::connect_db(&db_config).await?;

            if !db::connection::check_connection(&conn).await {
                error!("Database connection check failed");
                return Err(anyhow::anyhow!("Failed to connect to database"));
            }

            info!("Database connected successfully");
            Ok(Arc::new(SurrealGraphStore::new(conn)))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory graph store; loaded data is lost on shutdown");
            Ok(Arc::new(InMemoryGraphStore::new()))
        }
    }
}

/// Señal de shutdown graceful
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received...");
}
