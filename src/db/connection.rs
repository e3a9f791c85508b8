use anyhow::{Context, Result};
use surrealdb::engine::remote::http::{Client, Http};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::{info, warn};

/// Cliente HTTP de SurrealDB
pub type DatabaseConnection = Surreal<Client>;

/// Configuración de conexión al almacén de grafos
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
}

impl DbConfig {
    /// Carga la configuración desde variables de entorno
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: env_or("SURREAL_URL", "http://localhost:8000"),
            username: env_or("SURREAL_USER", "root"),
            password: env_or("SURREAL_PASS", "root"),
            namespace: env_or("SURREAL_NS", "chaingraph"),
            database: env_or("SURREAL_DB", "ledger"),
        })
    }

    /// host:port sin el esquema, como lo espera el motor HTTP
    pub fn address(&self) -> &str {
        ["http://", "https://", "ws://", "wss://"]
            .iter()
            .fold(self.url.as_str(), |addr, scheme| addr.trim_start_matches(scheme))
            .trim_end_matches('/')
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Conecta a SurrealDB, autentica y selecciona namespace/database
pub async fn connect_db(config: &DbConfig) -> Result<DatabaseConnection> {
    let addr = config.address();
    info!("Connecting to SurrealDB HTTP at {}", addr);

    let db = Surreal::new::<Http>(addr)
        .await
        .context("Failed to connect to SurrealDB")?;

    db.signin(Root {
        username: &config.username,
        password: &config.password,
    })
    .await
    .context("Failed to authenticate with SurrealDB")?;

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .context("Failed to select namespace/database")?;

    info!(
        "Connected to SurrealDB: {}/{}",
        config.namespace, config.database
    );

    Ok(db)
}

/// Verifica la conexión a la base de datos
pub async fn check_connection(db: &DatabaseConnection) -> bool {
    match db.health().await {
        Ok(_) => true,
        Err(e) => {
            warn!("Database health check failed: {}", e);
            false
        }
    }
}
