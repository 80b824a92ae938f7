use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kratos_api::app::{self, AppState};
use kratos_api::database::{DataAdapter, DatabaseManager, MemoryAdapter, PostgresAdapter};
use kratos_api::resource::ResourceRegistry;

/// Metadata-driven REST resource server
#[derive(Parser, Debug)]
#[command(name = "kratos-api", version, about)]
struct Args {
    /// Port to listen on (overrides PORT / KRATOS_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Resource registry YAML file (overrides KRATOS_RESOURCES)
    #[arg(short, long)]
    resources: Option<PathBuf>,

    /// Start in maintenance mode
    #[arg(long)]
    maintenance: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL, JWT_SECRET, etc. are picked up
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let args = Args::parse();

    let mut config = kratos_api::config::config().clone();
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(resources) = args.resources {
        config.server.resources_file = resources;
    }
    if args.maintenance {
        config.server.maintenance = true;
    }
    info!("Starting Kratos API in {:?} mode", config.environment);

    let registry = ResourceRegistry::from_file(&config.server.resources_file).with_context(|| {
        format!(
            "failed to load resources from {}",
            config.server.resources_file.display()
        )
    })?;
    info!(
        "Loaded {} resource(s) from {}",
        registry.len(),
        config.server.resources_file.display()
    );

    let adapter: Arc<dyn DataAdapter> = match config.database.url {
        Some(_) => {
            let pool = DatabaseManager::connect(&config.database)
                .await
                .context("failed to connect to the database")?;
            DatabaseManager::health_check(&pool).await?;

            let postgres = PostgresAdapter::new(pool);
            postgres
                .ensure_collections(&registry)
                .await
                .context("failed to prepare resource tables")?;
            Arc::new(postgres)
        }
        None => {
            warn!("DATABASE_URL is not set; records are kept in memory and lost on exit");
            Arc::new(MemoryAdapter::new())
        }
    };

    let base_path = config.server.base_path();
    let state = AppState::new(&config, registry, adapter);
    let app = app::build(state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("Kratos API listening on http://{}{}", addr, base_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutting down");
}
