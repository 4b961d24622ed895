mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, StoreArgs};
use haystack_directory::bootstrap;
use haystack_directory::config::DirectoryConfig;
use haystack_directory::directory::handlers::routes;
use haystack_directory::directory::service::DirectoryService;
use haystack_directory::error::DirectoryError;
use haystack_directory::storage;
use haystack_directory::storage::memory::MemoryBackend;
use haystack_directory::volume::types::{LogicalVolume, VolumeId};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.store)?;

    match cli.command {
        Commands::Serve { bind, volumes } => serve(config, bind, volumes).await,
        Commands::TableServer { bind } => table_server(bind).await,
        Commands::Bootstrap => {
            let backend = storage::connect(&config.store, config.retry.call_timeout())?;
            let report = bootstrap::ensure_schema(backend.as_ref(), &config.store, &config.retry).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn load_config(args: &StoreArgs) -> anyhow::Result<DirectoryConfig> {
    let mut config = DirectoryConfig::from_env().context("loading configuration")?;

    if !args.store_endpoints.is_empty() {
        config.store.endpoints = args.store_endpoints.clone();
    }
    if let Some(keyspace) = &args.keyspace {
        config.store.keyspace = keyspace.clone();
    }
    if let Some(rf) = args.replication_factor {
        config.store.replication_factor = rf;
    }

    config.validate().context("validating configuration")?;
    Ok(config)
}

async fn serve(config: DirectoryConfig, bind: SocketAddr, seeds: Vec<(u32, u64)>) -> anyhow::Result<()> {
    // 1. Storage handle, shared by everything below:
    let backend = storage::connect(&config.store, config.retry.call_timeout())?;

    // 2. Schema:
    bootstrap::ensure_schema(backend.as_ref(), &config.store, &config.retry).await?;

    // 3. Service and seed volumes:
    let service = Arc::new(DirectoryService::new(backend, &config));
    for (id, capacity) in seeds {
        match service
            .allocator()
            .provision(LogicalVolume::new(VolumeId(id), capacity))
            .await
        {
            Ok(()) => {}
            Err(DirectoryError::Conflict { .. }) => {
                tracing::info!("Volume {} already provisioned", id);
            }
            Err(e) => return Err(e).context(format!("provisioning volume {}", id)),
        }
    }

    // 4. HTTP server:
    let app = routes(service.clone());
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Directory listening on {}", bind);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    drop(service);
    tracing::info!("Directory stopped, storage handle released");
    Ok(())
}

async fn table_server(bind: SocketAddr) -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let app = storage::handlers::routes(backend);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Table server listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Table server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown requested");
}
