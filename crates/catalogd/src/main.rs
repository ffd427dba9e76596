use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use catalogd_core::builder::Builder;
use catalogd_core::catalog::{CatalogStore, MemoryCatalog, SqliteCatalog};
use catalogd_core::landlord::Landlord;
use catalogd_core::object_store::{LocalObjectStore, ObjectStore, S3ObjectStore};
use catalogd_core::redaction;
use catalogd_core::tools::CliBuildTools;

mod cli;
mod gateway;

#[tokio::main]
async fn main() -> Result<()> {
    catalogd_core::logging::init()?;

    let parsed = cli::Cli::parse();
    let config = parsed.config;

    if let Some(key) = &config.object_store_access_key {
        redaction::global_registry().add_secret(key);
    }
    if let Some(key) = &config.object_store_secret_key {
        redaction::global_registry().add_secret(key);
    }

    let catalog: Arc<dyn CatalogStore> = if config.uses_sqlite() {
        let url = format!("sqlite://{}?mode=rwc", config.catalog_path().display());
        Arc::new(SqliteCatalog::connect(&url).await?)
    } else {
        Arc::new(MemoryCatalog::new())
    };

    let object_store: Arc<dyn ObjectStore> = match &config.object_store_endpoint {
        Some(endpoint) => {
            let mut builder = aws_config::defaults(aws_config::BehaviorVersion::latest()).endpoint_url(endpoint);
            if let (Some(access_key), Some(secret_key)) =
                (&config.object_store_access_key, &config.object_store_secret_key)
            {
                builder = builder.credentials_provider(aws_sdk_s3::config::Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "catalogd",
                ));
            }
            let aws_config = builder.load().await;
            Arc::new(S3ObjectStore::new(
                aws_sdk_s3::Client::new(&aws_config),
                config.object_store_bucket.clone(),
            ))
        }
        None => Arc::new(LocalObjectStore::new(std::env::temp_dir().join("catalogd-objects"))),
    };

    let landlord = Arc::new(Landlord::new(catalog.clone(), object_store.clone(), config.max_storage));
    let tools = Arc::new(CliBuildTools::default());
    let builder = Arc::new(Builder::new(
        catalog.clone(),
        tools,
        object_store.clone(),
        landlord.clone(),
        config.registry_endpoint.clone(),
    ));

    let bind_addr = config.bind_addr.clone();
    let state = gateway::AppState {
        catalog,
        builder,
        landlord,
        object_store,
        config: Arc::new(config),
    };

    let app = gateway::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "catalogd gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}
