use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use portfolio_backend_postgres::{PgAuditor, PgAuthorizer, PgManifestStore};
use portfolio_core::{Auditor, Authorizer, BlobStore, ManifestStore};
use portfolio_http::{router, RegistryState};
use portfolio_memory::{AllowAllAuthorizer, InMemoryAuditor, MemoryRegistry};
use portfolio_objectstore::blob_store::ObjectStoreBlobs;

mod config;
use crate::config::{Backend, Config};

#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    let mut config_file = File::open(cli.config_file.unwrap_or("./dev-config.yml".into()))?;
    let mut s = String::new();
    config_file.read_to_string(&mut s)?;
    let config: Config = serde_yaml::from_str(&s)?;

    let state = build_state(config.backend).await?;
    let app = router(state);

    tracing::info!(address = %config.listen_address, "starting registry");
    axum::Server::bind(&config.listen_address.parse()?)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

async fn build_state(backend: Backend) -> Result<RegistryState> {
    match backend {
        Backend::Memory => {
            let registry = Arc::new(MemoryRegistry::new());
            Ok(RegistryState::new(
                registry.clone() as Arc<dyn BlobStore>,
                registry as Arc<dyn ManifestStore>,
                Arc::new(AllowAllAuthorizer) as Arc<dyn Authorizer>,
                Arc::new(InMemoryAuditor::new()) as Arc<dyn Auditor>,
            ))
        }
        Backend::Postgres { postgres, objects } => {
            let pool = postgres.new_pool().await?;
            let objects = objects.new_objects().await?;
            Ok(RegistryState::new(
                Arc::new(ObjectStoreBlobs::new(objects)) as Arc<dyn BlobStore>,
                Arc::new(PgManifestStore::new(pool.clone())) as Arc<dyn ManifestStore>,
                Arc::new(PgAuthorizer::new(pool.clone())) as Arc<dyn Authorizer>,
                Arc::new(PgAuditor::new(pool)) as Arc<dyn Auditor>,
            ))
        }
    }
}
