use serde::Deserialize;

use portfolio_backend_postgres::PgConfig;
use portfolio_objectstore::Config as ObjectStoreConfig;

/// Top-level config loaded from the YAML file named on the command line.
#[derive(Clone, Deserialize)]
pub struct Config {
    pub backend: Backend,
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

fn default_listen_address() -> String {
    "0.0.0.0:13030".to_string()
}

/// Which collaborator set to wire into [`portfolio_http::RegistryState`].
#[derive(Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backend {
    /// In-process, non-durable; for local development and smoke-testing a deployment config.
    Memory,
    /// Manifests and authorization in Postgres, blobs in whatever `objects` backend is configured.
    Postgres {
        postgres: PgConfig,
        objects: ObjectStoreConfig,
    },
}
