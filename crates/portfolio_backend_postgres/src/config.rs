use serde::Deserialize;
use sqlx::postgres::{PgPool, PgPoolOptions};

use portfolio_core::Result;

use crate::errors::backend;

/// Assumed schema, left undocumented as migrations since persisting it is out of scope here:
///
/// ```sql
/// CREATE TABLE organizations (
///     slug TEXT PRIMARY KEY,
///     public BOOLEAN NOT NULL DEFAULT FALSE,
///     write_enabled BOOLEAN NOT NULL DEFAULT TRUE
/// );
/// CREATE TABLE repositories (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name TEXT UNIQUE NOT NULL
/// );
/// CREATE TABLE manifests (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     repository_id UUID NOT NULL REFERENCES repositories (id),
///     digest TEXT NOT NULL,
///     content_type TEXT NOT NULL,
///     blob_digest TEXT NOT NULL,
///     blob_size BIGINT NOT NULL,
///     UNIQUE (repository_id, digest)
/// );
/// CREATE TABLE manifest_dependencies (
///     manifest_id UUID NOT NULL REFERENCES manifests (id),
///     digest TEXT NOT NULL,
///     size BIGINT NOT NULL
/// );
/// CREATE TABLE tags (
///     repository_id UUID NOT NULL REFERENCES repositories (id),
///     name TEXT NOT NULL,
///     manifest_digest TEXT NOT NULL,
///     PRIMARY KEY (repository_id, name)
/// );
/// CREATE TABLE audit_log (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     repository_name TEXT NOT NULL,
///     reference TEXT NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT now()
/// );
/// ```
#[derive(Clone, Deserialize)]
pub struct PgConfig {
    connection_string: String,
}

impl PgConfig {
    pub async fn new_pool(&self) -> Result<PgPool> {
        PgPoolOptions::new()
            .connect(&self.connection_string)
            .await
            .map_err(backend)
    }
}
