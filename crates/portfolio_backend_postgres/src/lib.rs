//! Postgres-backed [`portfolio_core::ManifestStore`], [`portfolio_core::Authorizer`], and
//! [`portfolio_core::Auditor`] implementations.
//!
//! Blob bytes are out of scope for this crate; pair it with `portfolio_objectstore`'s
//! `ObjectStoreBlobs` for the `BlobStore` side of a `RegistryState`.
mod auditor;
mod authorizer;
mod config;
mod errors;
mod manifests;

pub use auditor::PgAuditor;
pub use authorizer::PgAuthorizer;
pub use config::PgConfig;
pub use manifests::PgManifestStore;
