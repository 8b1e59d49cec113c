//! # Portfolio Core
//!
//! `portfolio_core` provides the interoperability types shared between [`portfolio_http`] [an OCI
//! Distribution Spec implementation](https://github.com/opencontainers/distribution-spec) and
//! backend implementations such as `portfolio_backend_postgres` and `portfolio_memory`.
//!
//! The primary set of interoperability types can be found in the [`crate::registry`] module: a
//! `BlobStore`, a `ManifestStore`, an `Authorizer`, and an `Auditor`, each object-safe so a
//! handler can hold them as `Arc<dyn ...>` without knowing which backend is wired up behind it.
pub mod errors;
pub use errors::{DistributionErrorCode, Error, ErrorEnvelope, ErrorInfo, Result};

mod oci_digest;
pub use oci_digest::OciDigest;

pub mod registry;
pub use registry::{
    Action, Auditor, Authorizer, BlobDescriptor, BlobRead, BlobStore, BoxError, ByteStream,
    ManifestRecord, ManifestRef, ManifestSpec, ManifestStore, RepositoryName,
};
