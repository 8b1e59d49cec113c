//! Adapts any [`ObjectStore`] into a [`portfolio_core::BlobStore`], mapping digests onto keys
//! under a per-repository prefix.
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http::StatusCode;

use portfolio_core::{BlobRead, ByteStream, Error as CoreError, OciDigest, RepositoryName, Result};

use crate::{Key, ObjectStore};

/// `portfolio_core::BlobStore` implementation backed by an [`ObjectStore`], used to pair
/// `portfolio_backend_postgres`'s `ManifestStore` with S3-compatible bulk storage.
pub struct ObjectStoreBlobs {
    objects: Arc<dyn ObjectStore>,
}

impl ObjectStoreBlobs {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    fn key_for(repo: &RepositoryName, digest: &OciDigest) -> Result<Key> {
        let digest_string = digest.to_string();
        let (algorithm, encoded) = digest_string
            .split_once(':')
            .expect("OciDigest::to_string always includes an algorithm prefix");
        let path = std::path::PathBuf::from(format!(
            "{}/blobs/{}/{}",
            repo.as_str(),
            algorithm,
            encoded
        ));
        Key::try_from(path).map_err(|e| CoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl portfolio_core::BlobStore for ObjectStoreBlobs {
    async fn get(
        &self,
        repo: &RepositoryName,
        digest: &OciDigest,
        allow_redirect: bool,
    ) -> Result<BlobRead> {
        let key = Self::key_for(repo, digest)?;

        if allow_redirect {
            if let Some(location) = self
                .objects
                .presigned_get_url(&key)
                .await
                .map_err(|e| CoreError::Backend(e.to_string()))?
            {
                return Ok(BlobRead::Redirect {
                    location,
                    status: StatusCode::TEMPORARY_REDIRECT,
                });
            }
        }

        let body = self
            .objects
            .get(&key)
            .await
            .map_err(|e| CoreError::Backend(e.to_string()))?;

        let stream: ByteStream =
            Box::pin(body.map_err(|e| Box::new(e) as portfolio_core::BoxError));
        Ok(BlobRead::Bytes(stream))
    }

    async fn stat(&self, repo: &RepositoryName, digest: &OciDigest) -> Result<u64> {
        let key = Self::key_for(repo, digest)?;
        self.objects
            .size(&key)
            .await
            .map_err(|e| CoreError::Backend(e.to_string()))
    }

    async fn put(
        &self,
        repo: &RepositoryName,
        digest: &OciDigest,
        _content_type: &str,
        bytes: Bytes,
    ) -> Result<()> {
        let key = Self::key_for(repo, digest)?;
        let content_length = bytes.len() as u64;
        self.objects
            .put(&key, hyper::body::Body::from(bytes), content_length)
            .await
            .map_err(|e| CoreError::Backend(e.to_string()))
    }
}
