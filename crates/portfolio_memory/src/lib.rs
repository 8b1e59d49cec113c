//! In-process `BlobStore`/`ManifestStore`/`Authorizer`/`Auditor` implementations, backed by
//! nothing more durable than a handful of `Mutex<HashMap<_>>`s.
//!
//! Meant for running the registry standalone without a database, and for the integration test
//! suite, which needs a backend it can exercise without a live Postgres/S3 deployment.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use portfolio_core::{
    Action, Auditor, Authorizer, BlobDescriptor, BlobRead, ByteStream, Error, ManifestRecord,
    ManifestRef, ManifestStore, OciDigest, RepositoryName, Result,
};

/// Every entry a repository can hold: blobs keyed by digest, and manifest records keyed by both
/// digest and tag so a GET/HEAD under either resolves to the same bytes.
#[derive(Default)]
struct Repository {
    blobs: HashMap<OciDigest, (String, Bytes)>,
    by_digest: HashMap<OciDigest, ManifestRecord>,
    by_tag: HashMap<String, ManifestRecord>,
    // Insertion order of tags, for deterministic pagination.
    tag_order: Vec<String>,
}

/// A single process-local registry: every repository a caller has ever written to, each
/// independently locked.
#[derive(Default)]
pub struct MemoryRegistry {
    repositories: Mutex<HashMap<String, Repository>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl portfolio_core::BlobStore for MemoryRegistry {
    async fn get(
        &self,
        repo: &RepositoryName,
        digest: &OciDigest,
        _allow_redirect: bool,
    ) -> Result<BlobRead> {
        let repositories = self.repositories.lock().expect("lock poisoned");
        let repository = repositories
            .get(repo.as_str())
            .ok_or_else(|| Error::NameUnknown(None))?;
        let (_, bytes) = repository
            .blobs
            .get(digest)
            .ok_or_else(|| Error::ManifestUnknown(None))?
            .clone();

        let stream: ByteStream = Box::pin(futures_util::stream::once(async move { Ok(bytes) }));
        Ok(BlobRead::Bytes(stream))
    }

    async fn stat(&self, repo: &RepositoryName, digest: &OciDigest) -> Result<u64> {
        let repositories = self.repositories.lock().expect("lock poisoned");
        let repository = repositories
            .get(repo.as_str())
            .ok_or_else(|| Error::NameUnknown(None))?;
        let (_, bytes) = repository
            .blobs
            .get(digest)
            .ok_or_else(|| Error::ManifestUnknown(None))?;
        Ok(bytes.len() as u64)
    }

    async fn put(
        &self,
        repo: &RepositoryName,
        digest: &OciDigest,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<()> {
        let mut repositories = self.repositories.lock().expect("lock poisoned");
        let repository = repositories.entry(repo.as_str().to_string()).or_default();
        repository
            .blobs
            .insert(digest.clone(), (content_type.to_string(), bytes));
        Ok(())
    }
}

#[async_trait]
impl ManifestStore for MemoryRegistry {
    async fn get(&self, repo: &RepositoryName, reference: &ManifestRef) -> Result<ManifestRecord> {
        let repositories = self.repositories.lock().expect("lock poisoned");
        let repository = repositories
            .get(repo.as_str())
            .ok_or_else(|| Error::NameUnknown(None))?;

        match reference {
            ManifestRef::Digest(d) => repository
                .by_digest
                .get(d)
                .cloned()
                .ok_or_else(|| Error::ManifestUnknown(None)),
            ManifestRef::Tag(t) => repository
                .by_tag
                .get(t)
                .cloned()
                .ok_or_else(|| Error::ManifestUnknown(None)),
        }
    }

    async fn put(
        &self,
        repo: &RepositoryName,
        reference: &ManifestRef,
        manifest: ManifestRecord,
        deps: Vec<BlobDescriptor>,
    ) -> Result<()> {
        let mut repositories = self.repositories.lock().expect("lock poisoned");
        let repository = repositories.entry(repo.as_str().to_string()).or_default();

        // Dependencies recorded here are purely informational in this backend: the existence
        // check for index sub-manifests happens in portfolio_http via `contains` before `put` is
        // ever called. We still verify any dependency already present matches, to catch
        // programmer error in callers rather than silently accepting a mismatched descriptor.
        for dep in &deps {
            if let Some((_, existing)) = repository.blobs.get(&dep.digest) {
                if existing.len() as u64 != dep.size {
                    tracing::warn!(
                        "dependency {} size mismatch: recorded {} vs descriptor {}",
                        dep.digest,
                        existing.len(),
                        dep.size
                    );
                }
            }
        }

        repository
            .by_digest
            .insert(manifest.blob.digest.clone(), manifest.clone());

        match reference {
            ManifestRef::Digest(_) => {}
            ManifestRef::Tag(t) => {
                if !repository.by_tag.contains_key(t) {
                    repository.tag_order.push(t.clone());
                }
                repository.by_tag.insert(t.clone(), manifest);
            }
        }

        Ok(())
    }

    async fn list_tags(
        &self,
        repo: &RepositoryName,
        n: usize,
        last: Option<&str>,
    ) -> Result<Vec<String>> {
        let repositories = self.repositories.lock().expect("lock poisoned");
        let repository = repositories
            .get(repo.as_str())
            .ok_or_else(|| Error::NameUnknown(None))?;

        let mut tags: Vec<String> = repository.tag_order.clone();
        tags.sort();

        let start = match last {
            Some(l) => tags.iter().position(|t| t == l).map(|i| i + 1).unwrap_or(0),
            None => 0,
        };

        Ok(tags.into_iter().skip(start).take(n).collect())
    }

    async fn list_digests(&self, repo: &RepositoryName) -> Result<Vec<OciDigest>> {
        let repositories = self.repositories.lock().expect("lock poisoned");
        let repository = repositories
            .get(repo.as_str())
            .ok_or_else(|| Error::NameUnknown(None))?;
        Ok(repository.by_digest.keys().cloned().collect())
    }

    async fn list_repositories(&self, n: usize) -> Result<Vec<String>> {
        let repositories = self.repositories.lock().expect("lock poisoned");
        let mut names: Vec<String> = repositories.keys().cloned().collect();
        names.sort();
        names.truncate(n);
        Ok(names)
    }

    async fn contains(&self, repo: &RepositoryName, digest: &OciDigest) -> Result<bool> {
        let repositories = self.repositories.lock().expect("lock poisoned");
        Ok(repositories
            .get(repo.as_str())
            .map(|r| r.by_digest.contains_key(digest))
            .unwrap_or(false))
    }
}

/// Grants every action on every repository. Suitable for local development and the integration
/// test suite; a deployed registry pairs `portfolio_backend_postgres`'s organization-scoped
/// authorizer instead.
pub struct AllowAllAuthorizer;

#[async_trait]
impl Authorizer for AllowAllAuthorizer {
    async fn authorize(&self, _repo: &RepositoryName, _action: Action) -> Result<()> {
        Ok(())
    }

    async fn authorize_reference(
        &self,
        _repo: &RepositoryName,
        _reference: &ManifestRef,
        _action: Action,
    ) -> Result<()> {
        Ok(())
    }
}

/// Collects pull events in memory for inspection by tests; never fails.
#[derive(Default)]
pub struct InMemoryAuditor {
    pulls: Mutex<Vec<(String, String)>>,
}

impl InMemoryAuditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded_pulls(&self) -> Vec<(String, String)> {
        self.pulls.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl Auditor for InMemoryAuditor {
    async fn audit_pull(&self, repo: &RepositoryName, target: &ManifestRef) -> Result<()> {
        self.pulls
            .lock()
            .expect("lock poisoned")
            .push((repo.to_string(), target.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_core::{BlobStore, ManifestSpec};

    fn repo(s: &str) -> RepositoryName {
        RepositoryName::parse(s).unwrap()
    }

    fn sample_image_manifest() -> Bytes {
        Bytes::from_static(
            br#"{
                "schemaVersion": 2,
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "config": {
                    "mediaType": "application/vnd.oci.image.config.v1+json",
                    "digest": "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                    "size": 2
                },
                "layers": []
            }"#,
        )
    }

    #[tokio::test]
    async fn put_then_get_manifest_by_tag_and_digest_agree() {
        let registry = MemoryRegistry::new();
        let repo = repo("acme/app");
        let bytes = sample_image_manifest();
        let spec = ManifestSpec::try_from(&bytes).unwrap();
        let digest = OciDigest::from(bytes.as_ref());
        let record = ManifestRecord {
            content_type: spec
                .media_type()
                .map(|m| m.to_string())
                .unwrap_or_default(),
            blob: BlobDescriptor {
                digest: digest.clone(),
                size: bytes.len() as u64,
            },
        };

        registry
            .put(
                &repo,
                &ManifestRef::Tag("latest".to_string()),
                record.clone(),
                vec![],
            )
            .await
            .unwrap();

        let by_tag = ManifestStore::get(&registry, &repo, &ManifestRef::Tag("latest".to_string()))
            .await
            .unwrap();
        let by_digest = ManifestStore::get(&registry, &repo, &ManifestRef::Digest(digest))
            .await
            .unwrap();

        assert_eq!(by_tag.blob.digest, by_digest.blob.digest);
    }

    #[tokio::test]
    async fn unknown_repository_yields_name_unknown() {
        let registry = MemoryRegistry::new();
        let repo = repo("acme/ghost");
        let err = ManifestStore::get(&registry, &repo, &ManifestRef::Tag("latest".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NameUnknown(_)));
    }

    #[tokio::test]
    async fn contains_reflects_puts() {
        let registry = MemoryRegistry::new();
        let repo = repo("acme/app");
        let bytes = sample_image_manifest();
        let digest = OciDigest::from(bytes.as_ref());
        let record = ManifestRecord {
            content_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
            blob: BlobDescriptor {
                digest: digest.clone(),
                size: bytes.len() as u64,
            },
        };

        assert!(!registry.contains(&repo, &digest).await.unwrap());
        registry
            .put(
                &repo,
                &ManifestRef::Digest(digest.clone()),
                record,
                vec![],
            )
            .await
            .unwrap();
        assert!(registry.contains(&repo, &digest).await.unwrap());
    }

    #[tokio::test]
    async fn tag_pagination_resumes_after_last() {
        let registry = MemoryRegistry::new();
        let repo = repo("acme/app");
        let bytes = sample_image_manifest();
        let digest = OciDigest::from(bytes.as_ref());

        for tag in ["a", "b", "c"] {
            let record = ManifestRecord {
                content_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
                blob: BlobDescriptor {
                    digest: digest.clone(),
                    size: bytes.len() as u64,
                },
            };
            registry
                .put(&repo, &ManifestRef::Tag(tag.to_string()), record, vec![])
                .await
                .unwrap();
        }

        let page1 = registry.list_tags(&repo, 2, None).await.unwrap();
        assert_eq!(page1, vec!["a".to_string(), "b".to_string()]);

        let page2 = registry
            .list_tags(&repo, 2, Some("b"))
            .await
            .unwrap();
        assert_eq!(page2, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn blob_round_trips_bytes() {
        let registry = MemoryRegistry::new();
        let repo = repo("acme/app");
        let bytes = Bytes::from_static(b"hello");
        let digest = OciDigest::from(bytes.as_ref());

        registry
            .put(&repo, &digest, "application/octet-stream", bytes.clone())
            .await
            .unwrap();

        assert_eq!(registry.stat(&repo, &digest).await.unwrap(), 5);

        match BlobStore::get(&registry, &repo, &digest, false).await.unwrap() {
            BlobRead::Bytes(mut stream) => {
                use futures_util::StreamExt;
                let chunk = stream.next().await.unwrap().unwrap();
                assert_eq!(chunk, bytes);
            }
            BlobRead::Redirect { .. } => panic!("memory backend never redirects"),
        }
    }
}
