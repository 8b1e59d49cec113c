use async_trait::async_trait;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use portfolio_core::{
    BlobDescriptor, Error, ManifestRecord, ManifestRef, ManifestStore, OciDigest, RepositoryName,
    Result,
};

use crate::errors::backend;

/// [`ManifestStore`] backed by a flat `repositories` / `manifests` / `tags` schema: a manifest
/// row is keyed by `(repository_id, digest)`, a tag row maps a name onto that digest, and both a
/// tag PUT and a digest PUT resolve to the same manifest row.
pub struct PgManifestStore {
    pool: PgPool,
}

impl PgManifestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn repository_id(&self, repo: &RepositoryName) -> Result<Uuid> {
        sqlx::query_scalar!(
            "SELECT id FROM repositories WHERE name = $1",
            repo.as_str(),
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| Error::NameUnknown(Some(repo.as_str().to_string())))
    }

    async fn get_or_create_repository_id(&self, repo: &RepositoryName) -> Result<Uuid> {
        sqlx::query_scalar!(
            r#"
INSERT INTO repositories (id, name)
VALUES (gen_random_uuid(), $1)
ON CONFLICT (name) DO UPDATE SET name = excluded.name
RETURNING id
            "#,
            repo.as_str(),
        )
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }
}

#[async_trait]
impl ManifestStore for PgManifestStore {
    async fn get(&self, repo: &RepositoryName, reference: &ManifestRef) -> Result<ManifestRecord> {
        let repository_id = self.repository_id(repo).await?;

        let row = match reference {
            ManifestRef::Digest(digest) => sqlx::query!(
                r#"
SELECT content_type, blob_digest, blob_size
FROM manifests
WHERE repository_id = $1 AND digest = $2
                "#,
                repository_id,
                String::from(digest),
            )
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?,
            ManifestRef::Tag(tag) => sqlx::query!(
                r#"
SELECT m.content_type, m.blob_digest, m.blob_size
FROM manifests m
JOIN tags t ON t.manifest_digest = m.digest AND t.repository_id = m.repository_id
WHERE m.repository_id = $1 AND t.name = $2
                "#,
                repository_id,
                tag.as_str(),
            )
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?,
        };

        let row = row.ok_or_else(|| {
            Error::ManifestUnknown(Some(format!("no manifest found for reference {reference}")))
        })?;

        Ok(ManifestRecord {
            content_type: row.content_type,
            blob: BlobDescriptor {
                digest: OciDigest::try_from(row.blob_digest.as_str())?,
                size: row.blob_size as u64,
            },
        })
    }

    async fn put(
        &self,
        repo: &RepositoryName,
        reference: &ManifestRef,
        manifest: ManifestRecord,
        deps: Vec<BlobDescriptor>,
    ) -> Result<()> {
        let repository_id = self.get_or_create_repository_id(repo).await?;
        let digest = String::from(&manifest.blob.digest);

        let mut tx = self.pool.begin().await.map_err(backend)?;

        let manifest_id: Uuid = sqlx::query_scalar!(
            r#"
INSERT INTO manifests (id, repository_id, digest, content_type, blob_digest, blob_size)
VALUES (gen_random_uuid(), $1, $2, $3, $4, $5)
ON CONFLICT (repository_id, digest)
DO UPDATE SET content_type = excluded.content_type
RETURNING id
            "#,
            repository_id,
            digest,
            manifest.content_type,
            digest,
            manifest.blob.size as i64,
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        sqlx::query!(
            "DELETE FROM manifest_dependencies WHERE manifest_id = $1",
            manifest_id,
        )
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        for dep in &deps {
            sqlx::query!(
                r#"
INSERT INTO manifest_dependencies (manifest_id, digest, size)
VALUES ($1, $2, $3)
                "#,
                manifest_id,
                String::from(&dep.digest),
                dep.size as i64,
            )
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        if let ManifestRef::Tag(tag) = reference {
            sqlx::query!(
                r#"
INSERT INTO tags (repository_id, name, manifest_digest)
VALUES ($1, $2, $3)
ON CONFLICT (repository_id, name)
DO UPDATE SET manifest_digest = excluded.manifest_digest
                "#,
                repository_id,
                tag.as_str(),
                digest,
            )
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;

        Ok(())
    }

    async fn list_tags(
        &self,
        repo: &RepositoryName,
        n: usize,
        last: Option<&str>,
    ) -> Result<Vec<String>> {
        let repository_id = self.repository_id(repo).await?;
        let rows = sqlx::query_scalar!(
            r#"
SELECT name
FROM tags
WHERE repository_id = $1 AND ($2::text IS NULL OR name > $2)
ORDER BY name
LIMIT $3
            "#,
            repository_id,
            last,
            n as i64,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows)
    }

    async fn list_digests(&self, repo: &RepositoryName) -> Result<Vec<OciDigest>> {
        let repository_id = self.repository_id(repo).await?;
        let rows = sqlx::query_scalar!(
            "SELECT digest FROM manifests WHERE repository_id = $1",
            repository_id,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter()
            .map(|d| OciDigest::try_from(d.as_str()))
            .collect()
    }

    async fn list_repositories(&self, n: usize) -> Result<Vec<String>> {
        sqlx::query_scalar!(
            "SELECT name FROM repositories ORDER BY name LIMIT $1",
            n as i64,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn contains(&self, repo: &RepositoryName, digest: &OciDigest) -> Result<bool> {
        let repository_id = self.repository_id(repo).await?;
        let exists = sqlx::query_scalar!(
            r#"
SELECT EXISTS(
    SELECT 1 FROM manifests WHERE repository_id = $1 AND digest = $2
) AS "exists!"
            "#,
            repository_id,
            String::from(digest),
        )
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(exists)
    }
}
