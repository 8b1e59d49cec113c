use async_trait::async_trait;
use sqlx::postgres::PgPool;

use portfolio_core::{Auditor, ManifestRef, RepositoryName, Result};

use crate::errors::backend;

/// [`Auditor`] that appends one row per successful pull. Failures to write an audit row are
/// returned to the caller, which per the trait's contract logs them and never fails the request.
pub struct PgAuditor {
    pool: PgPool,
}

impl PgAuditor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Auditor for PgAuditor {
    async fn audit_pull(&self, repo: &RepositoryName, target: &ManifestRef) -> Result<()> {
        sqlx::query!(
            r#"
INSERT INTO audit_log (id, repository_name, reference)
VALUES (gen_random_uuid(), $1, $2)
            "#,
            repo.as_str(),
            target.to_string(),
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}
