use async_trait::async_trait;
use sqlx::postgres::PgPool;

use portfolio_core::{Action, Authorizer, Error, ManifestRef, RepositoryName, Result};

use crate::errors::backend;

struct OrgPolicy {
    public: bool,
    write_enabled: bool,
}

/// [`Authorizer`] whose policy is keyed entirely by the organization slug derived from
/// [`RepositoryName::organization`]: an unknown organization denies everything rather than
/// distinguishing "no such org" from "not allowed", per the wire error table's folding of both
/// into `DENIED`.
pub struct PgAuthorizer {
    pool: PgPool,
}

impl PgAuthorizer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn policy(&self, org: &str) -> Result<OrgPolicy> {
        let row = sqlx::query!(
            "SELECT public, write_enabled FROM organizations WHERE slug = $1",
            org,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => Ok(OrgPolicy {
                public: row.public,
                write_enabled: row.write_enabled,
            }),
            None => Err(Error::AccessDenied),
        }
    }
}

#[async_trait]
impl Authorizer for PgAuthorizer {
    async fn authorize(&self, repo: &RepositoryName, action: Action) -> Result<()> {
        let policy = self.policy(repo.organization()).await?;
        match action {
            Action::Read | Action::Stat if policy.public => Ok(()),
            Action::Write if policy.write_enabled => Ok(()),
            _ => Err(Error::AccessDenied),
        }
    }

    async fn authorize_reference(
        &self,
        repo: &RepositoryName,
        _reference: &ManifestRef,
        action: Action,
    ) -> Result<()> {
        self.authorize(repo, action).await
    }
}
