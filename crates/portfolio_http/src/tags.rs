use std::collections::HashMap;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

use portfolio_core::{Action, RepositoryName};

use super::errors::{Error, Result};
use super::RegistryState;

#[derive(Debug, Serialize)]
struct TagsResponse {
    name: String,
    tags: Vec<String>,
}

/// `GET /v2/<name>/tags/list?n=&last=`.
///
/// Unlike the catalog handler, a malformed `n` is rejected outright with `BAD_REQUEST` rather
/// than silently substituted.
pub(crate) async fn get_tags(
    state: &RegistryState,
    repo: RepositoryName,
    params: &HashMap<String, String>,
) -> Result<Response> {
    state.authorizer.authorize(&repo, Action::Read).await?;

    let n = match params.get("n") {
        Some(s) => s
            .parse::<usize>()
            .map_err(|_| Error::InvalidQueryParameter("n", s.clone()))?,
        None => 10000,
    };
    let last = params.get("last").map(String::as_str);

    let tags = state.manifests.list_tags(&repo, n, last).await?;

    Ok((
        StatusCode::OK,
        Json(TagsResponse {
            name: repo.as_str().to_string(),
            tags,
        }),
    )
        .into_response())
}
