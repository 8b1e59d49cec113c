use std::collections::HashMap;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

use super::errors::Result;
use super::RegistryState;

#[derive(Debug, Serialize)]
struct CatalogResponse {
    repositories: Vec<String>,
}

/// `GET /v2/_catalog?n=`.
///
/// No per-repo authorization: the manifest store is expected to scope repositories by the
/// authenticated principal's organization on its own. Unlike the tag lister, a malformed `n` is
/// not an error: it silently falls back to `0` rather than `BAD_REQUEST`. This asymmetry with
/// [`super::tags::get_tags`] is preserved from the upstream behavior being mirrored here and is
/// plausibly a bug, but changing it is out of scope.
pub(crate) async fn get_catalog(
    state: &RegistryState,
    params: &HashMap<String, String>,
) -> Result<Response> {
    let n = params
        .get("n")
        .map(|s| s.parse::<usize>().unwrap_or(0))
        .unwrap_or(10000);

    let repositories = state.manifests.list_repositories(n).await?;

    Ok((StatusCode::OK, Json(CatalogResponse { repositories })).into_response())
}
