//! # Portfolio HTTP
//!
//! `portfolio_http` implements the
//! [Distribution Spec](https://github.com/opencontainers/distribution-spec) request surface as an
//! [`axum::Router`], generic over the collaborator traits defined in [`portfolio_core`] -- a
//! backend only has to provide [`portfolio_core::BlobStore`], [`portfolio_core::ManifestStore`],
//! [`portfolio_core::Authorizer`], and [`portfolio_core::Auditor`] implementations.
//!
//! Distribution-spec paths embed a repository name of unbounded segment count in the middle of
//! the URL (`/v2/<name>/manifests/<reference>`), which does not fit Axum's static path-parameter
//! matching. Rather than pre-declaring routes per endpoint shape, [`router`] mounts a single
//! catch-all under `/v2` and hands the remaining path segments to [`classify::classify`], a pure
//! function unit-tested independently of any HTTP machinery.
//!
//! ## Example `main.rs`
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use portfolio_http::{router, RegistryState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let state: RegistryState = unimplemented!("wire up a BlobStore/ManifestStore/Authorizer/Auditor");
//!     let app = router(state);
//!     axum::Server::bind(&"0.0.0.0:13030".parse()?)
//!         .serve(app.into_make_service())
//!         .await?;
//!     Ok(())
//! }
//! ```
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use http::Response as HttpResponse;
use http_body::Body;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{self, TraceLayer};

mod classify;
mod errors;
mod manifests;
mod referrers;
mod tags;

pub(crate) mod catalog;

pub(crate) use errors::Error;
pub(crate) use errors::Result;

use classify::{classify, Classified};
use portfolio_core::{Auditor, Authorizer, BlobStore, ManifestStore, RepositoryName};

/// The collaborators every handler in this crate is generic over, bundled as `Arc<dyn _>` trait
/// objects so a single concrete state type works for any backend.
#[derive(Clone)]
pub struct RegistryState {
    pub blobs: Arc<dyn BlobStore>,
    pub manifests: Arc<dyn ManifestStore>,
    pub authorizer: Arc<dyn Authorizer>,
    pub auditor: Arc<dyn Auditor>,
}

impl RegistryState {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        manifests: Arc<dyn ManifestStore>,
        authorizer: Arc<dyn Authorizer>,
        auditor: Arc<dyn Auditor>,
    ) -> Self {
        Self {
            blobs,
            manifests,
            authorizer,
            auditor,
        }
    }
}

fn maybe_get_content_length(response: &HttpResponse<impl Body>) -> Option<HeaderValue> {
    response
        .body()
        .size_hint()
        .exact()
        .map(|size| HeaderValue::from_str(&size.to_string()).expect("size is always ASCII digits"))
}

async fn version() -> Result<Response> {
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str("application/json")?,
    );
    Ok((StatusCode::OK, headers, "{}").into_response())
}

fn split_path(uri: &Uri) -> Vec<&str> {
    uri.path().split('/').filter(|s| !s.is_empty()).collect()
}

/// Single entry point for every `/v2/...` request other than the bare version check. Classifies
/// the path, resolves a [`RepositoryName`] where one is present, and dispatches to the matching
/// handler for the request method. Any combination the classifier or method match doesn't
/// recognize falls through to [`Error::MethodUnknown`], which renders as `405`.
async fn dispatch(
    State(state): State<RegistryState>,
    Query(params): Query<HashMap<String, String>>,
    req: Request<axum::body::Body>,
) -> Result<Response> {
    let method = req.method().clone();
    let segments = split_path(req.uri());
    let classified = classify(&segments);

    match (&method, classified) {
        (&Method::GET, Classified::Catalog) => catalog::get_catalog(&state, &params).await,
        (&Method::GET, Classified::Tags { repo }) => {
            let repo = RepositoryName::parse(&repo)?;
            tags::get_tags(&state, repo, &params).await
        }
        (&Method::GET, Classified::Referrers { repo, digest }) => {
            let repo = RepositoryName::parse(&repo)?;
            referrers::get_referrers(&state, repo, digest, &params).await
        }
        (&Method::GET, Classified::Manifest { repo, target }) => {
            let repo = RepositoryName::parse(&repo)?;
            manifests::get_manifest(&state, repo, target).await
        }
        (&Method::HEAD, Classified::Manifest { repo, target }) => {
            let repo = RepositoryName::parse(&repo)?;
            manifests::head_manifest(&state, repo, target).await
        }
        (&Method::PUT, Classified::Manifest { repo, target }) => {
            let repo = RepositoryName::parse(&repo)?;
            let content_type = req
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let bytes = hyper::body::to_bytes(req.into_body())
                .await
                .map_err(|e| portfolio_core::Error::Backend(e.to_string()))?;
            manifests::put_manifest(&state, repo, target, content_type.as_deref(), bytes).await
        }
        _ => Err(Error::MethodUnknown),
    }
}

/// Build the [`axum::Router`] implementing the distribution-spec surface against `state`.
pub fn router(state: RegistryState) -> Router {
    Router::new()
        .route("/v2/", get(version))
        .route("/v2/*rest", any(dispatch))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().include_headers(true))
                .on_response(trace::DefaultOnResponse::new())
                .on_request(trace::DefaultOnRequest::new()),
        )
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_str("docker-distribution-api-version")
                .expect("static header name is valid"),
            HeaderValue::from_str("registry/2.0").expect("static header value is valid"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_TYPE,
            HeaderValue::from_str("application/json").expect("static header value is valid"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_LENGTH,
            maybe_get_content_length,
        ))
}
