//! Harness for driving [`portfolio_http::router`] end-to-end against an in-memory backend,
//! without a live TCP listener.
//!
//! Every test in this crate builds its own [`RegistryState`] via [`test_state`] and sends
//! requests through [`send`], which runs the router as a [`tower::Service`] via
//! [`tower::ServiceExt::oneshot`] -- the same code path a real deployment serves requests
//! through, minus the socket.
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use bytes::Bytes;
use tower::ServiceExt;

use portfolio_core::{Auditor, Authorizer, BlobStore, ManifestStore};
use portfolio_http::{router, RegistryState};
use portfolio_memory::{AllowAllAuthorizer, InMemoryAuditor, MemoryRegistry};

/// A fresh in-memory registry, wired up the same way `portfolio`'s `Backend::Memory` is.
pub fn test_state() -> RegistryState {
    let registry = Arc::new(MemoryRegistry::new());
    RegistryState::new(
        registry.clone() as Arc<dyn BlobStore>,
        registry as Arc<dyn ManifestStore>,
        Arc::new(AllowAllAuthorizer) as Arc<dyn Authorizer>,
        Arc::new(InMemoryAuditor::new()) as Arc<dyn Auditor>,
    )
}

/// The decoded parts of a response a test actually wants to assert on.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// The `errors[0].code` field of an OCI error envelope body.
    pub fn error_code(&self) -> String {
        let value: serde_json::Value =
            serde_json::from_slice(&self.body).expect("error response body is JSON");
        value["errors"][0]["code"]
            .as_str()
            .expect("error envelope always has errors[0].code")
            .to_string()
    }

    /// The `errors[0].message` field of an OCI error envelope body, if present.
    pub fn error_message(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(&self.body).ok()?;
        value["errors"][0]["message"].as_str().map(String::from)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Drive `req` through a fresh clone of `state`'s router and collect the whole response body.
pub async fn send(state: &RegistryState, req: Request<Body>) -> TestResponse {
    let app = router(state.clone());
    let response = app.oneshot(req).await.expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let body = hyper::body::to_bytes(response.into_body())
        .await
        .expect("collecting response body");
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn get_request(path: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .expect("request is well-formed")
}

pub fn head_request(path: &str) -> Request<Body> {
    Request::builder()
        .method("HEAD")
        .uri(path)
        .body(Body::empty())
        .expect("request is well-formed")
}

pub fn delete_request(path: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(path)
        .body(Body::empty())
        .expect("request is well-formed")
}

pub fn put_manifest_request(
    repo: &str,
    reference: &str,
    content_type: &str,
    body: Bytes,
) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(format!("/v2/{repo}/manifests/{reference}"))
        .header("content-type", content_type)
        .body(Body::from(body))
        .expect("request is well-formed")
}
