use std::str::FromStr;

use axum::body::{Bytes, StreamBody};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use oci_spec::image::MediaType;

use portfolio_core::{
    Action, BlobDescriptor, BlobRead, ManifestRecord, ManifestRef, ManifestSpec, OciDigest,
    RepositoryName,
};

use super::errors::Result;
use super::RegistryState;

/// `GET /v2/<name>/manifests/<reference>`.
///
/// Fetches bytes from the blob store for the manifest's digest; a redirect directive short-
/// circuits straight to an HTTP redirect once the pull has been audited. Audit failures are
/// logged but never surface to the client.
pub(crate) async fn get_manifest(
    state: &RegistryState,
    repo: RepositoryName,
    target: &str,
) -> Result<Response> {
    let manifest_ref = ManifestRef::from_str(target).map_err(|_| {
        portfolio_core::Error::Unsupported("manifest reference must be a tag or digest")
    })?;

    state
        .authorizer
        .authorize_reference(&repo, &manifest_ref, Action::Read)
        .await?;

    let record = state.manifests.get(&repo, &manifest_ref).await?;

    match state.blobs.get(&repo, &record.blob.digest, true).await? {
        BlobRead::Redirect { location, status } => {
            audit(state, &repo, &manifest_ref).await;
            let mut headers = HeaderMap::new();
            headers.insert(header::LOCATION, HeaderValue::from_str(&location)?);
            Ok((status, headers).into_response())
        }
        BlobRead::Bytes(stream) => {
            let mut headers = manifest_headers(&record)?;
            headers.insert(
                header::CONTENT_LENGTH,
                HeaderValue::from_str(&record.blob.size.to_string())?,
            );
            let response = (StatusCode::OK, headers, StreamBody::new(stream)).into_response();
            audit(state, &repo, &manifest_ref).await;
            Ok(response)
        }
    }
}

/// `HEAD /v2/<name>/manifests/<reference>`. Same semantics as GET but the body is never
/// streamed; `Content-Length` comes from the blob store's `stat` capability rather than the
/// manifest record, matching the distribution spec's treatment of HEAD as an independent stat
/// operation. A backend that cannot stat surfaces that as an internal error.
pub(crate) async fn head_manifest(
    state: &RegistryState,
    repo: RepositoryName,
    target: &str,
) -> Result<Response> {
    let manifest_ref = ManifestRef::from_str(target).map_err(|_| {
        portfolio_core::Error::Unsupported("manifest reference must be a tag or digest")
    })?;

    state
        .authorizer
        .authorize_reference(&repo, &manifest_ref, Action::Read)
        .await?;

    let record = state.manifests.get(&repo, &manifest_ref).await?;
    let size = state.blobs.stat(&repo, &record.blob.digest).await?;

    let mut headers = manifest_headers(&record)?;
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&size.to_string())?,
    );

    audit(state, &repo, &manifest_ref).await;

    Ok((StatusCode::OK, headers, "").into_response())
}

fn manifest_headers(record: &ManifestRecord) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_lowercase(b"docker-content-digest")?,
        HeaderValue::from_str(&record.blob.digest.to_string())?,
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.content_type)?,
    );
    Ok(headers)
}

/// Audits a completed pull. Failures are logged but never propagated: the pull already
/// succeeded from the client's perspective by the time this runs.
async fn audit(state: &RegistryState, repo: &RepositoryName, target: &ManifestRef) {
    if let Err(e) = state.auditor.audit_pull(repo, target).await {
        tracing::warn!("failed to record audit entry for pull of {repo}@{target}: {e}");
    }
}

/// `PUT /v2/<name>/manifests/<reference>`, per the
/// [Distribution Spec push algorithm](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pushing-manifests).
pub(crate) async fn put_manifest(
    state: &RegistryState,
    repo: RepositoryName,
    target: &str,
    content_type: Option<&str>,
    bytes: Bytes,
) -> Result<Response> {
    let manifest_ref = ManifestRef::from_str(target).map_err(|_| {
        portfolio_core::Error::Unsupported("manifest reference must be a tag or digest")
    })?;

    state
        .authorizer
        .authorize_reference(&repo, &manifest_ref, Action::Write)
        .await?;

    if bytes.len() > 4 * 1024 * 1024 {
        return Err(portfolio_core::Error::ManifestInvalid(Some(
            "manifest body exceeds maximum size".to_string(),
        ))
        .into());
    }

    // We deserialize the body into a type we can use to determine how to represent it, but per
    // the distribution spec we also need to store the exact byte representation the client sent.
    // Deserializing non-destructively from &Bytes lets us still pass the original bytes on to
    // the blob store unmodified.
    let mut manifest = ManifestSpec::try_from(&bytes).map_err(|e| {
        tracing::warn!("error deserializing manifest: {e:?}");
        portfolio_core::Error::ManifestInvalid(None)
    })?;

    match (manifest.media_type(), content_type) {
        (Some(mt), Some(ct)) => {
            if mt != MediaType::from(ct) {
                return Err(portfolio_core::Error::ManifestInvalid(Some(format!(
                    "mediaType {mt} does not match Content-Type header {ct}"
                )))
                .into());
            }
        }
        (None, Some(ct)) => manifest.set_media_type(ct),
        (Some(_), None) => {
            tracing::warn!("client neglected to include a Content-Type header");
        }
        (None, None) => {
            manifest.infer_media_type()?;
            if let Some(mt) = manifest.media_type() {
                tracing::warn!("inferred media type as: {mt}");
            }
        }
    }

    // Index dependency enforcement: every distributable image/index sub-manifest an index
    // references must already be recorded in this repo before the PUT is allowed to proceed.
    for required in manifest.required_existing_manifests() {
        let digest = OciDigest::try_from(required.digest().as_str())?;
        if !state.manifests.contains(&repo, &digest).await? {
            return Err(portfolio_core::Error::ManifestUnknown(Some(format!(
                "referenced manifest {digest} not found in repository"
            )))
            .into());
        }
    }

    let deps = manifest.dependencies()?;

    let digest = OciDigest::from(bytes.as_ref());
    let content_type_string = manifest
        .media_type()
        .map(|mt| mt.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    state
        .blobs
        .put(&repo, &digest, &content_type_string, bytes.clone())
        .await?;

    let record = ManifestRecord {
        content_type: content_type_string,
        blob: BlobDescriptor {
            digest: digest.clone(),
            size: bytes.len() as u64,
        },
    };

    state
        .manifests
        .put(&repo, &manifest_ref, record, deps)
        .await?;

    let location = format!("/v2/{}/manifests/{}", repo.as_str(), digest);
    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, HeaderValue::from_str(&location)?);
    headers.insert(
        HeaderName::from_lowercase(b"docker-content-digest")?,
        HeaderValue::from_str(&digest.to_string())?,
    );
    headers.insert(
        HeaderName::from_lowercase(b"oci-subject")?,
        HeaderValue::from_str(&digest.to_string())?,
    );

    Ok((StatusCode::CREATED, headers, "").into_response())
}

/// Manifest deletion is part of the distribution spec but intentionally disabled here: no route
/// ever dispatches to `DELETE /v2/<name>/manifests/<reference>`. An implementer re-enabling this
/// must also address the TOCTOU in the index dependency check above -- nothing currently
/// prevents a sub-manifest from being deleted between the `contains` check and the subsequent
/// `ManifestStore::put`. Kept for reference; never called.
#[allow(dead_code)]
async fn delete_manifest(
    state: &RegistryState,
    repo: RepositoryName,
    target: &str,
) -> Result<Response> {
    let manifest_ref = ManifestRef::from_str(target).map_err(|_| {
        portfolio_core::Error::Unsupported("manifest reference must be a tag or digest")
    })?;
    state
        .authorizer
        .authorize_reference(&repo, &manifest_ref, Action::Write)
        .await?;
    let _ = state.manifests.get(&repo, &manifest_ref).await?;
    Ok((StatusCode::ACCEPTED, "").into_response())
}
