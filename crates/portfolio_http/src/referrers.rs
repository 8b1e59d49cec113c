use std::collections::HashMap;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use http::StatusCode;
use oci_spec::image::{Descriptor, DescriptorBuilder, ImageIndex, ImageIndexBuilder, MediaType};
use serde_json::Value;

use portfolio_core::{Action, BlobRead, OciDigest, RepositoryName};

use super::errors::Result;
use super::RegistryState;

/// `GET /v2/<name>/referrers/<digest>`.
///
/// Authorize `(repo, target, Read)`, then scan every manifest digest recorded in `repo` for one
/// whose `subject.digest` matches `target`.
///
/// O(manifests-in-repo) per call: this endpoint's contract specifies result correctness, not
/// performance. The `artifact_type` query-string filter is accepted but not applied to narrow
/// the result set -- only echoed back in the `OCI-Filters-Applied` header -- which mirrors a
/// known gap rather than full compliance with the filtering extension.
pub(crate) async fn get_referrers(
    state: &RegistryState,
    repo: RepositoryName,
    digest: &str,
    params: &HashMap<String, String>,
) -> Result<Response> {
    let target = OciDigest::try_from(digest)
        .map_err(|_| portfolio_core::Error::Unsupported("referrers target must be a digest"))?;
    let target_ref: portfolio_core::ManifestRef = target
        .to_string()
        .parse()
        .expect("a digest string always parses back as a ManifestRef");

    state
        .authorizer
        .authorize_reference(&repo, &target_ref, Action::Read)
        .await?;

    let digests = state.manifests.list_digests(&repo).await?;

    let mut manifests = Vec::new();
    for d in digests {
        let record = match state.manifests.get(&repo, &d_ref(&d)).await {
            Ok(r) => r,
            Err(_) => continue,
        };

        let bytes = match state.blobs.get(&repo, &record.blob.digest, false).await? {
            BlobRead::Bytes(stream) => collect(stream).await?,
            BlobRead::Redirect { .. } => continue,
        };

        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let subject_digest = value
            .get("subject")
            .and_then(|s| s.get("digest"))
            .and_then(Value::as_str);
        if subject_digest != Some(target.to_string().as_str()) {
            continue;
        }

        // Unmarshal errors here are tolerated: a manifest with a malformed or absent
        // `config.mediaType` still counts as a referrer, just with an empty artifact type.
        let artifact_type = value
            .get("config")
            .and_then(|c| c.get("mediaType"))
            .and_then(Value::as_str)
            .map(MediaType::from);

        let mut builder = DescriptorBuilder::default();
        builder
            .media_type(MediaType::from(record.content_type.as_str()))
            .size(bytes.len() as i64)
            .digest(d.to_string());
        if let Some(at) = artifact_type {
            builder.artifact_type(at);
        }
        let descriptor: Descriptor = builder
            .build()
            .expect("all required Descriptor fields are set above");
        manifests.push(descriptor);
    }

    let image_index: ImageIndex = ImageIndexBuilder::default()
        .schema_version(2u32)
        .media_type(MediaType::ImageIndex)
        .manifests(manifests)
        .build()
        .expect("all required ImageIndex fields are set above");

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(MediaType::ImageIndex.to_string().as_str())?,
    );
    if let Some(artifact_type) = params.get("artifact_type") {
        headers.insert(
            HeaderName::from_lowercase(b"oci-filters-applied")?,
            HeaderValue::from_str(artifact_type)?,
        );
    }

    Ok((StatusCode::OK, headers, Json(image_index)).into_response())
}

fn d_ref(d: &OciDigest) -> portfolio_core::ManifestRef {
    portfolio_core::ManifestRef::Digest(d.clone())
}

async fn collect(mut stream: portfolio_core::ByteStream) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream
        .try_next()
        .await
        .map_err(|e| portfolio_core::Error::Backend(e.to_string()))?
    {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
