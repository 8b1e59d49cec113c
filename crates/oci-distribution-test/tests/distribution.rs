//! End-to-end HTTP-layer coverage of the distribution-spec surface, against the in-memory
//! backend. Every test drives the real [`portfolio_http::router`] through
//! [`oci_distribution_test::send`] rather than calling handler functions directly.
use bytes::Bytes;
use oci_spec::image::MediaType;

use oci_distribution_test::{
    delete_request, get_request, head_request, put_manifest_request, send, test_state,
};
use portfolio_core::OciDigest;
use portfolio_test_support::{basic_config, ImageBuilder, IndexBuilder, LayerBuilder};

fn layer(content: &'static str) -> portfolio_test_support::Layer {
    LayerBuilder::default()
        .data(Bytes::from_static(content.as_bytes()))
        .build()
        .unwrap()
}

fn sample_image() -> portfolio_test_support::Image {
    ImageBuilder::default()
        .config(basic_config())
        .layers(vec![layer("layer contents")])
        .build()
        .unwrap()
}

#[tokio::test]
async fn push_then_pull_image_by_tag_and_digest() {
    let state = test_state();
    let image = sample_image();
    let body = image.manifest_bytes();
    let content_type = MediaType::ImageManifest.to_string();

    let put = send(
        &state,
        put_manifest_request("acme/app", "v1", &content_type, body.clone()),
    )
    .await;
    assert_eq!(put.status, 201);
    let location = put.header("location").unwrap().to_string();
    assert!(location.ends_with(&format!("/manifests/{}", image.digest())));
    assert_eq!(put.header("docker-content-digest").unwrap(), image.digest().to_string());

    let by_tag = send(&state, get_request("/v2/acme/app/manifests/v1")).await;
    assert_eq!(by_tag.status, 200);
    assert_eq!(by_tag.body, body);
    assert_eq!(
        by_tag.header("docker-content-digest").unwrap(),
        image.digest().to_string()
    );

    let by_digest = send(
        &state,
        get_request(&format!("/v2/acme/app/manifests/{}", image.digest())),
    )
    .await;
    assert_eq!(by_digest.status, 200);
    assert_eq!(by_digest.body, body);
}

#[tokio::test]
async fn head_matches_get_status_digest_type_and_length() {
    let state = test_state();
    let image = sample_image();
    let body = image.manifest_bytes();
    let content_type = MediaType::ImageManifest.to_string();

    send(
        &state,
        put_manifest_request("acme/app", "v1", &content_type, body.clone()),
    )
    .await;

    let get = send(&state, get_request("/v2/acme/app/manifests/v1")).await;
    let head = send(&state, head_request("/v2/acme/app/manifests/v1")).await;

    assert_eq!(head.status, get.status);
    assert_eq!(head.header("docker-content-digest"), get.header("docker-content-digest"));
    assert_eq!(head.header("content-type"), get.header("content-type"));
    assert_eq!(head.header("content-length"), get.header("content-length"));
    assert!(head.body.is_empty());
}

#[tokio::test]
async fn tag_repoints_to_latest_push_digest_by_tag_unchanged() {
    let state = test_state();
    let content_type = MediaType::ImageManifest.to_string();

    let first = ImageBuilder::default()
        .config(basic_config())
        .layers(vec![layer("v1 contents")])
        .build()
        .unwrap();
    let second = ImageBuilder::default()
        .config(basic_config())
        .layers(vec![layer("v2 contents")])
        .build()
        .unwrap();
    assert_ne!(first.digest(), second.digest());

    send(
        &state,
        put_manifest_request("acme/app", "latest", &content_type, first.manifest_bytes()),
    )
    .await;
    send(
        &state,
        put_manifest_request("acme/app", "latest", &content_type, second.manifest_bytes()),
    )
    .await;

    let by_tag = send(&state, get_request("/v2/acme/app/manifests/latest")).await;
    assert_eq!(by_tag.body, second.manifest_bytes());

    let by_first_digest = send(
        &state,
        get_request(&format!("/v2/acme/app/manifests/{}", first.digest())),
    )
    .await;
    assert_eq!(by_first_digest.body, first.manifest_bytes());
}

#[tokio::test]
async fn pull_nonexistent_tag_yields_manifest_unknown() {
    let state = test_state();
    let content_type = MediaType::ImageManifest.to_string();

    // Establish that the repository itself exists, so the miss below is a manifest miss rather
    // than a repository miss.
    send(
        &state,
        put_manifest_request("acme/app", "v1", &content_type, sample_image().manifest_bytes()),
    )
    .await;

    let resp = send(&state, get_request("/v2/acme/app/manifests/does-not-exist")).await;
    assert_eq!(resp.status, 404);
    assert_eq!(resp.error_code(), "MANIFEST_UNKNOWN");
}

#[tokio::test]
async fn index_referencing_missing_child_is_rejected_with_no_partial_state() {
    let state = test_state();
    let missing_digest = OciDigest::try_from(
        "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
    )
    .unwrap();

    let image = sample_image();
    let index_json = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": [{
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "digest": missing_digest.to_string(),
            "size": image.manifest_bytes().len(),
        }],
    });
    let body = Bytes::from(serde_json::to_vec(&index_json).unwrap());

    let resp = send(
        &state,
        put_manifest_request(
            "acme/app",
            "latest",
            &MediaType::ImageIndex.to_string(),
            body,
        ),
    )
    .await;
    assert_eq!(resp.status, 404);
    assert_eq!(resp.error_code(), "MANIFEST_UNKNOWN");
    assert!(resp
        .error_message()
        .unwrap()
        .contains(&missing_digest.to_string()));

    // No partial state: the tag must not resolve after the rejected PUT.
    let after = send(&state, get_request("/v2/acme/app/manifests/latest")).await;
    assert_eq!(after.status, 404);
}

#[tokio::test]
async fn index_with_existing_child_succeeds() {
    let state = test_state();
    let child = sample_image();
    let content_type = MediaType::ImageManifest.to_string();

    send(
        &state,
        put_manifest_request(
            "acme/app",
            &child.digest().to_string(),
            &content_type,
            child.manifest_bytes(),
        ),
    )
    .await;

    let index = IndexBuilder::default()
        .manifests(vec![child])
        .build()
        .unwrap();

    let resp = send(
        &state,
        put_manifest_request(
            "acme/app",
            "multiarch",
            &MediaType::ImageIndex.to_string(),
            index.index_bytes(),
        ),
    )
    .await;
    assert_eq!(resp.status, 201);
}

#[tokio::test]
async fn tags_list_paginates_with_n_and_last() {
    let state = test_state();
    let content_type = MediaType::ImageManifest.to_string();
    let image = sample_image();

    for tag in ["v1", "v2", "v3", "v4"] {
        send(
            &state,
            put_manifest_request("acme/app", tag, &content_type, image.manifest_bytes()),
        )
        .await;
    }

    let page1 = send(&state, get_request("/v2/acme/app/tags/list?n=2")).await;
    assert_eq!(page1.status, 200);
    let body1: serde_json::Value = serde_json::from_slice(&page1.body).unwrap();
    assert_eq!(body1["name"], "acme/app");
    assert_eq!(body1["tags"], serde_json::json!(["v1", "v2"]));

    let page2 = send(
        &state,
        get_request("/v2/acme/app/tags/list?n=2&last=v2"),
    )
    .await;
    let body2: serde_json::Value = serde_json::from_slice(&page2.body).unwrap();
    assert_eq!(body2["tags"], serde_json::json!(["v3", "v4"]));
}

#[tokio::test]
async fn referrers_includes_exactly_the_manifests_with_matching_subject() {
    let state = test_state();
    let content_type = MediaType::ImageManifest.to_string();

    let parent = sample_image();
    send(
        &state,
        put_manifest_request(
            "acme/app",
            &parent.digest().to_string(),
            &content_type,
            parent.manifest_bytes(),
        ),
    )
    .await;

    let referrer = ImageBuilder::default()
        .config(basic_config())
        .layers(vec![layer("signature bytes")])
        .subject(parent.descriptor())
        .build()
        .unwrap();
    send(
        &state,
        put_manifest_request(
            "acme/app",
            &referrer.digest().to_string(),
            &content_type,
            referrer.manifest_bytes(),
        ),
    )
    .await;

    // An unrelated manifest with no subject must not show up as a referrer.
    let unrelated = ImageBuilder::default()
        .config(basic_config())
        .layers(vec![layer("unrelated bytes")])
        .build()
        .unwrap();
    send(
        &state,
        put_manifest_request(
            "acme/app",
            &unrelated.digest().to_string(),
            &content_type,
            unrelated.manifest_bytes(),
        ),
    )
    .await;

    let resp = send(
        &state,
        get_request(&format!("/v2/acme/app/referrers/{}", parent.digest())),
    )
    .await;
    assert_eq!(resp.status, 200);
    let index: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    let manifests = index["manifests"].as_array().unwrap();
    assert_eq!(manifests.len(), 1);
    assert_eq!(manifests[0]["digest"], referrer.digest().to_string());
    assert_eq!(
        manifests[0]["artifactType"],
        serde_json::json!("application/vnd.oci.image.config.v1+json")
    );
}

#[tokio::test]
async fn referrers_rejects_non_digest_target() {
    let state = test_state();
    let resp = send(
        &state,
        get_request("/v2/acme/app/referrers/not-a-digest"),
    )
    .await;
    assert_eq!(resp.status, 400);
    assert_eq!(resp.error_code(), "UNSUPPORTED");
}

#[tokio::test]
async fn manifest_body_with_top_level_blobs_field_is_rejected() {
    let state = test_state();
    let body = Bytes::from_static(br#"{"schemaVersion":2,"blobs":[{"digest":"sha256:aa"}]}"#);

    let resp = send(
        &state,
        put_manifest_request(
            "acme/app",
            "latest",
            "application/vnd.oci.image.manifest.v1+json",
            body,
        ),
    )
    .await;
    assert_eq!(resp.status, 400);
    assert_eq!(resp.error_code(), "MANIFEST_INVALID");
}

#[tokio::test]
async fn unsupported_method_on_manifest_endpoint_is_gated() {
    let state = test_state();
    let resp = send(&state, delete_request("/v2/acme/app/manifests/v1")).await;
    assert_eq!(resp.status, 405);
    assert_eq!(resp.error_code(), "METHOD_UNKNOWN");
}

#[tokio::test]
async fn index_non_distributable_layer_descriptor_is_not_required_to_pre_exist() {
    let state = test_state();
    let missing_digest = OciDigest::try_from(
        "sha256:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
    )
    .unwrap();

    // A foreign/non-distributable layer is never expected to be stored in this repository, so
    // an index referencing one by digest must not be rejected for that digest being unknown.
    let index_json = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": [{
            "mediaType": "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip",
            "digest": missing_digest.to_string(),
            "size": 1024,
        }],
    });
    let body = Bytes::from(serde_json::to_vec(&index_json).unwrap());

    let resp = send(
        &state,
        put_manifest_request(
            "acme/app",
            "foreign-layer",
            &MediaType::ImageIndex.to_string(),
            body,
        ),
    )
    .await;
    assert_eq!(resp.status, 201);
}

#[tokio::test]
async fn catalog_lists_pushed_repositories() {
    let state = test_state();
    let content_type = MediaType::ImageManifest.to_string();
    let image = sample_image();

    send(
        &state,
        put_manifest_request("acme/app", "v1", &content_type, image.manifest_bytes()),
    )
    .await;
    send(
        &state,
        put_manifest_request("acme/other", "v1", &content_type, image.manifest_bytes()),
    )
    .await;

    let resp = send(&state, get_request("/v2/_catalog")).await;
    assert_eq!(resp.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    let repositories = body["repositories"].as_array().unwrap();
    let names: Vec<&str> = repositories.iter().map(|v| v.as_str().unwrap()).collect();
    assert!(names.contains(&"acme/app"));
    assert!(names.contains(&"acme/other"));
}
