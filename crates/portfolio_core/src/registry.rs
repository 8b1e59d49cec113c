//! Interoperability traits and types shared between [`portfolio_http`] and whatever backend
//! stores blobs, manifests, and authorization/audit state.
//!
//! Every trait here is `Send + Sync + 'static` and object-safe, so a handler holds its
//! collaborators as `Arc<dyn BlobStore>`, `Arc<dyn ManifestStore>`, `Arc<dyn Authorizer>`,
//! `Arc<dyn Auditor>` without needing to know which concrete backend is wired up behind them.
//!
//! ## Known implementations
//!
//! * `portfolio_memory` -- an in-process implementation of all four, used to run the server
//!   standalone and in the integration test suite.
//! * `portfolio_backend_postgres` -- `ManifestStore`, `Authorizer`, and `Auditor` backed by
//!   Postgres, pairing with `portfolio_objectstore`'s S3 `BlobStore` for bulk bytes.
use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use http::StatusCode;
use once_cell::sync::Lazy;
use regex::Regex;

use oci_spec::image::{Descriptor, ImageIndex, ImageManifest, MediaType};

use crate::errors::Error;
use crate::oci_digest::OciDigest;

pub type Result<T> = std::result::Result<T, Error>;
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A stream of body bytes, used for blob reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, BoxError>> + Send>>;

/// A non-empty, slash-joined path of lowercase segments, prefixed by an organization slug.
///
/// Corresponds to the `<name>` portion of distribution-spec endpoints like
/// `/v2/<name>/manifests/<reference>`. The first segment is the owning organization; the
/// remainder (possibly empty) is the repository path within that organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryName {
    full: String,
    org_len: usize,
}

static SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*$").unwrap());

impl RepositoryName {
    /// Parse and validate a repository name as produced by the URL classifier: a `/`-joined path
    /// with no leading or trailing slash.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidRepositoryName(s.to_string()));
        }
        for segment in s.split('/') {
            if !SEGMENT_RE.is_match(segment) {
                return Err(Error::InvalidRepositoryName(s.to_string()));
            }
        }
        let org_len = s.find('/').unwrap_or(s.len());
        Ok(Self {
            full: s.to_string(),
            org_len,
        })
    }

    /// The full `org/repo/path` string as it appears in URLs.
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// The organization slug: the first path segment.
    pub fn organization(&self) -> &str {
        &self.full[..self.org_len]
    }
}

impl std::fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

/// Reference to an [OCI manifest](https://github.com/opencontainers/image-spec/blob/main/manifest.md)
/// as specified by the
/// [OCI Distribution Spec](https://github.com/opencontainers/distribution-spec): the
/// `<reference>` portion of `/v2/<name>/manifests/<reference>`.
///
/// `<reference>` MUST be either (a) the digest of the manifest or (b) a tag, and MUST NOT be in
/// any other format. A tag MUST be at most 128 characters and match
/// `[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}`.
#[derive(Debug, Clone)]
pub enum ManifestRef {
    Digest(OciDigest),
    Tag(String),
}

impl std::fmt::Display for ManifestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Digest(d) => write!(f, "{d}"),
            Self::Tag(t) => f.write_str(t),
        }
    }
}

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}$").unwrap());

impl std::str::FromStr for ManifestRef {
    type Err = Error;

    /// Convert a `&str` to a [`ManifestRef`], first attempting [`OciDigest`], then falling back
    /// to tag validation against `[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}`.
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(digest) = OciDigest::try_from(s) {
            return Ok(Self::Digest(digest));
        }
        if TAG_RE.is_match(s) {
            return Ok(Self::Tag(String::from(s)));
        }
        Err(Error::InvalidReference(s.to_string()))
    }
}

/// Abstraction over [`oci_spec::image::ImageManifest`] and [`oci_spec::image::ImageIndex`],
/// exposing the metadata the manifest handler, referrers handler, and backends all need without
/// caring which shape a given PUT body takes.
pub enum ManifestSpec {
    Image(ImageManifest),
    Index(ImageIndex),
}

impl TryFrom<&Bytes> for ManifestSpec {
    type Error = Error;

    fn try_from(bs: &Bytes) -> Result<Self> {
        reject_top_level_blobs_field(bs)?;

        let img_err = match serde_json::from_slice::<ImageManifest>(bs) {
            Ok(m) => return Ok(ManifestSpec::Image(m)),
            Err(e) => e,
        };
        match serde_json::from_slice::<ImageIndex>(bs) {
            Ok(m) => Ok(ManifestSpec::Index(m)),
            Err(idx_err) => {
                tracing::warn!("unable to deserialize manifest as image: {img_err}");
                tracing::warn!("unable to deserialize manifest as index: {idx_err}");
                Err(Error::ManifestInvalid(None))
            }
        }
    }
}

/// A manifest body whose top-level JSON object has a `blobs` key is non-compliant with the OCI
/// Image Manifest/Index schemas (which describe dependencies via `layers`/`manifests`, not a
/// `blobs` array) and is rejected outright.
fn reject_top_level_blobs_field(bs: &Bytes) -> Result<()> {
    let value: serde_json::Value =
        serde_json::from_slice(bs).map_err(|_| Error::ManifestInvalid(None))?;
    if value.get("blobs").is_some() {
        return Err(Error::ManifestInvalid(Some(
            "manifest body must not contain a top-level 'blobs' field".to_string(),
        )));
    }
    Ok(())
}

impl ManifestSpec {
    pub fn media_type(&self) -> Option<MediaType> {
        match self {
            ManifestSpec::Image(im) => im.media_type().clone(),
            ManifestSpec::Index(ii) => ii.media_type().clone(),
        }
    }

    pub fn artifact_type(&self) -> Option<MediaType> {
        match self {
            ManifestSpec::Image(im) => im.artifact_type().clone(),
            ManifestSpec::Index(ii) => ii.artifact_type().clone(),
        }
    }

    pub fn annotations(&self) -> Option<HashMap<String, String>> {
        match self {
            ManifestSpec::Image(im) => im.annotations().clone(),
            ManifestSpec::Index(ii) => ii.annotations().clone(),
        }
    }

    pub fn subject(&self) -> Option<Descriptor> {
        match self {
            ManifestSpec::Image(im) => im.subject().clone(),
            ManifestSpec::Index(ii) => ii.subject().clone(),
        }
    }

    pub fn set_media_type(&mut self, s: &str) {
        let mt: MediaType = s.into();
        match self {
            ManifestSpec::Image(im) => im.set_media_type(Some(mt)),
            ManifestSpec::Index(ii) => ii.set_media_type(Some(mt)),
        }
    }

    /// Infer the media type of a manifest that omitted it, per the rules in the
    /// [OCI Image Manifest spec](https://github.com/opencontainers/image-spec/blob/main/manifest.md).
    pub fn infer_media_type(&mut self) -> Result<()> {
        match self {
            ManifestSpec::Image(im) => {
                if im.artifact_type().is_some() {
                    im.set_media_type(Some(MediaType::ImageManifest));
                    return Ok(());
                }
                if im.config().media_type() == &MediaType::ImageConfig {
                    im.set_media_type(Some(MediaType::ImageManifest));
                    return Ok(());
                }
                Err(Error::ManifestInvalid(None))
            }
            ManifestSpec::Index(ii) => {
                ii.set_media_type(Some(MediaType::ImageIndex));
                Ok(())
            }
        }
    }

    /// Index sub-manifests that a PUT of this manifest must already find recorded in the
    /// repository, and image-manifest dependencies (config/subject/layers) to collect into the
    /// manifest record. Non-image/index distributable descriptors of an index are skipped; their
    /// absence has no defined consequence per the distribution spec.
    pub fn dependencies(&self) -> Result<Vec<BlobDescriptor>> {
        match self {
            ManifestSpec::Index(index) => {
                let mut deps = Vec::new();
                for d in index.manifests() {
                    if is_distributable_image_or_index(d.media_type()) {
                        deps.push(BlobDescriptor {
                            digest: OciDigest::try_from(d.digest().as_str())?,
                            size: d.size() as u64,
                        });
                    } else {
                        tracing::debug!(
                            "skipping dependency check for non-image/index descriptor {}",
                            d.digest()
                        );
                    }
                }
                Ok(deps)
            }
            ManifestSpec::Image(image) => {
                let mut deps = Vec::new();
                let config = image.config();
                deps.push(BlobDescriptor {
                    digest: OciDigest::try_from(config.digest().as_str())?,
                    size: config.size() as u64,
                });
                if let Some(subject) = image.subject() {
                    deps.push(BlobDescriptor {
                        digest: OciDigest::try_from(subject.digest().as_str())?,
                        size: subject.size() as u64,
                    });
                }
                for layer in image.layers() {
                    if is_distributable(layer.media_type()) {
                        deps.push(BlobDescriptor {
                            digest: OciDigest::try_from(layer.digest().as_str())?,
                            size: layer.size() as u64,
                        });
                    }
                }
                Ok(deps)
            }
        }
    }

    /// The subset of [`Self::dependencies`] whose presence as an already-recorded manifest in the
    /// repository must be verified before the PUT succeeds: index sub-manifests only.
    pub fn required_existing_manifests(&self) -> Vec<&Descriptor> {
        match self {
            ManifestSpec::Index(index) => index
                .manifests()
                .iter()
                .filter(|d| is_distributable_image_or_index(d.media_type()))
                .collect(),
            ManifestSpec::Image(_) => Vec::new(),
        }
    }
}

fn is_distributable(mt: &MediaType) -> bool {
    match mt {
        MediaType::ImageLayerNonDistributable
        | MediaType::ImageLayerNonDistributableGzip
        | MediaType::ImageLayerNonDistributableZstd => false,
        MediaType::Other(s) => !s.to_lowercase().contains("nondistributable"),
        _ => true,
    }
}

fn is_distributable_image_or_index(mt: &MediaType) -> bool {
    is_distributable(mt) && matches!(mt, MediaType::ImageManifest | MediaType::ImageIndex)
}

/// Identifies a piece of content stored in the blob store, as recorded by the manifest store.
#[derive(Debug, Clone)]
pub struct BlobDescriptor {
    pub digest: OciDigest,
    pub size: u64,
}

/// The authoritative record of a manifest: its content type and the blob that holds its bytes.
///
/// Stored under both the manifest's own digest and whatever tag/digest reference a PUT targeted;
/// a GET/HEAD by either must return byte-identical content.
#[derive(Debug, Clone)]
pub struct ManifestRecord {
    pub content_type: String,
    pub blob: BlobDescriptor,
}

/// Outcome of reading a blob: either its bytes, or an instruction to redirect the client
/// elsewhere (e.g. to a pre-signed object-store URL).
///
/// The manifest handler branches on this and runs the audit side effect on both branches.
pub enum BlobRead {
    Bytes(ByteStream),
    Redirect { location: String, status: StatusCode },
}

/// Content-addressed byte storage. `stat` and `put` are optional capabilities: a backend that
/// cannot support them returns [`Error::Unsupported`]. A route that requires the capability
/// (HEAD needs `stat`, manifest PUT needs `put`) surfaces that as an internal error, since
/// reaching the route at all implies the capability should have been available at deploy time.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Fetch the blob's bytes, or a redirect directive if `allow_redirect` and the backend
    /// prefers to hand the client off elsewhere.
    async fn get(
        &self,
        repo: &RepositoryName,
        digest: &OciDigest,
        allow_redirect: bool,
    ) -> Result<BlobRead>;

    /// Return the size in bytes of the blob, without fetching its content.
    async fn stat(&self, _repo: &RepositoryName, _digest: &OciDigest) -> Result<u64> {
        Err(Error::Unsupported("blob store does not support stat"))
    }

    /// Store `bytes` under `digest`.
    async fn put(
        &self,
        _repo: &RepositoryName,
        _digest: &OciDigest,
        _content_type: &str,
        _bytes: Bytes,
    ) -> Result<()> {
        Err(Error::Unsupported("blob store does not support put"))
    }
}

/// Metadata mapping `(repo, reference) -> manifest record`, plus the repository/tag enumeration
/// and dependency-check operations layered on top of it.
#[async_trait]
pub trait ManifestStore: Send + Sync + 'static {
    /// Look up the manifest recorded under `reference` in `repo`.
    ///
    /// Returns `Err(Error::NameUnknown(_))` if `repo` itself does not exist, or
    /// `Err(Error::ManifestUnknown(_))` if the repo exists but has no such reference.
    async fn get(&self, repo: &RepositoryName, reference: &ManifestRef) -> Result<ManifestRecord>;

    /// Record `manifest` under both its own digest and `reference` (a tag or the same digest),
    /// along with its dependency set (sub-manifests/layers/config it references), atomically:
    /// either both the digest and reference rows become visible, or neither does.
    ///
    /// Returns `Err(Error::QuotaExceeded)` if the repository's manifest quota is exhausted.
    async fn put(
        &self,
        repo: &RepositoryName,
        reference: &ManifestRef,
        manifest: ManifestRecord,
        deps: Vec<BlobDescriptor>,
    ) -> Result<()>;

    /// List up to `n` tags in `repo`, resuming after `last` if given, in a deterministic order
    /// such that `last` reliably resumes pagination.
    async fn list_tags(
        &self,
        repo: &RepositoryName,
        n: usize,
        last: Option<&str>,
    ) -> Result<Vec<String>>;

    /// List every manifest digest recorded in `repo`, for the referrers scan.
    async fn list_digests(&self, repo: &RepositoryName) -> Result<Vec<OciDigest>>;

    /// List up to `n` repository names visible to the caller.
    async fn list_repositories(&self, n: usize) -> Result<Vec<String>>;

    /// Check whether `digest` is already recorded as a manifest in `repo` (used by the index PUT
    /// dependency check).
    async fn contains(&self, repo: &RepositoryName, digest: &OciDigest) -> Result<bool>;
}

/// The action a principal wants to perform against a repository or reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Stat,
    Write,
}

/// Decides whether a principal may act on a repository or a specific reference within it.
///
/// Derives organization ownership from [`RepositoryName::organization`] and checks role/capability
/// for the given [`Action`]. Implementations reject malformed names with
/// `Err(Error::InvalidRepositoryName(_))` before any I/O occurs elsewhere in the handler.
#[async_trait]
pub trait Authorizer: Send + Sync + 'static {
    async fn authorize(&self, repo: &RepositoryName, action: Action) -> Result<()>;

    async fn authorize_reference(
        &self,
        repo: &RepositoryName,
        reference: &ManifestRef,
        action: Action,
    ) -> Result<()>;
}

/// Records pull events. Failures are logged by the caller and never surfaced to the client.
#[async_trait]
pub trait Auditor: Send + Sync + 'static {
    async fn audit_pull(&self, repo: &RepositoryName, target: &ManifestRef) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn repository_name_splits_organization() {
        let name = RepositoryName::parse("acme/app/backend").unwrap();
        assert_eq!(name.organization(), "acme");
        assert_eq!(name.as_str(), "acme/app/backend");
    }

    #[test]
    fn repository_name_single_segment_is_its_own_organization() {
        let name = RepositoryName::parse("acme").unwrap();
        assert_eq!(name.organization(), "acme");
    }

    #[test]
    fn repository_name_rejects_empty_segments() {
        assert!(RepositoryName::parse("acme//app").is_err());
        assert!(RepositoryName::parse("").is_err());
        assert!(RepositoryName::parse("/acme").is_err());
    }

    #[test]
    fn repository_name_rejects_uppercase() {
        assert!(RepositoryName::parse("Acme/App").is_err());
    }

    #[test]
    fn manifest_ref_prefers_digest_over_tag_shaped_string() {
        let r = ManifestRef::from_str(
            "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        )
        .unwrap();
        assert!(matches!(r, ManifestRef::Digest(_)));
    }

    #[test]
    fn manifest_ref_falls_back_to_tag() {
        let r = ManifestRef::from_str("v1.2.3").unwrap();
        assert!(matches!(r, ManifestRef::Tag(t) if t == "v1.2.3"));
    }

    #[test]
    fn manifest_ref_rejects_bad_input() {
        assert!(ManifestRef::from_str("").is_err());
    }

    #[test]
    fn reject_blobs_field_catches_top_level_array() {
        let bs = Bytes::from_static(br#"{"blobs":[{"digest":"sha256:aa"}]}"#);
        assert!(reject_top_level_blobs_field(&bs).is_err());
    }
}
