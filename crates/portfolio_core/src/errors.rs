use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

/// Wire-level error codes from the error encoder table (OCI Distribution Spec codes plus the
/// handful of registry-local codes the spec carries alongside them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionErrorCode {
    Denied,
    NameInvalid,
    NameUnknown,
    ManifestUnknown,
    ManifestInvalid,
    Unsupported,
    MethodUnknown,
    BadRequest,
    Unauthorized,
    Internal,
}

impl DistributionErrorCode {
    pub fn http_status(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Self::Denied => StatusCode::FORBIDDEN,
            Self::NameInvalid => StatusCode::BAD_REQUEST,
            Self::NameUnknown => StatusCode::NOT_FOUND,
            Self::ManifestUnknown => StatusCode::NOT_FOUND,
            Self::ManifestInvalid => StatusCode::BAD_REQUEST,
            Self::Unsupported => StatusCode::BAD_REQUEST,
            Self::MethodUnknown => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::Denied => "requested access to the resource is denied",
            Self::NameInvalid => "invalid repository name",
            Self::NameUnknown => "repository name not known to registry",
            Self::ManifestUnknown => "manifest unknown to registry",
            Self::ManifestInvalid => "manifest invalid",
            Self::Unsupported => "the operation is unsupported",
            Self::MethodUnknown => "the method is not allowed on this resource",
            Self::BadRequest => "the request could not be parsed",
            Self::Unauthorized => "authentication required",
            Self::Internal => "internal server error",
        }
    }
}

/// Errors surfaced by `portfolio_core` itself: digest parsing, manifest-spec parsing, and the
/// handful of conditions the core distinguishes before handing off to a collaborator.
///
/// Every collaborator trait (`BlobStore`, `ManifestStore`, `Authorizer`, `Auditor`) returns this
/// type so `portfolio_http` has a single error model to map onto the wire table regardless of
/// which backend produced it.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedDigestAlgorithm(String),
    #[error("invalid repository name: {0}")]
    InvalidRepositoryName(String),
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("manifest invalid{}", .0.as_ref().map(|s| format!(": {s}")).unwrap_or_default())]
    ManifestInvalid(Option<String>),
    #[error("manifest unknown{}", .0.as_ref().map(|s| format!(": {s}")).unwrap_or_default())]
    ManifestUnknown(Option<String>),
    #[error("repository unknown{}", .0.as_ref().map(|s| format!(": {s}")).unwrap_or_default())]
    NameUnknown(Option<String>),

    #[error("access denied")]
    AccessDenied,
    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("operation unsupported by backend: {0}")]
    Unsupported(&'static str),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Describes an error returned from the registry, in the envelope shape mandated by the OCI
/// Distribution Spec: `{"errors":[{"code","message","detail"}]}`.
#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: DistributionErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub errors: Vec<ErrorInfo>,
}

impl ErrorEnvelope {
    pub fn single(code: DistributionErrorCode, message: Option<String>) -> Self {
        Self {
            errors: vec![ErrorInfo {
                code,
                message: message.or_else(|| Some(code.default_message().to_string())),
                detail: None,
            }],
        }
    }
}
