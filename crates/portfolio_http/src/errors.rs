use axum::response::{IntoResponse, Response};

use portfolio_core::{DistributionErrorCode, Error as CoreError, ErrorEnvelope};

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the HTTP layer: malformed requests that never reach a collaborator, plus
/// every [`portfolio_core::Error`] a collaborator can return.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("missing query parameter: {0}")]
    MissingQueryParameter(&'static str),
    #[error("invalid query parameter {0}: {1}")]
    InvalidQueryParameter(&'static str, String),
    #[error("unsupported http method")]
    MethodUnknown,
    #[error("not found")]
    NotFound,

    #[error("http invalid header value")]
    HTTPInvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error("http invalid header name")]
    HTTPInvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::MissingQueryParameter(_) | Error::InvalidQueryParameter(_, _) => {
                into_error_response(DistributionErrorCode::BadRequest, Some(self.to_string()))
            }
            Error::MethodUnknown => {
                into_error_response(DistributionErrorCode::MethodUnknown, None)
            }
            Error::NotFound => into_error_response(DistributionErrorCode::NameUnknown, None),
            Error::HTTPInvalidHeaderValue(_) | Error::HTTPInvalidHeaderName(_) => {
                tracing::error!("{self}");
                into_error_response(DistributionErrorCode::Internal, None)
            }
            Error::Core(e) => core_error_to_response(e),
        }
    }
}

#[inline]
fn into_error_response(code: DistributionErrorCode, msg: Option<String>) -> Response {
    let status = code.http_status();
    let envelope = ErrorEnvelope::single(code, msg);
    (status, axum::Json(envelope)).into_response()
}

/// Maps a core error onto the wire-code table from the error encoder module.
///
/// [`CoreError::Backend`] and [`CoreError::Unsupported`] are the internal-error branches: logged
/// via `tracing::error!` with the underlying message, and never echoed back to the client beyond
/// a generic body.
#[inline]
fn core_error_to_response(e: CoreError) -> Response {
    match e {
        CoreError::InvalidDigest(s) => {
            into_error_response(DistributionErrorCode::Unsupported, Some(s))
        }
        CoreError::UnsupportedDigestAlgorithm(s) => {
            into_error_response(DistributionErrorCode::Unsupported, Some(s))
        }
        CoreError::InvalidRepositoryName(s) => {
            into_error_response(DistributionErrorCode::NameInvalid, Some(s))
        }
        CoreError::InvalidReference(s) => {
            into_error_response(DistributionErrorCode::Unsupported, Some(s))
        }
        CoreError::ManifestInvalid(detail) => {
            into_error_response(DistributionErrorCode::ManifestInvalid, detail)
        }
        CoreError::ManifestUnknown(detail) => {
            into_error_response(DistributionErrorCode::ManifestUnknown, detail)
        }
        CoreError::NameUnknown(detail) => {
            into_error_response(DistributionErrorCode::NameUnknown, detail)
        }
        CoreError::AccessDenied => into_error_response(DistributionErrorCode::Denied, None),
        CoreError::QuotaExceeded => into_error_response(
            DistributionErrorCode::Denied,
            Some("quota exceeded".to_string()),
        ),
        CoreError::Unsupported(msg) => {
            tracing::error!("backend capability missing: {msg}");
            into_error_response(DistributionErrorCode::Internal, None)
        }
        CoreError::Backend(msg) => {
            tracing::error!("backend error: {msg}");
            into_error_response(DistributionErrorCode::Internal, None)
        }
    }
}
