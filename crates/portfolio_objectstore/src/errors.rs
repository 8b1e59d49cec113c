//! ObjectStore errors

use thiserror;

pub type Result<T> = std::result::Result<T, Error>;

/// General purpose [`super::ObjectStore`] error handling.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("http error")]
    HTTPError(#[from] http::Error),

    #[error("{0}")]
    ByteStreamError(#[from] aws_sdk_s3::primitives::ByteStreamError),

    #[error("aws sdk put object error")]
    AWSSDKPutObjectError(
        #[from] aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::put_object::PutObjectError>,
    ),
    #[error("aws sdk get object error")]
    AWSSDKGetObjectError(
        #[from] aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError>,
    ),
    #[error("aws sdk head object error")]
    AWSSDKHeadObjectError(
        #[from] aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::head_object::HeadObjectError>,
    ),
    #[error("aws sdk delete object error")]
    AWSSDKDeleteObjectError(
        #[from]
        aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::delete_object::DeleteObjectError>,
    ),
    #[error("aws sdk credentials error")]
    AWSSDKCredentialsError(#[from] aws_credential_types::provider::error::CredentialsError),

    #[error("aws sdk presigning error")]
    AWSSDKPresigningError(#[from] aws_sdk_s3::presigning::PresigningConfigError),

    #[error("key error: {0}")]
    KeyError(#[from] KeyError),
}

/// Error type used when parsing [`super::Key`] from [`std::path::PathBuf`].
#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    #[error("prefix not allowed")]
    PrefixNotAllowed,

    #[error("root dir not allowed")]
    RootDirNotAllowed,

    #[error("current dir (`.`) not allowed")]
    CurDirNotAllowed,

    #[error("parent dir (`..`) not allowed")]
    ParentDirNotAllowed,

    #[error("path components must be valid unicode")]
    PathComponentsMustBeValidUnicode,

    #[error("path components must match regex: {0}")]
    PathComponentsMustMatchRegex(String),
}
