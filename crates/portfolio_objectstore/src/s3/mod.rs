use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use futures::stream::StreamExt;
use http::{StatusCode, Uri};
use hyper::body::Body;
use serde::Deserialize;

use super::Key;

pub(crate) mod logging;
use super::errors::{Error, Result};
use super::s3::logging::LoggingInterceptor;
use super::ObjectStore;

#[derive(Clone, Deserialize)]
pub struct S3Config {
    secret_key: String,
    access_key: String,
    hostname: String,
    bucket_name: String,
    region: String,
}

impl S3Config {
    pub async fn new_objects(&self) -> Result<S3> {
        let scp = SharedCredentialsProvider::new(
            Credentials::new(
                self.access_key.clone(),
                self.secret_key.clone(),
                None,
                None,
                "portfolio",
            )
            .provide_credentials()
            .await?,
        );

        let uri = Uri::builder()
            .scheme("https")
            .authority(self.hostname.as_str())
            .path_and_query("/")
            .build()?;

        let sdk_config = aws_config::load_from_env().await;

        let config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .region(Region::new(self.region.clone()))
            .credentials_provider(scp)
            .endpoint_url(uri.to_string())
            .interceptor(LoggingInterceptor)
            .build();

        let s3_client = aws_sdk_s3::Client::from_conf(config);

        Ok(S3 {
            bucket_name: self.bucket_name.clone(),
            client: s3_client,
        })
    }
}

#[derive(Clone)]
pub struct S3 {
    bucket_name: String,
    client: Client,
}

#[async_trait]
impl ObjectStore for S3 {
    async fn get(&self, key: &Key) -> Result<super::ObjectBody> {
        let get_object_output = self
            .client
            .get_object()
            .key(key)
            .bucket(&self.bucket_name)
            .send()
            .await?;

        Ok(get_object_output.body.map_err(|e| e.into()).boxed())
    }

    async fn exists(&self, key: &Key) -> Result<bool> {
        match self
            .client
            .head_object()
            .key(key)
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            Err(SdkError::ServiceError(e)) => {
                let http = e.raw();
                match http.status() {
                    StatusCode::NOT_FOUND => Ok(false),
                    _ => Err(SdkError::ServiceError(e).into()),
                }
            }
            Err(e) => Err(Error::AWSSDKHeadObjectError(e)),
            Ok(_) => Ok(true),
        }
    }

    async fn put(&self, key: &Key, body: Body, content_length: u64) -> Result<()> {
        let _put_object_output = self
            .client
            .put_object()
            .key(key)
            .body(body.into())
            .content_length(content_length as i64)
            .bucket(&self.bucket_name)
            .send()
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        self.client
            .delete_object()
            .key(key)
            .bucket(&self.bucket_name)
            .send()
            .await?;
        Ok(())
    }

    async fn size(&self, key: &Key) -> Result<u64> {
        let head_object_output = self
            .client
            .head_object()
            .key(key)
            .bucket(&self.bucket_name)
            .send()
            .await
            .map_err(Error::AWSSDKHeadObjectError)?;
        Ok(head_object_output.content_length().unwrap_or(0).max(0) as u64)
    }

    async fn presigned_get_url(&self, key: &Key) -> Result<Option<String>> {
        let presigned = self
            .client
            .get_object()
            .key(key)
            .bucket(&self.bucket_name)
            .presigned(PresigningConfig::expires_in(Duration::from_secs(900))?)
            .await?;
        Ok(Some(presigned.uri().to_string()))
    }
}
