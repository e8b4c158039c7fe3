use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;

use super::{ObjectStore, ObjectStoreError};
use crate::config::StorageCredentials;

const PROVIDER_NAME: &str = "cloudlet";

/// Bucket on AWS S3 or any S3-compatible service.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    #[must_use]
    pub fn new(credentials: &StorageCredentials, bucket: &str, endpoint: Option<&str>) -> Self {
        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(credentials.region.clone()))
            .credentials_provider(Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                None,
                None,
                PROVIDER_NAME,
            ));
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_owned(),
        }
    }

    fn presigning(ttl: Duration) -> Result<PresigningConfig, ObjectStoreError> {
        PresigningConfig::expires_in(ttl).map_err(|e| ObjectStoreError::Signing(e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| ObjectStoreError::Signing(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| ObjectStoreError::Signing(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    /// S3 deletes succeed for absent keys, so existence is checked first.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        if let Err(e) = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            return Err(match e.as_service_error() {
                Some(se) if se.is_not_found() => ObjectStoreError::NotFound(key.to_owned()),
                _ => ObjectStoreError::Backend(e.to_string()),
            });
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
