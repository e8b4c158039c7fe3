//! Object storage seam.
//!
//! File bytes never pass through the service: callers move them with signed
//! URLs issued here. Backends are built once at startup and shared as
//! `Arc<dyn ObjectStore>`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod local;
pub mod s3;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

/// Lifetime of signed URLs.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(kernel::SIGNED_URL_TTL_SECS);

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("object {0} not found")]
    NotFound(String),

    #[error("cannot sign url: {0}")]
    Signing(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Signed URL allowing a single PUT of `key` with the given content type.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError>;

    /// Signed URL allowing GET of `key`.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError>;

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
}
