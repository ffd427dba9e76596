//! Object storage for tarballs, build logs and built artifacts.
//!
//! The original pointed a local `boto3` client at a minio instance
//! (`http://127.0.0.1:9000`); [`S3ObjectStore`] is the equivalent
//! production backend built on `aws-sdk-s3`, and [`LocalObjectStore`] is a
//! filesystem-backed stand-in for tests and single-host deployments that
//! don't want to stand up an S3-compatible service.

use std::path::PathBuf;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tokio::io::AsyncWriteExt;

use crate::errors::{CatalogError, Result};

/// Named buckets the builder writes into, mirroring the original's
/// `docker-logs` / `singularity-logs` / `singularity` buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    DockerLogs,
    SingularityLogs,
    Singularity,
}

impl Bucket {
    fn name(self) -> &'static str {
        match self {
            Bucket::DockerLogs => "docker-logs",
            Bucket::SingularityLogs => "singularity-logs",
            Bucket::Singularity => "singularity",
        }
    }
}

/// Narrow interface onto an S3-compatible object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `bytes` to `bucket/key` and return a URL the caller can use
    /// to retrieve it later.
    async fn upload(&self, bucket: Bucket, key: &str, bytes: Vec<u8>) -> Result<String>;

    /// Delete an object. Deleting an object that doesn't exist is not an
    /// error, matching the idempotent-cleanup requirement.
    async fn delete(&self, bucket: Bucket, key: &str) -> Result<()>;

    /// Fetch an object's bytes, e.g. to re-read a build log.
    async fn fetch(&self, bucket: Bucket, key: &str) -> Result<Vec<u8>>;
}

/// Filesystem-backed object store: each bucket is a subdirectory of
/// `root`, each key a file within it.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path(&self, bucket: Bucket, key: &str) -> PathBuf {
        self.root.join(bucket.name()).join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, bucket: Bucket, key: &str, bytes: Vec<u8>) -> Result<String> {
        let path = self.path(bucket, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&bytes).await?;
        Ok(format!("file://{}", path.display()))
    }

    async fn delete(&self, bucket: Bucket, key: &str) -> Result<()> {
        let path = self.path(bucket, key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch(&self, bucket: Bucket, key: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.path(bucket, key)).await.map_err(|e| e.into())
    }
}

/// S3-compatible object store, configured from an endpoint URL and static
/// credentials (set up once at startup via [`crate::config::AppConfig`]).
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket_prefix: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket_prefix: String) -> Self {
        Self { client, bucket_prefix }
    }

    fn bucket_name(&self, bucket: Bucket) -> String {
        format!("{}-{}", self.bucket_prefix, bucket.name())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, bucket: Bucket, key: &str, bytes: Vec<u8>) -> Result<String> {
        let bucket_name = self.bucket_name(bucket);
        self.client
            .put_object()
            .bucket(&bucket_name)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| CatalogError::TransientInfra {
                message: format!("s3 put_object failed: {e}"),
            })?;
        Ok(format!("s3://{bucket_name}/{key}"))
    }

    async fn delete(&self, bucket: Bucket, key: &str) -> Result<()> {
        let bucket_name = self.bucket_name(bucket);
        self.client
            .delete_object()
            .bucket(&bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| CatalogError::TransientInfra {
                message: format!("s3 delete_object failed: {e}"),
            })?;
        Ok(())
    }

    async fn fetch(&self, bucket: Bucket, key: &str) -> Result<Vec<u8>> {
        let bucket_name = self.bucket_name(bucket);
        let out = self
            .client
            .get_object()
            .bucket(&bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| CatalogError::TransientInfra {
                message: format!("s3 get_object failed: {e}"),
            })?;
        let data = out.body.collect().await.map_err(|e| CatalogError::TransientInfra {
            message: format!("s3 get_object body read failed: {e}"),
        })?;
        Ok(data.into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf());
        let url = store.upload(Bucket::DockerLogs, "abc", b"hello".to_vec()).await.unwrap();
        assert!(url.starts_with("file://"));
        let fetched = store.fetch(Bucket::DockerLogs, "abc").await.unwrap();
        assert_eq!(fetched, b"hello");
    }

    #[tokio::test]
    async fn local_store_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf());
        store.delete(Bucket::Singularity, "missing").await.unwrap();
        store.delete(Bucket::Singularity, "missing").await.unwrap();
    }
}
