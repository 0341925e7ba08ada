//! Object storage for file content.
//!
//! Keys are opaque to the backends; [`content_key`] builds the ones used by
//! the node store.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

use super::node::{NodeId, ProjectId};

/// Trait for blob storage backends
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn copy(&self, from: &str, to: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Key of one content version of a file. Keys are never overwritten; a new
/// version always gets a new key.
pub fn content_key(project_id: ProjectId, node_id: NodeId, version: u64) -> String {
    format!("projects/{}/nodes/{}/v{}", project_id, node_id, version)
}

/// In-memory blob storage.
#[derive(Default)]
pub struct MemoryBlobStorage {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.data.lock().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.data
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("blob {} not found", key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().remove(key);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let mut data = self.data.lock();
        let bytes = data
            .get(from)
            .cloned()
            .ok_or_else(|| anyhow!("blob {} not found", from))?;
        data.insert(to.to_string(), bytes);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data.lock().contains_key(key))
    }
}

/// Directory-backed blob storage. Keys map to relative file paths.
pub struct FsBlobStorage {
    dir: PathBuf,
}

impl FsBlobStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key.starts_with('/')
            || key.split('/').any(|s| s.is_empty() || s == "." || s == "..")
        {
            return Err(anyhow!("invalid blob key {:?}", key));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path(key)?;
        Ok(tokio::fs::read(path).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path(key)?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let src = self.path(from)?;
        let dst = self.path(to)?;
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(src, dst).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path(key)?;
        Ok(tokio::fs::try_exists(path).await?)
    }
}

/// S3-compatible blob storage implementation
pub struct S3BlobStorage {
    pub client: aws_sdk_s3::Client,
    pub bucket: String,
}

impl S3BlobStorage {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BlobStorage for S3BlobStorage {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(data.to_vec().into())
            .send()
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;

        let data = resp.body.collect().await?;
        Ok(data.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, from))
            .key(to)
            .send()
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err.into())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn memory_blob_roundtrip_and_copy() {
        let blobs = MemoryBlobStorage::new();
        blobs.put("a", b"hello").await.unwrap();
        blobs.copy("a", "b").await.unwrap();
        assert_eq!(blobs.get("b").await.unwrap(), b"hello");
        blobs.delete("a").await.unwrap();
        assert!(!blobs.exists("a").await.unwrap());
        assert!(blobs.get("a").await.is_err());
        assert!(blobs.copy("a", "c").await.is_err());
        assert_eq!(blobs.len(), 1);
    }

    #[tokio::test]
    async fn fs_blob_creates_nested_keys() {
        let tempdir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStorage::new(tempdir.path()).unwrap();
        let key = content_key(Uuid::new_v4(), Uuid::new_v4(), 1);
        blobs.put(&key, b"fn main() {}").await.unwrap();
        assert!(blobs.exists(&key).await.unwrap());
        assert_eq!(blobs.get(&key).await.unwrap(), b"fn main() {}");

        blobs.copy(&key, "copies/main.rs").await.unwrap();
        assert_eq!(blobs.get("copies/main.rs").await.unwrap(), b"fn main() {}");

        blobs.delete(&key).await.unwrap();
        blobs.delete(&key).await.unwrap();
        assert!(!blobs.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn fs_blob_rejects_escaping_keys() {
        let tempdir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStorage::new(tempdir.path()).unwrap();
        assert!(blobs.put("../outside", b"x").await.is_err());
        assert!(blobs.put("/abs", b"x").await.is_err());
        assert!(blobs.get("a//b").await.is_err());
    }

    #[tokio::test]
    async fn s3_exists_reports_unreachable_backend_as_error() {
        use aws_sdk_s3::config::{retry::RetryConfig, BehaviorVersion, Credentials, Region};
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("key", "secret", None, None, "static"))
            .endpoint_url("http://127.0.0.1:1")
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .build();
        let blobs = S3BlobStorage::new(aws_sdk_s3::Client::from_conf(config), "codepad");
        // a transport failure is not proof that the key is absent
        assert!(blobs.exists("projects/p/nodes/n/v1").await.is_err());
    }
}
