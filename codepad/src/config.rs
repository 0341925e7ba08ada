//! Server configuration. Every option can come from the environment; a
//! command-line flag takes precedence over its variable.

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use codepad_core::auth::{Hs256Verifier, TokenVerifier};
use codepad_core::storage::store::DEFAULT_MAX_CONTENT_BYTES;
use codepad_core::storage::{
    BlobStorage, FsBlobStorage, MemoryBlobStorage, S3BlobStorage, StoreConfig,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BlobBackend {
    /// Files under the blob directory
    Fs,
    /// Process memory, lost on restart
    Memory,
    /// S3-compatible bucket
    S3,
}

#[derive(Clone, Debug, Parser)]
#[command(name = "codepad")]
#[command(about = "Project file tree service for the browser IDE")]
pub struct Config {
    /// Listen address
    #[arg(long, env = "CODEPAD_ADDR", default_value = "127.0.0.1:3000")]
    pub addr: SocketAddr,

    /// Directory holding node records and the project list
    #[arg(long, env = "CODEPAD_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "CODEPAD_BLOB_BACKEND", value_enum, default_value_t = BlobBackend::Fs)]
    pub blob_backend: BlobBackend,

    /// Content directory for the fs backend [default: <data-dir>/blobs]
    #[arg(long, env = "CODEPAD_BLOB_DIR")]
    pub blob_dir: Option<PathBuf>,

    #[arg(long, env = "CODEPAD_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom endpoint for S3-compatible stores such as MinIO
    #[arg(long, env = "CODEPAD_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// HS256 secret for bearer tokens; when set, X-User-Id is ignored
    #[arg(long, env = "CODEPAD_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    #[arg(long, env = "CODEPAD_MAX_CONTENT_BYTES", default_value_t = DEFAULT_MAX_CONTENT_BYTES)]
    pub max_content_bytes: usize,

    /// Delay before project stats are recomputed after a change
    #[arg(long, env = "CODEPAD_STATS_DEBOUNCE_MS", default_value_t = 250)]
    pub stats_debounce_ms: u64,
}

impl Config {
    pub fn nodes_dir(&self) -> PathBuf {
        self.data_dir.join("nodes")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.blob_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("blobs"))
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_content_bytes: self.max_content_bytes,
        }
    }

    pub fn stats_debounce(&self) -> Duration {
        Duration::from_millis(self.stats_debounce_ms)
    }

    /// `None` means no secret: identity comes from `X-User-Id` alone.
    pub fn verifier(&self) -> Option<Arc<dyn TokenVerifier>> {
        self.jwt_secret
            .as_deref()
            .map(|secret| Arc::new(Hs256Verifier::new(secret)) as Arc<dyn TokenVerifier>)
    }

    pub async fn blob_storage(&self) -> Result<Arc<dyn BlobStorage>> {
        match self.blob_backend {
            BlobBackend::Fs => {
                let dir = self.blob_dir();
                info!(dir = %dir.display(), "using filesystem blob storage");
                Ok(Arc::new(FsBlobStorage::new(dir)?))
            }
            BlobBackend::Memory => {
                info!("using in-memory blob storage");
                Ok(Arc::new(MemoryBlobStorage::new()))
            }
            BlobBackend::S3 => {
                let Some(bucket) = self.s3_bucket.clone() else {
                    bail!("CODEPAD_S3_BUCKET is required for the s3 blob backend");
                };
                let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
                if let Some(endpoint) = &self.s3_endpoint {
                    loader = loader.endpoint_url(endpoint);
                }
                let shared = loader.load().await;
                let s3_config = aws_sdk_s3::config::Builder::from(&shared)
                    .force_path_style(self.s3_endpoint.is_some())
                    .build();
                info!(bucket = %bucket, endpoint = ?self.s3_endpoint, "using s3 blob storage");
                Ok(Arc::new(S3BlobStorage::new(
                    aws_sdk_s3::Client::from_conf(s3_config),
                    bucket,
                )))
            }
        }
    }
}
