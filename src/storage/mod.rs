//! Snapshot archive upload
//!
//! A dump spec names exactly one storage backend. The provider trait takes
//! the staged snapshot file plus the spec and returns the final object
//! location recorded into status. The shipped uploader composes the object
//! URL from the backend config and PUTs the file bytes over HTTP; request
//! signing is expected to be handled in front of the endpoint.

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::crd::{QiniuStorageSpec, S3StorageSpec, StorageSpec};
use crate::error::{Error, Result};

/// Destination for a staged snapshot archive
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Upload `file` per the spec's backend and return the object location
    async fn store(&self, spec: &StorageSpec, file: &Path) -> Result<String>;
}

/// HTTP uploader covering both supported object-store backends
pub struct ObjectStoreUploader {
    http: reqwest::Client,
}

impl ObjectStoreUploader {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    async fn put(&self, url: &str, file: &Path) -> Result<()> {
        let body = tokio::fs::read(file).await?;
        let response = self
            .http
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::storage(format!("upload to {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::storage(format!(
                "upload to {url} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl Default for ObjectStoreUploader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for ObjectStoreUploader {
    async fn store(&self, spec: &StorageSpec, file: &Path) -> Result<String> {
        let key = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::storage("snapshot file has no usable name"))?;

        if let Some(s3) = &spec.s3 {
            let url = s3_object_url(s3, key);
            self.put(&url, file).await?;
            info!(location = %url, "uploaded snapshot archive");
            return Ok(url);
        }

        if let Some(qiniu) = &spec.qiniu {
            // endpoints are tried in order, first success wins
            let urls = qiniu_object_urls(qiniu, key);
            let mut last_err = Error::storage("qiniu backend has no endpoints");
            for url in urls {
                match self.put(&url, file).await {
                    Ok(()) => {
                        info!(location = %url, "uploaded snapshot archive");
                        return Ok(url);
                    }
                    Err(e) => {
                        warn!(location = %url, error = %e, "upload attempt failed, trying next endpoint");
                        last_err = e;
                    }
                }
            }
            return Err(last_err);
        }

        Err(Error::validation(
            "storage spec names no backend, expected s3 or qiniu",
        ))
    }
}

fn qiniu_object_urls(qiniu: &QiniuStorageSpec, key: &str) -> Vec<String> {
    qiniu
        .endpoints
        .iter()
        .map(|endpoint| {
            format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                qiniu.bucket,
                key
            )
        })
        .collect()
}

fn s3_object_url(s3: &S3StorageSpec, key: &str) -> String {
    let endpoint = s3.endpoint.trim_end_matches('/');
    if s3.force_path_style {
        format!("{}/{}/{}", endpoint, s3.bucket, key)
    } else {
        // virtual-hosted style: bucket becomes the leading host label
        let (scheme, host) = endpoint
            .split_once("://")
            .unwrap_or(("https", endpoint));
        format!("{}://{}.{}/{}", scheme, s3.bucket, host, key)
    }
}
