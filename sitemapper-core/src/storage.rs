//! Storage backends for generated sitemap files.
//!
//! Local mode writes into the generator's output root. S3 mode uploads to
//! `prefix + file name` as a publicly readable `application/xml` object.
//! Credentials come from the standard AWS environment variables.

use crate::error::{Result, SitemapError};
use crate::model::{StorageMode, StorageTarget};
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const XML_CONTENT_TYPE: &str = "application/xml";

pub enum StorageSink {
    Local {
        root: PathBuf,
    },
    S3 {
        client: aws_sdk_s3::Client,
        bucket: String,
        prefix: String,
    },
}

impl StorageSink {
    pub fn local(root: impl Into<PathBuf>) -> Self {
        StorageSink::Local { root: root.into() }
    }

    /// Build the sink for one index's storage settings.
    pub async fn for_target(target: &StorageTarget, output_root: &Path) -> Result<Self> {
        match target.mode {
            StorageMode::Local => Ok(Self::local(output_root)),
            StorageMode::S3 => {
                if target.bucket.is_empty() {
                    return Err(SitemapError::Storage(
                        "S3 storage selected but no bucket is configured".to_string(),
                    ));
                }

                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if !target.region.is_empty() {
                    loader = loader.region(Region::new(target.region.clone()));
                }
                let shared = loader.load().await;

                let mut builder = aws_sdk_s3::config::Builder::from(&shared);
                if let Some(endpoint) = target.endpoint.as_deref().filter(|e| !e.is_empty()) {
                    // Custom endpoints (MinIO, R2, ...) generally need path-style addressing
                    builder = builder.endpoint_url(endpoint).force_path_style(true);
                }

                Ok(StorageSink::S3 {
                    client: aws_sdk_s3::Client::from_conf(builder.build()),
                    bucket: target.bucket.clone(),
                    prefix: target.path_prefix.clone(),
                })
            }
        }
    }

    /// Where `file_name` ends up, for logging.
    pub fn location(&self, file_name: &str) -> String {
        match self {
            StorageSink::Local { root } => root.join(file_name).display().to_string(),
            StorageSink::S3 { bucket, prefix, .. } => format!("s3://{}/{}{}", bucket, prefix, file_name),
        }
    }

    /// Persist `body` under `file_name`, overwriting any previous content.
    pub async fn write(&self, file_name: &str, body: Vec<u8>) -> Result<()> {
        match self {
            StorageSink::Local { root } => {
                let path = root.join(file_name);
                debug!(path = %path.display(), bytes = body.len(), "Writing local file");
                tokio::fs::write(&path, body).await.map_err(|e| {
                    SitemapError::Storage(format!("{}: {}", path.display(), e))
                })?;
            }
            StorageSink::S3 {
                client,
                bucket,
                prefix,
            } => {
                let key = format!("{}{}", prefix, file_name);
                info!(bucket = %bucket, key = %key, "Uploading to S3");
                client
                    .put_object()
                    .bucket(bucket)
                    .key(&key)
                    .body(ByteStream::from(body))
                    .content_type(XML_CONTENT_TYPE)
                    .acl(ObjectCannedAcl::PublicRead)
                    .send()
                    .await
                    .map_err(|e| {
                        SitemapError::Storage(format!(
                            "s3://{}/{}: {}",
                            bucket,
                            key,
                            DisplayErrorContext(&e)
                        ))
                    })?;
            }
        }
        Ok(())
    }
}
