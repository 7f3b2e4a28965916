// dbsnapshot/src/storage/s3.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::{BehaviorVersion, Region};
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use s3::types::{
    BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier,
};
use std::path::Path;

use super::{ObjectPage, ObjectPager, ObjectStore, StoredObject, collect_all_pages};
use crate::config::StorageConfig;
use crate::errors::AppError;

/// S3 rejects DeleteObjects requests with more keys than this.
const MAX_DELETE_BATCH: usize = 1000;

/// Region in which S3 refuses an explicit location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// S3 (or S3-compatible) bucket access. Usable only after [`S3Gateway::init`].
pub struct S3Gateway {
    config: StorageConfig,
    client: Option<s3::Client>,
}

impl S3Gateway {
    pub fn new(config: StorageConfig) -> Self {
        Self { config, client: None }
    }

    /// Builds the client and provisions the bucket.
    ///
    /// A bucket we already own counts as provisioned; any other failure is returned.
    pub async fn init(&mut self) -> Result<()> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.config.region.clone()));
        if let Some(endpoint) = &self.config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(self.config.endpoint_url.is_some())
            .build();
        let client = s3::Client::from_conf(s3_config);
        tracing::info!(region = %self.config.region, "S3 client initialized");

        let mut request = client
            .create_bucket()
            .bucket(&self.config.bucket_name)
            .acl(BucketCannedAcl::Private);
        if self.config.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.config.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => tracing::info!(bucket = %self.config.bucket_name, "created bucket"),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                tracing::info!(bucket = %self.config.bucket_name, "bucket already exists")
            }
            Err(err) => {
                return Err(anyhow::anyhow!("{}", DisplayErrorContext(&err))).with_context(|| {
                    format!("Failed to create bucket {}", self.config.bucket_name)
                });
            }
        }

        self.client = Some(client);
        Ok(())
    }

    fn client(&self) -> Result<&s3::Client> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::StorageNotInitialized.into())
    }

    async fn delete_chunk(&self, client: &s3::Client, keys: &[String]) -> Result<()> {
        let delete = build_delete_request(keys)?;
        let output = client
            .delete_objects()
            .bucket(&self.config.bucket_name)
            .delete(delete)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| {
                format!(
                    "Failed to delete {} objects from bucket {}",
                    keys.len(),
                    self.config.bucket_name
                )
            })?;

        let errors = output.errors();
        if let Some(first) = errors.first() {
            return Err(AppError::PartialDelete {
                requested: keys.len(),
                failed: errors.len(),
                first: format!(
                    "{}: {}",
                    first.key().unwrap_or("<unknown key>"),
                    first.message().unwrap_or("no message")
                ),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Gateway {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()> {
        let client = self.client()?;

        let body = ByteStream::from_path(local_path).await.with_context(|| {
            format!("Failed to create ByteStream from file: {}", local_path.display())
        })?;

        client
            .put_object()
            .bucket(&self.config.bucket_name)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| {
                format!(
                    "Failed to upload file {} to S3 bucket {} with key {}",
                    local_path.display(),
                    self.config.bucket_name,
                    key
                )
            })?;

        tracing::info!(bucket = %self.config.bucket_name, key, "uploaded object");
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<StoredObject>> {
        collect_all_pages(self).await
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let client = self.client()?;
        for chunk in keys.chunks(MAX_DELETE_BATCH) {
            self.delete_chunk(client, chunk).await?;
        }
        tracing::info!(bucket = %self.config.bucket_name, count = keys.len(), "deleted objects");
        Ok(())
    }
}

#[async_trait]
impl ObjectPager for S3Gateway {
    async fn list_page(&self, continuation_token: Option<String>) -> Result<ObjectPage> {
        let client = self.client()?;
        let output = client
            .list_objects_v2()
            .bucket(&self.config.bucket_name)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| format!("Failed to list objects in bucket {}", self.config.bucket_name))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?.to_string();
                let last_modified = object
                    .last_modified()
                    .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos()));
                Some(StoredObject { key, last_modified })
            })
            .collect();

        Ok(ObjectPage {
            objects,
            next_token: output.next_continuation_token().map(str::to_string),
        })
    }
}

fn build_delete_request(keys: &[String]) -> Result<Delete> {
    let objects = keys
        .iter()
        .map(|key| ObjectIdentifier::builder().key(key).build())
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to build object identifiers for deletion")?;

    Delete::builder()
        .set_objects(Some(objects))
        .quiet(true)
        .build()
        .context("Failed to build delete request")
}
