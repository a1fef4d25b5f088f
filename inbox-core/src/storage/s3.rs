//! S3-compatible object store client built on `aws-sdk-s3`

use super::object::ObjectClient;
use super::{Result, StorageError};
use crate::config::S3Config;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use std::path::Path;

/// Files above this size go up as a multipart upload of parts this large
const PART_SIZE: u64 = 64 * 1024 * 1024;

pub struct S3ObjectClient {
    client: Client,
}

fn backend_err<E: std::error::Error>(op: &str, e: E) -> StorageError {
    StorageError::Backend(format!("{} failed: {}", op, DisplayErrorContext(e)))
}

impl S3ObjectClient {
    /// Connect to the endpoint in `config` with static credentials and
    /// path-style addressing (MinIO and friends).
    pub async fn connect(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "inbox-config",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn put_multipart(&self, bucket: &str, key: &str, local_path: &Path, size: u64) -> Result<()> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| backend_err("CreateMultipartUpload", e))?;
        let upload_id = create
            .upload_id()
            .ok_or_else(|| StorageError::Backend(format!("No upload id for {}/{}", bucket, key)))?
            .to_string();

        match self.upload_parts(bucket, key, &upload_id, local_path, size).await {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder().set_parts(Some(parts)).build();
                self.client
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|e| backend_err("CompleteMultipartUpload", e))?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        "Failed to abort upload {} of {}/{}: {}",
                        upload_id,
                        bucket,
                        key,
                        DisplayErrorContext(abort)
                    );
                }
                Err(e)
            }
        }
    }

    /// Send the file one part at a time; only the part in flight is read.
    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        local_path: &Path,
        size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut offset = 0u64;
        let mut part_number = 1i32;

        while offset < size {
            let length = PART_SIZE.min(size - offset);
            let body = ByteStream::read_from()
                .path(local_path)
                .offset(offset)
                .length(Length::Exact(length))
                .build()
                .await
                .map_err(|e| backend_err("ReadPart", e))?;

            let resp = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
                .map_err(|e| backend_err("UploadPart", e))?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(resp.e_tag().map(str::to_string))
                    .build(),
            );
            tracing::debug!("Uploaded part {} of {}/{}", part_number, bucket, key);

            offset += length;
            part_number += 1;
        }

        Ok(parts)
    }
}

#[async_trait]
impl ObjectClient for S3ObjectClient {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(backend_err("HeadBucket", e)),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error().is_some_and(|se| {
                    se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists()
                }) =>
            {
                Err(StorageError::AlreadyExists(bucket.to_string()))
            }
            Err(e) => Err(backend_err("CreateBucket", e)),
        }
    }

    async fn put_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<u64> {
        let size = tokio::fs::metadata(local_path).await?.len();
        if size > PART_SIZE {
            self.put_multipart(bucket, key, local_path, size).await?;
            return Ok(size);
        }

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| backend_err("ReadFile", e))?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| backend_err("PutObject", e))?;
        Ok(size)
    }

    async fn copy_object(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<()> {
        self.client
            .copy_object()
            .bucket(bucket)
            .copy_source(format!("{}/{}", bucket, src_key))
            .key(dst_key)
            .send()
            .await
            .map_err(|e| backend_err("CopyObject", e))?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| backend_err("DeleteObject", e))?;
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| backend_err("ListObjectsV2", e))?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            match resp.next_continuation_token() {
                Some(next) if resp.is_truncated().unwrap_or(false) => token = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(keys)
    }
}
