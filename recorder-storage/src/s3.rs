//! S3-backed object store

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{operation::get_object::GetObjectError, primitives::ByteStream, Client};
use recorder_core::{RecorderError, RecorderResult};
use tracing::{debug, instrument};

use crate::ObjectStore;

/// S3 or S3-compatible bucket
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    endpoint: Option<String>,
}

impl S3ObjectStore {
    /// Create a store for `bucket`
    ///
    /// Credentials and region come from the standard AWS provider chain.
    /// A custom `endpoint` switches to path-style addressing for
    /// S3-compatible services.
    pub async fn connect(bucket: &str, endpoint: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(endpoint.is_some())
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.to_string(),
            endpoint: endpoint.map(str::to_string),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> RecorderResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| RecorderError::storage(format!("S3 put error for {}: {}", key, e)))?;
        debug!("Put s3://{}/{}", self.bucket, key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> RecorderResult<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| RecorderError::storage(format!("Failed to read S3 body: {}", e)))?
                    .into_bytes();
                Ok(Some(bytes.to_vec()))
            }
            Err(e) => {
                if let Some(GetObjectError::NoSuchKey(_)) = e.as_service_error() {
                    return Ok(None);
                }
                Err(RecorderError::storage(format!("S3 get error for {}: {}", key, e)))
            }
        }
    }

    async fn probe(&self) -> RecorderResult<String> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| RecorderError::storage(format!("Bucket {} unreachable: {}", self.bucket, e)))?;
        Ok(format!("Bucket {} reachable", self.location()))
    }

    fn location(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("s3://{} via {}", self.bucket, endpoint),
            None => format!("s3://{}", self.bucket),
        }
    }
}
