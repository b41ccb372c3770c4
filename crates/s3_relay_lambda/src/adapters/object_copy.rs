use aws_sdk_s3::error::DisplayErrorContext;

use crate::runtime::copy_event::encode_copy_source;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub source_bucket: String,
    pub source_key: String,
    pub target_bucket: String,
    pub target_key: String,
}

pub trait ObjectCopier {
    fn copy_object(&self, request: &CopyRequest) -> Result<(), String>;
}

/// Server-side S3 copy. Holds the client built once at process start.
#[derive(Clone)]
pub struct S3ObjectCopier {
    s3_client: aws_sdk_s3::Client,
}

impl S3ObjectCopier {
    pub fn new(s3_client: aws_sdk_s3::Client) -> Self {
        Self { s3_client }
    }
}

impl ObjectCopier for S3ObjectCopier {
    fn copy_object(&self, request: &CopyRequest) -> Result<(), String> {
        let copy_source = encode_copy_source(&request.source_bucket, &request.source_key);
        let target_bucket = request.target_bucket.clone();
        let target_key = request.target_key.clone();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .copy_object()
                    .copy_source(copy_source)
                    .bucket(target_bucket)
                    .key(target_key)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| {
                        format!("failed to copy object in s3: {}", DisplayErrorContext(&error))
                    })
            })
        })
    }
}
