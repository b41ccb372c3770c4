use std::path::PathBuf;

use lambda_runtime::tracing;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::adapters::object_copy::{CopyRequest, ObjectCopier};
use crate::runtime::copy_event::{decode_event_key, CopyEvent};
use crate::runtime::routing::{RoutingError, RoutingTable};
use crate::runtime::storage_keys::destination_object_key;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyHandlerConfig {
    pub target_bucket: String,
    pub routing_config_path: PathBuf,
    /// `YYYY/MM/DD` for this invocation.
    pub date_partition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON-encoded string message.
    pub body: String,
}

impl HandlerResponse {
    fn with_message(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            body: Value::String(message.into()).to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CopyHandlerError {
    #[error("malformed S3 event: {0}")]
    MalformedEvent(&'static str),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("failed to copy {source_bucket}/{source_key} to {target_bucket}/{target_key}: {message}")]
    Copy {
        source_bucket: String,
        source_key: String,
        target_bucket: String,
        target_key: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RelayOutcome {
    Skipped,
    Copied { destination_key: String },
}

/// Reads the bucket and decoded key of the first record of an S3 event
/// notification (`Records[0].s3.bucket.name`, `Records[0].s3.object.key`).
pub fn copy_event_from_s3(event: &Value) -> Result<CopyEvent, CopyHandlerError> {
    let record = event
        .get("Records")
        .and_then(Value::as_array)
        .and_then(|records| records.first())
        .ok_or(CopyHandlerError::MalformedEvent("event has no records"))?;
    let s3 = record
        .get("s3")
        .ok_or(CopyHandlerError::MalformedEvent("record has no s3 entity"))?;
    let bucket = s3
        .get("bucket")
        .and_then(|bucket| bucket.get("name"))
        .and_then(Value::as_str)
        .ok_or(CopyHandlerError::MalformedEvent("record has no bucket name"))?;
    let raw_key = s3
        .get("object")
        .and_then(|object| object.get("key"))
        .and_then(Value::as_str)
        .ok_or(CopyHandlerError::MalformedEvent("record has no object key"))?;
    let key = decode_event_key(raw_key)
        .ok_or(CopyHandlerError::MalformedEvent("object key is not valid UTF-8 once decoded"))?;

    Ok(CopyEvent::new(bucket, key))
}

/// Entry point for the Lambda. A malformed event is the only error; routing
/// and copy failures are reported as 500 responses.
pub fn handle_s3_event(
    event: &Value,
    config: &CopyHandlerConfig,
    copier: &impl ObjectCopier,
) -> Result<HandlerResponse, CopyHandlerError> {
    let copy_event = copy_event_from_s3(event)?;
    Ok(handle_copy_event(&copy_event, config, copier))
}

pub fn handle_copy_event(
    event: &CopyEvent,
    config: &CopyHandlerConfig,
    copier: &impl ObjectCopier,
) -> HandlerResponse {
    let key = &event.source_key;
    match relay(event, config, copier) {
        Ok(RelayOutcome::Skipped) => {
            tracing::info!(
                source_bucket = %event.source_bucket,
                source_key = %key,
                "not a .json or .tsv.gz file, no action taken"
            );
            HandlerResponse::with_message(
                200,
                format!("{key} is not a .json or .tsv.gz file. No action taken."),
            )
        }
        Ok(RelayOutcome::Copied { destination_key }) => {
            tracing::info!(
                source_bucket = %event.source_bucket,
                source_key = %key,
                target_bucket = %config.target_bucket,
                destination_key = %destination_key,
                "object copied"
            );
            HandlerResponse::with_message(200, format!("Successfully copied {key}"))
        }
        Err(error @ CopyHandlerError::Routing(_)) => {
            tracing::error!(
                source_bucket = %event.source_bucket,
                source_key = %key,
                prefix_id = %event.prefix_id(),
                error = %error,
                "target prefix lookup failed"
            );
            HandlerResponse::with_message(500, format!("Error resolving target prefix for {key}"))
        }
        Err(error) => {
            tracing::error!(
                source_bucket = %event.source_bucket,
                source_key = %key,
                target_bucket = %config.target_bucket,
                error = %error,
                "object copy failed"
            );
            HandlerResponse::with_message(500, format!("Error copying {key}"))
        }
    }
}

fn relay(
    event: &CopyEvent,
    config: &CopyHandlerConfig,
    copier: &impl ObjectCopier,
) -> Result<RelayOutcome, CopyHandlerError> {
    if !event.file_kind().is_relayed() {
        return Ok(RelayOutcome::Skipped);
    }

    // Re-read on every invocation so config edits apply without a redeploy.
    let routing = RoutingTable::load(&config.routing_config_path)?;
    let target_prefix = routing.lookup(event.prefix_id())?;
    let destination_key =
        destination_object_key(target_prefix, &config.date_partition, &event.source_key);

    let request = CopyRequest {
        source_bucket: event.source_bucket.clone(),
        source_key: event.source_key.clone(),
        target_bucket: config.target_bucket.clone(),
        target_key: destination_key.clone(),
    };
    copier
        .copy_object(&request)
        .map_err(|message| CopyHandlerError::Copy {
            source_bucket: request.source_bucket.clone(),
            source_key: request.source_key.clone(),
            target_bucket: request.target_bucket.clone(),
            target_key: request.target_key.clone(),
            message,
        })?;

    Ok(RelayOutcome::Copied { destination_key })
}
