use std::fs;
use std::sync::Mutex;

use s3_relay_lambda::adapters::object_copy::{CopyRequest, ObjectCopier};
use s3_relay_lambda::config::CopyLambdaSettings;
use s3_relay_lambda::handlers::copy::{handle_s3_event, CopyHandlerConfig, HandlerResponse};
use serde_json::json;

#[derive(Default)]
struct RecordingCopier {
    requests: Mutex<Vec<CopyRequest>>,
}

impl ObjectCopier for RecordingCopier {
    fn copy_object(&self, request: &CopyRequest) -> Result<(), String> {
        self.requests
            .lock()
            .expect("poisoned mutex")
            .push(request.clone());
        Ok(())
    }
}

fn routing_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(
        dir.path().join("target.json"),
        r#"{"target_prefix": {"test1": "test1_prefix"}}"#,
    )
    .expect("write routing config");
    dir
}

fn handler_config(dir: &tempfile::TempDir) -> CopyHandlerConfig {
    let settings = CopyLambdaSettings::from_lookup(|key| match key {
        "TARGET_BUCKET" => Some("example-bucket".to_string()),
        "ROUTING_CONFIG_PATH" => Some(dir.path().join("target.json").display().to_string()),
        _ => None,
    })
    .expect("settings should load");

    CopyHandlerConfig {
        date_partition: "2024/06/01".to_string(),
        ..settings.handler_config()
    }
}

fn event(key: &str) -> serde_json::Value {
    json!({
        "Records": [
            {"s3": {"bucket": {"name": "src"}, "object": {"key": key}}}
        ]
    })
}

#[test]
fn relays_json_object_into_dated_target_prefix() {
    let dir = routing_dir();
    let copier = RecordingCopier::default();

    let response = handle_s3_event(&event("input/test1.json"), &handler_config(&dir), &copier)
        .expect("well-formed event");

    assert_eq!(
        serde_json::to_value(&response).expect("response should serialize"),
        json!({"statusCode": 200, "body": "\"Successfully copied input/test1.json\""})
    );
    let requests = copier.requests.lock().expect("poisoned mutex").clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].source_bucket, "src");
    assert_eq!(requests[0].source_key, "input/test1.json");
    assert_eq!(requests[0].target_bucket, "example-bucket");
    assert_eq!(
        requests[0].target_key,
        "test1_prefix/2024/06/01/input/test1.json"
    );
}

#[test]
fn ignores_unsupported_file_type() {
    let dir = routing_dir();
    let copier = RecordingCopier::default();

    let response: HandlerResponse =
        handle_s3_event(&event("input/HappyFace.jpg"), &handler_config(&dir), &copier)
            .expect("well-formed event");

    assert_eq!(response.status_code, 200);
    let message: String = serde_json::from_str(&response.body).expect("body is a JSON string");
    assert!(message.contains("No action taken"));
    assert!(copier.requests.lock().expect("poisoned mutex").is_empty());
}

#[test]
fn unmapped_stem_is_reported_as_server_error() {
    let dir = routing_dir();
    let copier = RecordingCopier::default();

    let response = handle_s3_event(&event("input/unknown.tsv.gz"), &handler_config(&dir), &copier)
        .expect("well-formed event");

    assert_eq!(response.status_code, 500);
    assert!(copier.requests.lock().expect("poisoned mutex").is_empty());
}
