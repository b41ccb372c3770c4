use lambda_runtime::{service_fn, tracing, Error, LambdaEvent};
use s3_relay_lambda::adapters::object_copy::S3ObjectCopier;
use s3_relay_lambda::config::CopyLambdaSettings;
use s3_relay_lambda::handlers::copy::{handle_s3_event, HandlerResponse};
use serde_json::Value;

async fn handle_request(
    event: LambdaEvent<Value>,
    settings: &CopyLambdaSettings,
    copier: &S3ObjectCopier,
) -> Result<HandlerResponse, Error> {
    let config = settings.handler_config();
    Ok(handle_s3_event(&event.payload, &config, copier)?)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let settings = CopyLambdaSettings::from_env()?;
    tracing::info!(
        target_bucket = %settings.target_bucket,
        routing_config_path = %settings.routing_config_path.display(),
        partition_clock = ?settings.partition_clock,
        "starting copy lambda"
    );

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let copier = S3ObjectCopier::new(aws_sdk_s3::Client::new(&aws_config));

    lambda_runtime::run(service_fn(|event: LambdaEvent<Value>| {
        handle_request(event, &settings, &copier)
    }))
    .await
}
