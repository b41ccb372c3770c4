use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_bucket_notification_configuration::GetBucketNotificationConfigurationOutput;
use aws_sdk_s3::types::{
    Event, EventBridgeConfiguration, FilterRule, FilterRuleName, LambdaFunctionConfiguration,
    NotificationConfiguration as S3NotificationConfiguration, NotificationConfigurationFilter,
    QueueConfiguration, S3KeyFilter, TopicConfiguration,
};

use crate::runtime::notification::{NotificationConfiguration, NotificationRule, NotificationTarget};

/// Whole-configuration access to a bucket's event notifications. Writes
/// replace everything previously configured on the bucket.
pub trait BucketNotificationStore {
    fn read_configuration(&self, bucket: &str) -> Result<NotificationConfiguration, String>;

    fn write_configuration(
        &self,
        bucket: &str,
        configuration: &NotificationConfiguration,
    ) -> Result<(), String>;
}

#[derive(Clone)]
pub struct S3NotificationStore {
    s3_client: aws_sdk_s3::Client,
}

impl S3NotificationStore {
    pub fn new(s3_client: aws_sdk_s3::Client) -> Self {
        Self { s3_client }
    }
}

impl BucketNotificationStore for S3NotificationStore {
    fn read_configuration(&self, bucket: &str) -> Result<NotificationConfiguration, String> {
        let client = self.s3_client.clone();
        let bucket = bucket.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .get_bucket_notification_configuration()
                    .bucket(&bucket)
                    .send()
                    .await
                    .map(|output| configuration_from_output(&output))
                    .map_err(|error| {
                        format!(
                            "failed to read notification configuration of {bucket}: {}",
                            DisplayErrorContext(&error)
                        )
                    })
            })
        })
    }

    fn write_configuration(
        &self,
        bucket: &str,
        configuration: &NotificationConfiguration,
    ) -> Result<(), String> {
        let sdk_configuration = to_sdk_configuration(configuration)?;
        let client = self.s3_client.clone();
        let bucket = bucket.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_bucket_notification_configuration()
                    .bucket(&bucket)
                    .notification_configuration(sdk_configuration)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| {
                        format!(
                            "failed to write notification configuration of {bucket}: {}",
                            DisplayErrorContext(&error)
                        )
                    })
            })
        })
    }
}

/// Lambda rules first, then queues, then topics, each in service order.
/// Response metadata is not carried over.
pub fn configuration_from_output(
    output: &GetBucketNotificationConfigurationOutput,
) -> NotificationConfiguration {
    let mut rules = Vec::new();

    for lambda in output.lambda_function_configurations() {
        let (filter_prefix, filter_suffix) = key_filters(lambda.filter());
        rules.push(NotificationRule {
            id: lambda.id().map(str::to_string),
            target: NotificationTarget::Lambda(lambda.lambda_function_arn().to_string()),
            events: event_names(lambda.events()),
            filter_prefix,
            filter_suffix,
        });
    }

    for queue in output.queue_configurations() {
        let (filter_prefix, filter_suffix) = key_filters(queue.filter());
        rules.push(NotificationRule {
            id: queue.id().map(str::to_string),
            target: NotificationTarget::Queue(queue.queue_arn().to_string()),
            events: event_names(queue.events()),
            filter_prefix,
            filter_suffix,
        });
    }

    for topic in output.topic_configurations() {
        let (filter_prefix, filter_suffix) = key_filters(topic.filter());
        rules.push(NotificationRule {
            id: topic.id().map(str::to_string),
            target: NotificationTarget::Topic(topic.topic_arn().to_string()),
            events: event_names(topic.events()),
            filter_prefix,
            filter_suffix,
        });
    }

    NotificationConfiguration {
        rules,
        event_bridge_enabled: output.event_bridge_configuration().is_some(),
    }
}

pub fn to_sdk_configuration(
    configuration: &NotificationConfiguration,
) -> Result<S3NotificationConfiguration, String> {
    let mut lambda_configurations = Vec::new();
    let mut queue_configurations = Vec::new();
    let mut topic_configurations = Vec::new();

    for rule in &configuration.rules {
        let events = rule.events.iter().map(|name| Event::from(name.as_str())).collect();
        let filter = sdk_filter(rule);
        match &rule.target {
            NotificationTarget::Lambda(arn) => lambda_configurations.push(
                LambdaFunctionConfiguration::builder()
                    .set_id(rule.id.clone())
                    .lambda_function_arn(arn)
                    .set_events(Some(events))
                    .set_filter(filter)
                    .build()
                    .map_err(|error| format!("invalid lambda notification rule: {error}"))?,
            ),
            NotificationTarget::Queue(arn) => queue_configurations.push(
                QueueConfiguration::builder()
                    .set_id(rule.id.clone())
                    .queue_arn(arn)
                    .set_events(Some(events))
                    .set_filter(filter)
                    .build()
                    .map_err(|error| format!("invalid queue notification rule: {error}"))?,
            ),
            NotificationTarget::Topic(arn) => topic_configurations.push(
                TopicConfiguration::builder()
                    .set_id(rule.id.clone())
                    .topic_arn(arn)
                    .set_events(Some(events))
                    .set_filter(filter)
                    .build()
                    .map_err(|error| format!("invalid topic notification rule: {error}"))?,
            ),
        }
    }

    Ok(S3NotificationConfiguration::builder()
        .set_lambda_function_configurations(non_empty(lambda_configurations))
        .set_queue_configurations(non_empty(queue_configurations))
        .set_topic_configurations(non_empty(topic_configurations))
        .set_event_bridge_configuration(
            configuration
                .event_bridge_enabled
                .then(|| EventBridgeConfiguration::builder().build()),
        )
        .build())
}

fn non_empty<T>(configurations: Vec<T>) -> Option<Vec<T>> {
    (!configurations.is_empty()).then_some(configurations)
}

fn event_names(events: &[Event]) -> Vec<String> {
    events.iter().map(|event| event.as_str().to_string()).collect()
}

fn key_filters(filter: Option<&NotificationConfigurationFilter>) -> (Option<String>, Option<String>) {
    let mut prefix = None;
    let mut suffix = None;
    let rules = filter
        .and_then(|filter| filter.key())
        .map(|key| key.filter_rules())
        .unwrap_or_default();
    for rule in rules {
        let value = rule.value().map(str::to_string);
        match rule.name() {
            Some(FilterRuleName::Prefix) => prefix = value,
            Some(FilterRuleName::Suffix) => suffix = value,
            _ => {}
        }
    }
    (prefix, suffix)
}

fn sdk_filter(rule: &NotificationRule) -> Option<NotificationConfigurationFilter> {
    let mut filter_rules = Vec::new();
    if let Some(prefix) = &rule.filter_prefix {
        filter_rules.push(
            FilterRule::builder()
                .name(FilterRuleName::Prefix)
                .value(prefix)
                .build(),
        );
    }
    if let Some(suffix) = &rule.filter_suffix {
        filter_rules.push(
            FilterRule::builder()
                .name(FilterRuleName::Suffix)
                .value(suffix)
                .build(),
        );
    }
    if filter_rules.is_empty() {
        return None;
    }

    Some(
        NotificationConfigurationFilter::builder()
            .key(
                S3KeyFilter::builder()
                    .set_filter_rules(Some(filter_rules))
                    .build(),
            )
            .build(),
    )
}
