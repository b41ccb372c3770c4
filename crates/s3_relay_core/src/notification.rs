//! Bucket notification configuration model.
//!
//! S3 replaces a bucket's notification configuration wholesale on every
//! write, so updates are read-modify-write over the complete rule list. Rules
//! for queues and topics are carried along untouched.

use serde::{Deserialize, Serialize};

pub const OBJECT_CREATED_ANY: &str = "s3:ObjectCreated:*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "arn", rename_all = "snake_case")]
pub enum NotificationTarget {
    Lambda(String),
    Queue(String),
    Topic(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub target: NotificationTarget,
    pub events: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_suffix: Option<String>,
}

impl NotificationRule {
    /// Object-created rule invoking `lambda_arn`. An empty suffix means no
    /// suffix filter.
    pub fn lambda_object_created(
        lambda_arn: impl Into<String>,
        prefix: impl Into<String>,
        suffix: Option<&str>,
    ) -> Self {
        Self {
            id: None,
            target: NotificationTarget::Lambda(lambda_arn.into()),
            events: vec![OBJECT_CREATED_ANY.to_string()],
            filter_prefix: Some(prefix.into()),
            filter_suffix: suffix
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }

    pub fn is_lambda(&self) -> bool {
        matches!(self.target, NotificationTarget::Lambda(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfiguration {
    pub rules: Vec<NotificationRule>,
    #[serde(default)]
    pub event_bridge_enabled: bool,
}

impl NotificationConfiguration {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Appends `rule` after every existing rule. Nothing already present is
    /// removed or reordered.
    pub fn merged_with(mut self, rule: NotificationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn lambda_rules(&self) -> impl Iterator<Item = &NotificationRule> {
        self.rules.iter().filter(|rule| rule.is_lambda())
    }
}
