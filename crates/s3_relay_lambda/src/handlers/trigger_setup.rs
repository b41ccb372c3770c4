//! Wires S3 buckets to Lambda functions: invoke permission plus an
//! object-created notification rule per trigger rule.
//!
//! Every bucket named by the plan is cleared once up front, then rules are
//! appended one at a time with a read immediately before each write. Reruns
//! therefore converge on the same configuration. Nothing guards against two
//! runs targeting the same bucket at once; run one at a time per bucket.

use lambda_runtime::tracing;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::function_registry::{FunctionRegistry, PermissionRevocation};
use crate::adapters::notification_store::BucketNotificationStore;
use crate::runtime::notification::{NotificationConfiguration, NotificationRule};
use crate::runtime::trigger_plan::{
    account_id_from_function_arn, distinct_buckets, InvokePermissionGrant, TriggerPlanError,
    TriggerRule,
};

#[derive(Debug, Error)]
pub enum TriggerSetupError {
    #[error(transparent)]
    Plan(#[from] TriggerPlanError),
    #[error("failed to clear notifications of {bucket}: {message}")]
    Clear { bucket: String, message: String },
    #[error("failed to resolve function {function_name}: {message}")]
    FunctionLookup {
        function_name: String,
        message: String,
    },
    #[error("failed to update invoke permission {statement_id}: {message}")]
    Permission {
        statement_id: String,
        message: String,
    },
    #[error("failed to read notifications of {bucket}: {message}")]
    NotificationRead { bucket: String, message: String },
    #[error("failed to write notifications of {bucket}: {message}")]
    NotificationWrite { bucket: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppliedTrigger {
    pub function_name: String,
    pub function_arn: String,
    pub bucket: String,
    pub statement_id: String,
    pub rule: NotificationRule,
    pub lambda_rule_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerSetupReport {
    pub cleared_buckets: Vec<String>,
    pub applied: Vec<AppliedTrigger>,
}

/// One rule as `configure_triggers` would apply it. The ARN and account are
/// placeholders since the preview makes no API calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedTrigger {
    pub bucket: String,
    pub grant: InvokePermissionGrant,
    pub rule: NotificationRule,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerPlanPreview {
    pub buckets_to_clear: Vec<String>,
    pub steps: Vec<PlannedTrigger>,
}

pub const PLACEHOLDER_ACCOUNT: &str = "<account>";

fn placeholder_function_arn(function_name: &str) -> String {
    format!("arn:aws:lambda:<region>:{PLACEHOLDER_ACCOUNT}:function:{function_name}")
}

pub fn plan_triggers(rules: &[TriggerRule]) -> TriggerPlanPreview {
    TriggerPlanPreview {
        buckets_to_clear: distinct_buckets(rules),
        steps: rules
            .iter()
            .map(|rule| PlannedTrigger {
                bucket: rule.bucket.clone(),
                grant: InvokePermissionGrant::for_bucket(
                    &rule.function_name,
                    &rule.bucket,
                    PLACEHOLDER_ACCOUNT,
                ),
                rule: NotificationRule::lambda_object_created(
                    placeholder_function_arn(&rule.function_name),
                    rule.prefix.clone(),
                    rule.suffix.as_deref(),
                ),
            })
            .collect(),
    }
}

pub fn configure_triggers(
    rules: &[TriggerRule],
    functions: &impl FunctionRegistry,
    notifications: &impl BucketNotificationStore,
) -> Result<TriggerSetupReport, TriggerSetupError> {
    let mut report = TriggerSetupReport::default();

    for bucket in distinct_buckets(rules) {
        notifications
            .write_configuration(&bucket, &NotificationConfiguration::empty())
            .map_err(|message| TriggerSetupError::Clear {
                bucket: bucket.clone(),
                message,
            })?;
        tracing::info!(bucket = %bucket, "cleared notification configuration");
        report.cleared_buckets.push(bucket);
    }

    for rule in rules {
        let applied = apply_rule(rule, functions, notifications)?;
        tracing::info!(
            function_name = %applied.function_name,
            bucket = %applied.bucket,
            lambda_rule_count = applied.lambda_rule_count,
            "configured s3 trigger"
        );
        report.applied.push(applied);
    }

    Ok(report)
}

fn apply_rule(
    rule: &TriggerRule,
    functions: &impl FunctionRegistry,
    notifications: &impl BucketNotificationStore,
) -> Result<AppliedTrigger, TriggerSetupError> {
    tracing::info!(
        function_name = %rule.function_name,
        bucket = %rule.bucket,
        prefix = %rule.prefix,
        suffix = ?rule.suffix,
        "configuring s3 trigger"
    );

    let function_arn =
        functions
            .function_arn(&rule.function_name)
            .map_err(|message| TriggerSetupError::FunctionLookup {
                function_name: rule.function_name.clone(),
                message,
            })?;
    let account_id = account_id_from_function_arn(&function_arn)?;

    let grant = InvokePermissionGrant::for_bucket(&rule.function_name, &rule.bucket, &account_id);
    refresh_permission(&grant, functions)?;

    let notification_rule = NotificationRule::lambda_object_created(
        function_arn.clone(),
        rule.prefix.clone(),
        rule.suffix.as_deref(),
    );

    let current = notifications
        .read_configuration(&rule.bucket)
        .map_err(|message| TriggerSetupError::NotificationRead {
            bucket: rule.bucket.clone(),
            message,
        })?;
    let merged = current.merged_with(notification_rule.clone());
    notifications
        .write_configuration(&rule.bucket, &merged)
        .map_err(|message| TriggerSetupError::NotificationWrite {
            bucket: rule.bucket.clone(),
            message,
        })?;

    Ok(AppliedTrigger {
        function_name: rule.function_name.clone(),
        function_arn,
        bucket: rule.bucket.clone(),
        statement_id: grant.statement_id,
        rule: notification_rule,
        lambda_rule_count: merged.lambda_rules().count(),
    })
}

fn refresh_permission(
    grant: &InvokePermissionGrant,
    functions: &impl FunctionRegistry,
) -> Result<(), TriggerSetupError> {
    let permission_error = |message| TriggerSetupError::Permission {
        statement_id: grant.statement_id.clone(),
        message,
    };

    match functions
        .revoke_invoke_permission(&grant.function_name, &grant.statement_id)
        .map_err(permission_error)?
    {
        PermissionRevocation::Removed => {
            tracing::info!(statement_id = %grant.statement_id, "removed existing permission")
        }
        PermissionRevocation::NotFound => {
            tracing::info!(statement_id = %grant.statement_id, "no existing permission found")
        }
    }

    functions
        .grant_invoke_permission(grant)
        .map_err(permission_error)?;
    tracing::info!(statement_id = %grant.statement_id, "added invoke permission");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;

    use super::*;
    use crate::runtime::notification::{NotificationTarget, OBJECT_CREATED_ANY};
    use crate::runtime::trigger_plan::statement_id;

    const ACCOUNT: &str = "123456789012";

    fn function_arn(name: &str) -> String {
        format!("arn:aws:lambda:ap-northeast-1:{ACCOUNT}:function:{name}")
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum RegistryCall {
        Lookup(String),
        Revoke(String),
        Grant(InvokePermissionGrant),
    }

    struct FakeFunctionRegistry {
        known: BTreeSet<String>,
        statements: Mutex<BTreeSet<String>>,
        calls: Mutex<Vec<RegistryCall>>,
    }

    impl FakeFunctionRegistry {
        fn with_functions(names: &[&str]) -> Self {
            Self {
                known: names.iter().map(|name| name.to_string()).collect(),
                statements: Mutex::new(BTreeSet::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<RegistryCall> {
            self.calls.lock().expect("poisoned mutex").clone()
        }
    }

    impl FunctionRegistry for FakeFunctionRegistry {
        fn function_arn(&self, function_name: &str) -> Result<String, String> {
            self.calls
                .lock()
                .expect("poisoned mutex")
                .push(RegistryCall::Lookup(function_name.to_string()));
            if self.known.contains(function_name) {
                Ok(function_arn(function_name))
            } else {
                Err(format!("Function not found: {function_name}"))
            }
        }

        fn revoke_invoke_permission(
            &self,
            _function_name: &str,
            statement_id: &str,
        ) -> Result<PermissionRevocation, String> {
            self.calls
                .lock()
                .expect("poisoned mutex")
                .push(RegistryCall::Revoke(statement_id.to_string()));
            if self
                .statements
                .lock()
                .expect("poisoned mutex")
                .remove(statement_id)
            {
                Ok(PermissionRevocation::Removed)
            } else {
                Ok(PermissionRevocation::NotFound)
            }
        }

        fn grant_invoke_permission(&self, grant: &InvokePermissionGrant) -> Result<(), String> {
            self.calls
                .lock()
                .expect("poisoned mutex")
                .push(RegistryCall::Grant(grant.clone()));
            let inserted = self
                .statements
                .lock()
                .expect("poisoned mutex")
                .insert(grant.statement_id.clone());
            if inserted {
                Ok(())
            } else {
                Err(format!("statement {} already exists", grant.statement_id))
            }
        }
    }

    #[derive(Default)]
    struct InMemoryNotificationStore {
        buckets: Mutex<BTreeMap<String, NotificationConfiguration>>,
        writes: Mutex<Vec<String>>,
    }

    impl InMemoryNotificationStore {
        fn seeded(bucket: &str, configuration: NotificationConfiguration) -> Self {
            let store = Self::default();
            store
                .buckets
                .lock()
                .expect("poisoned mutex")
                .insert(bucket.to_string(), configuration);
            store
        }

        fn configuration(&self, bucket: &str) -> NotificationConfiguration {
            self.buckets
                .lock()
                .expect("poisoned mutex")
                .get(bucket)
                .cloned()
                .unwrap_or_default()
        }

        fn writes(&self) -> Vec<String> {
            self.writes.lock().expect("poisoned mutex").clone()
        }
    }

    impl BucketNotificationStore for InMemoryNotificationStore {
        fn read_configuration(&self, bucket: &str) -> Result<NotificationConfiguration, String> {
            Ok(self.configuration(bucket))
        }

        fn write_configuration(
            &self,
            bucket: &str,
            configuration: &NotificationConfiguration,
        ) -> Result<(), String> {
            self.writes
                .lock()
                .expect("poisoned mutex")
                .push(bucket.to_string());
            self.buckets
                .lock()
                .expect("poisoned mutex")
                .insert(bucket.to_string(), configuration.clone());
            Ok(())
        }
    }

    fn rule(function_name: &str, bucket: &str, prefix: &str, suffix: Option<&str>) -> TriggerRule {
        TriggerRule {
            function_name: function_name.to_string(),
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            suffix: suffix.map(str::to_string),
        }
    }

    #[test]
    fn single_rule_on_empty_bucket_writes_one_lambda_entry() {
        let functions = FakeFunctionRegistry::with_functions(&["fn"]);
        let notifications = InMemoryNotificationStore::default();

        let report = configure_triggers(
            &[rule("fn", "bucket", "input/", Some(".json"))],
            &functions,
            &notifications,
        )
        .expect("setup should succeed");

        let configuration = notifications.configuration("bucket");
        let lambda_rules: Vec<_> = configuration.lambda_rules().collect();
        assert_eq!(lambda_rules.len(), 1);
        assert_eq!(lambda_rules[0].target, NotificationTarget::Lambda(function_arn("fn")));
        assert_eq!(lambda_rules[0].filter_prefix.as_deref(), Some("input/"));
        assert_eq!(lambda_rules[0].filter_suffix.as_deref(), Some(".json"));
        assert_eq!(report.applied[0].lambda_rule_count, 1);
        assert_eq!(report.applied[0].statement_id, "fn-s3-invoke-bucket");
    }

    #[test]
    fn revokes_before_granting_with_bucket_scope() {
        let functions = FakeFunctionRegistry::with_functions(&["fn"]);
        let notifications = InMemoryNotificationStore::default();

        configure_triggers(
            &[rule("fn", "bucket", "input/", None)],
            &functions,
            &notifications,
        )
        .expect("setup should succeed");

        assert_eq!(
            functions.calls(),
            vec![
                RegistryCall::Lookup("fn".to_string()),
                RegistryCall::Revoke("fn-s3-invoke-bucket".to_string()),
                RegistryCall::Grant(InvokePermissionGrant::for_bucket("fn", "bucket", ACCOUNT)),
            ]
        );
    }

    #[test]
    fn clears_each_bucket_once_before_appending() {
        let stale = NotificationConfiguration::empty().merged_with(
            NotificationRule::lambda_object_created(function_arn("old"), "stale/", None),
        );
        let functions = FakeFunctionRegistry::with_functions(&["fn", "fn2"]);
        let notifications = InMemoryNotificationStore::seeded("bucket", stale);

        let report = configure_triggers(
            &[
                rule("fn", "bucket", "input/", Some(".json")),
                rule("fn2", "bucket", "prefix/", Some(".tsv.gz")),
                rule("fn", "common", "input/", Some(".tsv.gz")),
            ],
            &functions,
            &notifications,
        )
        .expect("setup should succeed");

        assert_eq!(report.cleared_buckets, vec!["bucket".to_string(), "common".to_string()]);
        assert_eq!(
            notifications.writes(),
            vec!["bucket", "common", "bucket", "bucket", "common"]
        );

        let configuration = notifications.configuration("bucket");
        let prefixes: Vec<_> = configuration
            .lambda_rules()
            .map(|rule| rule.filter_prefix.clone().unwrap_or_default())
            .collect();
        assert_eq!(prefixes, vec!["input/".to_string(), "prefix/".to_string()]);
        assert_eq!(notifications.configuration("common").rules.len(), 1);
    }

    #[test]
    fn rerun_converges_to_same_configuration() {
        let functions = FakeFunctionRegistry::with_functions(&["fn"]);
        let notifications = InMemoryNotificationStore::default();
        let rules = [rule("fn", "bucket", "input/", Some(".json"))];

        configure_triggers(&rules, &functions, &notifications).expect("first run");
        let first = notifications.configuration("bucket");
        configure_triggers(&rules, &functions, &notifications).expect("second run");

        assert_eq!(notifications.configuration("bucket"), first);
    }

    #[test]
    fn plan_lists_grants_and_rules_without_touching_aws() {
        let rules = [
            rule("fn", "logs.example.com", "input/", Some(".json")),
            rule("fn2", "logs.example.com", "prefix/", None),
        ];

        let preview = plan_triggers(&rules);

        assert_eq!(preview.buckets_to_clear, vec!["logs.example.com".to_string()]);
        assert_eq!(preview.steps.len(), 2);
        let first = &preview.steps[0];
        assert_eq!(first.grant.statement_id, statement_id("fn", "logs.example.com"));
        assert_eq!(first.grant.source_arn, "arn:aws:s3:::logs.example.com");
        assert_eq!(first.grant.source_account, PLACEHOLDER_ACCOUNT);
        assert_eq!(
            first.rule.target,
            NotificationTarget::Lambda(
                "arn:aws:lambda:<region>:<account>:function:fn".to_string()
            )
        );
        assert_eq!(first.rule.events, vec![OBJECT_CREATED_ANY.to_string()]);
        assert_eq!(first.rule.filter_suffix.as_deref(), Some(".json"));
        assert_eq!(preview.steps[1].rule.filter_suffix, None);

        let json = serde_json::to_value(&preview).expect("preview should serialize");
        assert_eq!(json["steps"][1]["grant"]["function_name"], "fn2");
    }

    #[test]
    fn plan_matches_applied_rule_shape() {
        let rules = [rule("fn", "bucket", "input/", Some(".json"))];
        let functions = FakeFunctionRegistry::with_functions(&["fn"]);
        let notifications = InMemoryNotificationStore::default();

        let preview = plan_triggers(&rules);
        let report = configure_triggers(&rules, &functions, &notifications).expect("setup");

        let planned = &preview.steps[0];
        let applied = &report.applied[0];
        assert_eq!(planned.grant.statement_id, applied.statement_id);
        assert_eq!(planned.rule.filter_prefix, applied.rule.filter_prefix);
        assert_eq!(planned.rule.filter_suffix, applied.rule.filter_suffix);
        assert_eq!(preview.buckets_to_clear, report.cleared_buckets);
    }

    #[test]
    fn unknown_function_aborts_run() {
        let functions = FakeFunctionRegistry::with_functions(&["fn"]);
        let notifications = InMemoryNotificationStore::default();

        let error = configure_triggers(
            &[
                rule("fn", "bucket", "input/", None),
                rule("missing", "bucket", "other/", None),
            ],
            &functions,
            &notifications,
        )
        .expect_err("missing function should fail");

        assert!(matches!(
            error,
            TriggerSetupError::FunctionLookup { ref function_name, .. } if function_name == "missing"
        ));
        // The first rule stays applied; there is no rollback.
        assert_eq!(notifications.configuration("bucket").rules.len(), 1);
    }
}
