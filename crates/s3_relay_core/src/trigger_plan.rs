//! Wiring plan for the trigger configurator: which function gets invoked for
//! which bucket prefix/suffix, and the permission grant each pairing needs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_COMMON_BUCKET: &str = "s3-copy-input-bucket-common";
pub const S3_SERVICE_PRINCIPAL: &str = "s3.amazonaws.com";
pub const INVOKE_FUNCTION_ACTION: &str = "lambda:InvokeFunction";
/// Lambda `AddPermission` limit on `StatementId`.
pub const MAX_STATEMENT_ID_LEN: usize = 100;

const MAX_FUNCTION_NAME_LEN: usize = 64;
const STATEMENT_ID_DIGEST_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum TriggerPlanError {
    #[error("failed to read trigger rules {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid trigger rules: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("trigger rule set is empty")]
    Empty,
    #[error("trigger rule {index} has an empty {field}")]
    MissingField { index: usize, field: &'static str },
    #[error("trigger rule {index} has invalid bucket name '{bucket}'")]
    InvalidBucketName { index: usize, bucket: String },
    #[error("trigger rule {index} has invalid function name '{function_name}'")]
    InvalidFunctionName {
        index: usize,
        function_name: String,
    },
    #[error("cannot derive account id from function arn '{0}'")]
    InvalidFunctionArn(String),
}

/// A wiring rule before environment expansion. `{env}`, `{input_bucket}` and
/// `{common_bucket}` placeholders are substituted in every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRuleTemplate {
    pub function_name: String,
    pub bucket: String,
    pub prefix: String,
    #[serde(default)]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRule {
    pub function_name: String,
    pub bucket: String,
    pub prefix: String,
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEnvironment {
    pub env: String,
    pub input_bucket: String,
    pub common_bucket: String,
}

impl TriggerEnvironment {
    fn expand(&self, template: &str) -> String {
        template
            .replace("{env}", &self.env)
            .replace("{input_bucket}", &self.input_bucket)
            .replace("{common_bucket}", &self.common_bucket)
    }
}

pub fn default_rule_templates() -> Vec<TriggerRuleTemplate> {
    let rule = |function_name: &str, bucket: &str, prefix: &str, suffix: &str| {
        TriggerRuleTemplate {
            function_name: function_name.to_string(),
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            suffix: Some(suffix.to_string()),
        }
    };

    vec![
        rule("s3-copy-lambda-{env}", "{input_bucket}-{env}", "input/", ".json"),
        rule("s3-copy-lambda2-{env}", "{input_bucket}-{env}", "prefix/", ".tsv.gz"),
        rule("s3-copy-lambda-{env}", "{common_bucket}", "input/", ".tsv.gz"),
        rule("s3-copy-lambda2-{env}", "{common_bucket}", "input2/", ".tsv.gz"),
    ]
}

pub fn load_rule_templates(path: impl AsRef<Path>) -> Result<Vec<TriggerRuleTemplate>, TriggerPlanError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| TriggerPlanError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

pub fn expand_rules(
    templates: &[TriggerRuleTemplate],
    environment: &TriggerEnvironment,
) -> Result<Vec<TriggerRule>, TriggerPlanError> {
    if templates.is_empty() {
        return Err(TriggerPlanError::Empty);
    }

    let mut rules = Vec::with_capacity(templates.len());
    for (index, template) in templates.iter().enumerate() {
        let rule = TriggerRule {
            function_name: environment.expand(&template.function_name),
            bucket: environment.expand(&template.bucket),
            prefix: environment.expand(&template.prefix),
            suffix: template
                .suffix
                .as_deref()
                .map(|suffix| environment.expand(suffix))
                .filter(|suffix| !suffix.is_empty()),
        };
        if rule.function_name.trim().is_empty() {
            return Err(TriggerPlanError::MissingField {
                index,
                field: "function_name",
            });
        }
        if rule.bucket.trim().is_empty() {
            return Err(TriggerPlanError::MissingField {
                index,
                field: "bucket",
            });
        }
        if rule.prefix.is_empty() {
            return Err(TriggerPlanError::MissingField {
                index,
                field: "prefix",
            });
        }
        if !is_valid_bucket_name(&rule.bucket) {
            return Err(TriggerPlanError::InvalidBucketName {
                index,
                bucket: rule.bucket,
            });
        }
        if !is_valid_function_name(&rule.function_name) {
            return Err(TriggerPlanError::InvalidFunctionName {
                index,
                function_name: rule.function_name,
            });
        }
        rules.push(rule);
    }
    Ok(rules)
}

/// Buckets named by `rules`, in first-appearance order, without duplicates.
pub fn distinct_buckets(rules: &[TriggerRule]) -> Vec<String> {
    let mut buckets: Vec<String> = Vec::new();
    for rule in rules {
        if !buckets.contains(&rule.bucket) {
            buckets.push(rule.bucket.clone());
        }
    }
    buckets
}

/// S3 general purpose bucket naming: 3-63 chars of lowercase letters, digits,
/// `.` and `-`, starting and ending with a letter or digit.
pub fn is_valid_bucket_name(bucket: &str) -> bool {
    let bytes = bucket.as_bytes();
    let edge_ok = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    (3..=63).contains(&bytes.len())
        && bytes.first().is_some_and(edge_ok)
        && bytes.last().is_some_and(edge_ok)
        && bytes
            .iter()
            .all(|b| edge_ok(b) || *b == b'.' || *b == b'-')
        && !bucket.contains("..")
}

/// Plain function names only; ARNs are resolved by the lookup step.
pub fn is_valid_function_name(function_name: &str) -> bool {
    (1..=MAX_FUNCTION_NAME_LEN).contains(&function_name.len())
        && function_name.chars().all(is_statement_id_char)
}

fn is_statement_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Deterministic so a rerun revokes exactly the grant the previous run made.
///
/// `{function}-s3-invoke-{bucket}` when that is already a valid statement id.
/// Otherwise disallowed characters become `-`, the result is cut to fit
/// [`MAX_STATEMENT_ID_LEN`] and a digest of the unmodified id is appended, so
/// distinct buckets such as `a.b` and `a-b` never share an id.
pub fn statement_id(function_name: &str, bucket: &str) -> String {
    let raw = format!("{function_name}-s3-invoke-{bucket}");
    if raw.len() <= MAX_STATEMENT_ID_LEN && raw.chars().all(is_statement_id_char) {
        return raw;
    }

    let sanitized: String = raw
        .chars()
        .map(|c| if is_statement_id_char(c) { c } else { '-' })
        .collect();
    let digest = format!("{:x}", Sha256::digest(raw.as_bytes()));
    let keep = MAX_STATEMENT_ID_LEN - STATEMENT_ID_DIGEST_LEN - 1;
    let head: String = sanitized.chars().take(keep).collect();
    format!("{head}-{}", &digest[..STATEMENT_ID_DIGEST_LEN])
}

pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}")
}

/// `arn:aws:lambda:<region>:<account>:function:<name>[:<qualifier>]`
pub fn account_id_from_function_arn(function_arn: &str) -> Result<String, TriggerPlanError> {
    let parts: Vec<&str> = function_arn.split(':').collect();
    match parts.as_slice() {
        ["arn", _, "lambda", _, account, "function", ..]
            if !account.is_empty() && account.chars().all(|c| c.is_ascii_digit()) =>
        {
            Ok(account.to_string())
        }
        _ => Err(TriggerPlanError::InvalidFunctionArn(function_arn.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokePermissionGrant {
    pub function_name: String,
    pub statement_id: String,
    pub action: String,
    pub principal: String,
    pub source_arn: String,
    pub source_account: String,
}

impl InvokePermissionGrant {
    pub fn for_bucket(function_name: &str, bucket: &str, source_account: &str) -> Self {
        Self {
            function_name: function_name.to_string(),
            statement_id: statement_id(function_name, bucket),
            action: INVOKE_FUNCTION_ACTION.to_string(),
            principal: S3_SERVICE_PRINCIPAL.to_string(),
            source_arn: bucket_arn(bucket),
            source_account: source_account.to_string(),
        }
    }
}
