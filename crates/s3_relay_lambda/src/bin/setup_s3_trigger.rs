use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lambda_runtime::{tracing, Error};
use s3_relay_lambda::adapters::function_registry::AwsLambdaFunctionRegistry;
use s3_relay_lambda::adapters::notification_store::S3NotificationStore;
use s3_relay_lambda::handlers::trigger_setup::{configure_triggers, plan_triggers};
use s3_relay_lambda::runtime::trigger_plan::{
    default_rule_templates, expand_rules, load_rule_templates, TriggerEnvironment,
    DEFAULT_COMMON_BUCKET,
};

#[derive(Parser)]
#[command(
    name = "setup_s3_trigger",
    about = "Grant S3 invoke permissions and attach object-created notifications to copy lambdas",
    long_about = "Clears the notification configuration of every bucket in the rule set,\n\
                  then for each rule refreshes the lambda invoke permission and appends\n\
                  an object-created notification with the rule's prefix/suffix filter."
)]
struct Cli {
    /// Deployment environment, substituted for `{env}` in rules
    env: String,
    /// Input bucket base name, substituted for `{input_bucket}` in rules
    input_bucket_name: String,
    /// AWS shared-config profile used for credentials and region
    profile: String,
    /// JSON file with trigger rules; defaults to the built-in rule set
    #[arg(long)]
    rules: Option<PathBuf>,
    /// Shared input bucket, substituted for `{common_bucket}` in rules
    #[arg(long, env = "S3_TRIGGER_COMMON_BUCKET", default_value = DEFAULT_COMMON_BUCKET)]
    common_bucket: String,
    /// Print the buckets to clear, each permission grant and notification rule, without calling AWS
    #[arg(long)]
    dry_run: bool,
}

async fn run(cli: Cli) -> Result<(), Error> {
    let templates = match &cli.rules {
        Some(path) => load_rule_templates(path)?,
        None => default_rule_templates(),
    };
    let environment = TriggerEnvironment {
        env: cli.env,
        input_bucket: cli.input_bucket_name,
        common_bucket: cli.common_bucket,
    };
    let rules = expand_rules(&templates, &environment)?;

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&plan_triggers(&rules))?);
        return Ok(());
    }

    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .profile_name(&cli.profile)
        .load()
        .await;
    let functions = AwsLambdaFunctionRegistry::new(aws_sdk_lambda::Client::new(&aws_config));
    let notifications = S3NotificationStore::new(aws_sdk_s3::Client::new(&aws_config));

    let report = configure_triggers(&rules, &functions, &notifications)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return if error.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    tracing::init_default_subscriber();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "s3 trigger setup failed");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_arguments() {
        let cli = Cli::try_parse_from(["setup_s3_trigger", "dev", "s3-copy-input-bucket", "default"])
            .expect("arguments should parse");

        assert_eq!(cli.env, "dev");
        assert_eq!(cli.input_bucket_name, "s3-copy-input-bucket");
        assert_eq!(cli.profile, "default");
        assert_eq!(cli.common_bucket, DEFAULT_COMMON_BUCKET);
        assert!(cli.rules.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn parses_dry_run_with_rules_file() {
        let cli = Cli::try_parse_from([
            "setup_s3_trigger",
            "dev",
            "s3-copy-input-bucket",
            "default",
            "--rules",
            "config/trigger_rules.json",
            "--dry-run",
        ])
        .expect("arguments should parse");

        assert!(cli.dry_run);
        assert_eq!(cli.rules, Some(PathBuf::from("config/trigger_rules.json")));
    }

    #[test]
    fn rejects_wrong_arity() {
        let error = Cli::try_parse_from(["setup_s3_trigger", "dev", "s3-copy-input-bucket"])
            .err()
            .expect("missing profile should fail");
        assert!(error.use_stderr());
    }
}
