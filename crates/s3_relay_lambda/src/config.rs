use std::path::PathBuf;
use std::str::FromStr;

use chrono::Datelike;
use thiserror::Error;

use crate::handlers::copy::CopyHandlerConfig;
use crate::runtime::routing::DEFAULT_ROUTING_CONFIG_PATH;
use crate::runtime::storage_keys::date_partition;

pub const TARGET_BUCKET_ENV: &str = "TARGET_BUCKET";
pub const ROUTING_CONFIG_PATH_ENV: &str = "ROUTING_CONFIG_PATH";
pub const PARTITION_CLOCK_ENV: &str = "PARTITION_CLOCK";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error("unsupported PARTITION_CLOCK value '{0}', expected 'local' or 'utc'")]
    InvalidPartitionClock(String),
}

/// Clock used for the `YYYY/MM/DD` destination partition. `Local` follows the
/// execution environment's timezone (on Lambda that is `TZ`, UTC unless set).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartitionClock {
    #[default]
    Local,
    Utc,
}

impl FromStr for PartitionClock {
    type Err = SettingsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "utc" => Ok(Self::Utc),
            _ => Err(SettingsError::InvalidPartitionClock(value.to_string())),
        }
    }
}

impl PartitionClock {
    pub fn today_partition(self) -> String {
        let today = match self {
            Self::Local => chrono::Local::now().date_naive(),
            Self::Utc => chrono::Utc::now().date_naive(),
        };
        date_partition(today.year(), today.month(), today.day())
    }
}

/// Process-wide settings for the copy Lambda, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyLambdaSettings {
    pub target_bucket: String,
    pub routing_config_path: PathBuf,
    pub partition_clock: PartitionClock,
}

impl CopyLambdaSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let target_bucket = lookup(TARGET_BUCKET_ENV)
            .filter(|value| !value.trim().is_empty())
            .ok_or(SettingsError::Missing(TARGET_BUCKET_ENV))?;
        let routing_config_path = lookup(ROUTING_CONFIG_PATH_ENV)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ROUTING_CONFIG_PATH.to_string());
        let partition_clock = match lookup(PARTITION_CLOCK_ENV) {
            Some(value) if !value.trim().is_empty() => value.parse()?,
            _ => PartitionClock::default(),
        };

        Ok(Self {
            target_bucket,
            routing_config_path: PathBuf::from(routing_config_path),
            partition_clock,
        })
    }

    /// Handler configuration for one invocation, dated now.
    pub fn handler_config(&self) -> CopyHandlerConfig {
        CopyHandlerConfig {
            target_bucket: self.target_bucket.clone(),
            routing_config_path: self.routing_config_path.clone(),
            date_partition: self.partition_clock.today_partition(),
        }
    }
}
