//! Domain primitives for the S3 copy relay.
//!
//! This crate owns copy routing decisions, destination key layout and the
//! bucket notification model used by the trigger configurator. It
//! intentionally excludes AWS SDK and Lambda runtime concerns; those live in
//! `s3_relay_lambda`.

pub mod copy_event;
pub mod notification;
pub mod routing;
pub mod storage_keys;
pub mod trigger_plan;
