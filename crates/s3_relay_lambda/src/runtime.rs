//! Re-exports of the domain primitives the handlers are built on.

pub use s3_relay_core::{copy_event, notification, routing, storage_keys, trigger_plan};
