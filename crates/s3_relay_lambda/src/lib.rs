//! AWS-oriented adapters and handlers for the S3 copy relay.
//!
//! This crate owns runtime integration details (Lambda handlers, S3 and
//! Lambda control-plane adapters, environment settings) and exposes a single
//! runtime module boundary for the routing, key layout and notification
//! primitives in `s3_relay_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod runtime;
