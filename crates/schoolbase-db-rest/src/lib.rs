//! REST gateway backend for schoolbase.
//!
//! Talks to the hosted database through its PostgREST-compatible HTTP
//! gateway: tables under `{base}/rest/v1/{table}`, procedures under
//! `{base}/rest/v1/rpc/{name}`. Requests carry the privileged service key;
//! the key is never logged.

mod client;
mod config;

pub use client::RestStore;
pub use config::{ConfigError, RestConfig, ServiceKey};
