//! Core library for the zVirt engine exporter
//!
//! The exporter keeps one pre-rendered Prometheus exposition body in memory
//! and refreshes it in the background:
//! - [`token`] keeps a valid SSO bearer token, re-authenticating on demand
//! - [`collector`] fetches engine collections concurrently and renders them
//!   through [`format`]
//! - [`snapshot`] holds the last published body served by [`api`]

pub mod api;
pub mod client;
pub mod collector;
pub mod error;
pub mod format;
pub mod health;
pub mod models;
pub mod observability;
pub mod snapshot;
pub mod token;

pub use error::{ExporterError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
pub use snapshot::SnapshotCache;
pub use token::TokenCache;
