//! Submission sinks: where finished measurements are recorded.
//!
//! The daemon only sees [`SubmissionSink`]. Which implementation backs it is decided once at
//! start-up from [`SubmissionConfig`]:
//!
//! - [`direct::DirectSink`]: writes through the repositories into PostgreSQL
//! - [`remote::RemoteApiSink`]: posts to a remote ingest API over HTTP
//!
//! Both take the same submission payloads and store identical records. The sink is also the
//! daemon's source of hosts, so the daemon behaves the same in either mode.

use crate::api::models::submissions::{SpeedTestSubmission, ThroughputTestSubmission};
use crate::config::SubmissionConfig;
use crate::db::models::hosts::Host;
use crate::errors::Result;
use crate::types::{SpeedTestId, ThroughputTestId};
use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

pub mod direct;
pub mod remote;

/// Durable destination for measurements.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    /// Hosts currently eligible for throughput testing.
    async fn list_active_hosts(&self) -> Result<Vec<Host>>;

    /// Record a speed measurement, returning its stored identity.
    async fn submit_speed(&self, submission: &SpeedTestSubmission) -> Result<SpeedTestId>;

    /// Record a throughput measurement (successful or failed), returning its stored identity.
    async fn submit_throughput(&self, submission: &ThroughputTestSubmission) -> Result<ThroughputTestId>;
}

/// Create a submission sink from configuration
///
/// This is the single point where configuration becomes a sink instance. Direct submission
/// needs the pool; failing to build a sink is fatal at start-up.
pub fn create_sink(config: &SubmissionConfig, pool: Option<PgPool>) -> anyhow::Result<Arc<dyn SubmissionSink>> {
    match config {
        SubmissionConfig::Direct => {
            let pool = pool.context("direct submission requires a database connection")?;
            Ok(Arc::new(direct::DirectSink::new(pool)))
        }
        SubmissionConfig::Api(api) => Ok(Arc::new(remote::RemoteApiSink::new(api)?)),
    }
}
