//! Direct-storage sink writing into PostgreSQL.

use super::SubmissionSink;
use crate::api::models::submissions::{SpeedTestSubmission, ThroughputTestSubmission};
use crate::db::errors::DbError;
use crate::db::handlers::{Hosts, SpeedTests, ThroughputTests};
use crate::db::models::hosts::Host;
use crate::db::models::speed_tests::SpeedTest;
use crate::db::models::throughput_tests::ThroughputTest;
use crate::errors::{Error, Result};
use crate::types::{SpeedTestId, ThroughputTestId};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

const SPEED_TEST: &str = "speed test";
const THROUGHPUT_TEST: &str = "throughput test";

/// Writes measurements through the repositories using one shared pool.
#[derive(Clone)]
pub struct DirectSink {
    pool: PgPool,
}

impl DirectSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionSink for DirectSink {
    async fn list_active_hosts(&self) -> Result<Vec<Host>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        Ok(Hosts::new(&mut conn).list_active(None).await?)
    }

    async fn submit_speed(&self, submission: &SpeedTestSubmission) -> Result<SpeedTestId> {
        Ok(store_speed(&self.pool, submission).await?.id)
    }

    async fn submit_throughput(&self, submission: &ThroughputTestSubmission) -> Result<ThroughputTestId> {
        Ok(store_throughput(&self.pool, submission).await?.id)
    }
}

/// Validate and store a speed submission. Shared with the ingest API.
#[instrument(skip(pool, submission), fields(daemon_id = %submission.daemon_id), err)]
pub async fn store_speed(pool: &PgPool, submission: &SpeedTestSubmission) -> Result<SpeedTest> {
    submission.validate()?;

    let mut conn = pool.acquire().await.map_err(|e| persistence_failed(SPEED_TEST, e.into()))?;
    SpeedTests::new(&mut conn)
        .create(&submission.clone().into())
        .await
        .map_err(|e| persistence_failed(SPEED_TEST, e))
}

/// Validate and store a throughput submission, attached to its host. Shared with the ingest API.
#[instrument(skip(pool, submission), fields(host_id = submission.host_id, daemon_id = %submission.daemon_id), err)]
pub async fn store_throughput(pool: &PgPool, submission: &ThroughputTestSubmission) -> Result<ThroughputTest> {
    submission.validate()?;

    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| persistence_failed(THROUGHPUT_TEST, e.into()))?;
    ThroughputTests::new(&mut conn)
        .create(&submission.clone().into())
        .await
        .map_err(|e| match e {
            DbError::ForeignKeyViolation { .. } => Error::HostNotFound { id: submission.host_id },
            other => persistence_failed(THROUGHPUT_TEST, other),
        })
}

fn persistence_failed(entity: &'static str, source: DbError) -> Error {
    Error::PersistenceWriteFailed { entity, source }
}
