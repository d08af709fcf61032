//! On-demand measurements. Each request runs the tool in-process, stores the result through the
//! same path scheduled runs use, and answers once it is stored. Requests wait for a free run
//! slot, and tool processes are killed on shutdown.

use crate::AppState;
use crate::api::models::runs::{RoundEntry, ThroughputRunQuery};
use crate::db::handlers::{SpeedTests, ThroughputTests};
use crate::db::models::speed_tests::SpeedTest;
use crate::db::models::throughput_tests::ThroughputTest;
use crate::errors::{Error, Result};
use crate::types::HostId;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

// POST /speedtest/run - Run a speed test now
#[tracing::instrument(skip_all)]
pub async fn run_speed_test(State(state): State<AppState>) -> Result<(StatusCode, Json<SpeedTest>)> {
    let id = state.orchestrator.run_speed_test_now(&state.shutdown).await?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let test = SpeedTests::new(&mut pool_conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Speed test".to_string(),
        id: id.to_string(),
    })?;
    Ok((StatusCode::CREATED, Json(test)))
}

// POST /iperf/run?duration=10 - Run a full throughput round now
#[tracing::instrument(skip_all)]
pub async fn run_throughput_round(
    State(state): State<AppState>,
    Query(query): Query<ThroughputRunQuery>,
) -> Result<Json<Vec<RoundEntry>>> {
    let duration = query.duration()?;
    let outcomes = state.orchestrator.throughput_round_now(duration, &state.shutdown).await?;
    Ok(Json(outcomes.into_iter().map(RoundEntry::from).collect()))
}

// POST /iperf/run/{host_id}?duration=10 - Measure one active host now
#[tracing::instrument(skip_all, fields(host_id = %host_id))]
pub async fn run_throughput_test(
    State(state): State<AppState>,
    Path(host_id): Path<HostId>,
    Query(query): Query<ThroughputRunQuery>,
) -> Result<(StatusCode, Json<ThroughputTest>)> {
    let duration = query.duration()?;
    let (id, _) = state.orchestrator.test_host_now(host_id, duration, &state.shutdown).await?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let test = ThroughputTests::new(&mut pool_conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Throughput test".to_string(),
            id: id.to_string(),
        })?;
    Ok((StatusCode::CREATED, Json(test)))
}
