use crate::AppState;
use crate::api::models::dashboard::{
    DASHBOARD_RECENT_LIMIT, DASHBOARD_SLOWEST_LIMIT, DashboardResponse, DashboardStatistics,
};
use crate::db::handlers::{Hosts, SpeedTests, ThroughputTests};
use crate::errors::{Error, Result};
use axum::{Json, extract::State};

// GET /dashboard - Recent and slowest measurements, active hosts and totals
#[tracing::instrument(skip_all)]
pub async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let mut speed_tests = SpeedTests::new(&mut pool_conn);
    let recent_speed_tests = speed_tests.recent(DASHBOARD_RECENT_LIMIT).await?;
    let slowest_speed_tests = speed_tests.slowest(DASHBOARD_SLOWEST_LIMIT).await?;
    let total_speed_tests = speed_tests.count().await?;

    let mut throughput_tests = ThroughputTests::new(&mut pool_conn);
    let recent_throughput_tests = throughput_tests.recent(DASHBOARD_RECENT_LIMIT).await?;
    let slowest_throughput_tests = throughput_tests.slowest(DASHBOARD_SLOWEST_LIMIT).await?;
    let total_throughput_tests = throughput_tests.count().await?;

    let active_hosts = Hosts::new(&mut pool_conn).list_active(None).await?;

    let statistics = DashboardStatistics::new(
        total_speed_tests,
        total_throughput_tests,
        active_hosts.len(),
        &recent_speed_tests,
    );

    Ok(Json(DashboardResponse {
        recent_speed_tests,
        recent_throughput_tests,
        slowest_speed_tests,
        slowest_throughput_tests,
        active_hosts,
        statistics,
    }))
}
