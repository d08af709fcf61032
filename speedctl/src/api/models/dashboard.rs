use crate::db::models::hosts::Host;
use crate::db::models::speed_tests::SpeedTest;
use crate::db::models::throughput_tests::ThroughputTest;
use serde::{Deserialize, Serialize};

/// Rows of each kind shown in the recent lists.
pub const DASHBOARD_RECENT_LIMIT: i64 = 10;
/// Rows of each kind shown in the slowest lists.
pub const DASHBOARD_SLOWEST_LIMIT: i64 = 5;

/// Body of `GET /dashboard`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub recent_speed_tests: Vec<SpeedTest>,
    pub recent_throughput_tests: Vec<ThroughputTest>,
    pub slowest_speed_tests: Vec<SpeedTest>,
    pub slowest_throughput_tests: Vec<ThroughputTest>,
    pub active_hosts: Vec<Host>,
    pub statistics: DashboardStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStatistics {
    pub total_speed_tests: i64,
    pub total_throughput_tests: i64,
    pub active_hosts: usize,
    /// Averages over the recent speed tests, absent when there are none
    pub avg_download_mbps: Option<f64>,
    pub avg_upload_mbps: Option<f64>,
}

impl DashboardStatistics {
    pub fn new(
        total_speed_tests: i64,
        total_throughput_tests: i64,
        active_hosts: usize,
        recent_speed_tests: &[SpeedTest],
    ) -> Self {
        Self {
            total_speed_tests,
            total_throughput_tests,
            active_hosts,
            avg_download_mbps: mean(recent_speed_tests.iter().map(|t| t.download_mbps)),
            avg_upload_mbps: mean(recent_speed_tests.iter().map(|t| t.upload_mbps)),
        }
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> Option<f64> {
    let n = values.len();
    (n > 0).then(|| values.sum::<f64>() / n as f64)
}
