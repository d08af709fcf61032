use crate::errors::{Error, Result};
use crate::orchestrator::CategoryOutcome;
use crate::types::{HostCategory, HostId, ThroughputTestId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest iperf3 run the API will start on demand.
pub const MAX_RUN_DURATION_SECS: u64 = 300;

/// Query parameters for `POST /iperf/run` and `POST /iperf/run/{host_id}`
#[derive(Debug, Default, Deserialize)]
pub struct ThroughputRunQuery {
    /// Seconds per iperf3 run; the configured duration when omitted
    pub duration: Option<u64>,
}

impl ThroughputRunQuery {
    pub fn duration(&self) -> Result<Option<Duration>> {
        match self.duration {
            None => Ok(None),
            Some(secs @ 1..=MAX_RUN_DURATION_SECS) => Ok(Some(Duration::from_secs(secs))),
            Some(_) => Err(Error::BadRequest {
                message: format!("duration must be between 1 and {MAX_RUN_DURATION_SECS} seconds"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundEntryStatus {
    Recorded,
    Skipped,
    SubmitFailed,
}

/// One category of an on-demand throughput round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEntry {
    pub category: HostCategory,
    pub status: RoundEntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<HostId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<ThroughputTestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<(HostCategory, CategoryOutcome)> for RoundEntry {
    fn from((category, outcome): (HostCategory, CategoryOutcome)) -> Self {
        let entry = Self {
            category,
            status: RoundEntryStatus::Skipped,
            host_id: None,
            test_id: None,
            success: None,
            error: None,
        };

        match outcome {
            CategoryOutcome::Recorded {
                host_id,
                test_id,
                success,
            } => Self {
                status: RoundEntryStatus::Recorded,
                host_id: Some(host_id),
                test_id: Some(test_id),
                success: Some(success),
                ..entry
            },
            CategoryOutcome::Skipped => entry,
            CategoryOutcome::SubmitFailed(e) => Self {
                status: RoundEntryStatus::SubmitFailed,
                error: Some(e.user_message()),
                ..entry
            },
        }
    }
}
