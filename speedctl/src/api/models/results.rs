use crate::errors::{Error, Result};
use crate::types::HostCategory;
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const DEFAULT_RESULTS_LIMIT: i64 = 50;
pub const MAX_RESULTS_LIMIT: i64 = 1000;

/// Query parameters for `GET /speedtest/results` and `GET /iperf/results`
#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    pub limit: Option<i64>,
    /// Throughput results only
    pub category: Option<HostCategory>,
}

impl ResultsQuery {
    /// Requested page size, clamped to `1..=MAX_RESULTS_LIMIT`.
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_RESULTS_LIMIT).clamp(1, MAX_RESULTS_LIMIT)
    }
}

/// Query parameters for `GET /speedtest/results/range`
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RangeQuery {
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(Error::BadRequest {
                message: "start must not be after end".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(ResultsQuery::default().limit(), DEFAULT_RESULTS_LIMIT);
        let query = ResultsQuery {
            limit: Some(0),
            category: None,
        };
        assert_eq!(query.limit(), 1);
        let query = ResultsQuery {
            limit: Some(5000),
            category: None,
        };
        assert_eq!(query.limit(), MAX_RESULTS_LIMIT);
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let now = Utc::now();
        let range = RangeQuery {
            start: now,
            end: now - Duration::hours(1),
        };
        assert!(matches!(range.validate(), Err(Error::BadRequest { .. })));
    }
}
