use crate::types::{HostCategory, HostId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Port iperf3 servers listen on unless told otherwise.
pub const DEFAULT_IPERF_PORT: i32 = 5201;

/// A throughput target.
///
/// Deleting a host leaves its historical measurements in place with an empty host reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Host {
    pub id: HostId,
    /// Human-readable label
    pub name: String,
    /// Hostname or IP address passed to `iperf3 -c`
    pub hostname: String,
    pub port: i32,
    pub category: HostCategory,
    /// Inactive hosts are never selected for testing
    pub active: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database request for creating a new host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCreateDBRequest {
    pub name: String,
    pub hostname: String,
    /// Defaults to [`DEFAULT_IPERF_PORT`]
    pub port: Option<i32>,
    pub category: HostCategory,
    /// Defaults to `true`
    pub active: Option<bool>,
    pub description: Option<String>,
}

impl HostCreateDBRequest {
    pub fn new(name: impl Into<String>, hostname: impl Into<String>, category: HostCategory) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            port: None,
            category,
            active: None,
            description: None,
        }
    }
}

/// Database request for updating a host. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostUpdateDBRequest {
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<i32>,
    pub category: Option<HostCategory>,
    pub active: Option<bool>,
    pub description: Option<Option<String>>,
}

/// Filter for listing hosts
#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    pub active: Option<bool>,
    pub category: Option<HostCategory>,
}

impl HostFilter {
    pub fn active() -> Self {
        Self {
            active: Some(true),
            category: None,
        }
    }

    pub fn with_category(mut self, category: HostCategory) -> Self {
        self.category = Some(category);
        self
    }
}
