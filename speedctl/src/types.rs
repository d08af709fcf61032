//! Common type definitions shared across the daemon, repositories and ingest API.
//!
//! # ID Types
//!
//! All stored entities use `BIGSERIAL` identities wrapped in type aliases:
//!
//! - [`HostId`]: iperf3 target host identifier
//! - [`SpeedTestId`]: stored speed measurement identifier
//! - [`ThroughputTestId`]: stored throughput measurement identifier
//!
//! # Daemon Identity
//!
//! [`DaemonId`] is the provenance stamp written on every record. It is computed once at
//! start-up and passed explicitly to everything that submits results.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type HostId = i64;
pub type SpeedTestId = i64;
pub type ThroughputTestId = i64;

/// Network category a throughput target belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HostCategory {
    Lan,
    Vpn,
    Remote,
}

impl HostCategory {
    /// Categories in the order a throughput run visits them.
    pub const ALL: [HostCategory; 3] = [HostCategory::Lan, HostCategory::Vpn, HostCategory::Remote];

    pub fn as_str(&self) -> &'static str {
        match self {
            HostCategory::Lan => "lan",
            HostCategory::Vpn => "vpn",
            HostCategory::Remote => "remote",
        }
    }
}

impl fmt::Display for HostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport protocol of a throughput test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    /// Lenient mapping from the protocol string iperf3 reports in `start.test_start`.
    pub fn from_tool(value: &str) -> Self {
        if value.eq_ignore_ascii_case("udp") {
            Protocol::Udp
        } else {
            Protocol::Tcp
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
        }
    }
}

/// Identifier stamped on every record produced by one daemon process.
///
/// Used for provenance and debugging only; it carries no ownership semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DaemonId(String);

impl DaemonId {
    /// Build the identity from the machine hostname and the current process id.
    pub fn generate() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self::from_parts(&hostname, std::process::id())
    }

    pub fn from_parts(hostname: &str, pid: u32) -> Self {
        Self(format!("daemon-{hostname}-{pid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DaemonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
