//! Measurement submission payloads.
//!
//! These are the canonical records both sinks accept. The remote sink posts them as JSON and
//! the ingest API converts them with the same `From` impls the direct sink uses, so a record
//! stored through either path is identical.

use crate::db::models::speed_tests::SpeedTestCreateDBRequest;
use crate::db::models::throughput_tests::ThroughputTestCreateDBRequest;
use crate::errors::{Error, Result};
use crate::normalizer::{SpeedMeasurement, ThroughputMeasurement};
use crate::types::{DaemonId, HostId, Protocol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /speedtest/results`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestSubmission {
    pub timestamp: DateTime<Utc>,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    pub daemon_id: String,
}

impl SpeedTestSubmission {
    pub fn from_measurement(measurement: SpeedMeasurement, daemon_id: &DaemonId) -> Self {
        Self {
            timestamp: measurement.timestamp,
            download_mbps: measurement.download_mbps,
            upload_mbps: measurement.upload_mbps,
            ping_ms: measurement.ping_ms,
            jitter_ms: measurement.jitter_ms,
            server_name: measurement.server_name,
            server_id: measurement.server_id,
            isp: measurement.isp,
            external_ip: measurement.external_ip,
            result_url: measurement.result_url,
            daemon_id: daemon_id.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_daemon_id(&self.daemon_id)?;
        require_bandwidth("download_mbps", self.download_mbps)?;
        require_bandwidth("upload_mbps", self.upload_mbps)?;
        if !self.ping_ms.is_finite() {
            return Err(Error::BadRequest {
                message: "ping_ms must be a finite number".to_string(),
            });
        }
        Ok(())
    }
}

impl From<SpeedTestSubmission> for SpeedTestCreateDBRequest {
    fn from(s: SpeedTestSubmission) -> Self {
        Self {
            timestamp: s.timestamp,
            download_mbps: s.download_mbps,
            upload_mbps: s.upload_mbps,
            ping_ms: s.ping_ms,
            jitter_ms: s.jitter_ms,
            server_name: s.server_name,
            server_id: s.server_id,
            isp: s.isp,
            external_ip: s.external_ip,
            result_url: s.result_url,
            daemon_id: s.daemon_id,
        }
    }
}

/// Body of `POST /iperf/results`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputTestSubmission {
    pub timestamp: DateTime<Utc>,
    pub host_id: HostId,
    pub sent_mbps: f64,
    pub received_mbps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retransmits: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_rtt_ms: Option<f64>,
    pub duration_seconds: i32,
    #[serde(default)]
    pub protocol: Protocol,
    /// Explicit outcome of a locally executed test. A run succeeded only if it moved data in
    /// either direction, so `true` with zero bandwidth is still stored as a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub daemon_id: String,
}

impl ThroughputTestSubmission {
    pub fn from_measurement(
        measurement: ThroughputMeasurement,
        host_id: HostId,
        duration_seconds: i32,
        daemon_id: &DaemonId,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            host_id,
            sent_mbps: measurement.sent_mbps,
            received_mbps: measurement.received_mbps,
            retransmits: measurement.retransmits,
            mean_rtt_ms: measurement.mean_rtt_ms,
            duration_seconds,
            protocol: measurement.protocol,
            success: Some(true),
            error_message: None,
            daemon_id: daemon_id.to_string(),
        }
    }

    /// A failed attempt: zero bandwidth and the error that caused it.
    pub fn failed(host_id: HostId, duration_seconds: i32, error: &Error, daemon_id: &DaemonId) -> Self {
        Self {
            timestamp: Utc::now(),
            host_id,
            sent_mbps: 0.0,
            received_mbps: 0.0,
            retransmits: None,
            mean_rtt_ms: None,
            duration_seconds,
            protocol: Protocol::Tcp,
            success: Some(false),
            error_message: Some(error.detail()),
            daemon_id: daemon_id.to_string(),
        }
    }

    /// Outcome as it will be stored.
    pub fn is_success(&self) -> bool {
        let moved_data = self.sent_mbps > 0.0 || self.received_mbps > 0.0;
        self.success.unwrap_or(true) && moved_data
    }

    pub fn validate(&self) -> Result<()> {
        require_daemon_id(&self.daemon_id)?;
        require_bandwidth("sent_mbps", self.sent_mbps)?;
        require_bandwidth("received_mbps", self.received_mbps)?;
        if self.duration_seconds <= 0 {
            return Err(Error::BadRequest {
                message: "duration_seconds must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl From<ThroughputTestSubmission> for ThroughputTestCreateDBRequest {
    fn from(s: ThroughputTestSubmission) -> Self {
        if s.is_success() {
            return Self {
                timestamp: s.timestamp,
                host_id: s.host_id,
                sent_mbps: s.sent_mbps,
                received_mbps: s.received_mbps,
                retransmits: s.retransmits,
                mean_rtt_ms: s.mean_rtt_ms,
                duration_seconds: s.duration_seconds,
                protocol: s.protocol,
                success: true,
                error_message: None,
                daemon_id: s.daemon_id,
            };
        }

        Self {
            timestamp: s.timestamp,
            protocol: s.protocol,
            ..ThroughputTestCreateDBRequest::failed(
                s.host_id,
                s.duration_seconds,
                s.error_message.unwrap_or_else(|| "no data transferred".to_string()),
                s.daemon_id,
            )
        }
    }
}

fn require_daemon_id(daemon_id: &str) -> Result<()> {
    if daemon_id.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "daemon_id must not be empty".to_string(),
        });
    }
    Ok(())
}

fn require_bandwidth(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::BadRequest {
            message: format!("{field} must be a non-negative number"),
        });
    }
    Ok(())
}
