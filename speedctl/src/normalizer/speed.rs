use super::BandwidthUnit;
use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const TOOL: &str = "speedtest";

/// Canonical internet speed measurement, before it is stamped with a daemon id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedMeasurement {
    pub timestamp: DateTime<Utc>,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub jitter_ms: Option<f64>,
    pub server_name: Option<String>,
    pub server_id: Option<String>,
    pub isp: Option<String>,
    pub external_ip: Option<String>,
    pub result_url: Option<String>,
}

#[derive(Deserialize)]
struct SpeedtestOutput {
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    ping: Ping,
    download: Transfer,
    upload: Transfer,
    #[serde(default)]
    isp: Option<String>,
    #[serde(default)]
    interface: Interface,
    #[serde(default)]
    server: Server,
    #[serde(default)]
    result: ResultLink,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Ping {
    jitter: f64,
    latency: f64,
}

#[derive(Deserialize)]
struct Transfer {
    bandwidth: f64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Interface {
    #[serde(rename = "externalIp")]
    external_ip: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Server {
    name: Option<String>,
    id: Option<serde_json::Value>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ResultLink {
    url: Option<String>,
}

/// Parse `speedtest --format=json` output.
///
/// `download.bandwidth` and `upload.bandwidth` are required. Optional fields are kept only
/// when non-empty or non-zero, and a missing timestamp falls back to now.
pub fn parse_speed(raw: &[u8], unit: BandwidthUnit) -> Result<SpeedMeasurement> {
    let output: SpeedtestOutput = serde_json::from_slice(raw).map_err(|e| Error::NormalizationFailed {
        tool: TOOL,
        reason: e.to_string(),
        raw: raw.to_vec(),
    })?;

    Ok(SpeedMeasurement {
        timestamp: output.timestamp.unwrap_or_else(Utc::now),
        download_mbps: unit.to_mbps(output.download.bandwidth),
        upload_mbps: unit.to_mbps(output.upload.bandwidth),
        ping_ms: output.ping.latency,
        jitter_ms: (output.ping.jitter > 0.0).then_some(output.ping.jitter),
        server_name: non_empty(output.server.name),
        server_id: output.server.id.and_then(server_id),
        isp: non_empty(output.isp),
        external_ip: non_empty(output.interface.external_ip),
        result_url: non_empty(output.result.url),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// The tool reports the id as a number; some versions quote it.
fn server_id(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) if n.as_f64().is_some_and(|v| v != 0.0) => Some(n.to_string()),
        serde_json::Value::String(s) => non_empty(Some(s)),
        _ => None,
    }
}
