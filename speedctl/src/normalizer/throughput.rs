use super::bits_to_mbps;
use crate::errors::{Error, Result};
use crate::types::Protocol;
use serde::{Deserialize, Serialize};

const TOOL: &str = "iperf3";

/// Canonical throughput measurement of one successful iperf3 run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputMeasurement {
    pub sent_mbps: f64,
    pub received_mbps: f64,
    pub retransmits: Option<f64>,
    /// Absent when the run reported no streams
    pub mean_rtt_ms: Option<f64>,
    pub protocol: Protocol,
}

#[derive(Deserialize)]
struct IperfOutput {
    #[serde(default)]
    start: Start,
    #[serde(default)]
    end: End,
    /// iperf3 reports failures in-band with `-J`
    error: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Start {
    test_start: TestStart,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TestStart {
    protocol: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct End {
    sum_sent: Option<Sum>,
    sum_received: Option<Sum>,
    streams: Vec<Stream>,
}

#[derive(Deserialize)]
struct Sum {
    bits_per_second: f64,
    retransmits: Option<f64>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Stream {
    sender: Sender,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Sender {
    /// Microseconds
    mean_rtt: Option<f64>,
}

/// Parse `iperf3 -J` output.
pub fn parse_throughput(raw: &[u8]) -> Result<ThroughputMeasurement> {
    let failed = |reason: String| Error::NormalizationFailed {
        tool: TOOL,
        reason,
        raw: raw.to_vec(),
    };

    let output: IperfOutput = serde_json::from_slice(raw).map_err(|e| failed(e.to_string()))?;
    if let Some(error) = output.error.filter(|e| !e.is_empty()) {
        return Err(failed(error));
    }

    let (Some(sent), Some(received)) = (&output.end.sum_sent, &output.end.sum_received) else {
        return Err(failed("missing end.sum_sent or end.sum_received".to_string()));
    };

    let mean_rtt_ms = output
        .end
        .streams
        .first()
        .and_then(|stream| stream.sender.mean_rtt)
        .map(|us| us / 1000.0);

    Ok(ThroughputMeasurement {
        sent_mbps: bits_to_mbps(sent.bits_per_second),
        received_mbps: bits_to_mbps(received.bits_per_second),
        retransmits: sent.retransmits,
        mean_rtt_ms,
        protocol: output
            .start
            .test_start
            .protocol
            .as_deref()
            .map(Protocol::from_tool)
            .unwrap_or_default(),
    })
}
