//! Remote-API sink posting measurements to an ingest API.

use super::SubmissionSink;
use crate::api::models::submissions::{SpeedTestSubmission, ThroughputTestSubmission};
use crate::config::ApiSubmissionConfig;
use crate::db::models::hosts::Host;
use crate::errors::{Error, Result};
use crate::types::{SpeedTestId, ThroughputTestId};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, instrument};
use url::Url;

/// Posts submissions to `{endpoint}/speedtest/results` and `{endpoint}/iperf/results`.
pub struct RemoteApiSink {
    client: Client,
    base_url: Url,
}

/// The stored record is echoed back; only its identity is needed here.
#[derive(Deserialize)]
struct Created {
    id: i64,
}

impl RemoteApiSink {
    pub fn new(config: &ApiSubmissionConfig) -> anyhow::Result<Self> {
        // reqwest is built without a default TLS provider
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create submission HTTP client")?;

        Ok(Self {
            client,
            base_url: ensure_slash(&config.endpoint),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Other(anyhow!("Failed to construct submission URL for {path}: {e}")))
    }

    fn unreachable(&self, source: reqwest::Error) -> Error {
        Error::SubmissionUnreachable {
            endpoint: self.base_url.to_string(),
            source,
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SubmissionRejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.unreachable(e))?;
        serde_json::from_str(&body).map_err(|e| {
            debug!(body = %body, "Unexpected submission API response");
            Error::Other(anyhow!("error decoding submission API response: {e}"))
        })
    }
}

/// Makes sure a url has a trailing slash, so `join` appends instead of replacing the last segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let path = format!("{}/", new_url.path());
        new_url.set_path(&path);
        new_url
    }
}

#[async_trait]
impl SubmissionSink for RemoteApiSink {
    #[instrument(skip(self), err)]
    async fn list_active_hosts(&self) -> Result<Vec<Host>> {
        let mut url = self.url("hosts")?;
        url.query_pairs_mut().append_pair("active", "true");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        self.decode(response).await
    }

    #[instrument(skip(self, submission), fields(download_mbps = submission.download_mbps), err)]
    async fn submit_speed(&self, submission: &SpeedTestSubmission) -> Result<SpeedTestId> {
        let url = self.url("speedtest/results")?;
        let response = self
            .client
            .post(url)
            .json(submission)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let created: Created = self.decode(response).await?;
        Ok(created.id)
    }

    #[instrument(skip(self, submission), fields(host_id = submission.host_id), err)]
    async fn submit_throughput(&self, submission: &ThroughputTestSubmission) -> Result<ThroughputTestId> {
        let url = self.url("iperf/results")?;
        let response = self
            .client
            .post(url)
            .json(submission)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let created: Created = self.decode(response).await?;
        Ok(created.id)
    }
}
