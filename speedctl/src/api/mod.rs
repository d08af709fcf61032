//! Ingest API for measurements submitted by remote daemons.
//!
//! - **[`handlers`]**: axum route handlers
//! - **[`models`]**: request payloads and aggregate responses
//!
//! All routes live under `/api/v1`. A daemon in `api` submission mode talks to exactly the
//! subset it needs: `GET /hosts?active=true`, `POST /speedtest/results` and
//! `POST /iperf/results`. The remaining routes administer hosts, read back measurements, start
//! measurements on demand (`POST /speedtest/run`, `POST /iperf/run`, `POST /iperf/run/{host_id}`)
//! and summarize them (`GET /dashboard`).

pub mod handlers;
pub mod models;
