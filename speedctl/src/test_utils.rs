//! Shared fixtures for handler and round-trip tests.

use crate::config::{Config, DatabaseConfig, IngestApiConfig};
use crate::db::handlers::{Hosts, Repository};
use crate::db::models::hosts::{Host, HostCreateDBRequest};
use crate::errors::{Error, Result};
use crate::orchestrator::TestOrchestrator;
use crate::runner::CommandRunner;
use crate::sink::direct::DirectSink;
use crate::types::{DaemonId, HostCategory};
use crate::{AppState, build_router};
use axum_test::TestServer;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const SPEEDTEST_OUTPUT: &[u8] = br#"{"timestamp":"2025-03-01T12:00:00Z","ping":{"jitter":0.8,"latency":9.5},"download":{"bandwidth":12500000},"upload":{"bandwidth":2500000},"server":{"id":1234,"name":"Example Server"}}"#;

const IPERF_OUTPUT: &[u8] = br#"{
    "start": {"test_start": {"protocol": "TCP"}},
    "end": {
        "sum_sent": {"bits_per_second": 100000000, "retransmits": 3},
        "sum_received": {"bits_per_second": 95000000}
    }
}"#;

/// Stands in for the measurement tools: canned output, or a connection failure.
pub struct CannedRunner {
    working: bool,
}

impl CannedRunner {
    pub fn working() -> Arc<Self> {
        Arc::new(Self { working: true })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { working: false })
    }
}

#[async_trait::async_trait]
impl CommandRunner for CannedRunner {
    async fn run(&self, program: &str, _args: &[String], _deadline: Duration, _cancel: &CancellationToken) -> Result<Vec<u8>> {
        if !self.working {
            return Err(Error::ProcessExecutionFailed {
                command: program.to_string(),
                detail: "exited with exit status: 1".to_string(),
                stderr: Some(format!("{program}: error - unable to connect to server")),
            });
        }
        match program {
            "speedtest" => Ok(SPEEDTEST_OUTPUT.to_vec()),
            _ => Ok(IPERF_OUTPUT.to_vec()),
        }
    }
}

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.database = DatabaseConfig {
        url: Some("postgres://localhost/speedctl_test".to_string()),
        max_connections: 1,
        ..Default::default()
    };
    config.background_services.daemon.enabled = false;
    config.background_services.ingest_api = IngestApiConfig { enabled: true };
    config
}

fn create_test_state(pool: PgPool, runner: Arc<dyn CommandRunner>) -> AppState {
    let config = create_test_config();
    let orchestrator = TestOrchestrator::new(
        Arc::new(DirectSink::new(pool.clone())),
        runner,
        config.testing.clone(),
        config.tools.clone(),
        DaemonId::from_parts("test", 1),
    );
    AppState {
        db: pool,
        config,
        orchestrator: Arc::new(orchestrator),
        shutdown: CancellationToken::new(),
    }
}

/// Ingest API backed by `pool`, served in-process.
pub fn create_test_server(pool: PgPool) -> TestServer {
    create_test_server_with_runner(pool, CannedRunner::working())
}

/// Ingest API whose on-demand runs use `runner` instead of real tools.
pub fn create_test_server_with_runner(pool: PgPool, runner: Arc<dyn CommandRunner>) -> TestServer {
    TestServer::new(build_router(create_test_state(pool, runner))).expect("Failed to create test server")
}

/// Ingest API backed by `pool`, served on a real local port so HTTP clients can reach it.
pub async fn spawn_http_server(pool: PgPool) -> SocketAddr {
    let state = create_test_state(pool, CannedRunner::working());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read test listener address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, build_router(state)).await;
    });
    addr
}

pub async fn create_test_host(pool: &PgPool, name: &str, category: HostCategory, active: bool) -> Host {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut request = HostCreateDBRequest::new(name, format!("{name}.example"), category);
    request.active = Some(active);
    Hosts::new(&mut conn).create(&request).await.expect("Failed to create test host")
}
