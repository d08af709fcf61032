//! # speedctl: scheduled network measurement
//!
//! `speedctl` runs as a long-lived daemon that periodically measures a network from one vantage
//! point and records the results. Two kinds of measurement are taken:
//!
//! - **Speed tests** against the public internet, by running the Ookla `speedtest` CLI.
//! - **Throughput tests** against known `iperf3` servers ("hosts"). Each round picks one random
//!   active host per category (`lan`, `vpn`, `remote`) and measures against it.
//!
//! ## Architecture
//!
//! The external tools are executed by the [`runner`] with a hard deadline, and their JSON
//! output is turned into canonical measurements by the [`normalizer`]. The [`orchestrator`]
//! owns the schedule, using the [`selector`] to pick throughput targets. Finished measurements
//! go to a [`sink`], chosen at start-up:
//!
//! - **direct**: written straight into PostgreSQL through the repositories in [`db`]
//! - **api**: posted to a remote ingest API over HTTP
//!
//! The same binary can serve that ingest API ([`api`]), so a fleet of daemons can report to one
//! collector that owns the database. Both paths store identical records.
//!
//! ## Configuration
//!
//! See [`config`]. A YAML file is merged with `SPEEDCTL_`-prefixed environment variables and a
//! raw `DATABASE_URL`.
//!
//! ## Database
//!
//! PostgreSQL with migrations embedded in the binary:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::migrate::MigrateError> {
//! speedctl::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod normalizer;
pub mod orchestrator;
pub mod runner;
pub mod selector;
pub mod sink;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use config::Config;

use anyhow::Context;
use api::handlers::{dashboard, hosts, runs, speed_tests, throughput_tests};
use axum::{
    Router,
    routing::{get, post},
};
use config::{SubmissionConfig, TestCommand};
use orchestrator::{CategoryOutcome, TestOrchestrator};
use runner::{CommandRunner, ProcessRunner};
use sink::direct::DirectSink;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, error, info};
use types::{DaemonId, HostCategory};

/// Shared state of the ingest API handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Executes on-demand runs; always stores into `db`
    pub orchestrator: Arc<TestOrchestrator>,
    /// Cancelled on shutdown, killing tool processes of in-flight requests
    pub shutdown: CancellationToken,
}

/// Get the speedctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Build the ingest API router.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/hosts", get(hosts::list_hosts).post(hosts::create_host))
        .route(
            "/hosts/{id}",
            get(hosts::get_host).patch(hosts::update_host).delete(hosts::delete_host),
        )
        .route(
            "/speedtest/results",
            get(speed_tests::list_speed_tests).post(speed_tests::submit_speed_test),
        )
        .route("/speedtest/results/range", get(speed_tests::speed_tests_in_range))
        .route("/speedtest/run", post(runs::run_speed_test))
        .route(
            "/speedtest/results/{id}",
            get(speed_tests::get_speed_test).delete(speed_tests::delete_speed_test),
        )
        .route(
            "/iperf/results",
            get(throughput_tests::list_throughput_tests).post(throughput_tests::submit_throughput_test),
        )
        .route(
            "/iperf/results/{id}",
            get(throughput_tests::get_throughput_test).delete(throughput_tests::delete_throughput_test),
        )
        .route("/iperf/run", post(runs::run_throughput_round))
        .route("/iperf/run/{host_id}", post(runs::run_throughput_test))
        .route("/dashboard", get(dashboard::get_dashboard));

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api/v1", api_routes)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Connect to PostgreSQL and run migrations, if anything in this process needs the database.
async fn setup_database(config: &Config) -> anyhow::Result<Option<PgPool>> {
    if !config.needs_database() {
        debug!("No database needed: api submission mode without the ingest API");
        return Ok(None);
    }
    connect_database(config).await.map(Some)
}

async fn connect_database(config: &Config) -> anyhow::Result<PgPool> {
    let url = config
        .database
        .url
        .as_deref()
        .context("database URL is required for direct submission or the ingest API")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(config.database.acquire_timeout)
        .connect(url)
        .await
        .context("Failed to connect to database")?;

    migrator().run(&pool).await.context("Failed to run database migrations")?;
    info!("Database connected and migrations applied");
    Ok(pool)
}

/// A configured process: the measurement daemon, the ingest API, or both.
pub struct Application {
    config: Config,
    pool: Option<PgPool>,
    router: Option<Router>,
    orchestrator: Option<Arc<TestOrchestrator>>,
    shutdown: CancellationToken,
}

impl Application {
    /// Connect to the database and build the sink and router. Failures here are fatal.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting speedctl with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        let daemon_id = DaemonId::generate();
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
        let shutdown = CancellationToken::new();

        let orchestrator = if config.background_services.daemon.enabled {
            let sink = sink::create_sink(&config.submission, pool.clone())?;
            info!(daemon_id = %daemon_id, "Measurement daemon enabled");
            Some(Arc::new(TestOrchestrator::new(
                sink,
                Arc::clone(&runner),
                config.testing.clone(),
                config.tools.clone(),
                daemon_id.clone(),
            )))
        } else {
            None
        };

        let router = match (&pool, config.background_services.ingest_api.enabled) {
            (Some(pool), true) => {
                // On-demand runs share the daemon's run slots when both write to this database
                let on_demand = match &orchestrator {
                    Some(daemon) if config.submission == SubmissionConfig::Direct => Arc::clone(daemon),
                    _ => Arc::new(TestOrchestrator::new(
                        Arc::new(DirectSink::new(pool.clone())),
                        Arc::clone(&runner),
                        config.testing.clone(),
                        config.tools.clone(),
                        daemon_id.clone(),
                    )),
                };
                Some(build_router(AppState {
                    db: pool.clone(),
                    config: config.clone(),
                    orchestrator: on_demand,
                    shutdown: shutdown.clone(),
                }))
            }
            _ => None,
        };

        Ok(Self {
            config,
            pool,
            router,
            orchestrator,
            shutdown,
        })
    }

    /// Run until `shutdown` resolves, then stop the daemon and release resources.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let shutdown_token = self.shutdown;
        let daemon = self
            .orchestrator
            .map(|orchestrator| tokio::spawn(orchestrator.run(shutdown_token.clone())));

        // Cancel before the server drains, so on-demand runs holding requests open are killed
        let shutdown = {
            let token = shutdown_token.clone();
            async move {
                shutdown.await;
                token.cancel();
            }
        };

        let result = match self.router {
            Some(router) => {
                let bind_addr = self.config.bind_address();
                match TcpListener::bind(&bind_addr).await {
                    Ok(listener) => {
                        info!("Ingest API listening on http://{}", bind_addr);
                        axum::serve(listener, router)
                            .with_graceful_shutdown(shutdown)
                            .await
                            .context("Ingest API server failed")
                    }
                    Err(e) => Err(anyhow::Error::from(e).context(format!("Failed to bind {bind_addr}"))),
                }
            }
            None => {
                shutdown.await;
                Ok(())
            }
        };

        shutdown_token.cancel();
        if let Some(daemon) = daemon
            && let Err(e) = daemon.await
        {
            error!("Measurement daemon task failed: {}", e);
        }

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        result
    }
}

/// Run the `test` subcommand: measure once through the configured sink and report the result.
///
/// `shutdown` cancels a run in progress; its tool process is killed.
pub async fn run_test_command<F>(config: Config, command: TestCommand, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let pool = match config.submission {
        SubmissionConfig::Direct => Some(connect_database(&config).await?),
        SubmissionConfig::Api(_) => None,
    };
    let sink = sink::create_sink(&config.submission, pool.clone())?;
    let orchestrator = TestOrchestrator::new(
        sink,
        Arc::new(ProcessRunner::new()),
        config.testing.clone(),
        config.tools.clone(),
        DaemonId::generate(),
    );

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown.await;
            cancel.cancel();
        }
    });

    let result = run_test(&orchestrator, command, &cancel).await;

    watcher.abort();
    if let Some(pool) = pool {
        pool.close().await;
    }
    result
}

async fn run_test(orchestrator: &TestOrchestrator, command: TestCommand, cancel: &CancellationToken) -> anyhow::Result<()> {
    match command {
        TestCommand::Speed => {
            let id = orchestrator
                .run_speed_test_now(cancel)
                .await
                .context("Speed test failed")?;
            println!("Speed test stored with id {id}");
        }
        TestCommand::Iperf {
            host_id: Some(host_id),
            duration,
        } => {
            let duration = duration.map(std::time::Duration::from_secs);
            let (id, success) = orchestrator
                .test_host_now(host_id, duration, cancel)
                .await
                .with_context(|| format!("Throughput test against host {host_id} failed"))?;
            if !success {
                anyhow::bail!("Throughput test against host {host_id} failed, stored as {id}");
            }
            println!("Throughput test against host {host_id} stored with id {id}");
        }
        TestCommand::Iperf { host_id: None, duration } => {
            let duration = duration.map(std::time::Duration::from_secs);
            let outcomes = orchestrator.throughput_round_now(duration, cancel).await?;
            if outcomes.is_empty() {
                anyhow::bail!("Throughput round did not run, see the log for details");
            }
            for (category, outcome) in outcomes {
                println!("{}", describe_outcome(category, &outcome));
            }
        }
    }
    Ok(())
}

fn describe_outcome(category: HostCategory, outcome: &CategoryOutcome) -> String {
    match outcome {
        CategoryOutcome::Recorded {
            host_id,
            test_id,
            success: true,
        } => format!("{category}: host {host_id} measured, stored as {test_id}"),
        CategoryOutcome::Recorded {
            host_id,
            test_id,
            success: false,
        } => format!("{category}: host {host_id} failed, stored as {test_id}"),
        CategoryOutcome::Skipped => format!("{category}: no active hosts, skipped"),
        CategoryOutcome::SubmitFailed(e) => format!("{category}: could not store result: {e}"),
    }
}
