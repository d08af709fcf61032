//! Periodic scheduling of speed tests and throughput rounds.
//!
//! The [`TestOrchestrator`] owns two independent timers. The first tick of each fires
//! immediately, so a freshly started daemon measures right away. Every tick spawns its run
//! as a separate task; runs of the same kind may overlap, but the number executing at once
//! is bounded by a semaphore sized from `testing.max_concurrent_runs`. Runs that cannot get
//! a permit wait for one rather than being dropped.
//!
//! A throughput round visits the categories in order (lan, vpn, remote), picks one random
//! active host in each and measures against it. A failure against one host is logged and
//! stored as a failed measurement, and the round moves on to the next category. Speed test
//! failures are only logged.
//!
//! Cancelling the token stops scheduling and kills running tool processes. Runs that are
//! already past their process step still finish their final write.
//!
//! The `*_now` methods run the same measurements on demand, for the ingest API and the `test`
//! subcommand. They take a run slot from the same semaphore as scheduled runs.

use crate::api::models::submissions::{SpeedTestSubmission, ThroughputTestSubmission};
use crate::config::{TestingConfig, ToolsConfig};
use crate::db::models::hosts::Host;
use crate::errors::{Error, Result};
use crate::normalizer::{ThroughputMeasurement, parse_speed, parse_throughput};
use crate::runner::CommandRunner;
use crate::selector::select_host;
use crate::sink::SubmissionSink;
use crate::types::{DaemonId, HostCategory, HostId, SpeedTestId, ThroughputTestId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// What happened to one category during a throughput round.
#[derive(Debug)]
pub enum CategoryOutcome {
    /// A measurement was stored, successful or not
    Recorded {
        host_id: HostId,
        test_id: ThroughputTestId,
        success: bool,
    },
    /// No active host in the category
    Skipped,
    /// The measurement could not be stored
    SubmitFailed(Error),
}

pub struct TestOrchestrator {
    sink: Arc<dyn SubmissionSink>,
    runner: Arc<dyn CommandRunner>,
    testing: TestingConfig,
    tools: ToolsConfig,
    daemon_id: DaemonId,
    permits: Arc<Semaphore>,
}

impl TestOrchestrator {
    pub fn new(
        sink: Arc<dyn SubmissionSink>,
        runner: Arc<dyn CommandRunner>,
        testing: TestingConfig,
        tools: ToolsConfig,
        daemon_id: DaemonId,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(testing.max_concurrent_runs.max(1)));
        Self {
            sink,
            runner,
            testing,
            tools,
            daemon_id,
            permits,
        }
    }

    /// Schedule runs until `shutdown` is cancelled, then wait for in-flight runs to wind down.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            daemon_id = %self.daemon_id,
            speedtest_interval = ?self.testing.speedtest_interval,
            throughput_interval = ?self.testing.throughput_interval,
            max_concurrent_runs = self.testing.max_concurrent_runs,
            "Starting measurement daemon"
        );

        let mut speed_timer = tokio::time::interval(self.testing.speedtest_interval);
        speed_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut throughput_timer = tokio::time::interval(self.testing.throughput_interval);
        throughput_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut runs = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(in_flight = runs.len(), "Measurement daemon stopping");
                    break;
                }
                _ = speed_timer.tick() => {
                    let this = Arc::clone(&self);
                    let cancel = shutdown.clone();
                    self.spawn_run(&mut runs, &shutdown, "speed test", async move {
                        this.speed_test_job(&cancel).await
                    });
                }
                _ = throughput_timer.tick() => {
                    let this = Arc::clone(&self);
                    let cancel = shutdown.clone();
                    self.spawn_run(&mut runs, &shutdown, "throughput round", async move {
                        this.throughput_round(&cancel).await;
                    });
                }
                Some(joined) = runs.join_next(), if !runs.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Measurement task panicked");
                    }
                }
            }
        }

        while let Some(joined) = runs.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Measurement task panicked");
            }
        }
        info!("Measurement daemon stopped");
    }

    /// Spawn a job that first waits for a run permit. Jobs still waiting at shutdown are dropped.
    fn spawn_run<F>(&self, runs: &mut JoinSet<()>, shutdown: &CancellationToken, kind: &'static str, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let shutdown = shutdown.clone();
        let span = info_span!("measurement_run", kind, daemon_id = %self.daemon_id);

        runs.spawn(
            async move {
                let _permit = tokio::select! {
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                    _ = shutdown.cancelled() => {
                        debug!("Shutdown before a run slot was free, skipping");
                        return;
                    }
                };
                job.await;
            }
            .instrument(span),
        );
    }

    async fn run_slot(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!("run slots unavailable: {e}")))
    }

    /// Run a speed test now, once a run slot is free.
    pub async fn run_speed_test_now(&self, cancel: &CancellationToken) -> Result<SpeedTestId> {
        let _permit = self.run_slot().await?;
        self.run_speed_test(cancel).await
    }

    /// Run a full throughput round now, with an optional per-test duration override.
    pub async fn throughput_round_now(
        &self,
        duration: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Vec<(HostCategory, CategoryOutcome)>> {
        let _permit = self.run_slot().await?;
        let duration = duration.unwrap_or(self.testing.throughput_duration);
        Ok(self.throughput_round_for(duration, cancel).await)
    }

    /// Measure one specific active host now, returning the stored test and whether it succeeded.
    pub async fn test_host_now(
        &self,
        host_id: HostId,
        duration: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<(ThroughputTestId, bool)> {
        let hosts = self.sink.list_active_hosts().await?;
        let host = hosts
            .iter()
            .find(|h| h.id == host_id)
            .ok_or(Error::HostNotFound { id: host_id })?;

        let _permit = self.run_slot().await?;
        let duration = duration.unwrap_or(self.testing.throughput_duration);
        self.test_host(host, duration, cancel).await
    }

    async fn speed_test_job(&self, cancel: &CancellationToken) {
        match self.run_speed_test(cancel).await {
            Ok(id) => debug!(speed_test_id = id, "Speed test stored"),
            Err(e) => {
                if let Some(raw) = e.raw_output() {
                    debug!(raw = %raw, "Unparseable speed test output");
                }
                warn!(error = %e.detail(), "Speed test failed");
            }
        }
    }

    /// Execute the speed tool once, normalize its output and submit it.
    pub async fn run_speed_test(&self, cancel: &CancellationToken) -> Result<SpeedTestId> {
        let args = ["--format=json", "--accept-license", "--accept-gdpr"].map(String::from);
        let raw = self
            .runner
            .run(&self.tools.speedtest_binary, &args, self.testing.speedtest_timeout, cancel)
            .await?;

        let measurement = parse_speed(&raw, self.testing.speedtest_bandwidth_unit)?;
        info!(
            download_mbps = measurement.download_mbps,
            upload_mbps = measurement.upload_mbps,
            ping_ms = measurement.ping_ms,
            server = measurement.server_name.as_deref().unwrap_or("unknown"),
            "Speed test completed"
        );

        let submission = SpeedTestSubmission::from_measurement(measurement, &self.daemon_id);
        self.sink.submit_speed(&submission).await
    }

    /// Measure one random active host per category, in order.
    ///
    /// The host list is fetched once per round. An empty list from a failed fetch ends the round.
    pub async fn throughput_round(&self, cancel: &CancellationToken) -> Vec<(HostCategory, CategoryOutcome)> {
        self.throughput_round_for(self.testing.throughput_duration, cancel).await
    }

    async fn throughput_round_for(&self, duration: Duration, cancel: &CancellationToken) -> Vec<(HostCategory, CategoryOutcome)> {
        let hosts = match self.sink.list_active_hosts().await {
            Ok(hosts) => hosts,
            Err(e) => {
                error!(error = %e, "Failed to load hosts, skipping throughput round");
                return Vec::new();
            }
        };

        let mut outcomes = Vec::with_capacity(HostCategory::ALL.len());
        for category in HostCategory::ALL {
            if cancel.is_cancelled() {
                debug!(category = %category, "Shutting down, not starting further throughput tests");
                break;
            }

            let outcome = match select_host(&hosts, category) {
                Ok(host) => match self.test_host(host, duration, cancel).await {
                    Ok((test_id, success)) => CategoryOutcome::Recorded {
                        host_id: host.id,
                        test_id,
                        success,
                    },
                    Err(e) => CategoryOutcome::SubmitFailed(e),
                },
                Err(e) => {
                    info!(category = %category, "{e}, skipping category");
                    CategoryOutcome::Skipped
                }
            };
            outcomes.push((category, outcome));
        }

        let recorded = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, CategoryOutcome::Recorded { success: true, .. }))
            .count();
        info!(succeeded = recorded, categories = outcomes.len(), "Throughput round finished");
        outcomes
    }

    /// Measure `host` and submit the result. A failed measurement is submitted as a failure;
    /// only a failed submission is returned as an error.
    async fn test_host(&self, host: &Host, duration: Duration, cancel: &CancellationToken) -> Result<(ThroughputTestId, bool)> {
        let duration_seconds = i32::try_from(duration.as_secs()).unwrap_or(i32::MAX);

        let submission = match self.measure_throughput(host, duration, cancel).await {
            Ok(measurement) => {
                info!(
                    host = %host.name,
                    category = %host.category,
                    sent_mbps = measurement.sent_mbps,
                    received_mbps = measurement.received_mbps,
                    "Throughput test completed"
                );
                ThroughputTestSubmission::from_measurement(measurement, host.id, duration_seconds, &self.daemon_id)
            }
            Err(e) => {
                if let Some(raw) = e.raw_output() {
                    debug!(host = %host.name, raw = %raw, "Unparseable throughput output");
                }
                warn!(host = %host.name, category = %host.category, error = %e.detail(), "Throughput test failed");
                ThroughputTestSubmission::failed(host.id, duration_seconds, &e, &self.daemon_id)
            }
        };

        let success = submission.is_success();
        match self.sink.submit_throughput(&submission).await {
            Ok(test_id) => Ok((test_id, success)),
            Err(e) => {
                error!(host = %host.name, category = %host.category, error = %e, "Failed to submit throughput result");
                Err(e)
            }
        }
    }

    async fn measure_throughput(&self, host: &Host, duration: Duration, cancel: &CancellationToken) -> Result<ThroughputMeasurement> {
        let args = vec![
            "-c".to_string(),
            host.hostname.clone(),
            "-p".to_string(),
            host.port.to_string(),
            "-t".to_string(),
            duration.as_secs().to_string(),
            "-J".to_string(),
        ];

        let raw = self
            .runner
            .run(&self.tools.iperf_binary, &args, self.testing.throughput_deadline(duration), cancel)
            .await?;
        parse_throughput(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Protocol;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SPEEDTEST_OUTPUT: &[u8] = br#"{"type":"result","timestamp":"2025-03-01T12:00:00Z","ping":{"jitter":0.8,"latency":9.5},"download":{"bandwidth":12500000},"upload":{"bandwidth":2500000},"isp":"Example Broadband","server":{"id":1234,"name":"Example Server"}}"#;

    const IPERF_OUTPUT: &[u8] = br#"{
        "start": {"test_start": {"protocol": "TCP", "duration": 10}},
        "end": {
            "streams": [{"sender": {"mean_rtt": 15000}}],
            "sum_sent": {"bits_per_second": 100000000, "retransmits": 3},
            "sum_received": {"bits_per_second": 95000000}
        }
    }"#;

    type Respond = dyn Fn(&str, &[String]) -> Result<Vec<u8>> + Send + Sync;

    /// Answers with canned output and tracks how many runs overlap.
    struct StubRunner {
        respond: Box<Respond>,
        delay: Duration,
        calls: Mutex<Vec<(String, Vec<String>)>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StubRunner {
        fn new(respond: impl Fn(&str, &[String]) -> Result<Vec<u8>> + Send + Sync + 'static) -> Self {
            Self {
                respond: Box::new(respond),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for StubRunner {
        async fn run(&self, program: &str, args: &[String], _deadline: Duration, cancel: &CancellationToken) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push((program.to_string(), args.to_vec()));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let cancelled = tokio::select! {
                _ = tokio::time::sleep(self.delay) => false,
                _ = cancel.cancelled() => true,
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if cancelled {
                return Err(Error::ProcessExecutionFailed {
                    command: program.to_string(),
                    detail: "cancelled".to_string(),
                    stderr: None,
                });
            }
            (self.respond)(program, args)
        }
    }

    /// Keeps submissions in memory.
    #[derive(Default)]
    struct RecordingSink {
        hosts: Vec<Host>,
        speed: Mutex<Vec<SpeedTestSubmission>>,
        throughput: Mutex<Vec<ThroughputTestSubmission>>,
    }

    impl RecordingSink {
        fn with_hosts(hosts: Vec<Host>) -> Self {
            Self {
                hosts,
                ..Default::default()
            }
        }

        fn speed(&self) -> Vec<SpeedTestSubmission> {
            self.speed.lock().unwrap().clone()
        }

        fn throughput(&self) -> Vec<ThroughputTestSubmission> {
            self.throughput.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SubmissionSink for RecordingSink {
        async fn list_active_hosts(&self) -> Result<Vec<Host>> {
            Ok(self.hosts.clone())
        }

        async fn submit_speed(&self, submission: &SpeedTestSubmission) -> Result<SpeedTestId> {
            let mut speed = self.speed.lock().unwrap();
            speed.push(submission.clone());
            Ok(speed.len() as i64)
        }

        async fn submit_throughput(&self, submission: &ThroughputTestSubmission) -> Result<ThroughputTestId> {
            let mut throughput = self.throughput.lock().unwrap();
            throughput.push(submission.clone());
            Ok(throughput.len() as i64)
        }
    }

    fn host(id: HostId, name: &str, category: HostCategory) -> Host {
        Host {
            id,
            name: name.to_string(),
            hostname: format!("{name}.example"),
            port: 5201,
            category,
            active: true,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn testing() -> TestingConfig {
        TestingConfig {
            speedtest_interval: Duration::from_secs(3600),
            throughput_interval: Duration::from_secs(3600),
            ..Default::default()
        }
    }

    fn orchestrator(sink: Arc<RecordingSink>, runner: Arc<StubRunner>, testing: TestingConfig) -> Arc<TestOrchestrator> {
        Arc::new(TestOrchestrator::new(
            sink,
            runner,
            testing,
            ToolsConfig::default(),
            DaemonId::from_parts("lab", 7),
        ))
    }

    /// iperf3 fails against `remote.example`, succeeds elsewhere.
    fn iperf_responder(program: &str, args: &[String]) -> Result<Vec<u8>> {
        match program {
            "speedtest" => Ok(SPEEDTEST_OUTPUT.to_vec()),
            _ if args.iter().any(|a| a == "remote.example") => Err(Error::ProcessExecutionFailed {
                command: program.to_string(),
                detail: "exited with exit status: 1".to_string(),
                stderr: Some("iperf3: error - unable to connect to server".to_string()),
            }),
            _ => Ok(IPERF_OUTPUT.to_vec()),
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_speed_test_is_normalized_and_submitted() {
        let sink = Arc::new(RecordingSink::default());
        let runner = Arc::new(StubRunner::new(iperf_responder));
        let orchestrator = orchestrator(sink.clone(), runner.clone(), testing());

        let id = orchestrator.run_speed_test(&CancellationToken::new()).await.unwrap();
        assert_eq!(id, 1);

        let (program, args) = &runner.calls()[0];
        assert_eq!(program, "speedtest");
        assert_eq!(args, &["--format=json", "--accept-license", "--accept-gdpr"]);

        let stored = sink.speed();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].download_mbps, 100.0);
        assert_eq!(stored[0].upload_mbps, 20.0);
        assert_eq!(stored[0].server_id.as_deref(), Some("1234"));
        assert_eq!(stored[0].daemon_id, "daemon-lab-7");
    }

    #[tokio::test]
    async fn test_failed_speed_test_is_not_submitted() {
        let sink = Arc::new(RecordingSink::default());
        let runner = Arc::new(StubRunner::new(|_, _| Ok(b"{\"error\": \"Configuration - No servers\"}".to_vec())));
        let orchestrator = orchestrator(sink.clone(), runner, testing());

        let err = orchestrator.run_speed_test(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::NormalizationFailed { tool: "speedtest", .. }));
        assert!(sink.speed().is_empty());
    }

    #[tokio::test]
    async fn test_throughput_round_visits_categories_in_order() {
        let sink = Arc::new(RecordingSink::with_hosts(vec![
            host(1, "nas", HostCategory::Lan),
            host(2, "office", HostCategory::Vpn),
            host(3, "remote", HostCategory::Remote),
        ]));
        let runner = Arc::new(StubRunner::new(iperf_responder));
        let orchestrator = orchestrator(sink.clone(), runner.clone(), testing());

        let outcomes = orchestrator.throughput_round(&CancellationToken::new()).await;
        let categories: Vec<_> = outcomes.iter().map(|(c, _)| *c).collect();
        assert_eq!(categories, HostCategory::ALL.to_vec());

        let hostnames: Vec<_> = runner.calls().iter().map(|(_, args)| args[1].clone()).collect();
        assert_eq!(hostnames, vec!["nas.example", "office.example", "remote.example"]);
        assert_eq!(
            runner.calls()[0].1,
            vec!["-c", "nas.example", "-p", "5201", "-t", "10", "-J"]
        );

        let stored = sink.throughput();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].sent_mbps, 100.0);
        assert_eq!(stored[0].received_mbps, 95.0);
        assert_eq!(stored[0].retransmits, Some(3.0));
        assert_eq!(stored[0].mean_rtt_ms, Some(15.0));
        assert_eq!(stored[0].protocol, Protocol::Tcp);
        assert_eq!(stored[0].duration_seconds, 10);
    }

    #[tokio::test]
    async fn test_failed_throughput_is_stored_once_with_error() {
        let sink = Arc::new(RecordingSink::with_hosts(vec![
            host(1, "nas", HostCategory::Lan),
            host(3, "remote", HostCategory::Remote),
        ]));
        let runner = Arc::new(StubRunner::new(iperf_responder));
        let orchestrator = orchestrator(sink.clone(), runner, testing());

        let outcomes = orchestrator.throughput_round(&CancellationToken::new()).await;
        assert!(matches!(
            outcomes[2].1,
            CategoryOutcome::Recorded {
                host_id: 3,
                success: false,
                ..
            }
        ));

        let failed: Vec<_> = sink.throughput().into_iter().filter(|s| !s.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].host_id, 3);
        assert_eq!(failed[0].sent_mbps, 0.0);
        assert_eq!(failed[0].received_mbps, 0.0);
        let message = failed[0].error_message.as_deref().unwrap();
        assert!(message.contains("unable to connect to server"), "{message}");
    }

    #[tokio::test]
    async fn test_empty_category_is_skipped() {
        let sink = Arc::new(RecordingSink::with_hosts(vec![
            host(1, "nas", HostCategory::Lan),
            host(3, "backup", HostCategory::Remote),
        ]));
        let runner = Arc::new(StubRunner::new(iperf_responder));
        let orchestrator = orchestrator(sink.clone(), runner, testing());

        let outcomes = orchestrator.throughput_round(&CancellationToken::new()).await;
        assert!(matches!(outcomes[1], (HostCategory::Vpn, CategoryOutcome::Skipped)));
        assert!(matches!(
            outcomes[2],
            (HostCategory::Remote, CategoryOutcome::Recorded { host_id: 3, success: true, .. })
        ));
        assert_eq!(sink.throughput().len(), 2);
    }

    #[tokio::test]
    async fn test_first_runs_start_immediately_and_cancel_stops_scheduling() {
        let sink = Arc::new(RecordingSink::with_hosts(vec![host(1, "nas", HostCategory::Lan)]));
        let runner = Arc::new(StubRunner::new(iperf_responder));
        let orchestrator = orchestrator(sink.clone(), runner.clone(), testing());

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(orchestrator.run(shutdown.clone()));

        // Intervals are an hour long, so only the immediate first ticks can have fired
        wait_until(|| sink.speed().len() == 1 && sink.throughput().len() == 1).await;

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("daemon did not stop")
            .unwrap();

        assert_eq!(runner.calls().len(), 2);
        assert_eq!(sink.speed().len(), 1);
        assert_eq!(sink.throughput().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_bounded() {
        let sink = Arc::new(RecordingSink::with_hosts(vec![host(1, "nas", HostCategory::Lan)]));
        let runner = Arc::new(StubRunner::new(iperf_responder).with_delay(Duration::from_millis(50)));
        let orchestrator = orchestrator(
            sink.clone(),
            runner.clone(),
            TestingConfig {
                speedtest_interval: Duration::from_millis(20),
                throughput_interval: Duration::from_millis(20),
                max_concurrent_runs: 1,
                ..Default::default()
            },
        );

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(orchestrator.run(shutdown.clone()));
        wait_until(|| runner.calls().len() >= 4).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_round_stops_after_current_host() {
        let sink = Arc::new(RecordingSink::with_hosts(vec![
            host(1, "nas", HostCategory::Lan),
            host(2, "office", HostCategory::Vpn),
        ]));
        let runner = Arc::new(StubRunner::new(iperf_responder).with_delay(Duration::from_secs(30)));
        let orchestrator = orchestrator(sink.clone(), runner.clone(), testing());

        let cancel = CancellationToken::new();
        let round = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            let cancel = cancel.clone();
            async move { orchestrator.throughput_round(&cancel).await }
        });

        wait_until(|| runner.calls().len() == 1).await;
        cancel.cancel();
        let outcomes = round.await.unwrap();

        // The interrupted run is still written, nothing further is started
        assert_eq!(outcomes.len(), 1);
        assert_eq!(runner.calls().len(), 1);
        let stored = sink.throughput();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].is_success());
        assert_eq!(stored[0].error_message.as_deref(), Some("iperf3 failed: cancelled"));
    }

    #[tokio::test]
    async fn test_single_host_run_uses_requested_host_and_duration() {
        let sink = Arc::new(RecordingSink::with_hosts(vec![
            host(1, "nas", HostCategory::Lan),
            host(2, "backup", HostCategory::Lan),
        ]));
        let runner = Arc::new(StubRunner::new(iperf_responder));
        let orchestrator = orchestrator(sink.clone(), runner.clone(), testing());

        let (test_id, success) = orchestrator
            .test_host_now(2, Some(Duration::from_secs(5)), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(test_id, 1);
        assert!(success);

        assert_eq!(runner.calls().len(), 1);
        assert_eq!(runner.calls()[0].1, vec!["-c", "backup.example", "-p", "5201", "-t", "5", "-J"]);
        let stored = sink.throughput();
        assert_eq!(stored[0].host_id, 2);
        assert_eq!(stored[0].duration_seconds, 5);
    }

    #[tokio::test]
    async fn test_single_host_run_requires_active_host() {
        let sink = Arc::new(RecordingSink::with_hosts(vec![host(1, "nas", HostCategory::Lan)]));
        let runner = Arc::new(StubRunner::new(iperf_responder));
        let orchestrator = orchestrator(sink.clone(), runner.clone(), testing());

        let err = orchestrator
            .test_host_now(42, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HostNotFound { id: 42 }));
        assert!(runner.calls().is_empty());
        assert!(sink.throughput().is_empty());
    }

    #[tokio::test]
    async fn test_round_now_applies_duration_override() {
        let sink = Arc::new(RecordingSink::with_hosts(vec![host(1, "nas", HostCategory::Lan)]));
        let runner = Arc::new(StubRunner::new(iperf_responder));
        let orchestrator = orchestrator(sink.clone(), runner.clone(), testing());

        let outcomes = orchestrator
            .throughput_round_now(Some(Duration::from_secs(3)), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(runner.calls()[0].1[5], "3");
        assert_eq!(sink.throughput()[0].duration_seconds, 3);
    }

    #[tokio::test]
    async fn test_on_demand_runs_share_the_concurrency_bound() {
        let sink = Arc::new(RecordingSink::default());
        let runner = Arc::new(StubRunner::new(iperf_responder).with_delay(Duration::from_millis(50)));
        let orchestrator = orchestrator(
            sink.clone(),
            runner.clone(),
            TestingConfig {
                max_concurrent_runs: 1,
                ..testing()
            },
        );

        let cancel = CancellationToken::new();
        let (a, b, c) = tokio::join!(
            orchestrator.run_speed_test_now(&cancel),
            orchestrator.run_speed_test_now(&cancel),
            orchestrator.run_speed_test_now(&cancel),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(sink.speed().len(), 3);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
    }
}
