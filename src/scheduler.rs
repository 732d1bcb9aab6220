//! Cycle scheduler: the agent's single cooperative loop.
//!
//! One logical task interleaves three activities per turn: run a measurement
//! cycle when the sample interval has elapsed, drain the backlog when there
//! is one and connectivity can be acquired, and service the session
//! keepalive. Exactly one activity touches the durable log at a time, by
//! construction, which is why no locking exists anywhere in the agent.

use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::connectivity::{Connectivity, NetworkLink, Session};
use crate::record::MeasurementRecord;
use crate::replay;
use crate::sampler::{Sampler, SensorBus};
use crate::store::DurableLog;

/// Cadence of the cooperative loop; every turn ends by yielding.
const LOOP_TICK: Duration = Duration::from_millis(250);

/// How often the scheduler reports cumulative progress.
const REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Counters accumulated across scheduler turns.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleStats {
    /// Valid measurements appended to the durable log
    pub records_stored: u64,

    /// Measurement cycles discarded by the sampler
    pub cycles_discarded: u64,

    /// Measurements lost because the log could not be written
    pub appends_failed: u64,

    /// Drain passes that ran to completion (with or without requeue)
    pub drains_run: u64,

    /// Turns where a backlog existed but connectivity could not be acquired
    pub drains_deferred: u64,

    /// Records confirmed delivered across all drains
    pub records_delivered: u64,
}

/// Owns every collaborator and drives them from one loop.
pub struct Scheduler<B, L, S> {
    sampler: Sampler<B>,
    log: DurableLog,
    connectivity: Connectivity<L, S>,
    sample_interval: Duration,
    started: Instant,
    last_sample: Option<Instant>,
    last_report: Instant,
    stats: CycleStats,
}

impl<B: SensorBus, L: NetworkLink, S: Session> Scheduler<B, L, S> {
    pub fn new(
        sampler: Sampler<B>,
        log: DurableLog,
        connectivity: Connectivity<L, S>,
        sample_interval: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            sampler,
            log,
            connectivity,
            sample_interval,
            started: now,
            last_sample: None,
            last_report: now,
            stats: CycleStats::default(),
        }
    }

    /// Run the loop forever.
    ///
    /// Never returns on its own; the caller races it against a shutdown
    /// signal. Every failure inside a turn narrows to "skip this unit of
    /// work, retry next turn".
    pub async fn run(&mut self) {
        info!(
            sample_interval_secs = self.sample_interval.as_secs(),
            channels = self.sampler.channel_count(),
            log = %self.log.path().display(),
            "scheduler started"
        );

        let mut ticker = interval(LOOP_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.turn().await;
        }
    }

    /// Execute one turn of the loop.
    ///
    /// Public so tests can drive the state machine deterministically.
    pub async fn turn(&mut self) {
        if self.sample_due() {
            self.last_sample = Some(Instant::now());
            self.run_measurement_cycle().await;
        }

        if self.log.has_pending().await {
            if self.connectivity.ensure().await {
                self.run_drain().await;
            } else {
                // Retried next turn, no escalation.
                debug!("connectivity unavailable, backlog retained");
                self.stats.drains_deferred += 1;
            }
        }

        self.connectivity.service().await;
        self.maybe_report();
        tokio::task::yield_now().await;
    }

    /// Current cumulative counters.
    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    fn sample_due(&self) -> bool {
        match self.last_sample {
            Some(last) => last.elapsed() >= self.sample_interval,
            None => true,
        }
    }

    async fn run_measurement_cycle(&mut self) {
        let Some(reading) = self.sampler.sample().await else {
            self.stats.cycles_discarded += 1;
            return;
        };

        let timestamp_ms = self.started.elapsed().as_millis() as u64;
        let record = MeasurementRecord::new(
            timestamp_ms,
            &reading,
            self.connectivity.signal_strength(),
        );

        match self.log.append(&record).await {
            Ok(()) => {
                self.stats.records_stored += 1;
                debug!(
                    timestamp_ms,
                    channels = record.channel_count(),
                    "measurement stored"
                );
            }
            Err(e) => {
                // This cycle's measurement is lost; the log itself is intact.
                warn!(error = %e, "measurement dropped, log unavailable");
                self.stats.appends_failed += 1;
            }
        }
    }

    async fn run_drain(&mut self) {
        match replay::drain(&self.log, &mut self.connectivity).await {
            Ok(report) => {
                self.stats.drains_run += 1;
                self.stats.records_delivered += report.records_delivered;
            }
            Err(e) => {
                warn!(error = %e, "drain pass failed, backlog retained");
            }
        }
    }

    fn maybe_report(&mut self) {
        if self.last_report.elapsed() >= REPORT_INTERVAL {
            info!(
                stored = self.stats.records_stored,
                delivered = self.stats.records_delivered,
                discarded = self.stats.cycles_discarded,
                deferred = self.stats.drains_deferred,
                "scheduler progress"
            );
            self.last_report = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connectivity::LinkStatus;
    use crate::sampler::ChannelId;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_log(tag: &str) -> DurableLog {
        let seq = TEST_SEQ.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "temp-relay-sched-{}-{}-{}.csv",
            tag,
            std::process::id(),
            seq
        ));
        let _ = std::fs::remove_file(&path);
        DurableLog::new(path)
    }

    struct FixedBus {
        values: Vec<Option<f32>>,
    }

    impl SensorBus for FixedBus {
        async fn discover(&mut self) -> Vec<ChannelId> {
            (0..self.values.len() as u64).map(ChannelId).collect()
        }

        async fn request_conversion(&mut self) {}

        async fn read_channel(&mut self, id: ChannelId) -> Option<f32> {
            self.values[id.0 as usize]
        }
    }

    struct UpLink;

    impl NetworkLink for UpLink {
        fn status(&self) -> LinkStatus {
            LinkStatus::Up
        }

        fn signal_strength(&self) -> i32 {
            -62
        }

        async fn connect(&mut self, _ssid: &str, _credential: &str) {}

        async fn disconnect(&mut self) {}
    }

    struct TestSession {
        open: bool,
        open_succeeds: bool,
        publish_succeeds: bool,
        published: Vec<(String, f32)>,
    }

    impl TestSession {
        fn working() -> Self {
            Self {
                open: false,
                open_succeeds: true,
                publish_succeeds: true,
                published: Vec::new(),
            }
        }

        fn unreachable() -> Self {
            Self {
                open: false,
                open_succeeds: false,
                publish_succeeds: false,
                published: Vec::new(),
            }
        }
    }

    impl Session for TestSession {
        fn is_open(&self) -> bool {
            self.open
        }

        async fn open(&mut self) -> bool {
            self.open = self.open_succeeds;
            self.open
        }

        async fn close(&mut self) {
            self.open = false;
        }

        async fn keepalive(&mut self) {}

        async fn publish(&mut self, topic: &str, value: f32) -> bool {
            if self.publish_succeeds {
                self.published.push((topic.to_string(), value));
            }
            self.publish_succeeds
        }
    }

    async fn scheduler(
        values: Vec<Option<f32>>,
        session: TestSession,
        log: DurableLog,
    ) -> Scheduler<FixedBus, UpLink, TestSession> {
        let sampler = Sampler::discover(FixedBus { values }).await;
        let connectivity = Connectivity::new(UpLink, session, &Config::default());
        Scheduler::new(sampler, log, connectivity, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_turn_samples_and_drains() {
        let log = temp_log("happy");
        let mut sched = scheduler(
            vec![Some(21.5), Some(22.0)],
            TestSession::working(),
            log.clone(),
        )
        .await;

        sched.turn().await;

        let stats = sched.stats();
        assert_eq!(stats.records_stored, 1);
        assert_eq!(stats.drains_run, 1);
        assert_eq!(stats.records_delivered, 1);
        // Backlog fully drained.
        assert!(!log.has_pending().await);
        assert_eq!(sched.connectivity.session.published.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_interval_gates_measurement() {
        let log = temp_log("interval");
        let mut sched = scheduler(vec![Some(21.5)], TestSession::working(), log).await;

        sched.turn().await;
        // Second turn inside the same interval: no new sample.
        sched.turn().await;
        assert_eq!(sched.stats().records_stored, 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        sched.turn().await;
        assert_eq!(sched.stats().records_stored, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlog_retained_while_unreachable() {
        let log = temp_log("offline");
        let mut sched = scheduler(
            vec![Some(21.5)],
            TestSession::unreachable(),
            log.clone(),
        )
        .await;

        sched.turn().await;

        let stats = sched.stats();
        assert_eq!(stats.records_stored, 1);
        assert_eq!(stats.drains_run, 0);
        assert_eq!(stats.drains_deferred, 1);
        assert!(log.has_pending().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlog_drains_once_reachable_again() {
        let log = temp_log("recovery");
        // Store two cycles while unreachable.
        let mut sched = scheduler(
            vec![Some(21.5)],
            TestSession::unreachable(),
            log.clone(),
        )
        .await;
        sched.turn().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        sched.turn().await;
        assert_eq!(sched.stats().records_stored, 2);
        assert!(log.has_pending().await);

        // Connectivity returns.
        sched.connectivity.session.open_succeeds = true;
        sched.connectivity.session.publish_succeeds = true;
        sched.turn().await;

        assert_eq!(sched.stats().records_delivered, 2);
        assert!(!log.has_pending().await);
        // FIFO order across the outage.
        let values: Vec<f32> = sched
            .connectivity
            .session
            .published
            .iter()
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(values, vec![21.5, 21.5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discarded_cycle_stores_nothing() {
        let log = temp_log("discard");
        let mut sched = scheduler(
            vec![Some(21.5), None],
            TestSession::working(),
            log.clone(),
        )
        .await;

        sched.turn().await;

        let stats = sched.stats();
        assert_eq!(stats.records_stored, 0);
        assert_eq!(stats.cycles_discarded, 1);
        assert!(!log.has_pending().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_channels_never_store_or_drain() {
        let log = temp_log("zero");
        let mut sched = scheduler(vec![], TestSession::working(), log.clone()).await;

        for _ in 0..3 {
            sched.turn().await;
            tokio::time::advance(Duration::from_secs(61)).await;
        }

        assert_eq!(sched.stats().records_stored, 0);
        assert!(!log.has_pending().await);
        assert!(sched.connectivity.session.published.is_empty());
    }
}
