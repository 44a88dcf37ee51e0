//! Background exporter that wakes on a fixed interval, reads the shows and
//! clicks in the current window and publishes each one as an `OutcomeRecord`.
//!
//! States: `Idle` (waiting for the next tick), `Exporting` (one cycle running),
//! `Stopped` (terminal). Cancellation is only observed between cycles; a cycle
//! that has started always runs to the end. A slow cycle delays the next tick
//! instead of queueing another one.

use crate::broker::{Broker, PublishChannel};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rotator_core::config::WindowPolicy;
use rotator_core::types::{OutcomeRecord, StatEvent};
use rotator_core::{Clock, RotationStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterState {
    Idle,
    Exporting,
    Stopped,
}

/// Result of one completed export cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub fetched: usize,
    pub published: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Exported(CycleReport),
    /// No channel could be opened; nothing was read.
    ChannelUnavailable,
    /// The event query failed; nothing was published.
    FetchFailed,
}

pub struct StatisticsExporter {
    store: Arc<dyn RotationStore>,
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    span: chrono::Duration,
    window: WindowPolicy,
    last_window_end: Option<DateTime<Utc>>,
    state: watch::Sender<ExporterState>,
}

impl StatisticsExporter {
    pub fn new(
        store: Arc<dyn RotationStore>,
        broker: Arc<dyn Broker>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        window: WindowPolicy,
    ) -> Self {
        // Intervals beyond chrono's range are capped; nothing configures one.
        let span = chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::weeks(52));
        let (state, _) = watch::channel(ExporterState::Idle);
        Self {
            store,
            broker,
            clock,
            interval,
            span,
            window,
            last_window_end: None,
            state,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ExporterState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ExporterState {
        *self.state.borrow()
    }

    /// Run cycles on every tick until `shutdown` is cancelled. The first
    /// cycle starts one interval after the call.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            window = ?self.window,
            "Statistics exporter started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.state.send_replace(ExporterState::Exporting);
                    match self.run_cycle().await {
                        CycleOutcome::Exported(report) => debug!(
                            fetched = report.fetched,
                            published = report.published,
                            failed = report.failed,
                            "Statistics cycle complete"
                        ),
                        CycleOutcome::ChannelUnavailable | CycleOutcome::FetchFailed => {
                            metrics::counter!("statistics.cycles_skipped").increment(1);
                        }
                    }
                    self.state.send_replace(ExporterState::Idle);
                }
            }
        }

        self.state.send_replace(ExporterState::Stopped);
        info!("Statistics exporter stopped");
    }

    /// Run a single export cycle. Failures are logged, never returned:
    /// a broken cycle must not take the exporter down.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let mut channel = match self.broker.open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                error!(error = %e, "Can't open broker channel, skipping cycle");
                return CycleOutcome::ChannelUnavailable;
            }
        };

        let (from, to) = self.window_bounds();
        let outcome = match self.store.events_in_window(from, to).await {
            Ok(events) => {
                self.last_window_end = Some(to);
                let report = Self::publish_all(channel.as_mut(), &events, from, to).await;
                CycleOutcome::Exported(report)
            }
            Err(e) => {
                error!(error = %e, from = %from, to = %to, "Can't fetch statistics events");
                CycleOutcome::FetchFailed
            }
        };

        if let Err(e) = channel.close().await {
            error!(error = %e, "Can't close broker channel");
        }

        outcome
    }

    fn window_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = self.clock.now();
        match self.window {
            WindowPolicy::Forward => (now, now + self.span),
            WindowPolicy::Trailing => {
                let from = self.last_window_end.unwrap_or(now - self.span);
                (from, now)
            }
        }
    }

    async fn publish_all(
        channel: &mut dyn PublishChannel,
        events: &[StatEvent],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CycleReport {
        let mut published = 0;
        let mut failed = 0;

        for event in events {
            let payload = match serde_json::to_vec(&OutcomeRecord::from(event)) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(error = %e, banner_id = event.banner_id, "Can't marshal statistics record");
                    failed += 1;
                    continue;
                }
            };

            match channel.publish(Bytes::from(payload)).await {
                Ok(()) => published += 1,
                Err(e) => {
                    warn!(
                        error = %e,
                        kind = %event.kind,
                        banner_id = event.banner_id,
                        slot_id = event.slot_id,
                        "Can't publish statistics record"
                    );
                    failed += 1;
                }
            }
        }

        metrics::counter!("statistics.published").increment(published as u64);
        metrics::counter!("statistics.publish_errors").increment(failed as u64);

        CycleReport {
            from,
            to,
            fetched: events.len(),
            published,
            failed,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::broker::CaptureBroker;
    use chrono::TimeZone;
    use rotator_core::types::{Banner, Slot, SocialGroup, StatKind};
    use rotator_core::ManualClock;
    use rotator_storage::MemoryStore;

    const INTERVAL: Duration = Duration::from_secs(10);

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn fixture(clock: Arc<ManualClock>) -> Arc<MemoryStore> {
        let store = MemoryStore::with_clock(clock);
        store.insert_slot(Slot {
            id: 1,
            description: "sidebar".into(),
        });
        store.insert_banner(Banner {
            id: 1,
            description: "spring sale".into(),
        });
        store.insert_social_group(SocialGroup {
            id: 1,
            description: "students".into(),
        });
        Arc::new(store)
    }

    fn exporter(
        store: Arc<MemoryStore>,
        broker: &CaptureBroker,
        clock: Arc<ManualClock>,
        window: WindowPolicy,
    ) -> StatisticsExporter {
        StatisticsExporter::new(store, Arc::new(broker.clone()), clock, INTERVAL, window)
    }

    #[tokio::test]
    async fn test_empty_window_publishes_nothing() {
        let clock = Arc::new(ManualClock::new(start()));
        let broker = CaptureBroker::new();
        let mut exporter = exporter(fixture(clock.clone()), &broker, clock, WindowPolicy::Forward);

        let outcome = exporter.run_cycle().await;
        match outcome {
            CycleOutcome::Exported(report) => {
                assert_eq!(report.fetched, 0);
                assert_eq!(report.published, 0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(broker.published().is_empty());
        assert_eq!(broker.opened(), 1);
        assert_eq!(broker.closed(), 1);
        assert_eq!(exporter.state(), ExporterState::Idle);
    }

    #[tokio::test]
    async fn test_forward_window_exports_current_events() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = fixture(clock.clone());
        store.create_association(1, 1).await.unwrap();
        store.insert_click(1, 1, 1).await.unwrap();

        let broker = CaptureBroker::new();
        let mut exporter = exporter(store, &broker, clock.clone(), WindowPolicy::Forward);

        let CycleOutcome::Exported(report) = exporter.run_cycle().await else {
            panic!("cycle did not export");
        };
        assert_eq!(report.from, start());
        assert_eq!(report.to, start() + chrono::Duration::seconds(10));
        assert_eq!(report.published, 2);

        let records = broker.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.kind == StatKind::Show));
        assert!(records.iter().any(|r| r.kind == StatKind::Click));

        // The forward window starts at "now", so older events are not exported again.
        clock.advance(chrono::Duration::seconds(10));
        let CycleOutcome::Exported(report) = exporter.run_cycle().await else {
            panic!("cycle did not export");
        };
        assert_eq!(report.fetched, 0);
    }

    #[tokio::test]
    async fn test_trailing_window_is_contiguous() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = fixture(clock.clone());
        let broker = CaptureBroker::new();
        let mut exporter = exporter(store.clone(), &broker, clock.clone(), WindowPolicy::Trailing);

        clock.advance(chrono::Duration::seconds(3));
        store.create_association(1, 1).await.unwrap();
        clock.advance(chrono::Duration::seconds(7));

        let CycleOutcome::Exported(first) = exporter.run_cycle().await else {
            panic!("cycle did not export");
        };
        assert_eq!(first.from, start());
        assert_eq!(first.fetched, 1);

        // Committed after the first snapshot: exported once, by the next cycle.
        store.insert_exposure(1, 1, 1).await.unwrap();
        clock.advance(chrono::Duration::seconds(25));

        let CycleOutcome::Exported(second) = exporter.run_cycle().await else {
            panic!("cycle did not export");
        };
        assert_eq!(second.from, first.to);
        assert_eq!(second.fetched, 1);
        assert_eq!(broker.records().len(), 2);
    }

    #[tokio::test]
    async fn test_publish_failure_skips_only_that_record() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = fixture(clock.clone());
        store.create_association(1, 1).await.unwrap();
        store.insert_exposure(1, 1, 1).await.unwrap();
        store.insert_click(1, 1, 1).await.unwrap();

        let broker = CaptureBroker::new();
        broker.fail_publish_attempt(1);
        let mut exporter = exporter(store, &broker, clock, WindowPolicy::Forward);

        let CycleOutcome::Exported(report) = exporter.run_cycle().await else {
            panic!("cycle did not export");
        };
        assert_eq!(report.fetched, 3);
        assert_eq!(report.published, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(broker.closed(), 1);
    }

    #[tokio::test]
    async fn test_channel_failure_skips_cycle_and_next_one_recovers() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = fixture(clock.clone());
        store.create_association(1, 1).await.unwrap();

        let broker = CaptureBroker::new();
        broker.set_fail_open(true);
        let mut exporter = exporter(store, &broker, clock, WindowPolicy::Trailing);

        assert_eq!(exporter.run_cycle().await, CycleOutcome::ChannelUnavailable);
        assert_eq!(broker.closed(), 0);

        broker.set_fail_open(false);
        let CycleOutcome::Exported(report) = exporter.run_cycle().await else {
            panic!("cycle did not export");
        };
        assert_eq!(report.published, 0);
        // Skipped cycle did not move the trailing window, so its span is retried.
        assert_eq!(report.from, start() - chrono::Duration::seconds(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_returns_to_idle_and_stops() {
        let clock = Arc::new(ManualClock::new(start()));
        let broker = CaptureBroker::new();
        let exporter = exporter(fixture(clock.clone()), &broker, clock, WindowPolicy::Forward);
        let state = exporter.subscribe();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(exporter.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(broker.opened(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(broker.opened(), 3);
        assert_eq!(*state.borrow(), ExporterState::Idle);

        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(*state.borrow(), ExporterState::Stopped);
        assert!(broker.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_idle_never_exports() {
        let clock = Arc::new(ManualClock::new(start()));
        let broker = CaptureBroker::new();
        let exporter = exporter(fixture(clock.clone()), &broker, clock, WindowPolicy::Forward);
        let state = exporter.subscribe();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        exporter.run(shutdown).await;
        assert_eq!(*state.borrow(), ExporterState::Stopped);
        assert_eq!(broker.opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_cycle_lets_cycle_finish() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = fixture(clock.clone());
        store.create_association(1, 1).await.unwrap();
        store.insert_exposure(1, 1, 1).await.unwrap();
        store.insert_click(1, 1, 1).await.unwrap();

        let broker = CaptureBroker::new();
        broker.set_publish_delay(Duration::from_secs(1));
        let exporter = exporter(store, &broker, clock, WindowPolicy::Forward);
        let state = exporter.subscribe();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(exporter.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(*state.borrow(), ExporterState::Exporting);

        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(broker.published().len(), 3);
        assert_eq!(broker.closed(), 1);
        assert_eq!(*state.borrow(), ExporterState::Stopped);
    }
}
