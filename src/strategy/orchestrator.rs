//! Signal Orchestrator
//!
//! Wires the data sources to the detectors and the detectors to the alert sink.
//! The open-interest and funding detectors live in the polling task; the RSI
//! detector lives in the bar consumer task, fed over an mpsc channel by the
//! streaming listener. No state is shared between the two.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::{PriceBar, Sample, Signal};
use crate::error::Result;
use crate::exchange::{MarketDataSource, PriceBarStream};
use crate::strategy::detectors::{
    FundingRateFlipDetector, OpenInterestDropDetector, RsiDivergenceDetector,
};
use crate::supervisor::AlertSink;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Sleep after a successful poll
    pub poll_interval: Duration,
    /// Sleep after a failed poll
    pub backoff: Duration,
    /// Capacity of the bar hand-off channel
    pub bar_channel_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            backoff: Duration::from_secs(60),
            bar_channel_capacity: 256,
        }
    }
}

/// Result of one poll iteration, as seen by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Keep the normal cadence
    Continue,
    /// Back off before retrying
    Backoff,
    /// First success after a backoff; normal cadence again
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollStep {
    pub action: PollAction,
    pub sleep: Duration,
}

/// Poll cadence and error backoff. Pure; owns no timers.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    interval: Duration,
    backoff: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, backoff: Duration) -> Self {
        Self { interval, backoff }
    }

    /// Step in effect before the first poll
    pub fn start(&self) -> PollStep {
        PollStep {
            action: PollAction::Continue,
            sleep: self.interval,
        }
    }

    /// Next step from the outcome of a poll and the step that preceded it
    pub fn next(&self, outcome: PollOutcome, previous: PollStep) -> PollStep {
        match (outcome, previous.action) {
            (PollOutcome::Failure, _) => PollStep {
                action: PollAction::Backoff,
                sleep: self.backoff,
            },
            (PollOutcome::Success, PollAction::Backoff) => PollStep {
                action: PollAction::Resume,
                sleep: self.interval,
            },
            (PollOutcome::Success, _) => PollStep {
                action: PollAction::Continue,
                sleep: self.interval,
            },
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        let config = OrchestratorConfig::default();
        Self::new(config.poll_interval, config.backoff)
    }
}

/// Polling side: open interest and funding snapshots
pub struct SnapshotPoller {
    source: Arc<dyn MarketDataSource>,
    sink: Arc<dyn AlertSink>,
    policy: PollPolicy,
    oi_detector: OpenInterestDropDetector,
    funding_detector: FundingRateFlipDetector,
}

impl SnapshotPoller {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        sink: Arc<dyn AlertSink>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            source,
            sink,
            policy,
            oi_detector: OpenInterestDropDetector::new(),
            funding_detector: FundingRateFlipDetector::new(),
        }
    }

    /// Fetch both snapshots, feed the detectors and emit any signals
    pub async fn poll_once(&mut self) -> Result<Vec<Signal>> {
        self.poll_at(Utc::now()).await
    }

    /// Same as [`poll_once`](Self::poll_once) with an explicit sample timestamp.
    ///
    /// Each signal reaches the sink as soon as its detector fires, so a failed
    /// funding fetch never swallows an open-interest signal from the same poll.
    pub async fn poll_at(&mut self, now: DateTime<Utc>) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();

        let oi = self.source.fetch_open_interest().await?;
        debug!(
            "[{}] open interest {:.2} ({} samples)",
            self.source.venue(),
            oi,
            self.oi_detector.window().len() + 1
        );
        if let Some(signal) = self.oi_detector.update(Sample::new(oi, now)) {
            self.sink.emit(&signal).await;
            signals.push(signal);
        }

        let rate = self.source.fetch_funding_rate().await?;
        debug!(
            "[{}] funding rate {:.4}% ({} samples)",
            self.source.venue(),
            rate * 100.0,
            self.funding_detector.window().len() + 1
        );
        if let Some(signal) = self.funding_detector.update(Sample::new(rate, now)) {
            self.sink.emit(&signal).await;
            signals.push(signal);
        }

        Ok(signals)
    }

    /// Poll forever. Failures are logged and backed off, never fatal.
    pub async fn run(mut self) {
        info!(
            "Polling {} every {:?} (backoff {:?})",
            self.source.venue(),
            self.policy.interval,
            self.policy.backoff
        );

        let mut step = self.policy.start();
        loop {
            let outcome = match self.poll_once().await {
                Ok(_) => PollOutcome::Success,
                Err(e) if e.is_transient() => {
                    warn!("Snapshot poll failed: {}", e);
                    PollOutcome::Failure
                }
                Err(e) => {
                    error!("Snapshot poll failed (non-transient): {}", e);
                    PollOutcome::Failure
                }
            };

            step = self.policy.next(outcome, step);
            match step.action {
                PollAction::Backoff => warn!("Backing off for {:?}", step.sleep),
                PollAction::Resume => info!("Snapshot polling recovered"),
                PollAction::Continue => {}
            }
            tokio::time::sleep(step.sleep).await;
        }
    }
}

/// Streaming side: closed price bars into the divergence detector
pub struct BarConsumer {
    sink: Arc<dyn AlertSink>,
    detector: RsiDivergenceDetector,
}

impl BarConsumer {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            sink,
            detector: RsiDivergenceDetector::new(),
        }
    }

    pub async fn handle_bar(&mut self, bar: PriceBar) -> Option<Signal> {
        let signal = self.detector.update(bar);
        debug!(
            "Bar closed at {} close={} ({} bars)",
            bar.close_time,
            bar.close,
            self.detector.len()
        );
        if let Some(signal) = &signal {
            self.sink.emit(signal).await;
        }
        signal
    }

    /// Consume bars until every sender is dropped
    pub async fn run(mut self, mut rx: mpsc::Receiver<PriceBar>) {
        while let Some(bar) = rx.recv().await {
            self.handle_bar(bar).await;
        }
        debug!("Bar channel closed");
    }

    pub fn detector(&self) -> &RsiDivergenceDetector {
        &self.detector
    }
}

/// Top-level monitor for one instrument
pub struct SignalOrchestrator {
    config: OrchestratorConfig,
    source: Arc<dyn MarketDataSource>,
    bars: Arc<dyn PriceBarStream>,
    sink: Arc<dyn AlertSink>,
}

impl SignalOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        source: Arc<dyn MarketDataSource>,
        bars: Arc<dyn PriceBarStream>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            config,
            source,
            bars,
            sink,
        }
    }

    /// Run the polling loop, the bar stream and the bar consumer until
    /// `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (tx, rx) = mpsc::channel(self.config.bar_channel_capacity.max(1));

        let bars = Arc::clone(&self.bars);
        let mut stream_task = tokio::spawn(async move { bars.subscribe_price_bars(tx).await });
        let consumer_task = tokio::spawn(BarConsumer::new(Arc::clone(&self.sink)).run(rx));

        let poller = SnapshotPoller::new(
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
            PollPolicy::new(self.config.poll_interval, self.config.backoff),
        );

        info!("Monitor started");

        let polling = poller.run();
        tokio::pin!(polling);
        tokio::pin!(shutdown);
        let mut stream_running = true;

        loop {
            tokio::select! {
                _ = &mut polling => break,
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                res = &mut stream_task, if stream_running => {
                    stream_running = false;
                    let reason = match res {
                        Ok(Ok(())) => "price bar stream ended".to_string(),
                        Ok(Err(e)) => e.to_string(),
                        Err(e) => format!("price bar stream task panicked: {}", e),
                    };
                    error!("Price bar stream stopped: {}", reason);
                    self.sink.component_failed("price_bar_stream", &reason).await;
                    warn!("Continuing with snapshot polling only");
                }
            }
        }

        stream_task.abort();
        consumer_task.abort();
        info!("Monitor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::exchange::{MockMarketDataSource, Venue};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        signals: Mutex<Vec<Signal>>,
        failures: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn emit(&self, signal: &Signal) {
            self.signals.lock().unwrap().push(signal.clone());
        }

        async fn component_failed(&self, component: &str, _reason: &str) {
            self.failures.lock().unwrap().push(component.to_string());
        }
    }

    fn scripted_source(oi: Vec<f64>, funding: Vec<f64>) -> MockMarketDataSource {
        let mut source = MockMarketDataSource::new();
        source.expect_venue().return_const(Venue::BinanceFutures);
        let mut oi = oi.into_iter();
        source.expect_fetch_open_interest().returning(move || {
            oi.next()
                .ok_or_else(|| MonitorError::MarketDataUnavailable("exhausted".into()))
        });
        let mut funding = funding.into_iter();
        source.expect_fetch_funding_rate().returning(move || {
            funding
                .next()
                .ok_or_else(|| MonitorError::MarketDataUnavailable("exhausted".into()))
        });
        source
    }

    #[test]
    fn test_poll_policy_success_keeps_cadence() {
        let policy = PollPolicy::default();
        let step = policy.next(PollOutcome::Success, policy.start());
        assert_eq!(step.action, PollAction::Continue);
        assert_eq!(step.sleep, Duration::from_secs(30));
    }

    #[test]
    fn test_poll_policy_failure_backs_off_then_recovers() {
        let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_secs(20));

        let step = policy.next(PollOutcome::Failure, policy.start());
        assert_eq!(step.action, PollAction::Backoff);
        assert_eq!(step.sleep, Duration::from_secs(20));

        // Repeated failures keep the same backoff
        let step = policy.next(PollOutcome::Failure, step);
        assert_eq!(step.action, PollAction::Backoff);
        assert_eq!(step.sleep, Duration::from_secs(20));

        let step = policy.next(PollOutcome::Success, step);
        assert_eq!(step.action, PollAction::Resume);
        assert_eq!(step.sleep, Duration::from_secs(5));

        let step = policy.next(PollOutcome::Success, step);
        assert_eq!(step.action, PollAction::Continue);
        assert_eq!(step.sleep, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_poll_emits_oi_drop() {
        let sink = Arc::new(RecordingSink::default());
        let source = scripted_source(vec![100.0, 80.0], vec![0.0001, 0.0001]);
        let mut poller = SnapshotPoller::new(Arc::new(source), sink.clone(), PollPolicy::default());

        let t0 = Utc::now();
        assert!(poller.poll_at(t0).await.unwrap().is_empty());
        let signals = poller
            .poll_at(t0 + ChronoDuration::seconds(310))
            .await
            .unwrap();

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind(), "oi_drop_5min");
        assert_eq!(sink.signals.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_poll_emits_funding_flip() {
        let sink = Arc::new(RecordingSink::default());
        let source = scripted_source(
            vec![100.0; 4],
            vec![-0.03, -0.025, -0.01, 0.002],
        );
        let mut poller = SnapshotPoller::new(Arc::new(source), sink.clone(), PollPolicy::default());

        let t0 = Utc::now();
        let mut last = Vec::new();
        for i in 0..4 {
            last = poller
                .poll_at(t0 + ChronoDuration::seconds(30 * i))
                .await
                .unwrap();
        }

        assert_eq!(last.len(), 1);
        match &last[0] {
            Signal::FundingFlipPositive {
                min_rate,
                current_rate,
                change,
            } => {
                assert!((min_rate + 3.0).abs() < 1e-9);
                assert!((current_rate - 0.2).abs() < 1e-9);
                assert!((change - 3.2).abs() < 1e-9);
            }
            other => panic!("unexpected signal {:?}", other),
        }
        assert_eq!(sink.signals.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported_not_fatal() {
        let sink = Arc::new(RecordingSink::default());
        let mut source = MockMarketDataSource::new();
        source.expect_venue().return_const(Venue::BinanceFutures);
        source
            .expect_fetch_open_interest()
            .returning(|| Err(MonitorError::MarketDataUnavailable("503".into())));
        source.expect_fetch_funding_rate().never();

        let mut poller = SnapshotPoller::new(Arc::new(source), sink.clone(), PollPolicy::default());
        let err = poller.poll_once().await.unwrap_err();

        assert!(err.is_transient());
        assert!(sink.signals.lock().unwrap().is_empty());
        assert!(poller.oi_detector.window().is_empty());
    }

    #[tokio::test]
    async fn test_oi_signal_survives_funding_failure() {
        let sink = Arc::new(RecordingSink::default());
        let source = scripted_source(vec![100.0, 80.0], vec![0.0001]);
        let mut poller = SnapshotPoller::new(Arc::new(source), sink.clone(), PollPolicy::default());

        let t0 = Utc::now();
        assert!(poller.poll_at(t0).await.unwrap().is_empty());
        // Funding script is exhausted on the second poll
        let result = poller.poll_at(t0 + ChronoDuration::seconds(310)).await;

        assert!(result.is_err());
        let emitted = sink.signals.lock().unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].kind(), "oi_drop_5min");
    }

    #[tokio::test]
    async fn test_bar_consumer_needs_history() {
        let sink = Arc::new(RecordingSink::default());
        let mut consumer = BarConsumer::new(sink.clone());
        let t0 = Utc::now();

        for i in 0..49 {
            let bar = PriceBar::new(t0 + ChronoDuration::minutes(15 * i), 100.0 + i as f64);
            assert!(consumer.handle_bar(bar).await.is_none());
        }

        assert_eq!(consumer.detector().len(), 49);
        assert!(sink.signals.lock().unwrap().is_empty());
    }

    struct ClosedStream;

    #[async_trait]
    impl PriceBarStream for ClosedStream {
        async fn subscribe_price_bars(&self, _tx: mpsc::Sender<PriceBar>) -> Result<()> {
            Err(MonitorError::Internal("stream closed".into()))
        }
    }

    struct PendingStream;

    #[async_trait]
    impl PriceBarStream for PendingStream {
        async fn subscribe_price_bars(&self, tx: mpsc::Sender<PriceBar>) -> Result<()> {
            tx.closed().await;
            Ok(())
        }
    }

    fn steady_source() -> MockMarketDataSource {
        let mut source = MockMarketDataSource::new();
        source.expect_venue().return_const(Venue::BinanceFutures);
        source.expect_fetch_open_interest().returning(|| Ok(100.0));
        source.expect_fetch_funding_rate().returning(|| Ok(0.0001));
        source
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let sink = Arc::new(RecordingSink::default());
        let config = OrchestratorConfig {
            poll_interval: Duration::from_millis(5),
            backoff: Duration::from_millis(5),
            bar_channel_capacity: 8,
        };
        let orchestrator = SignalOrchestrator::new(
            config,
            Arc::new(steady_source()),
            Arc::new(PendingStream),
            sink.clone(),
        );

        orchestrator
            .run(tokio::time::sleep(Duration::from_millis(30)))
            .await
            .unwrap();

        assert!(sink.signals.lock().unwrap().is_empty());
        assert!(sink.failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_transient_failure_keeps_polling() {
        let sink = Arc::new(RecordingSink::default());
        let polls = Arc::new(AtomicUsize::new(0));

        let mut source = MockMarketDataSource::new();
        source.expect_venue().return_const(Venue::BinanceFutures);
        let counter = Arc::clone(&polls);
        source.expect_fetch_open_interest().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(MonitorError::Internal("unexpected response".into()))
        });
        source.expect_fetch_funding_rate().never();

        let policy = PollPolicy::new(Duration::from_millis(5), Duration::from_millis(5));
        let poller = SnapshotPoller::new(Arc::new(source), sink.clone(), policy);

        let stopped = tokio::time::timeout(Duration::from_millis(60), poller.run()).await;

        assert!(stopped.is_err(), "poll loop must not exit on failure");
        assert!(polls.load(Ordering::SeqCst) >= 2);
        assert!(sink.signals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_failure_keeps_polling() {
        let sink = Arc::new(RecordingSink::default());
        let polls = Arc::new(AtomicUsize::new(0));

        let mut source = MockMarketDataSource::new();
        source.expect_venue().return_const(Venue::BinanceFutures);
        let counter = Arc::clone(&polls);
        source.expect_fetch_open_interest().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(100.0)
        });
        source.expect_fetch_funding_rate().returning(|| Ok(0.0001));

        let config = OrchestratorConfig {
            poll_interval: Duration::from_millis(5),
            backoff: Duration::from_millis(5),
            bar_channel_capacity: 8,
        };
        let orchestrator =
            SignalOrchestrator::new(config, Arc::new(source), Arc::new(ClosedStream), sink.clone());

        orchestrator
            .run(tokio::time::sleep(Duration::from_millis(80)))
            .await
            .unwrap();

        assert_eq!(
            sink.failures.lock().unwrap().as_slice(),
            &["price_bar_stream".to_string()]
        );
        assert!(polls.load(Ordering::SeqCst) >= 3);
    }
}
