//! Mock-backed harvest pipeline

use async_trait::async_trait;
use gleaner::{
    DownstreamConsumer, DownstreamError, EnrichedRecord, HarvestContext, HarvestOrchestrator,
    HarvestSettings, MemoryLedger, MockSecondary, MockUpstream, Notifier, RecordingConsumer,
    RecordingNotifier, RunLedger,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Everything a harvest talks to, kept around for inspection
pub struct Pipeline {
    pub ledger: Arc<dyn RunLedger>,
    pub consumer: Arc<dyn DownstreamConsumer>,
    pub recorder: Option<Arc<RecordingConsumer>>,
    pub notifier: Arc<dyn Notifier>,
    pub notifications: Option<Arc<RecordingNotifier>>,
    pub secondary: Arc<MockSecondary>,
    pub upstreams: Vec<Arc<MockUpstream>>,
    pub settings: HarvestSettings,
}

impl Pipeline {
    /// In-memory ledger, recording consumer and notifier
    pub fn new(secondary: MockSecondary) -> Self {
        let recorder = Arc::new(RecordingConsumer::new());
        let notifications = Arc::new(RecordingNotifier::new());
        Self {
            ledger: Arc::new(MemoryLedger::new()),
            consumer: recorder.clone(),
            recorder: Some(recorder),
            notifier: notifications.clone(),
            notifications: Some(notifications),
            secondary: Arc::new(secondary),
            upstreams: Vec::new(),
            settings: HarvestSettings::default(),
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn RunLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_recording_consumer(mut self, consumer: RecordingConsumer) -> Self {
        let consumer = Arc::new(consumer);
        self.consumer = consumer.clone();
        self.recorder = Some(consumer);
        self
    }

    pub fn with_consumer(mut self, consumer: Arc<dyn DownstreamConsumer>) -> Self {
        self.consumer = consumer;
        self.recorder = None;
        self
    }

    pub fn with_notifier(mut self, notifier: RecordingNotifier) -> Self {
        let notifier = Arc::new(notifier);
        self.notifier = notifier.clone();
        self.notifications = Some(notifier);
        self
    }

    pub fn with_upstream(mut self, upstream: MockUpstream) -> Self {
        self.upstreams.push(Arc::new(upstream));
        self
    }

    pub fn with_settings(mut self, settings: HarvestSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn orchestrator(&self) -> HarvestOrchestrator {
        let mut context = HarvestContext::new(
            self.ledger.clone(),
            self.secondary.clone(),
            self.consumer.clone(),
        )
        .with_notifier(self.notifier.clone())
        .with_settings(self.settings.clone());
        for upstream in &self.upstreams {
            context = context.with_upstream(upstream.clone());
        }
        HarvestOrchestrator::new(context)
    }

    pub fn recorder(&self) -> &RecordingConsumer {
        self.recorder.as_deref().expect("pipeline uses a recording consumer")
    }

    pub fn notifications(&self) -> &RecordingNotifier {
        self.notifications.as_deref().expect("pipeline uses a recording notifier")
    }
}

/// Consumer that holds each delivery for a while and tracks how many overlap
pub struct GaugedConsumer {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delivered: AtomicUsize,
}

impl GaugedConsumer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delivered: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DownstreamConsumer for GaugedConsumer {
    async fn deliver(&self, _record: &EnrichedRecord) -> Result<(), DownstreamError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_batch(&self, _identifiers: &[String]) -> Result<(), DownstreamError> {
        Ok(())
    }
}
