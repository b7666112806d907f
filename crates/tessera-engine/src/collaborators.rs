//! Side-effect seams invoked at generation boundaries.
//!
//! The engine core is deliberately ignorant of UI, notification delivery,
//! token counting, and topic naming. Those concerns hang off these traits;
//! every one of them has a no-op default so tests and headless embedders
//! pay nothing.

use std::sync::Arc;

use async_trait::async_trait;

use tessera_types::{Block, FailureSnapshot, Message, MessageId, MessageStatus, TopicId, Usage};

/// Summary of a finished generation, for observers.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub topic_id: TopicId,
    pub message_id: MessageId,
    pub status: MessageStatus,
    pub error: Option<FailureSnapshot>,
}

/// Notified when a generation reaches a terminal state.
#[async_trait]
pub trait GenerationObserver: Send + Sync {
    async fn on_generation_complete(&self, outcome: GenerationOutcome);
}

/// Estimates token usage locally when the provider reports none.
#[async_trait]
pub trait UsageEstimator: Send + Sync {
    async fn estimate(&self, message: &Message, blocks: &[Block]) -> Option<Usage>;
}

/// Requests an automatic topic title after a successful first turn.
#[async_trait]
pub trait TopicNamer: Send + Sync {
    async fn request_autoname(&self, topic_id: TopicId);
}

/// A completion/failure notification to surface out of band.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub topic_id: TopicId,
    pub title: String,
    pub body: String,
}

/// Delivers out-of-band notifications (desktop toast, push, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, request: NotificationRequest);
}

/// Reports whether the topic is currently on screen. Foregrounded topics
/// suppress completion notifications.
pub trait FocusProbe: Send + Sync {
    fn is_foregrounded(&self, topic_id: TopicId) -> bool;
}

// ── No-op defaults ──────────────────────────────────────────────────────

struct NoopObserver;

#[async_trait]
impl GenerationObserver for NoopObserver {
    async fn on_generation_complete(&self, _outcome: GenerationOutcome) {}
}

struct NoopEstimator;

#[async_trait]
impl UsageEstimator for NoopEstimator {
    async fn estimate(&self, _message: &Message, _blocks: &[Block]) -> Option<Usage> {
        None
    }
}

struct NoopNamer;

#[async_trait]
impl TopicNamer for NoopNamer {
    async fn request_autoname(&self, _topic_id: TopicId) {}
}

struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _request: NotificationRequest) {}
}

/// Treats every topic as foregrounded, so no notifications fire.
struct AlwaysForegrounded;

impl FocusProbe for AlwaysForegrounded {
    fn is_foregrounded(&self, _topic_id: TopicId) -> bool {
        true
    }
}

/// Bundle of boundary collaborators handed to the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub observer: Arc<dyn GenerationObserver>,
    pub estimator: Arc<dyn UsageEstimator>,
    pub namer: Arc<dyn TopicNamer>,
    pub notifier: Arc<dyn Notifier>,
    pub focus: Arc<dyn FocusProbe>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            observer: Arc::new(NoopObserver),
            estimator: Arc::new(NoopEstimator),
            namer: Arc::new(NoopNamer),
            notifier: Arc::new(NoopNotifier),
            focus: Arc::new(AlwaysForegrounded),
        }
    }
}

impl Collaborators {
    pub fn with_observer(mut self, observer: Arc<dyn GenerationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn UsageEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_namer(mut self, namer: Arc<dyn TopicNamer>) -> Self {
        self.namer = namer;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_focus(mut self, focus: Arc<dyn FocusProbe>) -> Self {
        self.focus = focus;
        self
    }
}
