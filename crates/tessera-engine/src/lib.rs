//! Streaming block engine.
//!
//! Turns an ordered stream of heterogeneous generation events into a
//! structured message of typed blocks, with a reactive live view and
//! coalesced durable writes.
//!
//! ```text
//! GenerationEvent stream
//!         │
//!         ▼
//! StreamOrchestrator ── one per (topic, message)
//!         │ routes to per-kind handlers
//!         ▼
//! BlockManager ── structural writes sync, incremental writes coalesced
//!         │
//!         ▼
//! MessageRepository ── live view + durable store
//! ```
//!
//! The entry point is [`StreamOrchestrator`]: construct one with a
//! repository and feed it events in arrival order.

pub mod collaborators;
pub mod constants;
pub mod error;
pub mod event;
pub mod handlers;
pub mod manager;
pub mod memory;
pub mod orchestrator;
pub mod repository;

pub use collaborators::{
    Collaborators, FocusProbe, GenerationObserver, GenerationOutcome, NotificationRequest,
    Notifier, TopicNamer, UsageEstimator,
};
pub use error::{EngineError, Result};
pub use event::{
    CitationPayload, FailureKind, GenerationEvent, GenerationFailure, GenerationMetrics,
    ImagePayload, ToolCallInfo, ToolCallOutcome, ToolCallStatus,
};
pub use manager::{ActiveBlockInfo, BlockManager};
pub use memory::{MemoryRepository, StoreEvent};
pub use orchestrator::StreamOrchestrator;
pub use repository::{MessageDelta, MessageRepository, SavePayload};
