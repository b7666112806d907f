//! Provider-agnostic generation events.
//!
//! Whatever produces a response stream (an LLM provider adapter, a replayed
//! transcript, a test fixture) converts its native frames into
//! [`GenerationEvent`]s. The orchestrator consumes them in arrival order and
//! turns them into block mutations.
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ Provider adapter │   │ Transcript replay│   │ Test fixture     │
//! └────────┬─────────┘   └────────┬─────────┘   └────────┬─────────┘
//!          │                      │                      │
//!          ▼                      ▼                      ▼
//!          ┌────────────────────────────────────────────────┐
//!          │         GenerationEvent (common enum)          │
//!          │   - StreamOrchestrator consumes these          │
//!          │   - BlockManager applies the mutations         │
//!          └────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use tessera_types::{FailureSnapshot, MessageStatus, Usage};

/// One event in a generation stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GenerationEvent {
    /// Generation accepted by the provider; streaming is about to begin.
    GenerationStarted,

    /// Start of a main-text span.
    TextStart,

    /// Cumulative text for the current text span (full text so far, not
    /// an increment).
    TextDelta(String),

    /// End of the current text span, carrying its final full text.
    TextComplete(String),

    /// Start of a thinking span.
    ThinkingStart,

    /// Cumulative text for the current thinking span.
    ThinkingDelta(String),

    /// End of the current thinking span, carrying its final full text.
    ThinkingComplete(String),

    /// Tool invocation announced (result not yet available).
    ToolPending(ToolCallInfo),

    /// Tool result arrived. May complete a call announced many events ago.
    ToolComplete(ToolCallOutcome),

    /// Image generation started.
    ImageCreated,

    /// Image generation progress (url/metadata may arrive piecemeal).
    ImageDelta(ImagePayload),

    /// Image generation finished.
    ImageGenerated(ImagePayload),

    /// A video reference was surfaced. Fires once per video.
    VideoFound {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },

    /// An external (provider-routed) search tool started running.
    ExternalToolInProgress,

    /// The external search tool finished with a citation set.
    ExternalToolComplete(CitationPayload),

    /// Provider-native web search started running.
    LlmWebSearchInProgress,

    /// Provider-native web search finished with a citation set.
    LlmWebSearchComplete(CitationPayload),

    /// Raw provider frame passed through unmapped. Compaction boundaries
    /// arrive this way.
    RawFrame {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },

    /// Generation failed (provider error or user abort).
    Failed(GenerationFailure),

    /// Generation completed.
    Completed {
        status: MessageStatus,
        metrics: GenerationMetrics,
    },
}

impl GenerationEvent {
    /// Check if this is a cumulative-delta event.
    pub fn is_delta(&self) -> bool {
        matches!(
            self,
            Self::TextDelta(_) | Self::ThinkingDelta(_) | Self::ImageDelta(_)
        )
    }

    /// Check if this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Completed { .. })
    }
}

/// A tool invocation announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallInfo {
    /// External correlation id; ties the later outcome to this call.
    pub id: String,
    /// Tool name (e.g. "web_search", "calculator").
    pub name: String,
    /// Input arguments as JSON, if the provider surfaced them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

/// How a tool call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    /// Completed normally.
    Done,
    /// Cancelled before producing a result.
    Cancelled,
    /// Failed.
    Error,
}

/// A tool result, correlated to its announcement by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    pub id: String,
    pub name: String,
    pub status: ToolCallStatus,
    /// Result payload for Done/Cancelled outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    /// Failure detail for Error outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureSnapshot>,
}

/// Image progress payload. Any field may be absent on a given delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A finished citation set from a search collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationPayload {
    /// Which collaborator produced it ("web_search", "knowledge_search", ...).
    pub source: String,
    /// The citation results as JSON.
    pub response: serde_json::Value,
}

/// Why a generation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The user aborted the generation. Partial content is kept and the
    /// message still completes successfully.
    UserAbort,
    /// The provider or transport failed.
    Provider,
}

/// Terminal failure event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub kind: FailureKind,
    pub snapshot: FailureSnapshot,
}

impl GenerationFailure {
    pub fn aborted() -> Self {
        Self {
            kind: FailureKind::UserAbort,
            snapshot: FailureSnapshot::new("UserAbort", "generation aborted by user"),
        }
    }

    pub fn provider(snapshot: FailureSnapshot) -> Self {
        Self {
            kind: FailureKind::Provider,
            snapshot,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self.kind, FailureKind::UserAbort)
    }
}

/// Completion-time accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_millis: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_delta() {
        assert!(GenerationEvent::TextDelta("hi".into()).is_delta());
        assert!(GenerationEvent::ThinkingDelta("hm".into()).is_delta());
        assert!(GenerationEvent::ImageDelta(ImagePayload::default()).is_delta());
        assert!(!GenerationEvent::TextStart.is_delta());
        assert!(!GenerationEvent::TextComplete("hi".into()).is_delta());
    }

    #[test]
    fn test_event_is_terminal() {
        assert!(GenerationEvent::Failed(GenerationFailure::aborted()).is_terminal());
        assert!(GenerationEvent::Completed {
            status: MessageStatus::Success,
            metrics: GenerationMetrics::default(),
        }
        .is_terminal());
        assert!(!GenerationEvent::GenerationStarted.is_terminal());
    }

    #[test]
    fn test_failure_kinds() {
        assert!(GenerationFailure::aborted().is_abort());
        let f = GenerationFailure::provider(FailureSnapshot::new("Overloaded", "529"));
        assert!(!f.is_abort());
        assert_eq!(f.snapshot.name, "Overloaded");
    }

    #[test]
    fn test_event_serde_roundtrip() {
        let ev = GenerationEvent::ToolComplete(ToolCallOutcome {
            id: "call_3".into(),
            name: "web_search".into(),
            status: ToolCallStatus::Done,
            response: Some(serde_json::json!({"results": []})),
            error: None,
        });
        let json = serde_json::to_string(&ev).unwrap();
        let parsed: GenerationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, parsed);
    }
}
