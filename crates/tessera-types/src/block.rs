//! Block types: the ordered, typed content units a message is composed of.
//!
//! A streamed assistant message is a sequence of blocks. Each block has one
//! kind (text, thinking, tool, image, video, citation, compact summary,
//! error record, or the unspecialized placeholder created at generation
//! start) and moves through a one-way status lifecycle.
//!
//! ## Design: flat struct + kind discriminant
//!
//! `Block` is a closed union expressed as a flat struct with a `BlockKind`
//! tag and optional kind-specific fields. This keeps "specialize the
//! placeholder in place" a trivial re-tag that preserves the block id, and
//! keeps the persisted shape one row wide.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::failure::FailureSnapshot;
use crate::ids::{BlockId, MessageId};

/// What a block *is* (content kind).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum BlockKind {
    /// Unspecialized placeholder created at generation start.
    /// Claimed (re-tagged in place) by the first real content event.
    #[default]
    Unknown,
    /// Main text response.
    #[serde(rename = "main_text")]
    #[strum(serialize = "main_text", serialize = "text")]
    MainText,
    /// Extended thinking / reasoning span.
    Thinking,
    /// Tool call + result.
    Tool,
    /// Generated image.
    Image,
    /// Found video reference.
    Video,
    /// Citation set (web search / knowledge search results).
    Citation,
    /// Compacted-context summary (boundary fold).
    Compact,
    /// Failure record appended when a generation terminates abnormally.
    Error,
}

impl BlockKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Unknown => "unknown",
            BlockKind::MainText => "main_text",
            BlockKind::Thinking => "thinking",
            BlockKind::Tool => "tool",
            BlockKind::Image => "image",
            BlockKind::Video => "video",
            BlockKind::Citation => "citation",
            BlockKind::Compact => "compact",
            BlockKind::Error => "error",
        }
    }

    /// Check if this is the unspecialized placeholder kind.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, BlockKind::Unknown)
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Block status. Moves forward only: {pending|processing} → streaming →
/// {success|error|paused}; terminal blocks are immutable content-wise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum BlockStatus {
    /// Created, no content yet.
    #[default]
    Pending,
    /// Claimed and working, not yet streaming content.
    Processing,
    /// Actively receiving content.
    Streaming,
    /// Completed successfully.
    #[strum(serialize = "success", serialize = "done")]
    Success,
    /// Failed.
    Error,
    /// Interrupted by user abort; partial content kept.
    Paused,
}

impl BlockStatus {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::Pending => "pending",
            BlockStatus::Processing => "processing",
            BlockStatus::Streaming => "streaming",
            BlockStatus::Success => "success",
            BlockStatus::Error => "error",
            BlockStatus::Paused => "paused",
        }
    }

    /// Terminal statuses: no further content mutation expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BlockStatus::Success | BlockStatus::Error | BlockStatus::Paused)
    }

    /// Check if this status indicates active work.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Back-reference from a MAIN_TEXT block to a citation block it was
/// produced alongside — the only cross-block link in the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRef {
    /// The citation block.
    pub block_id: BlockId,
    /// Which collaborator produced it ("web_search", "knowledge_search", ...).
    pub source: CitationSource,
}

/// Where a citation set came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum CitationSource {
    /// Built-in web search tool.
    #[default]
    #[serde(rename = "web_search")]
    #[strum(serialize = "web_search", serialize = "websearch")]
    WebSearch,
    /// Built-in knowledge-base search tool.
    #[serde(rename = "knowledge_search")]
    #[strum(serialize = "knowledge_search")]
    KnowledgeSearch,
    /// External tool surfaced through the provider.
    #[serde(rename = "external_tool")]
    #[strum(serialize = "external_tool")]
    ExternalTool,
    /// Provider-native (LLM built-in) web search.
    #[serde(rename = "llm_web_search")]
    #[strum(serialize = "llm_web_search")]
    LlmWebSearch,
}

impl CitationSource {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CitationSource::WebSearch => "web_search",
            CitationSource::KnowledgeSearch => "knowledge_search",
            CitationSource::ExternalTool => "external_tool",
            CitationSource::LlmWebSearch => "llm_web_search",
        }
    }
}

/// One typed content unit within a message.
///
/// ## Field groups
///
/// - **Core**: id, message_id, kind, status, created_at
/// - **Text-ish** (MainText/Thinking/Compact/Error): content
/// - **Media** (Image/Video): url, file_path, metadata
/// - **Tool** (Tool): tool_name, tool_call_id, response, error
/// - **Citation** (Citation): response
/// - **Links** (MainText): citation_references
/// - **Compact** (Compact): compacted_content (full transcript; content holds
///   the human-readable summary)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block ID.
    pub id: BlockId,
    /// Owning message.
    pub message_id: MessageId,
    /// Content kind.
    pub kind: BlockKind,
    /// Lifecycle status.
    pub status: BlockStatus,
    /// Timestamp when the block was created (Unix millis).
    pub created_at: u64,

    /// Primary text content (cumulative while streaming).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Remote URL (Image/Video).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Local file path (Image, once downloaded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Kind-specific structured metadata (JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Tool name (Tool blocks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// External tool-call correlation id (Tool blocks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Result payload (Tool/Citation blocks, JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    /// Failure snapshot (Error blocks, failed Tool blocks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureSnapshot>,
    /// Wall-clock milliseconds spent thinking (Thinking blocks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_millis: Option<u64>,
    /// Citation back-references (MainText blocks).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citation_references: Vec<CitationRef>,
    /// Compacted transcript (Compact blocks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compacted_content: Option<String>,
}

impl Block {
    /// Bare block of a given kind and status, fresh id.
    pub fn new(message_id: MessageId, kind: BlockKind, status: BlockStatus) -> Self {
        Self {
            id: BlockId::new(),
            message_id,
            kind,
            status,
            created_at: crate::now_millis(),
            content: None,
            url: None,
            file_path: None,
            metadata: None,
            tool_name: None,
            tool_call_id: None,
            response: None,
            error: None,
            thinking_millis: None,
            citation_references: Vec::new(),
            compacted_content: None,
        }
    }

    /// The UNKNOWN placeholder created at generation start.
    pub fn placeholder(message_id: MessageId) -> Self {
        Self::new(message_id, BlockKind::Unknown, BlockStatus::Processing)
    }

    /// A main-text block, streaming.
    pub fn main_text(message_id: MessageId, content: impl Into<String>) -> Self {
        let mut b = Self::new(message_id, BlockKind::MainText, BlockStatus::Streaming);
        b.content = Some(content.into());
        b
    }

    /// A thinking block, streaming.
    pub fn thinking(message_id: MessageId, content: impl Into<String>) -> Self {
        let mut b = Self::new(message_id, BlockKind::Thinking, BlockStatus::Streaming);
        b.content = Some(content.into());
        b
    }

    /// A tool block, processing (result not yet in).
    pub fn tool(
        message_id: MessageId,
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        arguments: Option<serde_json::Value>,
    ) -> Self {
        let mut b = Self::new(message_id, BlockKind::Tool, BlockStatus::Processing);
        b.tool_name = Some(tool_name.into());
        b.tool_call_id = Some(tool_call_id.into());
        b.metadata = arguments;
        b
    }

    /// An image block, processing (deltas will enrich it).
    pub fn image(message_id: MessageId) -> Self {
        Self::new(message_id, BlockKind::Image, BlockStatus::Processing)
    }

    /// A video block, created fully-formed and terminal.
    pub fn video(
        message_id: MessageId,
        url: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let mut b = Self::new(message_id, BlockKind::Video, BlockStatus::Success);
        b.url = Some(url.into());
        b.metadata = metadata;
        b
    }

    /// A citation block, processing (response not yet in).
    pub fn citation(message_id: MessageId) -> Self {
        Self::new(message_id, BlockKind::Citation, BlockStatus::Processing)
    }

    /// A failure record. Created already terminal — it records a failure,
    /// it is not itself a failed operation.
    pub fn error_record(message_id: MessageId, snapshot: FailureSnapshot) -> Self {
        let mut b = Self::new(message_id, BlockKind::Error, BlockStatus::Success);
        b.content = Some(snapshot.message.clone());
        b.error = Some(snapshot);
        b
    }

    /// Re-tag this block with a concrete kind, preserving its id.
    ///
    /// This is how the generation placeholder becomes a real block: the
    /// first content event claims it in place instead of creating a new one.
    pub fn specialized(mut self, kind: BlockKind) -> Self {
        self.kind = kind;
        self
    }

    /// Apply a patch. Only fields the patch carries are touched.
    pub fn apply(&mut self, patch: BlockPatch) {
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(content) = patch.content {
            self.content = Some(content);
        }
        if let Some(url) = patch.url {
            self.url = Some(url);
        }
        if let Some(file_path) = patch.file_path {
            self.file_path = Some(file_path);
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = Some(metadata);
        }
        if let Some(tool_name) = patch.tool_name {
            self.tool_name = Some(tool_name);
        }
        if let Some(tool_call_id) = patch.tool_call_id {
            self.tool_call_id = Some(tool_call_id);
        }
        if let Some(response) = patch.response {
            self.response = Some(response);
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
        if let Some(millis) = patch.thinking_millis {
            self.thinking_millis = Some(millis);
        }
        if let Some(refs) = patch.citation_references {
            self.citation_references = refs;
        }
        if let Some(compacted) = patch.compacted_content {
            self.compacted_content = Some(compacted);
        }
    }
}

/// A partial update to a block. `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct BlockPatch {
    pub kind: Option<BlockKind>,
    pub status: Option<BlockStatus>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub file_path: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub tool_name: Option<String>,
    pub tool_call_id: Option<String>,
    pub response: Option<serde_json::Value>,
    pub error: Option<FailureSnapshot>,
    pub thinking_millis: Option<u64>,
    pub citation_references: Option<Vec<CitationRef>>,
    pub compacted_content: Option<String>,
}

impl BlockPatch {
    /// A status-only patch.
    pub fn status(status: BlockStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// A cumulative-content patch with the given status.
    pub fn content(content: impl Into<String>, status: BlockStatus) -> Self {
        Self {
            content: Some(content.into()),
            status: Some(status),
            ..Default::default()
        }
    }

    /// Set the kind (placeholder specialization).
    pub fn with_kind(mut self, kind: BlockKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the response payload.
    pub fn with_response(mut self, response: serde_json::Value) -> Self {
        self.response = Some(response);
        self
    }

    /// Set the failure snapshot.
    pub fn with_error(mut self, error: FailureSnapshot) -> Self {
        self.error = Some(error);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn msg() -> MessageId {
        MessageId::new()
    }

    // ── BlockKind / BlockStatus ─────────────────────────────────────────

    #[test]
    fn test_kind_parsing() {
        assert_eq!(BlockKind::from_str("main_text"), Some(BlockKind::MainText));
        assert_eq!(BlockKind::from_str("text"), Some(BlockKind::MainText));
        assert_eq!(BlockKind::from_str("THINKING"), Some(BlockKind::Thinking));
        assert_eq!(BlockKind::from_str("compact"), Some(BlockKind::Compact));
        assert_eq!(BlockKind::from_str("nope"), None);
        assert!(BlockKind::Unknown.is_placeholder());
        assert!(!BlockKind::Tool.is_placeholder());
    }

    #[test]
    fn test_status_parsing_and_terminality() {
        assert_eq!(BlockStatus::from_str("STREAMING"), Some(BlockStatus::Streaming));
        assert_eq!(BlockStatus::from_str("done"), Some(BlockStatus::Success));
        assert!(BlockStatus::Success.is_terminal());
        assert!(BlockStatus::Error.is_terminal());
        assert!(BlockStatus::Paused.is_terminal());
        assert!(!BlockStatus::Pending.is_terminal());
        assert!(!BlockStatus::Processing.is_terminal());
        assert!(BlockStatus::Streaming.is_active());
    }

    // ── Constructors ────────────────────────────────────────────────────

    #[test]
    fn test_placeholder_block() {
        let b = Block::placeholder(msg());
        assert_eq!(b.kind, BlockKind::Unknown);
        assert_eq!(b.status, BlockStatus::Processing);
        assert!(b.content.is_none());
        assert!(b.created_at > 0);
    }

    #[test]
    fn test_tool_block() {
        let b = Block::tool(msg(), "web_search", "call_1", Some(serde_json::json!({"q": "rust"})));
        assert_eq!(b.kind, BlockKind::Tool);
        assert_eq!(b.status, BlockStatus::Processing);
        assert_eq!(b.tool_name.as_deref(), Some("web_search"));
        assert_eq!(b.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_video_block_is_terminal_at_birth() {
        let b = Block::video(msg(), "https://v.example/1", None);
        assert_eq!(b.kind, BlockKind::Video);
        assert!(b.status.is_terminal());
    }

    #[test]
    fn test_error_record_is_terminal() {
        let b = Block::error_record(msg(), FailureSnapshot::new("NetworkError", "reset"));
        assert_eq!(b.kind, BlockKind::Error);
        assert_eq!(b.status, BlockStatus::Success);
        assert_eq!(b.content.as_deref(), Some("reset"));
        assert!(b.error.is_some());
    }

    // ── Specialization ──────────────────────────────────────────────────

    #[test]
    fn test_specialized_preserves_id() {
        let b = Block::placeholder(msg());
        let id = b.id;
        let b = b.specialized(BlockKind::MainText);
        assert_eq!(b.id, id);
        assert_eq!(b.kind, BlockKind::MainText);
    }

    // ── Patching ────────────────────────────────────────────────────────

    #[test]
    fn test_apply_patch_touches_only_given_fields() {
        let mut b = Block::main_text(msg(), "Hel");
        b.apply(BlockPatch::content("Hello", BlockStatus::Streaming));
        assert_eq!(b.content.as_deref(), Some("Hello"));
        assert_eq!(b.status, BlockStatus::Streaming);
        assert_eq!(b.kind, BlockKind::MainText);

        b.apply(BlockPatch::status(BlockStatus::Success));
        assert_eq!(b.content.as_deref(), Some("Hello"));
        assert!(b.status.is_terminal());
    }

    #[test]
    fn test_apply_patch_kind_change() {
        let mut b = Block::placeholder(msg());
        let id = b.id;
        b.apply(
            BlockPatch::content("reasoning...", BlockStatus::Streaming)
                .with_kind(BlockKind::Thinking),
        );
        assert_eq!(b.id, id);
        assert_eq!(b.kind, BlockKind::Thinking);
        assert_eq!(b.content.as_deref(), Some("reasoning..."));
    }

    // ── Serde ───────────────────────────────────────────────────────────

    #[test]
    fn test_json_skips_empty_fields() {
        let b = Block::main_text(msg(), "hi");
        let json = serde_json::to_string(&b).unwrap();
        assert!(!json.contains("tool_name"));
        assert!(!json.contains("citation_references"));
        assert!(!json.contains("compacted_content"));
        let parsed: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(b, parsed);
    }

    #[test]
    fn test_citation_ref_roundtrip() {
        let mut b = Block::main_text(msg(), "answer");
        b.citation_references.push(CitationRef {
            block_id: BlockId::new(),
            source: CitationSource::WebSearch,
        });
        let json = serde_json::to_string(&b).unwrap();
        assert!(json.contains("web_search"));
        let parsed: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.citation_references.len(), 1);
    }

    #[test]
    fn test_postcard_roundtrip() {
        let b = Block::tool(msg(), "knowledge_search", "call_9", None);
        let bytes = postcard::to_stdvec(&b).unwrap();
        let parsed: Block = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(b, parsed);
    }
}
