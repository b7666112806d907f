//! Message types: the container that owns an ordered list of block ids.
//!
//! A message never embeds its blocks. It holds the ordering (`block_ids`)
//! and the blocks live beside it, keyed by id. Reordering, appending and
//! compaction-removal are all edits to the id list.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{BlockId, MessageId, TopicId};

/// Message status. Forward-only, like block status but coarser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum MessageStatus {
    /// Created, generation not yet started.
    #[default]
    Pending,
    /// Generation in flight.
    Streaming,
    /// Finished (normal completion or user abort).
    Success,
    /// Finished abnormally.
    Error,
}

impl MessageStatus {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Streaming => "streaming",
            MessageStatus::Success => "success",
            MessageStatus::Error => "error",
        }
    }

    /// Terminal statuses.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Success | MessageStatus::Error)
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token accounting as reported by the provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Providers sometimes report no usage at all. A degenerate report is
    /// replaced with a local estimate at completion time.
    pub fn is_degenerate(&self) -> bool {
        self.total_tokens == 0
    }
}

/// An assistant message: ordered block ids plus lifecycle bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID.
    pub id: MessageId,
    /// Owning topic (conversation).
    pub topic_id: TopicId,
    /// Lifecycle status.
    pub status: MessageStatus,
    /// Ordered block ids. Order is arrival order; compaction may remove.
    #[serde(default)]
    pub block_ids: Vec<BlockId>,
    /// Token usage, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Timestamp when created (Unix millis).
    pub created_at: u64,
    /// Timestamp of last mutation (Unix millis).
    pub updated_at: u64,
}

impl Message {
    /// New empty message with a fresh id.
    pub fn new(topic_id: TopicId) -> Self {
        Self::with_id(MessageId::new(), topic_id)
    }

    /// New empty message with a caller-provided id (the id is allocated
    /// before generation starts, so the caller usually already has one).
    pub fn with_id(id: MessageId, topic_id: TopicId) -> Self {
        let now = crate::now_millis();
        Self {
            id,
            topic_id,
            status: MessageStatus::Pending,
            block_ids: Vec::new(),
            usage: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a block id if not already present. Returns true if appended.
    pub fn push_block(&mut self, block_id: BlockId) -> bool {
        if self.block_ids.contains(&block_id) {
            return false;
        }
        self.block_ids.push(block_id);
        self.touch();
        true
    }

    /// Remove a block id. Returns true if it was present.
    pub fn remove_block(&mut self, block_id: BlockId) -> bool {
        let before = self.block_ids.len();
        self.block_ids.retain(|id| *id != block_id);
        let removed = self.block_ids.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Bump the updated-at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = crate::now_millis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(MessageStatus::from_str("streaming"), Some(MessageStatus::Streaming));
        assert_eq!(MessageStatus::from_str("SUCCESS"), Some(MessageStatus::Success));
        assert!(MessageStatus::Success.is_terminal());
        assert!(!MessageStatus::Streaming.is_terminal());
    }

    #[test]
    fn test_usage_degenerate() {
        assert!(Usage::default().is_degenerate());
        assert!(!Usage::new(10, 5).is_degenerate());
        assert_eq!(Usage::new(10, 5).total_tokens, 15);
    }

    #[test]
    fn test_push_block_is_append_if_absent() {
        let mut m = Message::new(TopicId::new());
        let a = BlockId::new();
        let b = BlockId::new();
        assert!(m.push_block(a));
        assert!(m.push_block(b));
        assert!(!m.push_block(a));
        assert_eq!(m.block_ids, vec![a, b]);
    }

    #[test]
    fn test_remove_block() {
        let mut m = Message::new(TopicId::new());
        let a = BlockId::new();
        let b = BlockId::new();
        m.push_block(a);
        m.push_block(b);
        assert!(m.remove_block(a));
        assert!(!m.remove_block(a));
        assert_eq!(m.block_ids, vec![b]);
    }

    #[test]
    fn test_with_id_uses_given_id() {
        let id = MessageId::new();
        let m = Message::with_id(id, TopicId::new());
        assert_eq!(m.id, id);
        assert_eq!(m.status, MessageStatus::Pending);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut m = Message::new(TopicId::new());
        m.push_block(BlockId::new());
        m.usage = Some(Usage::new(100, 40));
        let json = serde_json::to_string(&m).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(m, parsed);
    }
}
