//! Persistence seam between the engine and whatever stores messages.
//!
//! The engine never talks to a database directly. It pushes block and
//! message state through [`MessageRepository`], which a backend implements
//! (SQLite in production, an in-memory map in tests). The live view and the
//! durable store are both fed through this trait so they can never disagree
//! about ordering.

use async_trait::async_trait;

use tessera_types::{Block, BlockId, MessageId, MessageStatus, TopicId, Usage};

use crate::error::Result;

/// Partial message update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MessageDelta {
    pub status: Option<MessageStatus>,
    pub usage: Option<Usage>,
    /// When present, replaces the full ordered block-id list. Live blocks
    /// of this message absent from the list are dropped (compaction).
    pub block_ids: Option<Vec<BlockId>>,
}

/// One durable write: message delta plus the blocks whose current state
/// should land with it.
#[derive(Debug, Clone)]
pub struct SavePayload {
    pub topic_id: TopicId,
    pub message_id: MessageId,
    pub delta: MessageDelta,
    pub blocks: Vec<Block>,
}

/// Backend contract for message/block storage and the live view.
#[async_trait]
pub trait MessageRepository: Send + Sync + 'static {
    /// Publish the current state of a block to the live view.
    async fn upsert_live_block(&self, block: Block) -> Result<()>;

    /// Ensure a block id is present in a message's ordered list (append
    /// if absent, no-op if already there) in the live view.
    async fn append_block_to_message(&self, message_id: MessageId, block_id: BlockId)
    -> Result<()>;

    /// Durably persist a message delta together with block state.
    async fn persist(&self, payload: SavePayload) -> Result<()>;
}
