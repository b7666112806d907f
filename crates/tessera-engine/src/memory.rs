//! In-memory repository: the reactive live view, and the test backend.
//!
//! Holds live block/message state in lock-free maps and fans out change
//! notifications over a broadcast channel, so views can re-render a single
//! block without polling. Also keeps a "persisted" shadow copy so tests can
//! distinguish live state from what actually landed durably.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use async_trait::async_trait;
use tessera_types::{Block, BlockId, Message, MessageId, TopicId};

use crate::error::Result;
use crate::repository::{MessageRepository, SavePayload};

/// Change notification emitted on every live-view mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// A block was created or updated.
    BlockUpserted(BlockId),
    /// A message's status, usage, or block list changed.
    MessageChanged(MessageId),
}

/// In-memory message store with reactive change notifications.
pub struct MemoryRepository {
    /// Live block state, updated on every engine write.
    live_blocks: DashMap<BlockId, Block>,
    /// Live message state.
    messages: DashMap<MessageId, Message>,
    /// Shadow copies of what was durably persisted.
    persisted_blocks: DashMap<BlockId, Block>,
    persisted_messages: DashMap<MessageId, Message>,
    /// Count of durable writes, for coalescing assertions.
    persist_count: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryRepository {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            live_blocks: DashMap::new(),
            messages: DashMap::new(),
            persisted_blocks: DashMap::new(),
            persisted_messages: DashMap::new(),
            persist_count: AtomicU64::new(0),
            events,
        })
    }

    /// Subscribe to live-view change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: StoreEvent) {
        // Send fails only when nobody is listening, which is fine.
        let _ = self.events.send(event);
    }

    fn message_entry(&self, message_id: MessageId, topic_id: TopicId) -> Message {
        self.messages
            .entry(message_id)
            .or_insert_with(|| Message::with_id(message_id, topic_id))
            .clone()
    }

    // ── Read side ───────────────────────────────────────────────────────

    /// Current live state of a block.
    pub fn live_block(&self, block_id: BlockId) -> Option<Block> {
        self.live_blocks.get(&block_id).map(|b| b.clone())
    }

    /// Current live state of a message.
    pub fn message(&self, message_id: MessageId) -> Option<Message> {
        self.messages.get(&message_id).map(|m| m.clone())
    }

    /// Last durably persisted state of a block.
    pub fn persisted_block(&self, block_id: BlockId) -> Option<Block> {
        self.persisted_blocks.get(&block_id).map(|b| b.clone())
    }

    /// Last durably persisted state of a message.
    pub fn persisted_message(&self, message_id: MessageId) -> Option<Message> {
        self.persisted_messages.get(&message_id).map(|m| m.clone())
    }

    /// Number of durable writes so far.
    pub fn persist_count(&self) -> u64 {
        self.persist_count.load(Ordering::Relaxed)
    }

    /// Live blocks of a message, in message order.
    pub fn blocks_of(&self, message_id: MessageId) -> Vec<Block> {
        let Some(msg) = self.message(message_id) else {
            return Vec::new();
        };
        msg.block_ids
            .iter()
            .filter_map(|id| self.live_block(*id))
            .collect()
    }
}

#[async_trait]
impl MessageRepository for MemoryRepository {
    async fn upsert_live_block(&self, block: Block) -> Result<()> {
        let id = block.id;
        self.live_blocks.insert(id, block);
        self.notify(StoreEvent::BlockUpserted(id));
        Ok(())
    }

    async fn append_block_to_message(
        &self,
        message_id: MessageId,
        block_id: BlockId,
    ) -> Result<()> {
        // Topic is backfilled on the first persist; the live list only
        // needs ordering.
        let changed;
        if let Some(mut msg) = self.messages.get_mut(&message_id) {
            changed = msg.push_block(block_id);
        } else {
            let mut msg = Message::with_id(message_id, TopicId::nil());
            msg.push_block(block_id);
            self.messages.insert(message_id, msg);
            changed = true;
        }
        if changed {
            self.notify(StoreEvent::MessageChanged(message_id));
        }
        Ok(())
    }

    async fn persist(&self, payload: SavePayload) -> Result<()> {
        let mut msg = self.message_entry(payload.message_id, payload.topic_id);
        if msg.topic_id.is_nil() {
            msg.topic_id = payload.topic_id;
        }
        if let Some(status) = payload.delta.status {
            msg.status = status;
        }
        if let Some(usage) = payload.delta.usage {
            msg.usage = Some(usage);
        }
        if let Some(block_ids) = &payload.delta.block_ids {
            // Reconcile the live view: blocks dropped from the list
            // (compaction) disappear everywhere.
            let dropped: Vec<BlockId> = msg
                .block_ids
                .iter()
                .filter(|id| !block_ids.contains(id))
                .copied()
                .collect();
            for id in dropped {
                debug!(block_id = %id, "dropping block removed from message");
                self.live_blocks.remove(&id);
                self.persisted_blocks.remove(&id);
            }
            msg.block_ids = block_ids.clone();
        }
        msg.touch();

        for block in &payload.blocks {
            self.live_blocks.insert(block.id, block.clone());
            self.persisted_blocks.insert(block.id, block.clone());
            self.notify(StoreEvent::BlockUpserted(block.id));
        }
        self.messages.insert(payload.message_id, msg.clone());
        self.persisted_messages.insert(payload.message_id, msg);
        self.persist_count.fetch_add(1, Ordering::Relaxed);
        self.notify(StoreEvent::MessageChanged(payload.message_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MessageDelta;
    use tessera_types::{BlockStatus, MessageStatus};

    fn payload(topic: TopicId, message: MessageId, blocks: Vec<Block>) -> SavePayload {
        SavePayload {
            topic_id: topic,
            message_id: message,
            delta: MessageDelta::default(),
            blocks,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_read_live_block() {
        let repo = MemoryRepository::new();
        let msg = MessageId::new();
        let block = Block::main_text(msg, "hello");
        repo.upsert_live_block(block.clone()).await.unwrap();
        assert_eq!(repo.live_block(block.id), Some(block));
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let repo = MemoryRepository::new();
        let msg = MessageId::new();
        let id = BlockId::new();
        repo.append_block_to_message(msg, id).await.unwrap();
        repo.append_block_to_message(msg, id).await.unwrap();
        assert_eq!(repo.message(msg).unwrap().block_ids, vec![id]);
    }

    #[tokio::test]
    async fn test_persist_updates_shadow_and_counter() {
        let repo = MemoryRepository::new();
        let topic = TopicId::new();
        let msg = MessageId::new();
        let block = Block::main_text(msg, "partial");
        repo.persist(payload(topic, msg, vec![block.clone()])).await.unwrap();
        assert_eq!(repo.persist_count(), 1);
        assert_eq!(repo.persisted_block(block.id).unwrap().content.as_deref(), Some("partial"));
        assert_eq!(repo.persisted_message(msg).unwrap().topic_id, topic);
    }

    #[tokio::test]
    async fn test_block_ids_delta_prunes_dropped_blocks() {
        let repo = MemoryRepository::new();
        let topic = TopicId::new();
        let msg = MessageId::new();
        let a = Block::main_text(msg, "a");
        let b = Block::main_text(msg, "b");
        let mut p = payload(topic, msg, vec![a.clone(), b.clone()]);
        p.delta.block_ids = Some(vec![a.id, b.id]);
        repo.persist(p).await.unwrap();

        // Drop `a` from the list; its live state must disappear.
        let mut p = payload(topic, msg, vec![]);
        p.delta.block_ids = Some(vec![b.id]);
        repo.persist(p).await.unwrap();

        assert!(repo.live_block(a.id).is_none());
        assert!(repo.live_block(b.id).is_some());
        assert_eq!(repo.message(msg).unwrap().block_ids, vec![b.id]);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let repo = MemoryRepository::new();
        let mut rx = repo.subscribe();
        let msg = MessageId::new();
        let block = Block::thinking(msg, "hm");
        repo.upsert_live_block(block.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), StoreEvent::BlockUpserted(block.id));
    }

    #[tokio::test]
    async fn test_status_delta() {
        let repo = MemoryRepository::new();
        let topic = TopicId::new();
        let msg = MessageId::new();
        let mut p = payload(topic, msg, vec![]);
        p.delta.status = Some(MessageStatus::Streaming);
        repo.persist(p).await.unwrap();
        assert_eq!(repo.message(msg).unwrap().status, MessageStatus::Streaming);
        assert!(repo
            .blocks_of(msg)
            .iter()
            .all(|b| b.status != BlockStatus::Pending));
    }
}
