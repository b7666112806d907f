//! Block lifecycle manager.
//!
//! Owns the working set of blocks for one streaming message and decides,
//! per update, between two write paths:
//!
//! - **structural** — the block list or a block's shape changed (new block,
//!   kind change, terminal status). Written through synchronously so
//!   structure is never stale.
//! - **incremental** — same block, same kind, more content. Coalesced over
//!   [`COALESCE_WINDOW`]: deltas landing inside the window collapse into the
//!   pending write and only the latest state is flushed.
//!
//! At most one block is *active* (non-terminal) at a time. Activating a new
//! block cancels the previous active block's pending coalesced write first,
//! so writes can never land out of order across blocks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tessera_types::{
    Block, BlockId, BlockKind, BlockPatch, Message, MessageId, MessageStatus, TopicId, Usage,
};

use crate::constants::COALESCE_WINDOW;
use crate::error::{EngineError, Result};
use crate::repository::{MessageDelta, MessageRepository, SavePayload};

/// The currently active (non-terminal) block, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveBlockInfo {
    pub block_id: BlockId,
    pub kind: BlockKind,
}

/// A pending coalesced write for one block.
struct ScheduledWrite {
    /// Latest block state; refreshed in place while the timer runs.
    latest: Arc<Mutex<Block>>,
    handle: JoinHandle<()>,
}

/// Manages the blocks of one streaming message.
pub struct BlockManager<R: MessageRepository> {
    repo: Arc<R>,
    topic_id: TopicId,
    message: Message,
    blocks: HashMap<BlockId, Block>,
    active: Option<ActiveBlockInfo>,
    /// Kind of the most recently updated block; a mismatch forces the
    /// structural path.
    last_kind: Option<BlockKind>,
    scheduled: HashMap<BlockId, ScheduledWrite>,
    coalesce_window: Duration,
}

impl<R: MessageRepository> BlockManager<R> {
    pub fn new(repo: Arc<R>, topic_id: TopicId, message_id: MessageId) -> Self {
        Self::with_coalesce_window(repo, topic_id, message_id, COALESCE_WINDOW)
    }

    pub fn with_coalesce_window(
        repo: Arc<R>,
        topic_id: TopicId,
        message_id: MessageId,
        coalesce_window: Duration,
    ) -> Self {
        Self {
            repo,
            topic_id,
            message: Message::with_id(message_id, topic_id),
            blocks: HashMap::new(),
            active: None,
            last_kind: None,
            scheduled: HashMap::new(),
            coalesce_window,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_id(&self) -> MessageId {
        self.message.id
    }

    pub fn topic_id(&self) -> TopicId {
        self.topic_id
    }

    pub fn active(&self) -> Option<ActiveBlockInfo> {
        self.active
    }

    pub fn block(&self, block_id: BlockId) -> Option<&Block> {
        self.blocks.get(&block_id)
    }

    /// Id of the last block in message order.
    pub fn last_block_id(&self) -> Option<BlockId> {
        self.message.block_ids.last().copied()
    }

    /// Working-set blocks in message order.
    pub fn blocks(&self) -> Vec<Block> {
        self.message
            .block_ids
            .iter()
            .filter_map(|id| self.blocks.get(id).cloned())
            .collect()
    }

    // ── Mutation ────────────────────────────────────────────────────────

    /// Introduce a new block and make it the active one (unless it is
    /// already terminal, e.g. a video reference). Structural write.
    pub async fn transition_to(&mut self, block: Block) -> Result<BlockId> {
        let block_id = block.id;
        let kind = block.kind;

        // Finish the previous active block's pending write before the
        // structure changes under it.
        if let Some(prev) = self.active.take()
            && prev.block_id != block_id
        {
            self.flush_scheduled(prev.block_id).await;
        }

        self.message.push_block(block_id);
        self.blocks.insert(block_id, block.clone());
        self.last_kind = Some(kind);
        if !block.status.is_terminal() {
            self.active = Some(ActiveBlockInfo { block_id, kind });
        }

        self.repo.upsert_live_block(block.clone()).await?;
        self.repo
            .append_block_to_message(self.message.id, block_id)
            .await?;
        self.persist_blocks(vec![block], true).await?;
        Ok(block_id)
    }

    /// Apply a patch to an existing block, choosing the write path.
    ///
    /// `kind` is the block's kind after the patch; `terminal` marks this
    /// as the block's final update. Updates to blocks that are already
    /// terminal are dropped with a warning, which makes replayed terminal
    /// events harmless.
    pub async fn smart_update(
        &mut self,
        block_id: BlockId,
        patch: BlockPatch,
        kind: BlockKind,
        terminal: bool,
    ) -> Result<()> {
        let block = self
            .blocks
            .get_mut(&block_id)
            .ok_or(EngineError::UnknownBlock(block_id))?;
        if block.status.is_terminal() {
            warn!(block_id = %block_id, "update on terminal block dropped");
            return Ok(());
        }
        block.apply(patch);
        let block = block.clone();

        let structural = terminal || self.last_kind != Some(kind);
        self.last_kind = Some(kind);

        if structural {
            if terminal {
                self.cancel_scheduled(block_id);
                if self.active.map(|a| a.block_id) == Some(block_id) {
                    self.active = None;
                }
            } else {
                // Kind changed: the previously active block is done
                // receiving content.
                if let Some(prev) = self.active
                    && prev.block_id != block_id
                {
                    self.flush_scheduled(prev.block_id).await;
                }
                self.active = Some(ActiveBlockInfo { block_id, kind });
            }
            self.message.push_block(block_id);
            self.repo.upsert_live_block(block.clone()).await?;
            self.repo
                .append_block_to_message(self.message.id, block_id)
                .await?;
            self.persist_blocks(vec![block], true).await?;
        } else {
            self.active = Some(ActiveBlockInfo { block_id, kind });
            self.repo.upsert_live_block(block.clone()).await?;
            self.schedule_write(block);
        }
        Ok(())
    }

    /// Apply a patch and write it through synchronously without touching
    /// active-block tracking. Used for out-of-band edits such as citation
    /// back-references.
    pub async fn write_through(&mut self, block_id: BlockId, patch: BlockPatch) -> Result<()> {
        self.cancel_scheduled(block_id);
        let block = self
            .blocks
            .get_mut(&block_id)
            .ok_or(EngineError::UnknownBlock(block_id))?;
        block.apply(patch);
        let block = block.clone();
        self.repo.upsert_live_block(block.clone()).await?;
        self.persist_blocks(vec![block], false).await?;
        Ok(())
    }

    /// Drop a block from the message entirely (used when a transient block
    /// is folded away, e.g. the tagged transcript during compaction).
    pub async fn remove_block(&mut self, block_id: BlockId) -> Result<()> {
        self.cancel_scheduled(block_id);
        self.blocks.remove(&block_id);
        self.message.remove_block(block_id);
        if self.active.map(|a| a.block_id) == Some(block_id) {
            self.active = None;
        }
        self.persist_blocks(Vec::new(), true).await
    }

    /// Update the message status locally (persisted on the next
    /// [`persist_message`](Self::persist_message)).
    pub fn set_status(&mut self, status: MessageStatus) {
        self.message.status = status;
        self.message.touch();
    }

    /// Update the message usage locally.
    pub fn set_usage(&mut self, usage: Usage) {
        self.message.usage = Some(usage);
        self.message.touch();
    }

    /// Durably persist the message's status, usage, and block list.
    pub async fn persist_message(&mut self) -> Result<()> {
        let delta = MessageDelta {
            status: Some(self.message.status),
            usage: self.message.usage,
            block_ids: Some(self.message.block_ids.clone()),
        };
        self.repo
            .persist(SavePayload {
                topic_id: self.topic_id,
                message_id: self.message.id,
                delta,
                blocks: Vec::new(),
            })
            .await
    }

    /// Cancel all pending coalesced writes. Called once the stream ends;
    /// terminal blocks were already written through synchronously.
    pub fn shutdown(&mut self) {
        for (_, write) in self.scheduled.drain() {
            write.handle.abort();
        }
    }

    // ── Write plumbing ──────────────────────────────────────────────────

    async fn persist_blocks(&self, blocks: Vec<Block>, with_block_ids: bool) -> Result<()> {
        let delta = MessageDelta {
            block_ids: with_block_ids.then(|| self.message.block_ids.clone()),
            ..Default::default()
        };
        self.repo
            .persist(SavePayload {
                topic_id: self.topic_id,
                message_id: self.message.id,
                delta,
                blocks,
            })
            .await
    }

    /// Coalesce an incremental write. A pending timer for the same block
    /// keeps its deadline and just gets fresher state; otherwise a new
    /// timer starts.
    fn schedule_write(&mut self, block: Block) {
        let block_id = block.id;
        if let Some(write) = self.scheduled.get(&block_id)
            && !write.handle.is_finished()
        {
            *write.latest.lock() = block;
            return;
        }

        let latest = Arc::new(Mutex::new(block));
        let slot = Arc::clone(&latest);
        let repo = Arc::clone(&self.repo);
        let topic_id = self.topic_id;
        let message_id = self.message.id;
        let window = self.coalesce_window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let block = slot.lock().clone();
            let id = block.id;
            if let Err(e) = repo.upsert_live_block(block.clone()).await {
                warn!(block_id = %id, error = %e, "coalesced live write failed");
            }
            let payload = SavePayload {
                topic_id,
                message_id,
                delta: MessageDelta::default(),
                blocks: vec![block],
            };
            if let Err(e) = repo.persist(payload).await {
                warn!(block_id = %id, error = %e, "coalesced persist failed");
            }
        });
        self.scheduled.insert(block_id, ScheduledWrite { latest, handle });
    }

    fn cancel_scheduled(&mut self, block_id: BlockId) {
        if let Some(write) = self.scheduled.remove(&block_id) {
            debug!(block_id = %block_id, "cancelling pending coalesced write");
            write.handle.abort();
        }
    }

    /// Cancel a block's pending coalesced write; its state is about to be
    /// superseded by a synchronous write or is already final in the
    /// working set, so the timer's flush would be redundant.
    async fn flush_scheduled(&mut self, block_id: BlockId) {
        if self.scheduled.remove(&block_id).is_some_and(|w| {
            w.handle.abort();
            true
        }) && let Some(block) = self.blocks.get(&block_id).cloned()
        {
            if let Err(e) = self.repo.upsert_live_block(block.clone()).await {
                warn!(block_id = %block_id, error = %e, "flush live write failed");
            }
            if let Err(e) = self.persist_blocks(vec![block], false).await {
                warn!(block_id = %block_id, error = %e, "flush persist failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;
    use tessera_types::BlockStatus;

    fn manager(repo: &Arc<MemoryRepository>) -> BlockManager<MemoryRepository> {
        BlockManager::new(Arc::clone(repo), TopicId::new(), MessageId::new())
    }

    // ── Structural path ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_transition_to_sets_active_and_persists() {
        let repo = MemoryRepository::new();
        let mut mgr = manager(&repo);
        let id = mgr
            .transition_to(Block::main_text(mgr.message_id(), "hi"))
            .await
            .unwrap();
        assert_eq!(mgr.active().unwrap().block_id, id);
        assert_eq!(repo.persisted_block(id).unwrap().content.as_deref(), Some("hi"));
        assert_eq!(repo.persisted_message(mgr.message_id()).unwrap().block_ids, vec![id]);
    }

    #[tokio::test]
    async fn test_terminal_block_never_becomes_active() {
        let repo = MemoryRepository::new();
        let mut mgr = manager(&repo);
        mgr.transition_to(Block::video(mgr.message_id(), "https://v/1", None))
            .await
            .unwrap();
        assert!(mgr.active().is_none());
    }

    #[tokio::test]
    async fn test_kind_change_is_structural() {
        let repo = MemoryRepository::new();
        let mut mgr = manager(&repo);
        let thinking = mgr
            .transition_to(Block::thinking(mgr.message_id(), "hm"))
            .await
            .unwrap();
        mgr.smart_update(
            thinking,
            BlockPatch::content("hm, done", BlockStatus::Success),
            BlockKind::Thinking,
            true,
        )
        .await
        .unwrap();
        let text = mgr
            .transition_to(Block::main_text(mgr.message_id(), "answer"))
            .await
            .unwrap();
        assert_eq!(mgr.active().unwrap().block_id, text);
        assert_eq!(mgr.message().block_ids, vec![thinking, text]);
    }

    // ── Idempotence ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_update_on_terminal_block_is_dropped() {
        let repo = MemoryRepository::new();
        let mut mgr = manager(&repo);
        let id = mgr
            .transition_to(Block::main_text(mgr.message_id(), "final"))
            .await
            .unwrap();
        mgr.smart_update(
            id,
            BlockPatch::status(BlockStatus::Success),
            BlockKind::MainText,
            true,
        )
        .await
        .unwrap();
        // Replay of the terminal update must not clobber anything.
        mgr.smart_update(
            id,
            BlockPatch::content("clobbered", BlockStatus::Success),
            BlockKind::MainText,
            true,
        )
        .await
        .unwrap();
        assert_eq!(mgr.block(id).unwrap().content.as_deref(), Some("final"));
        assert_eq!(repo.persisted_block(id).unwrap().content.as_deref(), Some("final"));
    }

    #[tokio::test]
    async fn test_unknown_block_is_an_error() {
        let repo = MemoryRepository::new();
        let mut mgr = manager(&repo);
        let err = mgr
            .smart_update(
                BlockId::new(),
                BlockPatch::status(BlockStatus::Success),
                BlockKind::MainText,
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownBlock(_)));
    }

    // ── Coalescing ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_deltas_within_window_coalesce() {
        let repo = MemoryRepository::new();
        let mut mgr = manager(&repo);
        let id = mgr
            .transition_to(Block::main_text(mgr.message_id(), "h"))
            .await
            .unwrap();
        let after_create = repo.persist_count();

        for text in ["he", "hel", "hell", "hello"] {
            mgr.smart_update(
                id,
                BlockPatch::content(text, BlockStatus::Streaming),
                BlockKind::MainText,
                false,
            )
            .await
            .unwrap();
        }
        // Live view always has the freshest state.
        assert_eq!(repo.live_block(id).unwrap().content.as_deref(), Some("hello"));
        // Nothing durable yet: the window has not elapsed.
        assert_eq!(repo.persist_count(), after_create);

        tokio::time::sleep(COALESCE_WINDOW + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(repo.persist_count(), after_create + 1);
        assert_eq!(repo.persisted_block(id).unwrap().content.as_deref(), Some("hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_update_cancels_pending_write() {
        let repo = MemoryRepository::new();
        let mut mgr = manager(&repo);
        let id = mgr
            .transition_to(Block::main_text(mgr.message_id(), "h"))
            .await
            .unwrap();
        mgr.smart_update(
            id,
            BlockPatch::content("hel", BlockStatus::Streaming),
            BlockKind::MainText,
            false,
        )
        .await
        .unwrap();
        let before = repo.persist_count();
        mgr.smart_update(
            id,
            BlockPatch::content("hello", BlockStatus::Success),
            BlockKind::MainText,
            true,
        )
        .await
        .unwrap();
        assert_eq!(repo.persist_count(), before + 1);

        // The aborted timer never fires.
        tokio::time::sleep(COALESCE_WINDOW * 2).await;
        tokio::task::yield_now().await;
        assert_eq!(repo.persist_count(), before + 1);
        assert_eq!(repo.persisted_block(id).unwrap().content.as_deref(), Some("hello"));
    }

    // ── Removal / message bookkeeping ───────────────────────────────────

    #[tokio::test]
    async fn test_remove_block_updates_order_and_prunes() {
        let repo = MemoryRepository::new();
        let mut mgr = manager(&repo);
        let a = mgr
            .transition_to(Block::main_text(mgr.message_id(), "a"))
            .await
            .unwrap();
        mgr.smart_update(
            a,
            BlockPatch::status(BlockStatus::Success),
            BlockKind::MainText,
            true,
        )
        .await
        .unwrap();
        let b = mgr
            .transition_to(Block::main_text(mgr.message_id(), "b"))
            .await
            .unwrap();

        mgr.remove_block(a).await.unwrap();
        assert_eq!(mgr.message().block_ids, vec![b]);
        assert!(repo.live_block(a).is_none());
    }

    #[tokio::test]
    async fn test_persist_message_carries_status_and_usage() {
        let repo = MemoryRepository::new();
        let mut mgr = manager(&repo);
        mgr.set_status(MessageStatus::Success);
        mgr.set_usage(Usage::new(120, 30));
        mgr.persist_message().await.unwrap();
        let persisted = repo.persisted_message(mgr.message_id()).unwrap();
        assert_eq!(persisted.status, MessageStatus::Success);
        assert_eq!(persisted.usage, Some(Usage::new(120, 30)));
    }
}
