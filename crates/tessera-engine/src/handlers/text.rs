//! Main-text span handler.

use tessera_types::{Block, BlockId, BlockKind, BlockPatch, BlockStatus};

use crate::error::Result;
use crate::handlers::GenerationContext;
use crate::manager::BlockManager;
use crate::repository::MessageRepository;

/// Tracks the text block currently receiving content, if any.
#[derive(Default)]
pub struct TextHandler {
    block: Option<BlockId>,
}

impl TextHandler {
    /// The text block currently open, if any.
    pub fn current_block(&self) -> Option<BlockId> {
        self.block
    }

    /// Forget the current block without finalizing it. Used when another
    /// handler takes ownership of the block (compaction).
    pub fn clear(&mut self) {
        self.block = None;
    }

    pub async fn on_start<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
    ) -> Result<()> {
        self.ensure_block(mgr, ctx, "").await?;
        Ok(())
    }

    /// `text` is the cumulative text so far, not an increment.
    pub async fn on_delta<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
        text: &str,
    ) -> Result<()> {
        let block_id = self.ensure_block(mgr, ctx, text).await?;
        mgr.smart_update(
            block_id,
            BlockPatch::content(text, BlockStatus::Streaming),
            BlockKind::MainText,
            false,
        )
        .await
    }

    /// Finalize the current span. A completion with no open span is a
    /// no-op, which makes replayed completions harmless.
    pub async fn on_complete<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        text: &str,
    ) -> Result<()> {
        let Some(block_id) = self.block.take() else {
            return Ok(());
        };
        mgr.smart_update(
            block_id,
            BlockPatch::content(text, BlockStatus::Success),
            BlockKind::MainText,
            true,
        )
        .await
    }

    /// Open a text block if none is open: claim the generation placeholder
    /// when one is still unclaimed, otherwise append a fresh block. Any
    /// citations that finished before this text started attach now.
    pub async fn ensure_block<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
        initial: &str,
    ) -> Result<BlockId> {
        if let Some(block_id) = self.block {
            return Ok(block_id);
        }
        let citations = ctx.drain_pending_citations();
        let block_id = if let Some(placeholder) = ctx.claim_placeholder() {
            let mut patch = BlockPatch::content(initial, BlockStatus::Streaming)
                .with_kind(BlockKind::MainText);
            if !citations.is_empty() {
                patch.citation_references = Some(citations);
            }
            mgr.smart_update(placeholder, patch, BlockKind::MainText, false)
                .await?;
            placeholder
        } else {
            let mut block = Block::main_text(mgr.message_id(), initial);
            block.citation_references = citations;
            mgr.transition_to(block).await?
        };
        self.block = Some(block_id);
        Ok(block_id)
    }
}
