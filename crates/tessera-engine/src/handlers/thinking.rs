//! Thinking (reasoning) span handler.
//!
//! Same shape as text handling, plus a stopwatch: the block records how
//! long the model spent thinking, measured from span start.

use std::time::Instant;

use tessera_types::{Block, BlockId, BlockKind, BlockPatch, BlockStatus};

use crate::error::Result;
use crate::handlers::GenerationContext;
use crate::manager::BlockManager;
use crate::repository::MessageRepository;

#[derive(Default)]
pub struct ThinkingHandler {
    block: Option<BlockId>,
    started_at: Option<Instant>,
}

impl ThinkingHandler {
    pub fn current_block(&self) -> Option<BlockId> {
        self.block
    }

    pub async fn on_start<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
    ) -> Result<()> {
        self.ensure_block(mgr, ctx).await?;
        Ok(())
    }

    pub async fn on_delta<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
        text: &str,
    ) -> Result<()> {
        let block_id = self.ensure_block(mgr, ctx).await?;
        let mut patch = BlockPatch::content(text, BlockStatus::Streaming);
        patch.thinking_millis = Some(self.elapsed_millis());
        mgr.smart_update(block_id, patch, BlockKind::Thinking, false)
            .await
    }

    pub async fn on_complete<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        text: &str,
    ) -> Result<()> {
        let Some(block_id) = self.block.take() else {
            return Ok(());
        };
        let mut patch = BlockPatch::content(text, BlockStatus::Success);
        patch.thinking_millis = Some(self.elapsed_millis());
        self.started_at = None;
        mgr.smart_update(block_id, patch, BlockKind::Thinking, true)
            .await
    }

    fn elapsed_millis(&self) -> u64 {
        self.started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    async fn ensure_block<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
    ) -> Result<BlockId> {
        if let Some(block_id) = self.block {
            return Ok(block_id);
        }
        self.started_at = Some(Instant::now());
        let block_id = if let Some(placeholder) = ctx.claim_placeholder() {
            let patch = BlockPatch::content("", BlockStatus::Streaming)
                .with_kind(BlockKind::Thinking);
            mgr.smart_update(placeholder, patch, BlockKind::Thinking, false)
                .await?;
            placeholder
        } else {
            mgr.transition_to(Block::thinking(mgr.message_id(), "")).await?
        };
        self.block = Some(block_id);
        Ok(block_id)
    }
}
