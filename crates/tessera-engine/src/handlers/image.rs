//! Image generation handler.

use tessera_types::{Block, BlockId, BlockKind, BlockPatch, BlockStatus};

use crate::error::Result;
use crate::event::ImagePayload;
use crate::handlers::GenerationContext;
use crate::manager::BlockManager;
use crate::repository::MessageRepository;

#[derive(Default)]
pub struct ImageHandler {
    block: Option<BlockId>,
}

impl ImageHandler {
    pub async fn on_created<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
    ) -> Result<()> {
        self.ensure_block(mgr, ctx).await?;
        Ok(())
    }

    /// Progress: url, file path and metadata may each arrive on different
    /// deltas.
    pub async fn on_delta<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
        payload: ImagePayload,
    ) -> Result<()> {
        let block_id = self.ensure_block(mgr, ctx).await?;
        let mut patch = BlockPatch::status(BlockStatus::Streaming);
        patch.url = payload.url;
        patch.file_path = payload.file_path;
        patch.metadata = payload.metadata;
        mgr.smart_update(block_id, patch, BlockKind::Image, false).await
    }

    pub async fn on_generated<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
        payload: ImagePayload,
    ) -> Result<()> {
        let block_id = self.ensure_block(mgr, ctx).await?;
        self.block = None;
        let mut patch = BlockPatch::status(BlockStatus::Success);
        patch.url = payload.url;
        patch.file_path = payload.file_path;
        patch.metadata = payload.metadata;
        mgr.smart_update(block_id, patch, BlockKind::Image, true).await
    }

    async fn ensure_block<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
    ) -> Result<BlockId> {
        if let Some(block_id) = self.block {
            return Ok(block_id);
        }
        let block_id = if let Some(placeholder) = ctx.claim_placeholder() {
            let patch = BlockPatch::status(BlockStatus::Processing).with_kind(BlockKind::Image);
            mgr.smart_update(placeholder, patch, BlockKind::Image, false)
                .await?;
            placeholder
        } else {
            mgr.transition_to(Block::image(mgr.message_id())).await?
        };
        self.block = Some(block_id);
        Ok(block_id)
    }
}
