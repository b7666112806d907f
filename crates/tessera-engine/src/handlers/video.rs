//! Video reference handler.
//!
//! Videos arrive fully formed (a url plus metadata, nothing streams), so
//! the block is terminal at birth and never the active block. A generation
//! carries at most one video block: once its id is captured, every later
//! sighting is ignored. A text span interleaved with the video resumes on
//! its next delta.

use tracing::debug;

use tessera_types::{Block, BlockId};

use crate::error::Result;
use crate::manager::BlockManager;
use crate::repository::MessageRepository;

#[derive(Default)]
pub struct VideoHandler {
    block_id: Option<BlockId>,
}

impl VideoHandler {
    pub async fn on_found<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        url: String,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        if let Some(id) = self.block_id {
            debug!(block_id = %id, url = %url, "video block already captured, signal ignored");
            return Ok(());
        }
        let block = Block::video(mgr.message_id(), url, metadata);
        self.block_id = Some(block.id);
        mgr.transition_to(block).await?;
        Ok(())
    }
}
