//! Citation handler.
//!
//! Citation sets come from three places: built-in search tools (routed
//! here by the tool handler on success), external provider-routed tools,
//! and the provider's native web search. Whichever way one arrives, the
//! finished citation block is back-referenced from the main-text block it
//! supports. That back-reference is the only cross-block link in the
//! model; when no text block is open yet, the reference waits in
//! [`GenerationContext::pending_citations`] and attaches to the next text
//! block created.

use std::str::FromStr;

use tessera_types::{Block, BlockId, BlockKind, BlockPatch, BlockStatus, CitationRef, CitationSource};

use crate::error::Result;
use crate::event::CitationPayload;
use crate::handlers::GenerationContext;
use crate::handlers::text::TextHandler;
use crate::manager::BlockManager;
use crate::repository::MessageRepository;

#[derive(Default)]
pub struct CitationHandler {
    block: Option<BlockId>,
}

impl CitationHandler {
    /// An external search tool started. Always gets a dedicated block,
    /// never the placeholder: external tools run alongside other content.
    pub async fn on_external_in_progress<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
    ) -> Result<()> {
        let block_id = mgr.transition_to(Block::citation(mgr.message_id())).await?;
        self.block = Some(block_id);
        Ok(())
    }

    /// Provider-native web search started. Claims the placeholder when one
    /// is available, since this typically happens first in the stream.
    pub async fn on_llm_search_in_progress<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
    ) -> Result<()> {
        let block_id = if let Some(placeholder) = ctx.claim_placeholder() {
            let patch = BlockPatch::status(BlockStatus::Processing).with_kind(BlockKind::Citation);
            mgr.smart_update(placeholder, patch, BlockKind::Citation, false)
                .await?;
            placeholder
        } else {
            mgr.transition_to(Block::citation(mgr.message_id())).await?
        };
        self.block = Some(block_id);
        Ok(())
    }

    /// A search finished with results. Finalize the in-progress block (or
    /// create one if the start signal never arrived) and link it from the
    /// open text block.
    pub async fn on_complete<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
        text: &TextHandler,
        payload: CitationPayload,
    ) -> Result<()> {
        let source = parse_source(&payload.source);
        let block_id = match self.block.take() {
            Some(block_id) => {
                let patch = BlockPatch::status(BlockStatus::Success)
                    .with_response(payload.response);
                mgr.smart_update(block_id, patch, BlockKind::Citation, true)
                    .await?;
                block_id
            }
            None => {
                let mut block = Block::citation(mgr.message_id());
                block.status = BlockStatus::Success;
                block.response = Some(payload.response);
                mgr.transition_to(block).await?
            }
        };
        self.back_reference(mgr, ctx, text, block_id, source).await
    }

    /// A built-in search tool succeeded; its result doubles as a citation
    /// set. The tool block stays as is, a terminal citation block is added
    /// beside it.
    pub async fn on_tool_citation<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
        text: &TextHandler,
        source: CitationSource,
        response: serde_json::Value,
    ) -> Result<()> {
        let mut block = Block::citation(mgr.message_id());
        block.status = BlockStatus::Success;
        block.response = Some(response);
        let block_id = mgr.transition_to(block).await?;
        self.back_reference(mgr, ctx, text, block_id, source).await
    }

    async fn back_reference<R: MessageRepository>(
        &self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
        text: &TextHandler,
        citation_block: BlockId,
        source: CitationSource,
    ) -> Result<()> {
        let reference = CitationRef {
            block_id: citation_block,
            source,
        };
        let Some(text_block) = text.current_block() else {
            ctx.pending_citations.push(reference);
            return Ok(());
        };
        let mut refs = mgr
            .block(text_block)
            .map(|b| b.citation_references.clone())
            .unwrap_or_default();
        refs.push(reference);
        let patch = BlockPatch {
            citation_references: Some(refs),
            ..Default::default()
        };
        mgr.write_through(text_block, patch).await
    }
}

fn parse_source(source: &str) -> CitationSource {
    CitationSource::from_str(source).unwrap_or(CitationSource::ExternalTool)
}
