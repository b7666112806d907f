//! Tool-call handler.
//!
//! Tool calls are announced and resolved as separate events, possibly far
//! apart and out of order when several calls run concurrently. The
//! correlation index in [`GenerationContext`] maps external call ids to
//! blocks so a result always lands on the right one.

use tracing::warn;

use tessera_types::{Block, BlockKind, BlockPatch, BlockStatus, CitationSource};

use crate::constants::{KNOWLEDGE_SEARCH_TOOL, WEB_SEARCH_TOOL};
use crate::error::Result;
use crate::event::{ToolCallInfo, ToolCallOutcome, ToolCallStatus};
use crate::handlers::GenerationContext;
use crate::manager::BlockManager;
use crate::repository::MessageRepository;

#[derive(Default)]
pub struct ToolHandler;

impl ToolHandler {
    pub async fn on_pending<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
        info: ToolCallInfo,
    ) -> Result<()> {
        let block_id = if let Some(placeholder) = ctx.claim_placeholder() {
            let mut patch = BlockPatch::status(BlockStatus::Processing).with_kind(BlockKind::Tool);
            patch.tool_name = Some(info.name.clone());
            patch.tool_call_id = Some(info.id.clone());
            patch.metadata = info.arguments.clone();
            mgr.smart_update(placeholder, patch, BlockKind::Tool, false)
                .await?;
            placeholder
        } else {
            mgr.transition_to(Block::tool(
                mgr.message_id(),
                info.name.clone(),
                info.id.clone(),
                info.arguments.clone(),
            ))
            .await?
        };
        ctx.tool_calls.insert(info.id, block_id);
        Ok(())
    }

    /// Resolve a tool call. A failed tool stays local: its block goes to
    /// error, but the stream keeps going.
    ///
    /// Returns the citation payload when a built-in search tool succeeded,
    /// so the caller can record a citation set for it.
    pub async fn on_complete<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
        outcome: ToolCallOutcome,
    ) -> Result<Option<(CitationSource, serde_json::Value)>> {
        let Some(block_id) = ctx.tool_calls.remove(&outcome.id) else {
            warn!(call_id = %outcome.id, tool = %outcome.name, "tool result without matching call");
            return Ok(None);
        };

        let mut patch = match outcome.status {
            ToolCallStatus::Done | ToolCallStatus::Cancelled => {
                let mut p = BlockPatch::status(BlockStatus::Success);
                p.response = outcome.response.clone();
                p
            }
            ToolCallStatus::Error => {
                let mut p = BlockPatch::status(BlockStatus::Error);
                p.error = outcome.error.clone();
                p
            }
        };
        patch.tool_name = Some(outcome.name.clone());
        mgr.smart_update(block_id, patch, BlockKind::Tool, true).await?;

        if outcome.status == ToolCallStatus::Done
            && let Some(response) = outcome.response
            && let Some(source) = builtin_search_source(&outcome.name)
        {
            return Ok(Some((source, response)));
        }
        Ok(None)
    }
}

fn builtin_search_source(tool_name: &str) -> Option<CitationSource> {
    match tool_name {
        WEB_SEARCH_TOOL => Some(CitationSource::WebSearch),
        KNOWLEDGE_SEARCH_TOOL => Some(CitationSource::KnowledgeSearch),
        _ => None,
    }
}
