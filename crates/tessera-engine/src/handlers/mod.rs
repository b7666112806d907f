//! Per-content-kind event handlers.
//!
//! The orchestrator routes each [`GenerationEvent`](crate::event::GenerationEvent)
//! to exactly one handler. Handlers hold the small amount of per-stream
//! state their kind needs (the current block, a stopwatch, a tool-call
//! index) and express every mutation through the
//! [`BlockManager`](crate::manager::BlockManager).

use std::collections::HashMap;

use tessera_types::{BlockId, CitationRef};

pub mod citation;
pub mod compaction;
pub mod image;
pub mod lifecycle;
pub mod text;
pub mod thinking;
pub mod tool;
pub mod video;

/// State shared across handlers for one generation.
#[derive(Default)]
pub struct GenerationContext {
    /// The unspecialized placeholder created at generation start. The
    /// first content handler to need a block claims it (takes it and
    /// re-tags it in place). At most one claim ever succeeds.
    pub placeholder: Option<BlockId>,
    /// Tool-call correlation index: external call id to block. Results can
    /// arrive out of order and long after the announcement.
    pub tool_calls: HashMap<String, BlockId>,
    /// Citation back-references waiting for a text block to attach to.
    /// Citations can finish before the text they support starts.
    pub pending_citations: Vec<CitationRef>,
}

impl GenerationContext {
    /// Take the placeholder, if still unclaimed.
    pub fn claim_placeholder(&mut self) -> Option<BlockId> {
        self.placeholder.take()
    }

    /// Drain citations waiting for a text block.
    pub fn drain_pending_citations(&mut self) -> Vec<CitationRef> {
        std::mem::take(&mut self.pending_citations)
    }
}
