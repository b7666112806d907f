//! Context-compaction folding.
//!
//! When the provider compacts the conversation context mid-stream, the
//! stream carries a three-part sequence:
//!
//! 1. a raw frame typed `compact` (the boundary),
//! 2. a completed text span holding the human-readable summary,
//! 3. a completed text span whose body wraps the full compacted transcript
//!    in `<local-command-stdout>` tags.
//!
//! Those three collapse into a single COMPACT block: summary as its
//! content, transcript as its compacted content. The summary block is held
//! open (kept non-terminal) until the tagged transcript arrives; if the
//! stream ends or a new boundary appears first, the held block is released
//! as ordinary text.

use tracing::{debug, warn};

use tessera_types::{BlockId, BlockKind, BlockPatch, BlockStatus};

use crate::constants::{COMPACT_FRAME_TYPE, STDOUT_TAG_CLOSE, STDOUT_TAG_OPEN};
use crate::error::Result;
use crate::manager::BlockManager;
use crate::repository::MessageRepository;

enum CompactionState {
    /// No boundary seen.
    Idle,
    /// Boundary seen; the next completed text span is the summary.
    BoundarySeen,
    /// Summary captured and its block held open; waiting for the tagged
    /// transcript.
    AwaitingTagged { summary_block: BlockId, summary: String },
}

pub struct CompactionHandler {
    state: CompactionState,
}

impl Default for CompactionHandler {
    fn default() -> Self {
        Self {
            state: CompactionState::Idle,
        }
    }
}

impl CompactionHandler {
    /// True while the fold is mid-flight and completed text spans must be
    /// routed through [`on_text_complete`](Self::on_text_complete) even if
    /// no span was opened by deltas.
    pub fn expects_text(&self) -> bool {
        !matches!(self.state, CompactionState::Idle)
    }

    /// Inspect a raw frame for a compaction boundary. Non-boundary frames
    /// are ignored.
    pub async fn on_raw_frame<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        content: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<()> {
        if !is_compact_boundary(content, metadata) {
            debug!("raw frame ignored");
            return Ok(());
        }
        // A second boundary while a fold is mid-flight abandons the first
        // fold and starts over.
        if let CompactionState::AwaitingTagged { summary_block, summary } =
            std::mem::replace(&mut self.state, CompactionState::BoundarySeen)
        {
            warn!(block_id = %summary_block, "compaction boundary repeated, releasing held block");
            release_as_text(mgr, summary_block, summary).await?;
        }
        Ok(())
    }

    /// Route a completed text span through the fold. Returns `true` when
    /// the span was consumed and must not be finalized as ordinary text.
    pub async fn on_text_complete<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
        block_id: BlockId,
        final_text: &str,
    ) -> Result<bool> {
        match &self.state {
            CompactionState::Idle => Ok(false),
            CompactionState::BoundarySeen => {
                // Hold the summary block open: it must not finalize until
                // the transcript arrives and the fold can complete.
                let mut patch = BlockPatch::status(BlockStatus::Processing);
                patch.content = Some(final_text.to_string());
                mgr.write_through(block_id, patch).await?;
                self.state = CompactionState::AwaitingTagged {
                    summary_block: block_id,
                    summary: final_text.to_string(),
                };
                Ok(true)
            }
            CompactionState::AwaitingTagged { summary_block, summary } => {
                let Some(transcript) = extract_tagged(final_text) else {
                    // Not the transcript; ordinary text passes through and
                    // the fold keeps waiting.
                    return Ok(false);
                };
                let summary_block = *summary_block;
                let mut patch = BlockPatch::content(summary.clone(), BlockStatus::Success)
                    .with_kind(BlockKind::Compact);
                patch.compacted_content = Some(transcript.to_string());
                mgr.smart_update(summary_block, patch, BlockKind::Compact, true)
                    .await?;
                mgr.remove_block(block_id).await?;
                self.state = CompactionState::Idle;
                Ok(true)
            }
        }
    }

    /// The stream ended mid-fold: release the held summary block as
    /// ordinary text so no block is left non-terminal.
    pub async fn abandon<R: MessageRepository>(
        &mut self,
        mgr: &mut BlockManager<R>,
    ) -> Result<()> {
        if let CompactionState::AwaitingTagged { summary_block, summary } =
            std::mem::replace(&mut self.state, CompactionState::Idle)
        {
            warn!(block_id = %summary_block, "stream ended mid-compaction, releasing held block");
            release_as_text(mgr, summary_block, summary).await?;
        }
        self.state = CompactionState::Idle;
        Ok(())
    }
}

async fn release_as_text<R: MessageRepository>(
    mgr: &mut BlockManager<R>,
    block_id: BlockId,
    content: String,
) -> Result<()> {
    let patch = BlockPatch::content(content, BlockStatus::Success).with_kind(BlockKind::MainText);
    mgr.smart_update(block_id, patch, BlockKind::MainText, true).await
}

fn is_compact_boundary(content: Option<&str>, metadata: Option<&serde_json::Value>) -> bool {
    if metadata
        .and_then(|m| m.get("type"))
        .and_then(|t| t.as_str())
        == Some(COMPACT_FRAME_TYPE)
    {
        return true;
    }
    content
        .and_then(|c| serde_json::from_str::<serde_json::Value>(c).ok())
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
        .as_deref()
        == Some(COMPACT_FRAME_TYPE)
}

fn extract_tagged(text: &str) -> Option<&str> {
    let start = text.find(STDOUT_TAG_OPEN)? + STDOUT_TAG_OPEN.len();
    let end = text[start..].find(STDOUT_TAG_CLOSE)? + start;
    Some(&text[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_detection_via_metadata() {
        let meta = serde_json::json!({"type": "compact"});
        assert!(is_compact_boundary(None, Some(&meta)));
        let meta = serde_json::json!({"type": "other"});
        assert!(!is_compact_boundary(None, Some(&meta)));
    }

    #[test]
    fn test_boundary_detection_via_content() {
        assert!(is_compact_boundary(Some(r#"{"type":"compact"}"#), None));
        assert!(!is_compact_boundary(Some("not json"), None));
        assert!(!is_compact_boundary(None, None));
    }

    #[test]
    fn test_extract_tagged() {
        let text = "prefix <local-command-stdout>transcript body</local-command-stdout> suffix";
        assert_eq!(extract_tagged(text), Some("transcript body"));
        assert_eq!(extract_tagged("no tags here"), None);
        assert_eq!(extract_tagged("<local-command-stdout>unterminated"), None);
    }
}
