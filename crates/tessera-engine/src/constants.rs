//! Engine-wide tuning knobs and wire markers.

use std::time::Duration;

/// Window over which incremental block writes are coalesced. Deltas arriving
/// within the window collapse into the pending write; only the latest state
/// lands.
pub const COALESCE_WINDOW: Duration = Duration::from_millis(150);

/// Generations running longer than this trigger a completion notification
/// when the conversation is not foregrounded.
pub const LONG_RUN_NOTIFY_THRESHOLD: Duration = Duration::from_secs(30);

/// Built-in tool names whose successful results double as citation sets.
pub const WEB_SEARCH_TOOL: &str = "web_search";
pub const KNOWLEDGE_SEARCH_TOOL: &str = "knowledge_search";

/// Raw-frame discriminator that marks a compaction boundary.
pub const COMPACT_FRAME_TYPE: &str = "compact";

/// Tag pair wrapping the compacted transcript inside the post-boundary
/// tagged text.
pub const STDOUT_TAG_OPEN: &str = "<local-command-stdout>";
pub const STDOUT_TAG_CLOSE: &str = "</local-command-stdout>";
