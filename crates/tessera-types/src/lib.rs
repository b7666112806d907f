//! Shared identity and content types for Tessera.
//!
//! This crate is the relational foundation: typed IDs, blocks, messages,
//! and failure snapshots. It has **no internal tessera dependencies** — a
//! pure leaf crate that other crates build on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Topic (TopicId) ← the conversation
//!     └── contains Message (MessageId)
//!
//! Message (MessageId) ← one assistant turn
//!     └── owns ordered Block ids (never embeds blocks)
//!     └── carries status + usage
//!
//! Block (BlockId) ← one typed content unit
//!     └── kind: text / thinking / tool / image / video / citation /
//!               compact / error / unknown placeholder
//!     └── status moves forward only
//! ```
//!
//! # Key Types
//!
//! |---------------------|--------------------------------------------|
//! | Type                | Purpose                                    |
//! |---------------------|--------------------------------------------|
//! | [`Message`]         | Turn container (ordered block ids + usage) |
//! | [`Block`]           | One typed content unit                     |
//! | [`BlockPatch`]      | Partial block update                       |
//! | [`FailureSnapshot`] | Captured failure (name/message/stack)      |
//! | [`TopicId`]         | Which conversation                         |
//! | [`MessageId`]       | Which turn                                 |
//! | [`BlockId`]         | Which content unit                         |
//! |---------------------|--------------------------------------------|

pub mod block;
pub mod failure;
pub mod ids;
pub mod message;

// Re-export primary types at crate root for convenience.
pub use block::{Block, BlockKind, BlockPatch, BlockStatus, CitationRef, CitationSource};
pub use failure::FailureSnapshot;
pub use ids::{BlockId, MessageId, TopicId};
pub use message::{Message, MessageStatus, Usage};

/// Current time as Unix milliseconds. Used by constructors throughout the crate.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
