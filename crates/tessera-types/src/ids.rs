//! Typed identifiers for topics, messages, and blocks.
//!
//! All ID types wrap UUIDv7 (time-ordered, globally unique). They're opaque
//! on the wire (16 bytes) and display as standard UUID text for logging.
//! The `short()` form (first 8 hex chars) is for human-facing output —
//! never used as a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A topic (conversation) identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(uuid::Uuid);

/// A message identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(uuid::Uuid);

/// A block identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters — for human display only, not lookup.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full 32-character hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            /// The raw 16 bytes.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Reconstruct from 16 bytes.
            pub fn from_bytes(b: [u8; 16]) -> Self {
                Self(uuid::Uuid::from_bytes(b))
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }

            /// A nil / zero ID — for sentinel values only.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            /// Check if this is the nil ID.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Full UUID with hyphens for log readability
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(TopicId, "TopicId");
impl_typed_id!(MessageId, "MessageId");
impl_typed_id!(BlockId, "BlockId");

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unique() {
        let a = BlockId::new();
        let b = BlockId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_is_8_chars() {
        let id = MessageId::new();
        assert_eq!(id.short().len(), 8);
    }

    #[test]
    fn test_hex_is_32_chars() {
        let id = TopicId::new();
        assert_eq!(id.to_hex().len(), 32);
    }

    #[test]
    fn test_roundtrip_bytes() {
        let id = BlockId::new();
        let bytes = *id.as_bytes();
        assert_eq!(id, BlockId::from_bytes(bytes));
    }

    #[test]
    fn test_parse_hex_and_uuid_format() {
        let id = MessageId::new();
        assert_eq!(id, MessageId::parse(&id.to_hex()).unwrap());
        assert_eq!(id, MessageId::parse(&id.to_string()).unwrap());
    }

    #[test]
    fn test_nil() {
        assert!(BlockId::nil().is_nil());
        assert!(!BlockId::new().is_nil());
    }

    #[test]
    fn test_ordering_is_time_ordered() {
        let ids: Vec<BlockId> = (0..10).map(|_| BlockId::new()).collect();
        for i in 1..ids.len() {
            assert!(ids[i] >= ids[i - 1]);
        }
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = BlockId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_postcard_roundtrip() {
        let id = TopicId::new();
        let bytes = postcard::to_stdvec(&id).unwrap();
        let parsed: TopicId = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_debug_shows_type_and_short() {
        let id = MessageId::new();
        let debug = format!("{:?}", id);
        assert!(debug.starts_with("MessageId("));
        assert!(debug.ends_with(')'));
    }

    #[test]
    fn test_hash_usable_as_map_key() {
        use std::collections::HashMap;
        let id = BlockId::new();
        let mut map = HashMap::new();
        map.insert(id, "hello");
        assert_eq!(map.get(&id), Some(&"hello"));
    }
}
