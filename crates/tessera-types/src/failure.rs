//! Serializable failure snapshots.
//!
//! When a generation fails (or a single tool call errors), the event stream
//! carries a snapshot of the failure rather than a live error value, so the
//! record can be persisted and replayed without the originating type.

use serde::{Deserialize, Serialize};

/// A serializable snapshot of a failure: name, message, and optional detail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSnapshot {
    /// Error class name ("RateLimitError", "AbortError", ...).
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Stack trace or provider detail, when one was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// HTTP-style status code, when the failure came off the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl FailureSnapshot {
    /// Create a snapshot from name + message.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            status_code: None,
        }
    }

    /// Attach a stack trace / provider detail.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Attach an HTTP-style status code.
    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Snapshot an arbitrary error value.
    pub fn from_error(name: impl Into<String>, err: &dyn std::error::Error) -> Self {
        Self::new(name, err.to_string())
    }
}

impl std::fmt::Display for FailureSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction() {
        let snap = FailureSnapshot::new("RateLimitError", "too many requests")
            .with_status_code(429)
            .with_stack("at provider.rs:42");
        assert_eq!(snap.name, "RateLimitError");
        assert_eq!(snap.status_code, Some(429));
        assert!(snap.stack.is_some());
    }

    #[test]
    fn test_json_skips_none_fields() {
        let snap = FailureSnapshot::new("AbortError", "aborted by user");
        let json = serde_json::to_string(&snap).unwrap();
        assert!(!json.contains("stack"));
        assert!(!json.contains("status_code"));
    }

    #[test]
    fn test_json_roundtrip() {
        let snap = FailureSnapshot::new("NetworkError", "connection reset").with_status_code(502);
        let json = serde_json::to_string(&snap).unwrap();
        let parsed: FailureSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, parsed);
    }

    #[test]
    fn test_postcard_roundtrip() {
        let snap = FailureSnapshot::new("ProviderError", "boom");
        let bytes = postcard::to_stdvec(&snap).unwrap();
        let parsed: FailureSnapshot = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(snap, parsed);
    }

    #[test]
    fn test_from_error() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let snap = FailureSnapshot::from_error("IoError", &io);
        assert_eq!(snap.message, "timed out");
    }
}
