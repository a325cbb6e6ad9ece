//! # Identifier Rules
//!
//! Provisional vs. canonical identifiers for offline-created entities.
//!
//! ## Identifier Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Identifier Lifecycle                               │
//! │                                                                         │
//! │  OFFLINE CREATE                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  "local-5f3a..."  ◄── provisional (client-generated, tagged prefix)    │
//! │       │                                                                 │
//! │       │  sync engine replays the CREATE, server assigns the real id    │
//! │       ▼                                                                 │
//! │  "bill-8421..."   ◄── canonical (server-assigned, permanent)           │
//! │                                                                         │
//! │  Every cached/queued reference to the provisional id is rewritten      │
//! │  to the canonical one in the same drain pass.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The prefix makes provisional ids recognizable anywhere they leak: cache
//! keys, queued payloads, foreign-key fields on other entities.

use uuid::Uuid;

/// Prefix tagging client-generated identifiers that the server has not
/// confirmed yet.
pub const PROVISIONAL_PREFIX: &str = "local-";

/// Generates a new provisional identifier.
///
/// UUID v4 keeps provisional ids globally unique without coordination, so
/// two offline devices (or two rapid offline creates) never collide.
pub fn provisional() -> String {
    format!("{}{}", PROVISIONAL_PREFIX, Uuid::new_v4())
}

/// Returns true if the identifier is provisional (not yet server-assigned).
#[inline]
pub fn is_provisional(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}

/// Returns true if the identifier is canonical (server-assigned).
#[inline]
pub fn is_canonical(id: &str) -> bool {
    !id.is_empty() && !is_provisional(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisional_ids_are_tagged_and_unique() {
        let a = provisional();
        let b = provisional();
        assert!(is_provisional(&a));
        assert!(is_provisional(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_canonical_detection() {
        assert!(is_canonical("bill-1234"));
        assert!(!is_canonical("local-1234"));
        assert!(!is_canonical(""));
    }
}
