//! Basic type definitions for the chat service
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: UUID-based unique connection handle
//! - `Identity`: client-chosen display name, sanitized on construction

use uuid::Uuid;

/// Unique connection handle (newtype pattern)
///
/// Wraps a UUID v4 for type-safe identification of accepted connections.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection handle
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client identity established via `#login`
///
/// Construction strips every literal `<` and `>` from the raw command
/// argument and rejects identities that are empty after stripping.
/// Uniqueness across connections is not enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(String);

impl Identity {
    /// Build an identity from a raw `#login` argument.
    ///
    /// Returns `None` if nothing is left once the angle brackets are
    /// removed.
    pub fn sanitize(raw: &str) -> Option<Self> {
        let cleaned: String = raw.chars().filter(|c| *c != '<' && *c != '>').collect();
        if cleaned.is_empty() {
            None
        } else {
            Some(Self(cleaned))
        }
    }

    /// The identity as a plain string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_identity_strips_brackets() {
        let identity = Identity::sanitize("<alice>").unwrap();
        assert_eq!(identity.as_str(), "alice");
    }

    #[test]
    fn test_identity_strips_interior_brackets() {
        let identity = Identity::sanitize("a<l>ice").unwrap();
        assert_eq!(identity.as_str(), "alice");
    }

    #[test]
    fn test_identity_plain_value_unchanged() {
        let identity = Identity::sanitize("bob").unwrap();
        assert_eq!(identity.as_str(), "bob");
    }

    #[test]
    fn test_identity_rejects_empty() {
        assert!(Identity::sanitize("").is_none());
        assert!(Identity::sanitize("<>").is_none());
        assert!(Identity::sanitize("<<>>").is_none());
    }
}
