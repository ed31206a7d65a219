//! Globally unique identifiers used throughout Entitle.
//!
//! All entity IDs use UUIDv7 so rows sort by creation time, which is what
//! the per-account listing relies on for "newest first".

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// Opaque identifier for an account. Accounts are created outside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntitlementId
// ---------------------------------------------------------------------------

/// Unique identifier for an entitlement (subscription) row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct EntitlementId(pub Uuid);

impl EntitlementId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EntitlementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntitlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ent:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// GiftId
// ---------------------------------------------------------------------------

/// Unique identifier for a one-time gift token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct GiftId(pub Uuid);

impl GiftId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for GiftId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GiftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gift:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(AccountId::new(), AccountId::new());
        assert_ne!(EntitlementId::new(), EntitlementId::new());
        assert_ne!(GiftId::new(), GiftId::new());
    }

    #[test]
    fn entitlement_id_ordering() {
        let a = EntitlementId::new();
        let b = EntitlementId::new();
        assert!(a < b);
    }

    #[test]
    fn display_prefixes() {
        let id = AccountId::from_bytes([0u8; 16]);
        assert_eq!(id.to_string(), "acct:00000000-0000-0000-0000-000000000000");
        assert!(GiftId::new().to_string().starts_with("gift:"));
        assert!(EntitlementId::new().to_string().starts_with("ent:"));
    }

    #[test]
    fn ids_serialize_as_bare_uuids() {
        let gid = GiftId::new();
        let json = serde_json::to_string(&gid).unwrap();
        assert_eq!(json, format!("\"{}\"", gid.0));
    }
}
