//! Operation model: what a caller asks for, what gets durably recorded, and
//! what comes back.
//!
//! The [`OperationRecord`] is the linearization artifact: its uniqueness on
//! `idempotency_token` is the single source of truth for "has this
//! operation already happened". Its `result_summary` holds the canonical
//! payload of the first execution, so every replay returns the same bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    AccountId, EntitleError, Entitlement, EntitlementId, GiftId, GiftToken, Result, constants,
};

/// The five mutating operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Grant,
    Renew,
    Cancel,
    GiftCreate,
    GiftRedeem,
}

impl OperationKind {
    /// Status the request layer renders for a successful (or replayed)
    /// operation of this kind.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Grant | Self::GiftCreate => constants::STATUS_CREATED,
            Self::Renew | Self::Cancel | Self::GiftRedeem => constants::STATUS_OK,
        }
    }

    /// The entity type an operation of this kind is recorded against.
    #[must_use]
    pub fn target_entity(&self) -> TargetEntity {
        match self {
            Self::Grant | Self::Renew | Self::Cancel => TargetEntity::Entitlement,
            Self::GiftCreate | Self::GiftRedeem => TargetEntity::Gift,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grant => write!(f, "GRANT"),
            Self::Renew => write!(f, "RENEW"),
            Self::Cancel => write!(f, "CANCEL"),
            Self::GiftCreate => write!(f, "GIFT_CREATE"),
            Self::GiftRedeem => write!(f, "GIFT_REDEEM"),
        }
    }
}

/// Entity type an [`OperationRecord`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetEntity {
    Entitlement,
    Gift,
}

/// An operation kind bundled with its typed arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationDescriptor {
    Grant {
        account_id: AccountId,
        duration_months: u32,
    },
    Renew {
        entitlement_id: EntitlementId,
        duration_months: u32,
    },
    Cancel {
        entitlement_id: EntitlementId,
    },
    GiftCreate {
        issuer_id: AccountId,
        recipient_address: String,
        duration_months: u32,
    },
    GiftRedeem {
        gift_id: GiftId,
        redeemer_id: AccountId,
    },
}

impl OperationDescriptor {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Grant { .. } => OperationKind::Grant,
            Self::Renew { .. } => OperationKind::Renew,
            Self::Cancel { .. } => OperationKind::Cancel,
            Self::GiftCreate { .. } => OperationKind::GiftCreate,
            Self::GiftRedeem { .. } => OperationKind::GiftRedeem,
        }
    }

    /// Argument checks that need no store access.
    ///
    /// # Errors
    /// Returns [`EntitleError::InvalidArgument`] for a duration outside
    /// `1..=max_duration_months` or an empty recipient address.
    pub fn validate(&self, max_duration_months: u32) -> Result<()> {
        let duration = match self {
            Self::Grant {
                duration_months, ..
            }
            | Self::Renew {
                duration_months, ..
            } => Some(*duration_months),
            Self::GiftCreate {
                recipient_address,
                duration_months,
                ..
            } => {
                if recipient_address.trim().is_empty() {
                    return Err(EntitleError::InvalidArgument {
                        reason: "recipient_address is required".into(),
                    });
                }
                Some(*duration_months)
            }
            Self::Cancel { .. } | Self::GiftRedeem { .. } => None,
        };

        if let Some(months) = duration {
            if months == 0 || months > max_duration_months {
                return Err(EntitleError::InvalidArgument {
                    reason: format!(
                        "duration_months must be in 1..={max_duration_months}, got {months}"
                    ),
                });
            }
        }
        Ok(())
    }

    /// SHA-256 hex digest of the canonical JSON form of this descriptor.
    ///
    /// Two submissions under one token with different fingerprints are a
    /// caller bug; the coordinator still replays but logs the mismatch.
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(constants::FINGERPRINT_DOMAIN);
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Result of a gift redemption: both halves of the compound transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub gift: GiftToken,
    pub entitlement: Entitlement,
}

/// The structured result of a committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Entitlement(Entitlement),
    Gift(GiftToken),
    Redemption(Redemption),
}

impl Outcome {
    /// The `(entity type, entity id)` pair this outcome is recorded against.
    /// Redemptions are recorded against the gift, like gift creation.
    #[must_use]
    pub fn target(&self) -> (TargetEntity, Uuid) {
        match self {
            Self::Entitlement(e) => (TargetEntity::Entitlement, e.id.0),
            Self::Gift(g) => (TargetEntity::Gift, g.id.0),
            Self::Redemption(r) => (TargetEntity::Gift, r.gift.id.0),
        }
    }

    /// Whether this outcome shape is what `kind` produces.
    #[must_use]
    pub fn matches_kind(&self, kind: OperationKind) -> bool {
        matches!(
            (self, kind),
            (
                Self::Entitlement(_),
                OperationKind::Grant | OperationKind::Renew | OperationKind::Cancel
            ) | (Self::Gift(_), OperationKind::GiftCreate)
                | (Self::Redemption(_), OperationKind::GiftRedeem)
        )
    }

    /// Canonical serialized form. This exact string is stored in the
    /// operation record and the cache.
    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_payload(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Durable proof that an operation committed exactly once.
///
/// Created in the same transaction as the mutation it records; never
/// updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Unique across all records.
    pub idempotency_token: String,
    pub operation_kind: OperationKind,
    pub target_entity_type: TargetEntity,
    pub target_entity_id: Uuid,
    /// Canonical payload of the first execution's [`Outcome`].
    pub result_summary: String,
    /// [`OperationDescriptor::fingerprint`] of the request that committed.
    pub request_fingerprint: String,
    pub created_time: DateTime<Utc>,
}

impl OperationRecord {
    /// Build the record for a freshly applied operation.
    pub fn for_outcome(
        token: &str,
        kind: OperationKind,
        outcome: &Outcome,
        request_fingerprint: String,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let (target_entity_type, target_entity_id) = outcome.target();
        Ok(Self {
            idempotency_token: token.to_string(),
            operation_kind: kind,
            target_entity_type,
            target_entity_id,
            result_summary: outcome.to_payload()?,
            request_fingerprint,
            created_time: now,
        })
    }

    /// Rebuild the result this record implies, tagged as a replay.
    ///
    /// # Errors
    /// Returns [`EntitleError::ReplayUnavailable`] if the stored summary does
    /// not decode into an outcome of the recorded kind.
    pub fn replay(&self) -> Result<OperationResult> {
        let unavailable = || EntitleError::ReplayUnavailable {
            token: self.idempotency_token.clone(),
        };
        let outcome = Outcome::from_payload(&self.result_summary).map_err(|_| unavailable())?;
        if !outcome.matches_kind(self.operation_kind) {
            return Err(unavailable());
        }
        Ok(OperationResult {
            token: self.idempotency_token.clone(),
            kind: self.operation_kind,
            status_code: self.operation_kind.status_code(),
            outcome,
            payload: self.result_summary.clone(),
            replayed: true,
        })
    }
}

/// What `execute` returns: the outcome plus enough metadata to render a
/// response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub token: String,
    pub kind: OperationKind,
    pub status_code: u16,
    pub outcome: Outcome,
    /// Canonical serialized outcome. Byte-identical across first execution
    /// and every replay of the same token.
    pub payload: String,
    /// `false` for the execution that committed, `true` for every replay.
    pub replayed: bool,
}

impl OperationResult {
    /// Result of an execution that just committed `record`.
    #[must_use]
    pub fn committed(record: &OperationRecord, outcome: Outcome) -> Self {
        Self {
            token: record.idempotency_token.clone(),
            kind: record.operation_kind,
            status_code: record.operation_kind.status_code(),
            outcome,
            payload: record.result_summary.clone(),
            replayed: false,
        }
    }

    /// Equal observable result, ignoring the replay marker.
    #[must_use]
    pub fn same_result(&self, other: &Self) -> bool {
        self.token == other.token
            && self.kind == other.kind
            && self.status_code == other.status_code
            && self.payload == other.payload
    }
}
