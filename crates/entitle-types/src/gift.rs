//! # GiftToken: a one-time transfer of an entitlement
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  redeem    ┌──────────┐
//!   │ PENDING ├───────────▶│ REDEEMED │
//!   └───┬─────┘            └──────────┘
//!       │ expires_time passes
//!       ▼
//!   ┌─────────┐
//!   │ EXPIRED │
//!   └─────────┘
//! ```
//!
//! - **Single-use**: PENDING → REDEEMED is irreversible.
//! - **Time-bound**: `expires_time` is fixed at creation to
//!   `created_time + 30 days` and never extended. A token still stored as
//!   PENDING after that instant is effectively EXPIRED and cannot be redeemed.
//!
//! Redemption also grants the redeemer an entitlement. That half of the
//! compound transition lives in the coordinator, which commits both rows in
//! one transaction.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, EntitleError, GiftId, Result, constants};

/// The lifecycle state of a gift token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GiftState {
    /// Issued and waiting for a recipient.
    Pending,
    /// Consumed by a recipient. **Terminal.**
    Redeemed,
    /// Redemption window elapsed. **Terminal.**
    Expired,
}

impl GiftState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!((self, target), (Self::Pending, Self::Redeemed | Self::Expired))
    }
}

impl std::fmt::Display for GiftState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Redeemed => write!(f, "REDEEMED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A gift of `duration_months` of entitlement, addressed to a contact
/// address and redeemable by whichever account claims it first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftToken {
    pub id: GiftId,
    pub issuer_account_id: AccountId,
    pub recipient_address: String,
    /// Set on redemption.
    pub recipient_account_id: Option<AccountId>,
    pub state: GiftState,
    pub duration_months: u32,
    pub redeemed_time: Option<DateTime<Utc>>,
    pub expires_time: DateTime<Utc>,
    pub created_time: DateTime<Utc>,
}

impl GiftToken {
    /// The create transition.
    ///
    /// # Errors
    /// Returns [`EntitleError::InvalidArgument`] for an empty address or a
    /// zero duration.
    pub fn create(
        issuer_account_id: AccountId,
        recipient_address: impl Into<String>,
        duration_months: u32,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let recipient_address = recipient_address.into();
        if recipient_address.trim().is_empty() {
            return Err(EntitleError::InvalidArgument {
                reason: "recipient_address is required".into(),
            });
        }
        if duration_months == 0 {
            return Err(EntitleError::InvalidArgument {
                reason: "duration_months must be > 0".into(),
            });
        }
        Ok(Self {
            id: GiftId::new(),
            issuer_account_id,
            recipient_address,
            recipient_account_id: None,
            state: GiftState::Pending,
            duration_months,
            redeemed_time: None,
            expires_time: now + Duration::days(constants::GIFT_REDEMPTION_WINDOW_DAYS),
            created_time: now,
        })
    }

    /// Stored `Pending` past `expires_time` reads as `Expired`.
    #[must_use]
    pub fn effective_state(&self, now: DateTime<Utc>) -> GiftState {
        match self.state {
            GiftState::Pending if self.expires_time <= now => GiftState::Expired,
            state => state,
        }
    }

    #[must_use]
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        self.effective_state(now) == GiftState::Pending
    }

    /// Mark the gift as claimed by `redeemer` at `now`.
    ///
    /// # Errors
    /// Returns [`EntitleError::NotRedeemable`] if the gift is not effectively
    /// pending.
    pub fn redeem(&mut self, redeemer: AccountId, now: DateTime<Utc>) -> Result<()> {
        let state = self.effective_state(now);
        if !state.can_transition_to(GiftState::Redeemed) {
            return Err(EntitleError::NotRedeemable { id: self.id, state });
        }
        self.state = GiftState::Redeemed;
        self.recipient_account_id = Some(redeemer);
        self.redeemed_time = Some(now);
        Ok(())
    }

    /// Snapshot with the effective state at `now`.
    #[must_use]
    pub fn as_of(&self, now: DateTime<Utc>) -> Self {
        let mut snapshot = self.clone();
        snapshot.state = self.effective_state(now);
        snapshot
    }
}
