//! # Entitlement: a time-bounded subscription held by one account
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐          ┌────────┐  cancel   ┌───────────┐
//!   │ PENDING ├ ─ ─ ─ ─ ▶│ ACTIVE ├──────────▶│ CANCELLED │
//!   └─────────┘ reserved └───┬────┘           └───────────┘
//!                            │ end_time passes
//!                            ▼
//!                       ┌─────────┐
//!                       │ EXPIRED │
//!                       └─────────┘
//! ```
//!
//! Expiry is **lazy**: nothing rewrites a stored `Active` label when
//! `end_time` passes. Every check goes through [`effective_state`] instead,
//! which compares against the caller-supplied `now`.
//!
//! Invariants:
//! - `end_time > start_time`, always.
//! - At most one entitlement per account is effectively `Active` at any
//!   instant. The state machine cannot see sibling rows, so that invariant is
//!   enforced by the coordinator under the account's row lock.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, EntitleError, EntitlementId, Result};

/// The lifecycle state of an entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementState {
    /// Reserved for deferred-start flows; the grant transition never uses it.
    Pending,
    /// Entitlement is in force until `end_time`.
    Active,
    /// Explicitly revoked. **Terminal.**
    Cancelled,
    /// `end_time` has passed. **Terminal.**
    Expired,
}

impl EntitlementState {
    /// Can an entitlement in this state move to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Active) | (Self::Active, Self::Cancelled | Self::Expired)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Expired)
    }
}

impl std::fmt::Display for EntitlementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A time-bounded entitlement owned by exactly one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub id: EntitlementId,
    pub account_id: AccountId,
    /// Stored label. May lag behind [`effective_state`] for expiry.
    pub state: EntitlementState,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub cancelled_time: Option<DateTime<Utc>>,
}

/// The true state of `entitlement` at `now`.
///
/// A stored `Active` whose `end_time <= now` is `Expired`. Every other
/// stored state is already authoritative.
#[must_use]
pub fn effective_state(entitlement: &Entitlement, now: DateTime<Utc>) -> EntitlementState {
    match entitlement.state {
        EntitlementState::Active if entitlement.end_time <= now => EntitlementState::Expired,
        state => state,
    }
}

/// Calendar-month addition with overflow reported as a validation error.
///
/// # Errors
/// Returns [`EntitleError::InvalidArgument`] if the result is out of range.
pub fn add_months(at: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    at.checked_add_months(Months::new(months))
        .ok_or_else(|| EntitleError::InvalidArgument {
            reason: format!("{months} months from {at} is out of range"),
        })
}

impl Entitlement {
    /// The grant transition: a fresh `Active` entitlement starting at `now`.
    ///
    /// This does not check the one-active-per-account invariant; callers
    /// must do that against the account's other rows.
    ///
    /// # Errors
    /// Returns [`EntitleError::InvalidArgument`] for a zero duration or an
    /// out-of-range end time.
    pub fn grant(account_id: AccountId, now: DateTime<Utc>, duration_months: u32) -> Result<Self> {
        if duration_months == 0 {
            return Err(EntitleError::InvalidArgument {
                reason: "duration_months must be > 0".into(),
            });
        }
        let end_time = add_months(now, duration_months)?;
        Ok(Self {
            id: EntitlementId::new(),
            account_id,
            state: EntitlementState::Active,
            start_time: now,
            end_time,
            cancelled_time: None,
        })
    }

    /// See [`effective_state`].
    #[must_use]
    pub fn effective_state(&self, now: DateTime<Utc>) -> EntitlementState {
        effective_state(self, now)
    }

    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.effective_state(now) == EntitlementState::Active
    }

    /// Extend `end_time` by `extra_months`. Never shortens.
    ///
    /// # Errors
    /// - [`EntitleError::NotActive`] if not effectively active at `now`
    /// - [`EntitleError::InvalidArgument`] for a zero or overflowing extension
    pub fn renew(&mut self, extra_months: u32, now: DateTime<Utc>) -> Result<()> {
        self.require_active(now)?;
        if extra_months == 0 {
            return Err(EntitleError::InvalidArgument {
                reason: "duration_months must be > 0".into(),
            });
        }
        self.end_time = add_months(self.end_time, extra_months)?;
        Ok(())
    }

    /// Revoke the entitlement at `now`.
    ///
    /// # Errors
    /// Returns [`EntitleError::NotActive`] if not effectively active at `now`.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require_active(now)?;
        self.state = EntitlementState::Cancelled;
        self.cancelled_time = Some(now);
        Ok(())
    }

    /// Persist a lazily-derived expiry into the stored label.
    ///
    /// Returns `true` if the label changed.
    pub fn settle_expiry(&mut self, now: DateTime<Utc>) -> bool {
        let effective = self.effective_state(now);
        if effective == self.state {
            return false;
        }
        self.state = effective;
        true
    }

    /// A copy whose `state` is the effective state at `now`. This is what
    /// external reads and operation results expose.
    #[must_use]
    pub fn as_of(&self, now: DateTime<Utc>) -> Self {
        let mut snapshot = self.clone();
        snapshot.state = self.effective_state(now);
        snapshot
    }

    fn require_active(&self, now: DateTime<Utc>) -> Result<()> {
        let state = self.effective_state(now);
        if state == EntitlementState::Active {
            Ok(())
        } else {
            Err(EntitleError::NotActive { id: self.id, state })
        }
    }
}
