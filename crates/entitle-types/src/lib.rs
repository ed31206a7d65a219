//! # entitle-types
//!
//! Shared types, state machines, errors, and configuration for **Entitle**,
//! the exactly-once entitlement coordinator.
//!
//! This crate is the leaf dependency of the workspace. Every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AccountId`], [`EntitlementId`], [`GiftId`]
//! - **Account model**: [`Account`]
//! - **Entitlement model**: [`Entitlement`], [`EntitlementState`]
//! - **Gift model**: [`GiftToken`], [`GiftState`]
//! - **Operation model**: [`OperationDescriptor`], [`OperationKind`],
//!   [`OperationRecord`], [`OperationResult`], [`Outcome`]
//! - **Time**: [`Clock`], [`SystemClock`], [`ManualClock`]
//! - **Configuration**: [`CoordinatorConfig`]
//! - **Errors**: [`EntitleError`] with `ENT_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults
//!
//! The state machines are pure: every transition takes `now` explicitly and
//! never reads the wall clock, so lazy expiry is a function of
//! `(stored state, now)` and nothing else.

pub mod account;
pub mod clock;
pub mod config;
pub mod constants;
pub mod entitlement;
pub mod error;
pub mod gift;
pub mod ids;
pub mod operation;

// Re-export all primary types at crate root for ergonomic imports:
//   use entitle_types::{Entitlement, GiftToken, OperationDescriptor, ...};

pub use account::*;
pub use clock::*;
pub use config::*;
pub use entitlement::*;
pub use error::*;
pub use gift::*;
pub use ids::*;
pub use operation::*;

// Constants are accessed via `entitle_types::constants::FOO`
// (not re-exported to avoid name collisions).
