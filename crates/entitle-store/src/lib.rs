//! # entitle-store
//!
//! The two external collaborators of the coordinator, as traits:
//!
//! - [`Store`] / [`Transaction`]: the **Durable Store**. Atomic multi-row
//!   transactions, row-level locks, and a uniqueness constraint on the
//!   operation record's idempotency token.
//! - [`ResultCache`]: the **Fast-Path Cache**. Key → bytes with expiry.
//!   Advisory only; never a source of truth.
//!
//! Both ship with in-memory reference implementations ([`MemoryStore`],
//! [`MemoryCache`], [`NoCache`]) that honor the same contracts, so the
//! coordinator can be exercised without a database or Redis.
//!
//! ## Lock order
//!
//! Transactions acquire row locks in a fixed order: gift → account →
//! entitlement. Every transition in the coordinator follows it.

pub mod cache;
pub mod error;
pub mod memory;
pub mod store;

pub use cache::{MemoryCache, NoCache, ResultCache};
pub use error::{CacheError, CacheResult, StoreError, StoreResult};
pub use memory::{FaultPoint, MemoryStore, MemoryTx};
pub use store::{Store, Transaction};
