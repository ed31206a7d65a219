//! # entitle-coordinator
//!
//! The **Idempotent Operation Coordinator**: executes a named mutation
//! exactly once per idempotency token and returns the same observable
//! result to every caller that supplies that token.
//!
//! ## Execution path
//!
//! ```text
//! execute(token, op)
//!   ├─ empty token / bad args ──────────────▶ validation error (no I/O)
//!   ├─ cache hit ───────────────────────────▶ cached result (replayed)
//!   └─ miss: BEGIN
//!        lock rows (gift → account → entitlement)
//!        record for token exists? ──────────▶ ROLLBACK, replay record
//!        preconditions fail? ───────────────▶ ROLLBACK, domain error
//!        apply mutation + INSERT record
//!        COMMIT
//!          ├─ ok ───────────────────────────▶ fill cache, result
//!          ├─ token uniqueness violation ───▶ re-read record, replay
//!          └─ other failure ────────────────▶ transient error
//! ```
//!
//! The uniqueness constraint on the operation record is the only
//! correctness-bearing mechanism. The cache only shortens replays.

pub mod coordinator;
pub mod queries;
pub mod replay;
mod transitions;

pub use coordinator::Coordinator;
pub use replay::CachedResult;
