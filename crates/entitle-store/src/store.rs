//! Durable store contract.
//!
//! A [`Store`] hands out [`Transaction`]s. Inside one transaction:
//!
//! - `lock_*` reads take a row lock held until commit or rollback (the
//!   `SELECT ... FOR UPDATE` of a relational store). A second transaction
//!   locking the same row waits, then reads what the first committed.
//! - Plain reads see committed data plus this transaction's own writes.
//! - Writes are invisible to everyone else until [`Transaction::commit`].
//! - [`Transaction::insert_operation`] and `commit` fail with
//!   [`StoreError::UniqueViolation`] if a record for the same token exists
//!   or was committed first. When that happens nothing in the transaction
//!   is applied.
//!
//! Dropping a transaction without committing rolls it back.
//!
//! [`StoreError::UniqueViolation`]: crate::StoreError::UniqueViolation

use async_trait::async_trait;
use entitle_types::{
    Account, AccountId, Entitlement, EntitlementId, GiftId, GiftToken, OperationRecord,
};

use crate::StoreResult;

/// A transactional store holding accounts, entitlements, gifts, and
/// operation records.
#[async_trait]
pub trait Store: Send + Sync {
    type Tx: Transaction;

    /// Open a transaction.
    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Read a committed operation record outside any transaction. Used to
    /// resolve the race case after a uniqueness violation.
    async fn find_operation(&self, token: &str) -> StoreResult<Option<OperationRecord>>;
}

/// One atomic unit of work against a [`Store`].
#[async_trait]
pub trait Transaction: Send {
    async fn lock_gift(&mut self, id: GiftId) -> StoreResult<Option<GiftToken>>;

    async fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>>;

    async fn lock_entitlement(&mut self, id: EntitlementId) -> StoreResult<Option<Entitlement>>;

    /// Non-locking gift read.
    async fn get_gift(&mut self, id: GiftId) -> StoreResult<Option<GiftToken>>;

    /// Every entitlement ever held by `account_id`, newest first.
    ///
    /// Non-locking. Callers that act on the result to enforce the
    /// one-active-per-account rule must hold the account's row lock and
    /// lock each listed row before judging it.
    async fn entitlements_for_account(
        &mut self,
        account_id: AccountId,
    ) -> StoreResult<Vec<Entitlement>>;

    /// Look up the operation record for `token`, committed or written
    /// earlier in this transaction.
    async fn find_operation(&mut self, token: &str) -> StoreResult<Option<OperationRecord>>;

    /// Insert or overwrite an entitlement row.
    async fn put_entitlement(&mut self, entitlement: &Entitlement) -> StoreResult<()>;

    /// Insert or overwrite a gift row.
    async fn put_gift(&mut self, gift: &GiftToken) -> StoreResult<()>;

    /// Insert an operation record. Records are never updated.
    async fn insert_operation(&mut self, record: &OperationRecord) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}
