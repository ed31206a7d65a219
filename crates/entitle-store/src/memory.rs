//! In-memory reference implementation of the [`Store`] contract.
//!
//! Committed rows live behind one `std::sync::Mutex`, held only for short
//! synchronous sections (never across an `.await`). Row locks are per-key
//! `tokio::sync::Mutex`es registered in a [`DashMap`]; a transaction keeps
//! the owned guards until it commits or is dropped.
//!
//! Isolation is read-committed with row locks, which is what the
//! coordinator assumes of a relational store:
//! - locking reads block behind other holders, then observe their commits;
//! - a transaction's writes are buffered and applied atomically at commit;
//! - the operation-token uniqueness check and the apply happen under the
//!   same critical section, so exactly one of two racing commits for one
//!   token wins.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use dashmap::DashMap;
use entitle_types::{
    Account, AccountId, Entitlement, EntitlementId, GiftId, GiftToken, OperationRecord,
};
use tokio::sync::{Barrier, OwnedMutexGuard};

use crate::{Store, StoreError, StoreResult, Transaction};

/// Points at which a fault can be injected into a [`MemoryStore`]
/// transaction. Each armed fault fires once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Begin,
    PutEntitlement,
    PutGift,
    InsertOperation,
    Commit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Gift(GiftId),
    Account(AccountId),
    Entitlement(EntitlementId),
}

impl RowKey {
    /// Position in the global lock order.
    fn rank(self) -> u8 {
        match self {
            Self::Gift(_) => 0,
            Self::Account(_) => 1,
            Self::Entitlement(_) => 2,
        }
    }
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    /// Keyed by UUIDv7 id, so iteration order is creation order.
    entitlements: BTreeMap<EntitlementId, Entitlement>,
    gifts: HashMap<GiftId, GiftToken>,
    operations: HashMap<String, OperationRecord>,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: DashMap<RowKey, Arc<tokio::sync::Mutex<()>>>,
    accesses: AtomicU64,
    faults: Mutex<HashSet<FaultPoint>>,
    commit_barrier: Mutex<Option<Arc<Barrier>>>,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn trip(&self, point: FaultPoint) -> StoreResult<()> {
        let fired = self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&point);
        if fired {
            tracing::debug!(?point, "injected store fault");
            Err(StoreError::Unavailable(format!("injected fault at {point:?}")))
        } else {
            Ok(())
        }
    }
}

/// Shared-handle in-memory store. Cloning yields another handle to the
/// same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account. Account creation belongs to an upstream system;
    /// this is how that system's rows reach the store.
    pub fn insert_account(&self, account: Account) {
        self.shared.tables().accounts.insert(account.id, account);
    }

    /// Number of calls that reached the store (transactions opened plus
    /// out-of-transaction reads).
    #[must_use]
    pub fn access_count(&self) -> u64 {
        self.shared.accesses.load(Ordering::SeqCst)
    }

    /// Committed entitlements for `account_id`, newest first.
    #[must_use]
    pub fn committed_entitlements(&self, account_id: AccountId) -> Vec<Entitlement> {
        self.shared
            .tables()
            .entitlements
            .values()
            .rev()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn committed_entitlement(&self, id: EntitlementId) -> Option<Entitlement> {
        self.shared.tables().entitlements.get(&id).cloned()
    }

    #[must_use]
    pub fn committed_gift(&self, id: GiftId) -> Option<GiftToken> {
        self.shared.tables().gifts.get(&id).cloned()
    }

    #[must_use]
    pub fn committed_operation(&self, token: &str) -> Option<OperationRecord> {
        self.shared.tables().operations.get(token).cloned()
    }

    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.shared.tables().operations.len()
    }

    #[must_use]
    pub fn entitlement_count(&self) -> usize {
        self.shared.tables().entitlements.len()
    }

    /// Overwrite a committed operation record in place. Only for simulating
    /// a damaged row.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn corrupt_operation(&self, token: &str, result_summary: &str) {
        if let Some(record) = self.shared.tables().operations.get_mut(token) {
            record.result_summary = result_summary.to_string();
        }
    }

    /// Arm a one-shot fault.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn inject_fault(&self, point: FaultPoint) {
        self.shared
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(point);
    }

    /// Make every commit wait until `parties` commits are in flight. Forces
    /// racing transactions past their in-transaction checks before either
    /// one commits.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn set_commit_barrier(&self, parties: usize) {
        *self
            .shared
            .commit_barrier
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(Barrier::new(parties)));
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        self.shared.accesses.fetch_add(1, Ordering::SeqCst);
        self.shared.trip(FaultPoint::Begin)?;
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            held: HashMap::new(),
            max_rank: None,
            entitlements: BTreeMap::new(),
            gifts: HashMap::new(),
            operations: Vec::new(),
        })
    }

    async fn find_operation(&self, token: &str) -> StoreResult<Option<OperationRecord>> {
        self.shared.accesses.fetch_add(1, Ordering::SeqCst);
        Ok(self.committed_operation(token))
    }
}

/// A [`MemoryStore`] transaction. Dropping it discards buffered writes and
/// releases its row locks.
pub struct MemoryTx {
    shared: Arc<Shared>,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    max_rank: Option<u8>,
    entitlements: BTreeMap<EntitlementId, Entitlement>,
    gifts: HashMap<GiftId, GiftToken>,
    operations: Vec<OperationRecord>,
}

impl MemoryTx {
    async fn lock_row(&mut self, key: RowKey) {
        if self.held.contains_key(&key) {
            return;
        }
        debug_assert!(
            self.max_rank.is_none_or(|rank| rank <= key.rank()),
            "row lock {key:?} taken out of order"
        );
        let mutex = self.shared.row_locks.entry(key).or_default().clone();
        let guard = mutex.lock_owned().await;
        self.held.insert(key, guard);
        self.max_rank = Some(self.max_rank.map_or(key.rank(), |r| r.max(key.rank())));
    }

    fn read_gift(&self, id: GiftId) -> Option<GiftToken> {
        self.gifts
            .get(&id)
            .cloned()
            .or_else(|| self.shared.tables().gifts.get(&id).cloned())
    }
}

#[async_trait]
impl Transaction for MemoryTx {
    async fn lock_gift(&mut self, id: GiftId) -> StoreResult<Option<GiftToken>> {
        self.lock_row(RowKey::Gift(id)).await;
        Ok(self.read_gift(id))
    }

    async fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.lock_row(RowKey::Account(id)).await;
        Ok(self.shared.tables().accounts.get(&id).cloned())
    }

    async fn lock_entitlement(&mut self, id: EntitlementId) -> StoreResult<Option<Entitlement>> {
        self.lock_row(RowKey::Entitlement(id)).await;
        Ok(self
            .entitlements
            .get(&id)
            .cloned()
            .or_else(|| self.shared.tables().entitlements.get(&id).cloned()))
    }

    async fn get_gift(&mut self, id: GiftId) -> StoreResult<Option<GiftToken>> {
        Ok(self.read_gift(id))
    }

    async fn entitlements_for_account(
        &mut self,
        account_id: AccountId,
    ) -> StoreResult<Vec<Entitlement>> {
        let mut merged: BTreeMap<EntitlementId, Entitlement> = self
            .shared
            .tables()
            .entitlements
            .values()
            .filter(|e| e.account_id == account_id)
            .map(|e| (e.id, e.clone()))
            .collect();
        for pending in self.entitlements.values() {
            if pending.account_id == account_id {
                merged.insert(pending.id, pending.clone());
            }
        }
        Ok(merged.into_values().rev().collect())
    }

    async fn find_operation(&mut self, token: &str) -> StoreResult<Option<OperationRecord>> {
        if let Some(own) = self
            .operations
            .iter()
            .find(|r| r.idempotency_token == token)
        {
            return Ok(Some(own.clone()));
        }
        Ok(self.shared.tables().operations.get(token).cloned())
    }

    async fn put_entitlement(&mut self, entitlement: &Entitlement) -> StoreResult<()> {
        self.shared.trip(FaultPoint::PutEntitlement)?;
        self.entitlements.insert(entitlement.id, entitlement.clone());
        Ok(())
    }

    async fn put_gift(&mut self, gift: &GiftToken) -> StoreResult<()> {
        self.shared.trip(FaultPoint::PutGift)?;
        self.gifts.insert(gift.id, gift.clone());
        Ok(())
    }

    async fn insert_operation(&mut self, record: &OperationRecord) -> StoreResult<()> {
        self.shared.trip(FaultPoint::InsertOperation)?;
        let token = &record.idempotency_token;
        let exists = self.operations.iter().any(|r| &r.idempotency_token == token)
            || self.shared.tables().operations.contains_key(token);
        if exists {
            return Err(StoreError::UniqueViolation {
                token: token.clone(),
            });
        }
        self.operations.push(record.clone());
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.shared.trip(FaultPoint::Commit)?;

        let barrier = self
            .shared
            .commit_barrier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        let mut tables = self.shared.tables();
        if let Some(dup) = self
            .operations
            .iter()
            .find(|r| tables.operations.contains_key(&r.idempotency_token))
        {
            return Err(StoreError::UniqueViolation {
                token: dup.idempotency_token.clone(),
            });
        }
        for (id, entitlement) in self.entitlements {
            tables.entitlements.insert(id, entitlement);
        }
        for (id, gift) in self.gifts {
            tables.gifts.insert(id, gift);
        }
        for record in self.operations {
            tables
                .operations
                .insert(record.idempotency_token.clone(), record);
        }
        // `tables` drops before `self.held`: rows are visible before any
        // waiter is woken.
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
