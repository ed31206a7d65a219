//! Read surface. Every read returns effective-state snapshots: a row whose
//! stored label lags its timestamps is reported as it is now, not as it
//! was last written.

use entitle_store::{Store, Transaction};
use entitle_types::{AccountId, Entitlement, GiftId, GiftToken, Result};

use crate::Coordinator;

impl<S: Store> Coordinator<S> {
    /// All entitlements ever held by `account_id`, newest first.
    pub async fn account_entitlements(&self, account_id: AccountId) -> Result<Vec<Entitlement>> {
        let mut tx = self.store.begin().await?;
        let rows = tx.entitlements_for_account(account_id).await;
        self.release(tx).await;
        let now = self.clock.now();
        Ok(rows?.iter().map(|e| e.as_of(now)).collect())
    }

    /// The account's effectively active entitlement, if any.
    pub async fn active_entitlement(&self, account_id: AccountId) -> Result<Option<Entitlement>> {
        let now = self.clock.now();
        Ok(self
            .account_entitlements(account_id)
            .await?
            .into_iter()
            .find(|e| e.is_active_at(now)))
    }

    pub async fn gift(&self, gift_id: GiftId) -> Result<Option<GiftToken>> {
        let mut tx = self.store.begin().await?;
        let gift = tx.get_gift(gift_id).await;
        self.release(tx).await;
        let now = self.clock.now();
        Ok(gift?.map(|g| g.as_of(now)))
    }

    async fn release(&self, tx: S::Tx) {
        if let Err(err) = tx.rollback().await {
            tracing::warn!(error = %err, "read transaction rollback failed");
        }
    }
}
