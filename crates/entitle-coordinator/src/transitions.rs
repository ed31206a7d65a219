//! The five state transitions, each run inside one store transaction.
//!
//! Every transition follows the same shape:
//!
//! 1. take its row locks, in gift → account → entitlement order
//! 2. look for an operation record under the token
//! 3. check preconditions against the locked rows
//! 4. buffer writes
//!
//! Grant and redeem also lock every entitlement of the account they check
//! (still account before entitlement). That orders them against a renew or
//! cancel of any of those rows.
//!
//! Step 2 comes after the locks. A duplicate that queued behind the
//! winner's lock then sees the winner's record instead of the winner's
//! side effects.
//!
//! The clock is read once, after the token check, and every precondition
//! of the transition is judged against that instant.

use chrono::{DateTime, Utc};
use entitle_store::Transaction;
use entitle_types::{
    AccountId, Clock, EntitleError, Entitlement, EntitlementId, GiftId, GiftToken,
    OperationDescriptor, OperationRecord, Outcome, Redemption, Result,
};

/// What a transition produced inside the open transaction.
#[derive(Debug)]
pub(crate) enum Step {
    /// Writes are buffered; the caller records and commits.
    Applied {
        outcome: Outcome,
        at: DateTime<Utc>,
    },
    /// The token already has a committed record. Nothing was written.
    AlreadyRecorded(OperationRecord),
}

pub(crate) async fn apply<T: Transaction>(
    tx: &mut T,
    clock: &dyn Clock,
    token: &str,
    op: &OperationDescriptor,
) -> Result<Step> {
    match op {
        OperationDescriptor::Grant {
            account_id,
            duration_months,
        } => grant(tx, clock, token, *account_id, *duration_months).await,
        OperationDescriptor::Renew {
            entitlement_id,
            duration_months,
        } => renew(tx, clock, token, *entitlement_id, *duration_months).await,
        OperationDescriptor::Cancel { entitlement_id } => {
            cancel(tx, clock, token, *entitlement_id).await
        }
        OperationDescriptor::GiftCreate {
            issuer_id,
            recipient_address,
            duration_months,
        } => gift_create(tx, clock, token, *issuer_id, recipient_address, *duration_months).await,
        OperationDescriptor::GiftRedeem {
            gift_id,
            redeemer_id,
        } => gift_redeem(tx, clock, token, *gift_id, *redeemer_id).await,
    }
}

async fn grant<T: Transaction>(
    tx: &mut T,
    clock: &dyn Clock,
    token: &str,
    account_id: AccountId,
    months: u32,
) -> Result<Step> {
    let account = tx.lock_account(account_id).await?;
    if let Some(record) = tx.find_operation(token).await? {
        return Ok(Step::AlreadyRecorded(record));
    }
    let now = clock.now();
    if account.is_none() {
        return Err(EntitleError::AccountNotFound(account_id));
    }

    ensure_none_active(tx, account_id, now, EntitleError::AlreadyActive).await?;

    let entitlement = Entitlement::grant(account_id, now, months)?;
    tx.put_entitlement(&entitlement).await?;
    Ok(Step::Applied {
        outcome: Outcome::Entitlement(entitlement),
        at: now,
    })
}

async fn renew<T: Transaction>(
    tx: &mut T,
    clock: &dyn Clock,
    token: &str,
    id: EntitlementId,
    months: u32,
) -> Result<Step> {
    let entitlement = tx.lock_entitlement(id).await?;
    if let Some(record) = tx.find_operation(token).await? {
        return Ok(Step::AlreadyRecorded(record));
    }
    let now = clock.now();
    let mut entitlement = entitlement.ok_or(EntitleError::EntitlementNotFound(id))?;

    entitlement.renew(months, now)?;
    tx.put_entitlement(&entitlement).await?;
    Ok(Step::Applied {
        outcome: Outcome::Entitlement(entitlement),
        at: now,
    })
}

async fn cancel<T: Transaction>(
    tx: &mut T,
    clock: &dyn Clock,
    token: &str,
    id: EntitlementId,
) -> Result<Step> {
    let entitlement = tx.lock_entitlement(id).await?;
    if let Some(record) = tx.find_operation(token).await? {
        return Ok(Step::AlreadyRecorded(record));
    }
    let now = clock.now();
    let mut entitlement = entitlement.ok_or(EntitleError::EntitlementNotFound(id))?;

    entitlement.cancel(now)?;
    tx.put_entitlement(&entitlement).await?;
    Ok(Step::Applied {
        outcome: Outcome::Entitlement(entitlement),
        at: now,
    })
}

async fn gift_create<T: Transaction>(
    tx: &mut T,
    clock: &dyn Clock,
    token: &str,
    issuer_id: AccountId,
    recipient_address: &str,
    months: u32,
) -> Result<Step> {
    let issuer = tx.lock_account(issuer_id).await?;
    if let Some(record) = tx.find_operation(token).await? {
        return Ok(Step::AlreadyRecorded(record));
    }
    let now = clock.now();
    if issuer.is_none() {
        return Err(EntitleError::AccountNotFound(issuer_id));
    }

    let gift = GiftToken::create(issuer_id, recipient_address, months, now)?;
    tx.put_gift(&gift).await?;
    Ok(Step::Applied {
        outcome: Outcome::Gift(gift),
        at: now,
    })
}

/// Compound transition: the gift goes to REDEEMED and the redeemer gains a
/// fresh entitlement of the gift's duration. Both rows commit together or
/// not at all.
async fn gift_redeem<T: Transaction>(
    tx: &mut T,
    clock: &dyn Clock,
    token: &str,
    gift_id: GiftId,
    redeemer_id: AccountId,
) -> Result<Step> {
    let gift = tx.lock_gift(gift_id).await?;
    let redeemer = tx.lock_account(redeemer_id).await?;
    if let Some(record) = tx.find_operation(token).await? {
        return Ok(Step::AlreadyRecorded(record));
    }
    let now = clock.now();

    let mut gift = gift.ok_or(EntitleError::GiftNotFound(gift_id))?;
    if !gift.is_redeemable_at(now) {
        return Err(EntitleError::NotRedeemable {
            id: gift_id,
            state: gift.effective_state(now),
        });
    }
    if redeemer.is_none() {
        return Err(EntitleError::RecipientNotFound(redeemer_id));
    }
    ensure_none_active(tx, redeemer_id, now, EntitleError::RecipientAlreadyActive).await?;

    gift.redeem(redeemer_id, now)?;
    let entitlement = Entitlement::grant(redeemer_id, now, gift.duration_months)?;
    tx.put_gift(&gift).await?;
    tx.put_entitlement(&entitlement).await?;
    Ok(Step::Applied {
        outcome: Outcome::Redemption(Redemption { gift, entitlement }),
        at: now,
    })
}

/// Fail with `conflict(account_id)` if the account holds an effectively
/// active entitlement. Rows whose stored label lags their effective state
/// are relabeled in the same transaction.
///
/// Every row is judged as re-read under its own lock, so an in-flight renew
/// or cancel of one of them commits before it is judged. New rows for an
/// account are only created under its account lock, which the caller must
/// hold, so the listing is complete.
async fn ensure_none_active<T: Transaction>(
    tx: &mut T,
    account_id: AccountId,
    now: DateTime<Utc>,
    conflict: fn(AccountId) -> EntitleError,
) -> Result<()> {
    let listed = tx.entitlements_for_account(account_id).await?;
    let mut held = Vec::with_capacity(listed.len());
    for row in listed {
        if let Some(locked) = tx.lock_entitlement(row.id).await? {
            held.push(locked);
        }
    }

    if held.iter().any(|e| e.is_active_at(now)) {
        return Err(conflict(account_id));
    }
    for mut stale in held {
        if stale.settle_expiry(now) {
            tx.put_entitlement(&stale).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use entitle_store::{MemoryStore, Store};
    use entitle_types::{Account, EntitlementState, ManualClock, OperationKind, add_months};

    use super::*;

    fn setup() -> (MemoryStore, ManualClock, AccountId) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        let store = MemoryStore::new();
        let account = Account::new("a@example.com", clock.now());
        let id = account.id;
        store.insert_account(account);
        (store, clock, id)
    }

    async fn commit_grant(
        store: &MemoryStore,
        clock: &ManualClock,
        token: &str,
        account_id: AccountId,
    ) -> OperationRecord {
        let op = OperationDescriptor::Grant {
            account_id,
            duration_months: 1,
        };
        let mut tx = store.begin().await.unwrap();
        let Step::Applied { outcome, at } = apply(&mut tx, clock, token, &op).await.unwrap() else {
            panic!("expected a fresh grant");
        };
        let record =
            OperationRecord::for_outcome(token, OperationKind::Grant, &outcome, "fp".into(), at)
                .unwrap();
        tx.insert_operation(&record).await.unwrap();
        tx.commit().await.unwrap();
        record
    }

    #[tokio::test]
    async fn recorded_token_short_circuits() {
        let (store, clock, account) = setup();
        let record = commit_grant(&store, &clock, "t1", account).await;

        let op = OperationDescriptor::Grant {
            account_id: account,
            duration_months: 1,
        };
        let mut tx = store.begin().await.unwrap();
        let step = apply(&mut tx, &clock, "t1", &op).await.unwrap();
        assert!(matches!(step, Step::AlreadyRecorded(r) if r == record));
    }

    #[tokio::test]
    async fn grant_refused_while_active() {
        let (store, clock, account) = setup();
        commit_grant(&store, &clock, "t1", account).await;

        let op = OperationDescriptor::Grant {
            account_id: account,
            duration_months: 1,
        };
        let mut tx = store.begin().await.unwrap();
        let err = apply(&mut tx, &clock, "t2", &op).await.unwrap_err();
        assert!(matches!(err, EntitleError::AlreadyActive(id) if id == account));
    }

    #[tokio::test]
    async fn grant_relabels_expired_rows() {
        let (store, clock, account) = setup();
        let first = commit_grant(&store, &clock, "t1", account).await;
        let old_id = EntitlementId(first.target_entity_id);

        clock.advance(Duration::days(45));
        commit_grant(&store, &clock, "t2", account).await;

        let old = store.committed_entitlement(old_id).unwrap();
        assert_eq!(old.state, EntitlementState::Expired);
        assert_eq!(store.committed_entitlements(account).len(), 2);
    }

    fn renew_op(entitlement_id: EntitlementId) -> OperationDescriptor {
        OperationDescriptor::Renew {
            entitlement_id,
            duration_months: 1,
        }
    }

    fn grant_op(account_id: AccountId) -> OperationDescriptor {
        OperationDescriptor::Grant {
            account_id,
            duration_months: 1,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn grant_waits_for_in_flight_renew() {
        let (store, clock, account) = setup();
        let id = EntitlementId(commit_grant(&store, &clock, "t1", account).await.target_entity_id);
        let end = store.committed_entitlement(id).unwrap().end_time;

        // Renew judged just before expiry, grant just after.
        let renew_clock = ManualClock::new(end - Duration::seconds(1));
        let mut renew_tx = store.begin().await.unwrap();
        let step = apply(&mut renew_tx, &renew_clock, "renew", &renew_op(id)).await.unwrap();
        assert!(matches!(step, Step::Applied { .. }));

        let grant_store = store.clone();
        let grant = tokio::spawn(async move {
            let grant_clock = ManualClock::new(end + Duration::seconds(1));
            let mut tx = grant_store.begin().await.unwrap();
            apply(&mut tx, &grant_clock, "grant", &grant_op(account))
                .await
                .map(|_| ())
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!grant.is_finished(), "grant must wait on the row being renewed");

        renew_tx.commit().await.unwrap();
        let err = grant.await.unwrap().unwrap_err();
        assert!(matches!(err, EntitleError::AlreadyActive(a) if a == account));

        let renewed = store.committed_entitlement(id).unwrap();
        assert_eq!(renewed.state, EntitlementState::Active);
        assert_eq!(renewed.end_time, add_months(end, 1).unwrap());
        assert_eq!(store.committed_entitlements(account).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn renew_waits_for_grant_relabel() {
        let (store, clock, account) = setup();
        let id = EntitlementId(commit_grant(&store, &clock, "t1", account).await.target_entity_id);
        let end = store.committed_entitlement(id).unwrap().end_time;

        let grant_clock = ManualClock::new(end + Duration::seconds(1));
        let mut grant_tx = store.begin().await.unwrap();
        let step = apply(&mut grant_tx, &grant_clock, "grant", &grant_op(account))
            .await
            .unwrap();
        assert!(matches!(step, Step::Applied { .. }));

        let renew_store = store.clone();
        let renew = tokio::spawn(async move {
            let renew_clock = ManualClock::new(end - Duration::seconds(1));
            let mut tx = renew_store.begin().await.unwrap();
            apply(&mut tx, &renew_clock, "renew", &renew_op(id))
                .await
                .map(|_| ())
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!renew.is_finished(), "renew must wait on the row being relabeled");

        grant_tx.commit().await.unwrap();
        let err = renew.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            EntitleError::NotActive {
                state: EntitlementState::Expired,
                ..
            }
        ));

        let old = store.committed_entitlement(id).unwrap();
        assert_eq!(old.state, EntitlementState::Expired);
        assert_eq!(old.end_time, end);
        let active_after: Vec<_> = store
            .committed_entitlements(account)
            .into_iter()
            .filter(|e| e.is_active_at(end + Duration::seconds(1)))
            .collect();
        assert_eq!(active_after.len(), 1);
    }

    #[tokio::test]
    async fn redeem_checks_gift_before_recipient() {
        let (store, clock, _) = setup();
        let op = OperationDescriptor::GiftRedeem {
            gift_id: GiftId::new(),
            redeemer_id: AccountId::new(),
        };
        let mut tx = store.begin().await.unwrap();
        let err = apply(&mut tx, &clock, "t1", &op).await.unwrap_err();
        assert!(matches!(err, EntitleError::GiftNotFound(_)));
    }
}
