//! Shared fixture: an in-memory store and cache behind a coordinator
//! driven by a manual clock.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use entitle_coordinator::Coordinator;
use entitle_store::{MemoryCache, MemoryStore};
use entitle_types::{
    Account, AccountId, CoordinatorConfig, Entitlement, EntitlementId, GiftId, GiftToken,
    ManualClock, OperationDescriptor, OperationResult, Outcome, Redemption,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 2026-01-15T12:00:00Z
pub fn start() -> DateTime<Utc> {
    at(2026, 1, 15)
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .expect("valid test date")
}

pub struct Fixture {
    pub coordinator: Arc<Coordinator<MemoryStore>>,
    pub store: MemoryStore,
    pub cache: Arc<MemoryCache>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::starting_at(start())
    }

    pub fn starting_at(now: DateTime<Utc>) -> Self {
        init_tracing();
        let store = MemoryStore::new();
        let cache = Arc::new(MemoryCache::new());
        let clock = Arc::new(ManualClock::new(now));
        let coordinator = Coordinator::new(
            store.clone(),
            cache.clone(),
            clock.clone(),
            CoordinatorConfig::default(),
        )
        .expect("default config is valid");
        Self {
            coordinator: Arc::new(coordinator),
            store,
            cache,
            clock,
        }
    }

    pub fn account(&self) -> AccountId {
        let account = Account::new("member@example.com", start());
        let id = account.id;
        self.store.insert_account(account);
        id
    }

    pub fn cache_key(&self, token: &str) -> String {
        self.coordinator.config().cache_key(token)
    }

    pub async fn grant(&self, token: &str, account_id: AccountId, months: u32) -> OperationResult {
        self.coordinator
            .execute(token, grant_op(account_id, months))
            .await
            .expect("grant should succeed")
    }

    pub async fn create_gift(&self, token: &str, issuer_id: AccountId, months: u32) -> GiftToken {
        let result = self
            .coordinator
            .execute(
                token,
                OperationDescriptor::GiftCreate {
                    issuer_id,
                    recipient_address: "friend@example.com".into(),
                    duration_months: months,
                },
            )
            .await
            .expect("gift create should succeed");
        match result.outcome {
            Outcome::Gift(gift) => gift,
            other => panic!("expected gift outcome, got {other:?}"),
        }
    }
}

pub fn grant_op(account_id: AccountId, duration_months: u32) -> OperationDescriptor {
    OperationDescriptor::Grant {
        account_id,
        duration_months,
    }
}

pub fn renew_op(entitlement_id: EntitlementId, duration_months: u32) -> OperationDescriptor {
    OperationDescriptor::Renew {
        entitlement_id,
        duration_months,
    }
}

pub fn cancel_op(entitlement_id: EntitlementId) -> OperationDescriptor {
    OperationDescriptor::Cancel { entitlement_id }
}

pub fn redeem_op(gift_id: GiftId, redeemer_id: AccountId) -> OperationDescriptor {
    OperationDescriptor::GiftRedeem {
        gift_id,
        redeemer_id,
    }
}

pub fn entitlement(result: &OperationResult) -> &Entitlement {
    match &result.outcome {
        Outcome::Entitlement(e) => e,
        other => panic!("expected entitlement outcome, got {other:?}"),
    }
}

pub fn redemption(result: &OperationResult) -> &Redemption {
    match &result.outcome {
        Outcome::Redemption(r) => r,
        other => panic!("expected redemption outcome, got {other:?}"),
    }
}
