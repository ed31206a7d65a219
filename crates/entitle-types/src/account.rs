//! Account model. Accounts are owned by an upstream keyed store; the core
//! only reads them to check that referenced accounts exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// An account that can hold entitlements and issue or receive gifts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Contact address (e-mail) used to address gifts.
    pub contact_address: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn new(contact_address: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            contact_address: contact_address.into(),
            created_at,
        }
    }
}
