//! Cache wire format for completed operation results.
//!
//! A cache value is the JSON encoding of [`CachedResult`]. Its `payload`
//! is the exact `result_summary` string of the operation record, so a
//! cache hit and a store replay return the same bytes.

use chrono::{DateTime, Utc};
use entitle_types::{EntitleError, OperationKind, OperationResult, Outcome, Result};
use serde::{Deserialize, Serialize};

/// A denormalized, time-limited projection of an operation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResult {
    pub token: String,
    pub kind: OperationKind,
    pub status_code: u16,
    pub payload: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedResult {
    #[must_use]
    pub fn from_result(result: &OperationResult, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: result.token.clone(),
            kind: result.kind,
            status_code: result.status_code,
            payload: result.payload.clone(),
            expires_at,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Turn a cache entry back into a replayed result for `token`.
    ///
    /// # Errors
    /// Fails if the entry belongs to another token, has expired, or its
    /// payload does not decode into an outcome of its kind. The
    /// coordinator treats every such failure as a cache miss.
    pub fn into_result(self, token: &str, now: DateTime<Utc>) -> Result<OperationResult> {
        if self.token != token {
            return Err(EntitleError::Internal(format!(
                "cache entry for {} served under key of {token}",
                self.token
            )));
        }
        if self.expires_at <= now {
            return Err(EntitleError::Internal(format!(
                "cache entry for {token} expired at {}",
                self.expires_at
            )));
        }
        let outcome = Outcome::from_payload(&self.payload)?;
        if !outcome.matches_kind(self.kind) {
            return Err(EntitleError::Serialization(format!(
                "cached outcome does not match kind {}",
                self.kind
            )));
        }
        Ok(OperationResult {
            token: self.token,
            kind: self.kind,
            status_code: self.status_code,
            outcome,
            payload: self.payload,
            replayed: true,
        })
    }
}
