//! The coordinator: exactly-once execution keyed by idempotency token.

use std::sync::Arc;

use entitle_store::{NoCache, ResultCache, Store, StoreError, Transaction};
use entitle_types::{
    Clock, CoordinatorConfig, EntitleError, OperationDescriptor, OperationRecord,
    OperationResult, Result, SystemClock,
};

use crate::{
    replay::CachedResult,
    transitions::{self, Step},
};

/// Runs named mutations exactly once per idempotency token.
///
/// Safe to share across tasks. All coordination between concurrent calls
/// happens in the store: row locks serialize conflicting transitions and
/// the uniqueness constraint on the operation record decides which of two
/// same-token executions commits.
pub struct Coordinator<S: Store> {
    pub(crate) store: S,
    pub(crate) cache: Arc<dyn ResultCache>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: CoordinatorConfig,
}

impl<S: Store> Coordinator<S> {
    /// # Errors
    /// Returns [`EntitleError::Configuration`] if `config` is invalid.
    pub fn new(
        store: S,
        cache: Arc<dyn ResultCache>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            cache,
            clock,
            config,
        })
    }

    /// No cache, the system clock, and default configuration.
    #[must_use]
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            cache: Arc::new(NoCache),
            clock: Arc::new(SystemClock),
            config: CoordinatorConfig::default(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Execute `op` under `token`, or return the result of the execution
    /// that already committed under it.
    ///
    /// For any token, at most one execution commits. Every call that
    /// returns `Ok` for that token returns the same payload; all but the
    /// committing call have `replayed == true`.
    ///
    /// # Errors
    /// - [`EntitleError::MissingToken`] / [`EntitleError::InvalidArgument`]
    ///   before any store or cache access
    /// - a not-found or precondition error when the transition is refused;
    ///   nothing is recorded, so the token stays usable
    /// - [`EntitleError::ReplayUnavailable`] if a committed record exists but
    ///   cannot be read back
    /// - [`EntitleError::StoreUnavailable`] on store failure; retryable with
    ///   the same token
    pub async fn execute(&self, token: &str, op: OperationDescriptor) -> Result<OperationResult> {
        if token.trim().is_empty() {
            return Err(EntitleError::MissingToken);
        }
        op.validate(self.config.max_duration_months)?;
        let fingerprint = op.fingerprint()?;

        if let Some(hit) = self.cached(token).await {
            tracing::debug!(token, kind = %hit.kind, "replay from cache");
            return Ok(hit);
        }

        self.execute_in_store(token, &op, fingerprint).await
    }

    async fn execute_in_store(
        &self,
        token: &str,
        op: &OperationDescriptor,
        fingerprint: String,
    ) -> Result<OperationResult> {
        let kind = op.kind();
        let mut tx = self.store.begin().await?;

        let applied = transitions::apply(&mut tx, self.clock.as_ref(), token, op).await;
        let step = match applied {
            Ok(step) => step,
            Err(err) => {
                self.abort(tx, token).await;
                tracing::debug!(token, %kind, code = err.code(), "operation refused");
                return Err(err);
            }
        };

        let (outcome, at) = match step {
            Step::AlreadyRecorded(record) => {
                self.abort(tx, token).await;
                tracing::debug!(token, %kind, "replay from store");
                return self.replay_record(&record, &fingerprint).await;
            }
            Step::Applied { outcome, at } => (outcome, at),
        };

        let record = match OperationRecord::for_outcome(token, kind, &outcome, fingerprint, at) {
            Ok(record) => record,
            Err(err) => {
                self.abort(tx, token).await;
                return Err(err);
            }
        };

        let inserted = tx.insert_operation(&record).await;
        if let Err(err) = inserted {
            self.abort(tx, token).await;
            return self.resolve_write_failure(token, &record, err).await;
        }
        if let Err(err) = tx.commit().await {
            return self.resolve_write_failure(token, &record, err).await;
        }

        tracing::info!(
            token,
            %kind,
            target = %record.target_entity_id,
            "operation committed"
        );
        let result = OperationResult::committed(&record, outcome);
        self.remember(&result).await;
        Ok(result)
    }

    /// A write lost to a concurrent same-token commit, or failed outright.
    async fn resolve_write_failure(
        &self,
        token: &str,
        attempted: &OperationRecord,
        err: StoreError,
    ) -> Result<OperationResult> {
        match err {
            StoreError::UniqueViolation { .. } => {
                tracing::debug!(token, "lost commit race, replaying winner");
                match self.store.find_operation(token).await {
                    Ok(Some(record)) => {
                        self.replay_record(&record, &attempted.request_fingerprint)
                            .await
                    }
                    Ok(None) => Err(EntitleError::ReplayUnavailable {
                        token: token.to_string(),
                    }),
                    Err(read_err) => {
                        tracing::warn!(token, error = %read_err, "winner record unreadable after race");
                        Err(EntitleError::ReplayUnavailable {
                            token: token.to_string(),
                        })
                    }
                }
            }
            other => {
                tracing::warn!(token, error = %other, "operation write failed");
                Err(other.into())
            }
        }
    }

    async fn replay_record(
        &self,
        record: &OperationRecord,
        fingerprint: &str,
    ) -> Result<OperationResult> {
        if record.request_fingerprint != fingerprint {
            tracing::warn!(
                token = %record.idempotency_token,
                kind = %record.operation_kind,
                "token reused with different arguments, replaying the committed operation"
            );
        }
        let result = record.replay()?;
        self.remember(&result).await;
        Ok(result)
    }

    async fn cached(&self, token: &str) -> Option<OperationResult> {
        let key = self.config.cache_key(token);
        let bytes = match self.cache.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(token, error = %err, "cache read failed");
                return None;
            }
        };
        let now = self.clock.now();
        match CachedResult::decode(&bytes).and_then(|entry| entry.into_result(token, now)) {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::warn!(token, error = %err, "ignoring unusable cache entry");
                None
            }
        }
    }

    async fn remember(&self, result: &OperationResult) {
        let ttl = self.config.cache_ttl();
        let expires_at = match chrono::Duration::from_std(ttl) {
            Ok(delta) => self.clock.now() + delta,
            Err(err) => {
                tracing::warn!(token = %result.token, error = %err, "cache ttl out of range");
                return;
            }
        };
        let bytes = match CachedResult::from_result(result, expires_at).encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(token = %result.token, error = %err, "cache entry encode failed");
                return;
            }
        };
        let key = self.config.cache_key(&result.token);
        if let Err(err) = self.cache.set(&key, bytes, ttl).await {
            tracing::warn!(token = %result.token, error = %err, "cache write failed");
        }
    }

    async fn abort(&self, tx: S::Tx, token: &str) {
        if let Err(err) = tx.rollback().await {
            tracing::warn!(token, error = %err, "rollback failed");
        }
    }
}
