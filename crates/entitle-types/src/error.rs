//! Error types for the Entitle coordinator.
//!
//! All errors use the `ENT_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by class:
//! - 1xx: Validation errors (rejected before any store access)
//! - 2xx: Not-found errors
//! - 3xx: Precondition errors (domain conflicts)
//! - 4xx: Replay errors
//! - 9xx: Infrastructure / internal errors
//!
//! None of the 1xx–3xx errors are ever recorded as an operation: a retry
//! with the same idempotency token re-evaluates from scratch.

use thiserror::Error;

use crate::{AccountId, EntitlementId, EntitlementState, GiftId, GiftState};

/// Central error enum for all Entitle operations.
#[derive(Debug, Error)]
pub enum EntitleError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// The caller did not supply an idempotency token.
    #[error("ENT_ERR_100: Idempotency token is required")]
    MissingToken,

    /// An operation argument is malformed (zero duration, empty address, ...).
    #[error("ENT_ERR_101: Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // =================================================================
    // Not-Found Errors (2xx)
    // =================================================================
    /// The referenced account does not exist.
    #[error("ENT_ERR_200: Account not found: {0}")]
    AccountNotFound(AccountId),

    /// The referenced entitlement does not exist.
    #[error("ENT_ERR_201: Entitlement not found: {0}")]
    EntitlementNotFound(EntitlementId),

    /// The referenced gift token does not exist.
    #[error("ENT_ERR_202: Gift not found: {0}")]
    GiftNotFound(GiftId),

    /// The account redeeming a gift does not exist.
    #[error("ENT_ERR_203: Recipient not found: {0}")]
    RecipientNotFound(AccountId),

    // =================================================================
    // Precondition Errors (3xx)
    // =================================================================
    /// The account already holds an effectively active entitlement.
    #[error("ENT_ERR_300: Account {0} already has an active entitlement")]
    AlreadyActive(AccountId),

    /// The entitlement is not effectively active.
    #[error("ENT_ERR_301: Entitlement {id} is {state}, not ACTIVE")]
    NotActive {
        id: EntitlementId,
        state: EntitlementState,
    },

    /// The gift is not effectively pending (already redeemed or expired).
    #[error("ENT_ERR_302: Gift {id} is {state}, not redeemable")]
    NotRedeemable { id: GiftId, state: GiftState },

    /// The redeeming account already holds an effectively active entitlement.
    #[error("ENT_ERR_303: Recipient {0} already has an active entitlement")]
    RecipientAlreadyActive(AccountId),

    // =================================================================
    // Replay Errors (4xx)
    // =================================================================
    /// A record exists for the token but its result cannot be rebuilt.
    #[error("ENT_ERR_400: Replay unavailable for token {token}")]
    ReplayUnavailable { token: String },

    // =================================================================
    // Infrastructure / Internal (9xx)
    // =================================================================
    /// The durable store failed; the operation had no effect.
    #[error("ENT_ERR_900: Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Serialization / deserialization error.
    #[error("ENT_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid values, missing fields, etc.).
    #[error("ENT_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// Unrecoverable internal error.
    #[error("ENT_ERR_903: Internal error: {0}")]
    Internal(String),
}

/// Coarse error class. Callers branch on this, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Precondition,
    Replay,
    Transient,
    Internal,
}

impl EntitleError {
    /// The error class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingToken | Self::InvalidArgument { .. } => ErrorKind::Validation,
            Self::AccountNotFound(_)
            | Self::EntitlementNotFound(_)
            | Self::GiftNotFound(_)
            | Self::RecipientNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyActive(_)
            | Self::NotActive { .. }
            | Self::NotRedeemable { .. }
            | Self::RecipientAlreadyActive(_) => ErrorKind::Precondition,
            Self::ReplayUnavailable { .. } => ErrorKind::Replay,
            Self::StoreUnavailable(_) => ErrorKind::Transient,
            Self::Serialization(_) | Self::Configuration(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Stable machine-readable code, e.g. `"ENT_ERR_300"`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "ENT_ERR_100",
            Self::InvalidArgument { .. } => "ENT_ERR_101",
            Self::AccountNotFound(_) => "ENT_ERR_200",
            Self::EntitlementNotFound(_) => "ENT_ERR_201",
            Self::GiftNotFound(_) => "ENT_ERR_202",
            Self::RecipientNotFound(_) => "ENT_ERR_203",
            Self::AlreadyActive(_) => "ENT_ERR_300",
            Self::NotActive { .. } => "ENT_ERR_301",
            Self::NotRedeemable { .. } => "ENT_ERR_302",
            Self::RecipientAlreadyActive(_) => "ENT_ERR_303",
            Self::ReplayUnavailable { .. } => "ENT_ERR_400",
            Self::StoreUnavailable(_) => "ENT_ERR_900",
            Self::Serialization(_) => "ENT_ERR_901",
            Self::Configuration(_) => "ENT_ERR_902",
            Self::Internal(_) => "ENT_ERR_903",
        }
    }

    /// HTTP-style status a request layer should render for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Precondition => 409,
            ErrorKind::Transient => 503,
            ErrorKind::Replay | ErrorKind::Internal => 500,
        }
    }

    /// Whether retrying with the same token may succeed without the caller
    /// changing anything.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, EntitleError>;

impl From<serde_json::Error> for EntitleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = EntitleError::AccountNotFound(AccountId::new());
        let msg = format!("{err}");
        assert!(msg.starts_with("ENT_ERR_200"), "Got: {msg}");
    }

    #[test]
    fn not_active_display_names_state() {
        let err = EntitleError::NotActive {
            id: EntitlementId::new(),
            state: EntitlementState::Cancelled,
        };
        let msg = format!("{err}");
        assert!(msg.contains("ENT_ERR_301"));
        assert!(msg.contains("CANCELLED"));
    }

    #[test]
    fn code_matches_display_prefix() {
        let errors = vec![
            EntitleError::MissingToken,
            EntitleError::InvalidArgument { reason: "x".into() },
            EntitleError::GiftNotFound(GiftId::new()),
            EntitleError::NotRedeemable {
                id: GiftId::new(),
                state: GiftState::Expired,
            },
            EntitleError::RecipientAlreadyActive(AccountId::new()),
            EntitleError::ReplayUnavailable { token: "t".into() },
            EntitleError::StoreUnavailable("down".into()),
            EntitleError::Internal("test".into()),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with(err.code()),
                "code {} does not prefix message {msg}",
                err.code()
            );
        }
    }

    #[test]
    fn kinds_map_to_status_codes() {
        assert_eq!(EntitleError::MissingToken.status_code(), 400);
        assert_eq!(
            EntitleError::EntitlementNotFound(EntitlementId::new()).status_code(),
            404
        );
        assert_eq!(
            EntitleError::AlreadyActive(AccountId::new()).status_code(),
            409
        );
        assert_eq!(
            EntitleError::StoreUnavailable("x".into()).status_code(),
            503
        );
        assert_eq!(
            EntitleError::ReplayUnavailable { token: "t".into() }.status_code(),
            500
        );
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(EntitleError::StoreUnavailable("x".into()).is_retryable());
        assert!(!EntitleError::MissingToken.is_retryable());
        assert!(!EntitleError::AlreadyActive(AccountId::new()).is_retryable());
        assert!(!EntitleError::ReplayUnavailable { token: "t".into() }.is_retryable());
    }
}
