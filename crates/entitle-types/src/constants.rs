//! System-wide constants for the Entitle coordinator.

/// Days a gift token stays redeemable after creation. Never extended.
pub const GIFT_REDEMPTION_WINDOW_DAYS: i64 = 30;

/// Default time-to-live for a cached operation result (24 hours).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Default key prefix for cached operation results.
pub const DEFAULT_CACHE_KEY_PREFIX: &str = "idempotency:";

/// Upper bound on `duration_months` accepted by any operation (10 years).
pub const DEFAULT_MAX_DURATION_MONTHS: u32 = 120;

/// Status code for operations that create an entity (grant, gift-create).
pub const STATUS_CREATED: u16 = 201;

/// Status code for operations that mutate an existing entity.
pub const STATUS_OK: u16 = 200;

/// Domain tag mixed into request fingerprints.
pub const FINGERPRINT_DOMAIN: &[u8] = b"entitle:op:v1:";
