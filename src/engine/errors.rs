use thiserror::Error;

/// Errors that can arise while processing activity events or talking to the
/// statistics store.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected before any mutation: unknown event kind or malformed payload.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Rejected before mutation: a delta would drive a counter or the score
    /// below zero.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Referenced a badge id that is not in the catalog.
    #[error("unknown badge: {0}")]
    UnknownBadge(String),

    /// Non-fatal: a sink refused an event. Statistics and ledger state are
    /// already correct when this fires.
    #[error("notification delivery failed: {0}")]
    NotificationDelivery(String),

    /// Internal error (unexpected conditions).
    #[error("internal error: {0}")]
    Internal(String),
}
