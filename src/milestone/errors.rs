use thiserror::Error;

/// Errors that can arise while talking to the persistence gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Internal error (task join errors, injected test failures).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors surfaced by the milestone engine itself. Claim rejections are not
/// errors; they are [`crate::milestone::types::ClaimOutcome`] values.
#[derive(Debug, Error)]
pub enum MilestoneError {
    /// The persistence gateway failed; the operation was aborted and no
    /// cached state was changed.
    #[error("persistence failure: {0}")]
    Persistence(#[from] GatewayError),

    /// A gather delta of zero was supplied.
    #[error("delta amount must be positive")]
    InvalidAmount,

    /// A player name or resource key failed validation.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] crate::validation::KeyError),

    /// A claim referenced a level ordinal the registry does not define.
    #[error("unknown milestone level {level} for resource {resource}")]
    UnknownLevel { resource: String, level: u32 },
}
