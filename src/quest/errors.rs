use thiserror::Error;

/// Errors that can arise while loading quest content or running the engine.
#[derive(Debug, Error)]
pub enum QuestError {
    /// A malformed instruction string. The message names the offending field
    /// and the value that failed to parse.
    #[error("instruction error: {0}")]
    Instruction(String),

    /// An instruction used a type keyword that is not registered.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// A condition/event/objective reference that does not resolve.
    #[error("unknown reference: {0}")]
    UnknownReference(String),

    /// Firing a non-static event with no player, or similar misuse.
    #[error("state violation: {0}")]
    StateViolation(String),

    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, package files, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Malformed TOML package file.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON conversation file.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QuestError {
    /// Shorthand for an instruction diagnostic naming the field and the bad value.
    pub fn field(field: &str, value: &str) -> Self {
        QuestError::Instruction(format!("could not parse {}: \"{}\"", field, value))
    }

    /// Shorthand for a missing required argument.
    pub fn missing(field: &str) -> Self {
        QuestError::Instruction(format!("{} not defined", field))
    }
}
