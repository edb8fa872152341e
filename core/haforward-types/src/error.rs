//! Codec error types.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors produced while turning bytes into a [`Command`](crate::Command).
///
/// A decode error rejects a single message; receivers log it and move on.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON or not a JSON object.
    #[error("malformed command: {0}")]
    Malformed(String),

    /// The object has no string `type` discriminator.
    #[error("command has no `type` discriminator")]
    MissingType,

    /// The discriminator is not one this node understands.
    #[error("unknown command type: {0}")]
    UnknownType(String),

    /// Required fields for the discriminator are missing or mistyped.
    #[error("invalid `{type_name}` command: {source}")]
    InvalidFields {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A field parsed but holds a value outside its domain.
    #[error("invalid `{type_name}` command: {reason}")]
    InvalidValue { type_name: String, reason: String },
}

/// Errors produced while encoding commands or cache keys.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The command has no wire representation.
    #[error("command cannot be encoded: {0}")]
    Unencodable(String),

    /// A cache key did not match the shape registered for its cache.
    #[error("invalid key for cache {cache_name}: {reason}")]
    InvalidKey { cache_name: String, reason: String },

    /// Decoding failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
