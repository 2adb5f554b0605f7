//! Error types for the model layer.
//!
//! Like every Playclock crate, the model has its own error enum. A
//! `ModelError` always points at bad data: an unparseable identity, an
//! impossible currency definition, or a document that failed to encode or
//! decode.

/// Errors that can occur while building or (de)serializing model values.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A user identity string is not a valid UUID.
    ///
    /// Persisted documents are keyed by identity strings; an entry with a
    /// key like `"not-a-uuid"` surfaces as this variant so the loader can
    /// skip it and keep going.
    #[error("invalid user id {input:?}: {source}")]
    InvalidUserId {
        /// The rejected input.
        input: String,
        /// Why `uuid` refused it.
        #[source]
        source: uuid::Error,
    },

    /// A currency definition violates its invariants (zero interval,
    /// negative or non-finite default amount, empty id).
    #[error("invalid currency {id:?}: {reason}")]
    InvalidCurrency {
        /// The offending currency id.
        id: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// Serializing a document failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserializing a document failed: malformed JSON, wrong field
    /// types, or a truncated file.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
