//! Codec trait and implementations for persisted documents.
//!
//! The store layer writes one structured document holding every user's
//! snapshot. It does not care which byte format that document uses, only
//! that something implements [`Codec`]. [`JsonCodec`] is the default
//! because operators like to open the data file and read it.

use serde::{Serialize, de::DeserializeOwned};

use crate::ModelError;

/// Turns serializable values into bytes and back.
///
/// `Send + Sync + 'static` because the codec lives inside a persistence
/// adapter shared by the persistence tick, shutdown, and admin calls,
/// which may run on any runtime worker.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ModelError::Encode`] if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ModelError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ModelError::Decode`] for malformed or mistyped input.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ModelError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that writes pretty-printed JSON via `serde_json`.
///
/// Pretty output costs a few bytes per user but keeps the data file
/// diffable and hand-editable, which matters more than size for a file that
/// is rewritten every few minutes.
///
/// ```rust
/// use std::collections::BTreeMap;
/// use playclock_model::{Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let mut doc = BTreeMap::new();
/// doc.insert("totalTime".to_string(), 120u64);
///
/// let bytes = codec.encode(&doc).unwrap();
/// let back: BTreeMap<String, u64> = codec.decode(&bytes).unwrap();
/// assert_eq!(doc, back);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ModelError> {
        serde_json::to_vec_pretty(value).map_err(ModelError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ModelError> {
        serde_json::from_slice(data).map_err(ModelError::Decode)
    }
}
