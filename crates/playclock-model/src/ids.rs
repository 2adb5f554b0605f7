//! Identity types: who is earning, and which currency they earn.
//!
//! Both are newtype wrappers so that a user id can never be passed where a
//! currency id is expected, even though both end up as strings in the
//! persisted document.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ModelError;

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// A stable, opaque identifier for a user of the live session.
///
/// Backed by a UUID because that is what game hosts hand out for player
/// accounts. The persisted document stores it in hyphenated form, which is
/// also what `Display` prints.
///
/// `#[serde(transparent)]` serializes a `UserId` as the bare UUID string
/// instead of `{ "0": "..." }`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generates a fresh random identity. Handy for tests and demos.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an identity from its string form.
    ///
    /// # Errors
    /// Returns [`ModelError::InvalidUserId`] if `input` is not a UUID.
    pub fn parse(input: &str) -> Result<Self, ModelError> {
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|source| ModelError::InvalidUserId {
                input: input.to_string(),
                source,
            })
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for UserId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// CurrencyId
// ---------------------------------------------------------------------------

/// The key of a currency in the external ledger (e.g. `"gold"`).
///
/// Unique across the configured currencies. It is also the middle segment
/// of permission override nodes, so `Borrow<str>` lets maps keyed by
/// `CurrencyId` be queried with a plain `&str`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CurrencyId(String);

impl CurrencyId {
    /// Wraps a currency key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CurrencyId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CurrencyId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for CurrencyId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CurrencyId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
