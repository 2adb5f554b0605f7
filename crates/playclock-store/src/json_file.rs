//! File-backed persistence: one structured document for every user.
//!
//! Layout (shown as JSON, the default codec):
//!
//! ```text
//! {
//!   "players": {
//!     "6f1c3f0e-8a0b-4f5e-9d55-3c2b1a0f9e8d": {
//!       "totalTime": 3600,
//!       "periodTime": 1200,
//!       "lastRewardTimes": { "gold": 3600 }
//!     }
//!   }
//! }
//! ```
//!
//! The parsed document is cached in memory. Saves upsert into the cache and
//! rewrite the whole file through a temporary sibling plus rename, so a
//! crash mid-write leaves the previous file intact.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use playclock_model::{Codec, CurrencyId, JsonCodec, UserId, UserState};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{Persistence, StoreError};

// ---------------------------------------------------------------------------
// On-disk shape
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    players: BTreeMap<String, PlayerRecord>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerRecord {
    #[serde(default)]
    total_time: u64,
    #[serde(default)]
    period_time: u64,
    #[serde(default)]
    last_reward_times: BTreeMap<String, u64>,
}

impl From<&UserState> for PlayerRecord {
    fn from(state: &UserState) -> Self {
        Self {
            total_time: state.total_active_secs,
            period_time: state.period_active_secs,
            last_reward_times: state
                .reward_checkpoints
                .iter()
                .map(|(currency, cp)| (currency.to_string(), *cp))
                .collect(),
        }
    }
}

impl From<&PlayerRecord> for UserState {
    fn from(record: &PlayerRecord) -> Self {
        Self {
            total_active_secs: record.total_time,
            period_active_secs: record.period_time,
            reward_checkpoints: record
                .last_reward_times
                .iter()
                .map(|(currency, cp)| (CurrencyId::new(currency.as_str()), *cp))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// [`Persistence`] backed by a single document file.
///
/// Generic over the [`Codec`] so the byte format can change without
/// touching the document layout; JSON is the default.
pub struct JsonFileStore<C: Codec = JsonCodec> {
    path: PathBuf,
    codec: C,
    /// Parsed document. Also serializes writers so two saves never race on
    /// the temporary file.
    document: Mutex<Document>,
}

impl JsonFileStore<JsonCodec> {
    /// Opens (or prepares to create) a JSON data file at `path`.
    ///
    /// # Errors
    /// See [`JsonFileStore::open_with_codec`].
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_codec(path, JsonCodec).await
    }
}

impl<C: Codec> JsonFileStore<C> {
    /// Opens the data file at `path` using `codec`.
    ///
    /// A missing file is treated as an empty document; it is created on the
    /// first save.
    ///
    /// # Errors
    /// - [`StoreError::Io`] if the file exists but cannot be read.
    /// - [`StoreError::Model`] if its contents do not decode. The file is
    ///   left untouched.
    pub async fn open_with_codec(
        path: impl Into<PathBuf>,
        codec: C,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Document::default(),
            Ok(bytes) => normalize_keys(codec.decode::<Document>(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "data file not found, starting empty");
                Document::default()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        tracing::debug!(
            path = %path.display(),
            players = document.players.len(),
            "data file opened"
        );

        Ok(Self {
            path,
            codec,
            document: Mutex::new(document),
        })
    }

    /// The data file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, document: &Document) -> Result<(), StoreError> {
        let bytes = self.codec.encode(document)?;
        let tmp = tmp_path(&self.path);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        }
        tokio::fs::write(&tmp, &bytes).await.map_err(io_err(&tmp))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(io_err(&self.path))?;
        Ok(())
    }
}

impl<C: Codec> Persistence for JsonFileStore<C> {
    async fn load(&self, user: UserId) -> Result<Option<UserState>, StoreError> {
        let document = self.document.lock().await;
        Ok(document.players.get(&user.to_string()).map(UserState::from))
    }

    async fn load_all(&self) -> Result<Vec<(UserId, UserState)>, StoreError> {
        let document = self.document.lock().await;
        let mut users = Vec::with_capacity(document.players.len());
        for (key, record) in &document.players {
            match UserId::parse(key) {
                Ok(user) => users.push((user, UserState::from(record))),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping malformed user id in data file");
                }
            }
        }
        Ok(users)
    }

    async fn save_all(&self, users: &HashMap<UserId, UserState>) -> Result<(), StoreError> {
        let mut document = self.document.lock().await;
        for (user, state) in users {
            document.players.insert(user.to_string(), PlayerRecord::from(state));
        }
        self.write(&document).await?;
        tracing::debug!(saved = users.len(), total = document.players.len(), "data file written");
        Ok(())
    }

    async fn reset_all_period(&self) -> Result<(), StoreError> {
        let mut document = self.document.lock().await;
        if document.players.is_empty() {
            return Ok(());
        }
        for record in document.players.values_mut() {
            record.period_time = 0;
        }
        self.write(&document).await
    }
}

/// Rewrites valid identity keys into canonical hyphenated lowercase form so
/// lookups by `UserId::to_string()` always hit. Invalid keys are kept as-is
/// (they are skipped on load but never destroyed).
fn normalize_keys(document: Document) -> Document {
    let players = document
        .players
        .into_iter()
        .map(|(key, record)| match UserId::parse(&key) {
            Ok(user) => (user.to_string(), record),
            Err(_) => (key, record),
        })
        .collect();
    Document { players }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
