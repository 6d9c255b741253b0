//! Profile persistence and per-learner serialization
//!
//! `ProfileStore` is the one piece of shared mutable state in the system.
//! It sits in front of a pluggable `ProfileBackend` and adds:
//!
//! - get-or-create semantics on `load`
//! - a per-id lease so that two sessions of the same learner update the
//!   profile one after the other instead of overwriting each other
//!
//! ```text
//!   session A (ada) ──lock("ada")──► load ─► ... ─► save ─► release
//!   session B (ada) ──lock("ada")──────────── waits ──────► load ─► ...
//!   session C (bob) ──lock("bob")──► load ─► ...        (never blocked by A/B)
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

use super::types::{LearnerProfile, DEFAULT_HISTORY_LIMIT};
use crate::metrics::PROFILE_STORE_ERRORS;

/// Longest accepted learner id
const MAX_ID_LEN: usize = 64;

/// Prune idle lock entries once the map grows past this size
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Error type for profile persistence
#[derive(Debug)]
pub enum StoreError {
    /// Filesystem failure in a file-backed store
    Io(std::io::Error),
    /// Stored document could not be encoded/decoded
    Serialization(serde_json::Error),
    /// Learner id is empty, too long, or has characters outside `[A-Za-z0-9_-]`
    InvalidId(String),
    /// Backend is unreachable
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "Profile I/O error: {}", e),
            StoreError::Serialization(e) => write!(f, "Profile serialization error: {}", e),
            StoreError::InvalidId(id) => write!(f, "Invalid learner id: '{}'", id),
            StoreError::Unavailable(msg) => write!(f, "Profile store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e)
    }
}

/// Raw persistence layer behind the `ProfileStore`
///
/// Implementations only need to be atomic per document: `save` must either
/// fully replace the stored profile or leave the previous one untouched.
#[async_trait]
pub trait ProfileBackend: Send + Sync {
    /// Fetch a stored profile, `Ok(None)` when the learner is unknown
    async fn fetch(&self, id: &str) -> Result<Option<LearnerProfile>, StoreError>;

    /// Replace the stored profile for `profile.id`
    async fn store(&self, profile: &LearnerProfile) -> Result<(), StoreError>;
}

/// In-process backend, mostly for tests and single-run CLI sessions
#[derive(Default)]
pub struct MemoryBackend {
    profiles: RwLock<HashMap<String, LearnerProfile>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored profiles
    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }
}

#[async_trait]
impl ProfileBackend for MemoryBackend {
    async fn fetch(&self, id: &str) -> Result<Option<LearnerProfile>, StoreError> {
        Ok(self.profiles.read().await.get(id).cloned())
    }

    async fn store(&self, profile: &LearnerProfile) -> Result<(), StoreError> {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }
}

/// One JSON document per learner under a base directory
///
/// Saves go through a temporary file followed by a rename, so a reader sees
/// either the old document or the new one, never a torn write.
pub struct JsonFileBackend {
    base_dir: PathBuf,
}

impl JsonFileBackend {
    /// Create a backend rooted at `base_dir`, creating the directory if needed
    pub fn new(base_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Backend under `~/.tutorloop/profiles`
    pub fn default_store() -> std::io::Result<Self> {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self::new(PathBuf::from(home).join(".tutorloop").join("profiles"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn profile_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl ProfileBackend for JsonFileBackend {
    async fn fetch(&self, id: &str) -> Result<Option<LearnerProfile>, StoreError> {
        let path = self.profile_path(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn store(&self, profile: &LearnerProfile) -> Result<(), StoreError> {
        let path = self.profile_path(&profile.id);
        let tmp = self
            .base_dir
            .join(format!(".{}.{}.tmp", profile.id, uuid::Uuid::now_v7()));
        let json = serde_json::to_string_pretty(profile)?;

        if let Err(e) = tokio::fs::write(&tmp, json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Io(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Io(e));
        }
        Ok(())
    }
}

/// Exclusive right to update one learner's profile
///
/// Dropping the lease lets the next waiting session for the same id proceed.
pub struct ProfileLease {
    id: String,
    _guard: OwnedMutexGuard<()>,
}

impl ProfileLease {
    pub fn learner_id(&self) -> &str {
        &self.id
    }
}

/// Values used when a profile is created on first contact
#[derive(Debug, Clone, Copy)]
pub struct ProfileDefaults {
    pub initial_exploration: f64,
    pub history_limit: usize,
}

impl Default for ProfileDefaults {
    fn default() -> Self {
        Self {
            initial_exploration: 0.3,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Concurrency-safe front for learner profiles
pub struct ProfileStore {
    backend: Arc<dyn ProfileBackend>,
    defaults: ProfileDefaults,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ProfileStore {
    pub fn new(backend: Arc<dyn ProfileBackend>, defaults: ProfileDefaults) -> Self {
        Self {
            backend,
            defaults,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Store over a fresh `MemoryBackend`
    pub fn in_memory(defaults: ProfileDefaults) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), defaults)
    }

    /// Acquire the per-learner lease
    ///
    /// Waits while another interaction for the same id holds it. Leases for
    /// different ids are independent.
    pub async fn lock(&self, id: &str) -> ProfileLease {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > LOCK_PRUNE_THRESHOLD {
                // Entries only referenced by the map have no holder or waiter
                locks.retain(|_, m| Arc::strong_count(m) > 1);
            }
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = mutex.lock_owned().await;
        debug!(learner_id = %id, "Profile lease acquired");
        ProfileLease {
            id: id.to_string(),
            _guard: guard,
        }
    }

    /// Load a learner's profile, creating a default one if none exists
    ///
    /// The created profile is returned but not persisted; it is written on
    /// the first successful `save`.
    pub async fn load(&self, id: &str) -> Result<LearnerProfile, StoreError> {
        validate_id(id)?;
        match self.backend.fetch(id).await {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => {
                debug!(learner_id = %id, "Creating profile for new learner");
                Ok(LearnerProfile::new(
                    id,
                    self.defaults.initial_exploration,
                    self.defaults.history_limit,
                ))
            }
            Err(e) => {
                PROFILE_STORE_ERRORS.with_label_values(&["load"]).inc();
                warn!(learner_id = %id, error = %e, "Profile load failed");
                Err(e)
            }
        }
    }

    /// Persist a profile atomically
    pub async fn save(&self, profile: &LearnerProfile) -> Result<(), StoreError> {
        validate_id(&profile.id)?;
        self.backend.store(profile).await.map_err(|e| {
            PROFILE_STORE_ERRORS.with_label_values(&["save"]).inc();
            warn!(learner_id = %profile.id, error = %e, "Profile save failed");
            e
        })
    }
}

/// Learner ids double as file names, so keep them to a safe alphabet
pub fn validate_id(id: &str) -> Result<(), StoreError> {
    let ok = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}
