//! Persistence for the latest committed snapshot and the error flag.
//!
//! A snapshot is always replaced as a whole: readers observe either the
//! previous snapshot or the new one, never a mix.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{config::Config, error::ErrorKind, model::WeatherSnapshot};

/// Bookkeeping kept next to the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<ErrorKind>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl StoreStatus {
    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }
}

pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<WeatherSnapshot>>;

    /// Replace the stored snapshot and stamp the update time.
    fn save(&self, snapshot: &WeatherSnapshot) -> Result<()>;

    fn clear(&self) -> Result<()>;

    fn status(&self) -> StoreStatus;

    fn record_error(&self, kind: ErrorKind) -> Result<()>;

    fn clear_error(&self) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    snapshot: Option<WeatherSnapshot>,
    #[serde(default)]
    status: StoreStatus,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<Option<WeatherSnapshot>> {
        Ok(self.state.read().snapshot.clone())
    }

    fn save(&self, snapshot: &WeatherSnapshot) -> Result<()> {
        let mut state = self.state.write();
        state.snapshot = Some(snapshot.clone());
        state.status.last_update = Some(Utc::now());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.state.write() = StoreState::default();
        Ok(())
    }

    fn status(&self) -> StoreStatus {
        self.state.read().status.clone()
    }

    fn record_error(&self, kind: ErrorKind) -> Result<()> {
        let mut state = self.state.write();
        state.status.last_error = Some(kind);
        state.status.last_error_at = Some(Utc::now());
        Ok(())
    }

    fn clear_error(&self) -> Result<()> {
        let mut state = self.state.write();
        state.status.last_error = None;
        state.status.last_error_at = None;
        Ok(())
    }
}

/// JSON file store. Every mutation rewrites the whole file through a
/// temporary sibling and a rename.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl FileStore {
    /// Open the store at `path`, starting empty when the file does not
    /// exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read weather store: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse weather store: {}", path.display()))?
        } else {
            StoreState::default()
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Store in the platform data directory.
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Config::project_dirs()?.data_dir().join("weather.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &StoreState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create data directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(state).context("Failed to serialize weather store")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write weather store: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace weather store: {}", self.path.display()))?;
        Ok(())
    }

    /// Apply `change` to a copy of the state, persist it, then publish it.
    fn update(&self, change: impl FnOnce(&mut StoreState)) -> Result<()> {
        let mut state = self.state.write();
        let mut next = state.clone();
        change(&mut next);
        self.persist(&next)?;
        *state = next;
        Ok(())
    }
}

impl SnapshotStore for FileStore {
    fn load(&self) -> Result<Option<WeatherSnapshot>> {
        Ok(self.state.read().snapshot.clone())
    }

    fn save(&self, snapshot: &WeatherSnapshot) -> Result<()> {
        self.update(|state| {
            state.snapshot = Some(snapshot.clone());
            state.status.last_update = Some(Utc::now());
        })
    }

    fn clear(&self) -> Result<()> {
        self.update(|state| *state = StoreState::default())
    }

    fn status(&self) -> StoreStatus {
        self.state.read().status.clone()
    }

    fn record_error(&self, kind: ErrorKind) -> Result<()> {
        self.update(|state| {
            state.status.last_error = Some(kind);
            state.status.last_error_at = Some(Utc::now());
        })
    }

    fn clear_error(&self) -> Result<()> {
        if !self.state.read().status.has_error() {
            return Ok(());
        }
        self.update(|state| {
            state.status.last_error = None;
            state.status.last_error_at = None;
        })
    }
}
