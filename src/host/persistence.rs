//! Persistence seam for player counters and arena definitions
//!
//! Never called from the physics tick. A failed call is logged by the
//! caller and leaves in-memory state untouched.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::arena::settings::ArenaDefinition;
use crate::game::participant::ParticipantId;
use crate::game::stats::PlayerStats;

/// Files larger than this are refused on load
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("File {path} too large ({size} bytes > 10 MB limit)")]
    TooLarge { path: String, size: u64 },
    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),
}

/// Storage collaborator
pub trait Persistence: Send + Sync {
    /// Missing counters load as defaults
    fn load_counters(&self, id: ParticipantId) -> Result<PlayerStats, PersistenceError>;
    fn save_counters(&self, id: ParticipantId, stats: &PlayerStats) -> Result<(), PersistenceError>;
    fn load_arena_definitions(&self) -> Result<Vec<ArenaDefinition>, PersistenceError>;
    fn save_arena_definition(&self, definition: &ArenaDefinition) -> Result<(), PersistenceError>;
    fn delete_arena_definition(&self, id: &str) -> Result<(), PersistenceError>;
}

/// JSON files under a data directory
///
/// Layout: `<root>/playerdata/<uuid>.json` and `<root>/arenas/<id>.json`.
pub struct JsonFilePersistence {
    root: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn player_path(&self, id: ParticipantId) -> PathBuf {
        self.root.join("playerdata").join(format!("{}.json", id))
    }

    fn arenas_dir(&self) -> PathBuf {
        self.root.join("arenas")
    }

    fn arena_path(&self, id: &str) -> Result<PathBuf, PersistenceError> {
        if id.is_empty() || id.contains(['/', '\\', '.']) {
            return Err(PersistenceError::InvalidKey(id.to_string()));
        }
        Ok(self.arenas_dir().join(format!("{}.json", id)))
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
        let size = fs::metadata(path)?.len();
        if size > MAX_FILE_SIZE {
            return Err(PersistenceError::TooLarge {
                path: path.display().to_string(),
                size,
            });
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(value)?;
        fs::write(path, contents)?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

impl Persistence for JsonFilePersistence {
    fn load_counters(&self, id: ParticipantId) -> Result<PlayerStats, PersistenceError> {
        let path = self.player_path(id);
        if !path.exists() {
            return Ok(PlayerStats::default());
        }
        Self::read_json(&path)
    }

    fn save_counters(&self, id: ParticipantId, stats: &PlayerStats) -> Result<(), PersistenceError> {
        Self::write_json(&self.player_path(id), stats)
    }

    fn load_arena_definitions(&self) -> Result<Vec<ArenaDefinition>, PersistenceError> {
        let dir = self.arenas_dir();
        if !dir.exists() {
            debug!("No arena directory at {}", dir.display());
            return Ok(Vec::new());
        }

        let mut definitions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_json::<ArenaDefinition>(&path) {
                Ok(def) => definitions.push(def),
                Err(e) => warn!("Skipping arena file {}: {}", path.display(), e),
            }
        }
        definitions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(definitions)
    }

    fn save_arena_definition(&self, definition: &ArenaDefinition) -> Result<(), PersistenceError> {
        let path = self.arena_path(&definition.id)?;
        Self::write_json(&path, definition)
    }

    fn delete_arena_definition(&self, id: &str) -> Result<(), PersistenceError> {
        let path = self.arena_path(id)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// In-memory storage for tests and ephemeral servers
#[derive(Default)]
pub struct MemoryPersistence {
    counters: Mutex<HashMap<ParticipantId, PlayerStats>>,
    arenas: Mutex<HashMap<String, ArenaDefinition>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored counters without the default fallback
    pub fn stored_counters(&self, id: ParticipantId) -> Option<PlayerStats> {
        self.counters.lock().get(&id).copied()
    }
}

impl Persistence for MemoryPersistence {
    fn load_counters(&self, id: ParticipantId) -> Result<PlayerStats, PersistenceError> {
        Ok(self.counters.lock().get(&id).copied().unwrap_or_default())
    }

    fn save_counters(&self, id: ParticipantId, stats: &PlayerStats) -> Result<(), PersistenceError> {
        self.counters.lock().insert(id, *stats);
        Ok(())
    }

    fn load_arena_definitions(&self) -> Result<Vec<ArenaDefinition>, PersistenceError> {
        let mut definitions: Vec<_> = self.arenas.lock().values().cloned().collect();
        definitions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(definitions)
    }

    fn save_arena_definition(&self, definition: &ArenaDefinition) -> Result<(), PersistenceError> {
        self.arenas
            .lock()
            .insert(definition.id.clone(), definition.clone());
        Ok(())
    }

    fn delete_arena_definition(&self, id: &str) -> Result<(), PersistenceError> {
        self.arenas.lock().remove(id);
        Ok(())
    }
}
