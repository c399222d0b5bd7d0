use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::game_definition::{GameDefinition, GameDefinitionError};

/// Game documents compiled into the binary.
pub const BUILTIN_GAMES: &[(&str, &str)] = &[
    ("rock-climber", include_str!("games/rock-climber.json")),
    ("egyptian-treasures", include_str!("games/egyptian-treasures.json")),
];

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid game definition {source_name}: {source}")]
    Invalid {
        source_name: String,
        #[source]
        source: GameDefinitionError,
    },
    #[error("game {0} is defined more than once")]
    Duplicate(String),
    #[error("cannot read game definitions from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Game id to immutable definition, built once at startup and shared by every wager.
#[derive(Debug, Default, Clone)]
pub struct GameRegistry {
    games: HashMap<String, Arc<GameDefinition>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (name, json) in BUILTIN_GAMES {
            registry.insert_json(name, json)?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, def: GameDefinition) -> Result<(), RegistryError> {
        if self.games.contains_key(def.id()) {
            return Err(RegistryError::Duplicate(def.id().to_string()));
        }
        info!("Registered game {} ({} reels, {} paylines)", def.id(), def.reels_count(), def.paylines().len());
        self.games.insert(def.id().to_string(), Arc::new(def));
        Ok(())
    }

    fn insert_json(&mut self, source_name: &str, json: &str) -> Result<(), RegistryError> {
        let def = GameDefinition::from_json(json).map_err(|source| RegistryError::Invalid {
            source_name: source_name.to_string(),
            source,
        })?;
        self.insert(def)
    }

    /// Adds every `*.json` document found directly inside `dir`.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, RegistryError> {
        let io_err = |source| RegistryError::Io { path: dir.to_path_buf(), source };
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(io_err)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        if paths.is_empty() {
            warn!("No game definitions found in {}", dir.display());
        }
        for path in &paths {
            let json = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
                path: path.clone(),
                source,
            })?;
            self.insert_json(&path.display().to_string(), &json)?;
        }
        Ok(paths.len())
    }

    pub fn get(&self, id: &str) -> Option<Arc<GameDefinition>> {
        self.games.get(id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<GameDefinition>> {
        self.games.values()
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.games.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}
