use hashbrown::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::arena::machine::{Arena, ArenaError, ArenaState, Departure, JoinOutcome};
use crate::arena::settings::ArenaDefinition;
use crate::game::participant::{Participant, ParticipantId};
use crate::game::team::{play_mode_info, PlayMode};
use crate::host::Context;

/// Registry of arenas keyed by id, plus the player to arena index
pub struct ArenaRegistry {
    ctx: Context,
    arenas: HashMap<String, Arc<Arena>>,
    player_arenas: HashMap<ParticipantId, String>,
    max_arenas: usize,
}

impl ArenaRegistry {
    pub fn new(ctx: Context, max_arenas: usize) -> Self {
        Self {
            ctx,
            arenas: HashMap::new(),
            player_arenas: HashMap::new(),
            max_arenas,
        }
    }

    /// Create an arena from a definition
    pub fn create(&mut self, definition: &ArenaDefinition) -> Result<Arc<Arena>, RegistryError> {
        definition
            .validate()
            .map_err(RegistryError::InvalidDefinition)?;
        if self.arenas.contains_key(&definition.id) {
            return Err(RegistryError::ArenaExists);
        }
        if self.arenas.len() >= self.max_arenas {
            return Err(RegistryError::TooManyArenas);
        }

        let arena = Arc::new(Arena::new(definition, self.ctx.clone()));
        self.arenas.insert(definition.id.clone(), arena.clone());
        info!("Arena {} created ({})", definition.id, definition.name);
        Ok(arena)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Arena>> {
        self.arenas.get(id).cloned()
    }

    /// Remove an arena, dropping the index entries of its members
    pub fn remove(&mut self, id: &str) -> Option<Arc<Arena>> {
        let arena = self.arenas.remove(id)?;
        self.player_arenas.retain(|_, arena_id| arena_id != id);
        info!("Arena {} removed", id);
        Some(arena)
    }

    /// Add a participant to an arena; a player is in at most one arena
    pub fn join(
        &mut self,
        arena_id: &str,
        participant: Participant,
    ) -> Result<JoinOutcome, RegistryError> {
        let player_id = participant.id;
        if self.player_arenas.contains_key(&player_id) {
            return Err(RegistryError::AlreadyInArena);
        }

        let arena = self
            .arenas
            .get(arena_id)
            .ok_or(RegistryError::ArenaNotFound)?;

        let outcome = arena.join(participant)?;
        self.player_arenas.insert(player_id, arena_id.to_string());
        Ok(outcome)
    }

    /// Remove a player from whatever arena they are in
    pub fn leave(
        &mut self,
        player_id: ParticipantId,
    ) -> Result<(Arc<Arena>, Departure), RegistryError> {
        let arena_id = self
            .player_arenas
            .remove(&player_id)
            .ok_or(RegistryError::NotInArena)?;

        let arena = self
            .arenas
            .get(&arena_id)
            .cloned()
            .ok_or(RegistryError::ArenaNotFound)?;
        let departure = arena.leave(player_id)?;
        debug!("Player {} removed from arena {}", player_id, arena_id);
        Ok((arena, departure))
    }

    pub fn arena_of(&self, player_id: ParticipantId) -> Option<Arc<Arena>> {
        self.player_arenas
            .get(&player_id)
            .and_then(|id| self.arenas.get(id))
            .cloned()
    }

    pub fn arena_count(&self) -> usize {
        self.arenas.len()
    }

    /// Players currently in any arena
    pub fn player_count(&self) -> usize {
        self.player_arenas.len()
    }

    pub fn player_ids(&self) -> Vec<ParticipantId> {
        self.player_arenas.keys().copied().collect()
    }

    /// All arenas, ordered by id
    pub fn arenas(&self) -> Vec<Arc<Arena>> {
        let mut arenas: Vec<_> = self.arenas.values().cloned().collect();
        arenas.sort_by(|a, b| a.id().cmp(b.id()));
        arenas
    }

    /// Arena listing, ordered by id
    pub fn list(&self) -> Vec<ArenaInfo> {
        self.arenas()
            .iter()
            .map(|arena| ArenaInfo {
                id: arena.id().to_string(),
                name: arena.name().to_string(),
                state: arena.state(),
                mode: arena.mode(),
                mode_name: play_mode_info(arena.mode()).display_name,
                player_count: arena.player_count(),
                max_players: arena.max_players(),
            })
            .collect()
    }
}

/// Arena information for listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaInfo {
    pub id: String,
    pub name: String,
    pub state: ArenaState,
    pub mode: PlayMode,
    pub mode_name: &'static str,
    pub player_count: usize,
    pub max_players: usize,
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Too many arenas")]
    TooManyArenas,
    #[error("Arena already exists")]
    ArenaExists,
    #[error("Arena not found")]
    ArenaNotFound,
    #[error("Player is already in an arena")]
    AlreadyInArena,
    #[error("Player is not in an arena")]
    NotInArena,
    #[error("Invalid arena definition: {0}")]
    InvalidDefinition(String),
    #[error("Arena error: {0}")]
    Arena(#[from] ArenaError),
}
