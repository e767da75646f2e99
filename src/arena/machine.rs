//! Per-arena lifecycle state machine
//!
//! All mutable arena state sits behind one mutex. Callers never hold the
//! guard themselves: they go through the operations below, or through
//! [`Arena::with_state`] for a closure-scoped section. Presentation calls
//! are issued after the section is released.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::arena::settings::{ArenaDefinition, ArenaSettings, LocationKey};
use crate::game::participant::{Participant, ParticipantId, ParticipantSnapshot};
use crate::game::team::{PlayMode, Team};
use crate::host::Context;
use crate::util::vec3::Vec3;

/// Identifier of a running match
pub type MatchId = u64;

/// Arena lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArenaState {
    /// Waiting for players
    Waiting,
    /// Enough players, lobby countdown running
    Starting,
    /// Match in progress
    InGame,
    /// Match over, showing results
    Ending,
    /// Clearing per-match state
    Resetting,
    /// Closed by an admin; excluded from automatic transitions
    Disabled,
}

impl ArenaState {
    /// Whether players may join in this state
    pub fn accepts_joins(&self) -> bool {
        matches!(self, ArenaState::Waiting | ArenaState::Starting)
    }
}

/// Arena errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    #[error("Arena is full")]
    CapacityExceeded,
    #[error("Not allowed while the arena is {state:?}")]
    InvalidTransition { state: ArenaState },
    #[error("Player is already in this arena")]
    AlreadyPresent,
    #[error("Player is not in this arena")]
    NotPresent,
}

/// Result of a successful join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// The join moved the arena from Waiting to Starting
    pub became_ready: bool,
    pub player_count: usize,
}

/// Result of a leave
#[derive(Debug, Clone)]
pub struct Departure {
    pub participant: Participant,
    /// The arena was InGame, so the win condition must be re-checked
    pub needs_win_check: bool,
    /// The leave dropped a Starting arena back to Waiting
    pub became_waiting: bool,
}

/// Mutable arena state guarded by the arena mutex
#[derive(Debug)]
pub struct ArenaInner {
    pub state: ArenaState,
    pub locations: BTreeMap<LocationKey, Vec3>,
    pub settings: ArenaSettings,
    /// Join order
    pub roster: Vec<Participant>,
    pub red: Vec<ParticipantId>,
    pub blue: Vec<ParticipantId>,
    pub spectators: Vec<ParticipantId>,
    pub current_match: Option<MatchId>,
}

impl ArenaInner {
    pub fn member(&self, id: ParticipantId) -> Option<&Participant> {
        self.roster.iter().find(|p| p.id == id)
    }

    pub fn member_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.roster.iter_mut().find(|p| p.id == id)
    }

    pub fn member_ids(&self) -> Vec<ParticipantId> {
        self.roster.iter().map(|p| p.id).collect()
    }

    /// Alive members of a playing team
    pub fn alive_count(&self, team: Team) -> usize {
        let ids = match team {
            Team::Red => &self.red,
            Team::Blue => &self.blue,
            Team::Spectator => &self.spectators,
        };
        ids.iter()
            .filter_map(|id| self.member(*id))
            .filter(|p| p.alive)
            .count()
    }

    pub fn team_members(&self, team: Team) -> &[ParticipantId] {
        match team {
            Team::Red => &self.red,
            Team::Blue => &self.blue,
            Team::Spectator => &self.spectators,
        }
    }

    /// Reassign Red and Blue by join-order parity
    fn balance_teams(&mut self) {
        self.red.clear();
        self.blue.clear();
        let ArenaInner {
            roster,
            red,
            blue,
            spectators,
            ..
        } = self;
        for (index, participant) in roster.iter_mut().enumerate() {
            let team = if index % 2 == 0 { Team::Red } else { Team::Blue };
            participant.team = Some(team);
            match team {
                Team::Red => red.push(participant.id),
                _ => blue.push(participant.id),
            }
        }
        let ids: Vec<_> = roster.iter().map(|p| p.id).collect();
        spectators.retain(|id| !red.contains(id) && !blue.contains(id) && ids.contains(id));
    }

    fn reset_members(&mut self) {
        for participant in &mut self.roster {
            participant.reset();
        }
    }
}

/// Read-only copy of an arena
#[derive(Debug, Clone)]
pub struct ArenaSnapshot {
    pub id: String,
    pub name: String,
    pub state: ArenaState,
    pub min_players: usize,
    pub max_players: usize,
    pub mode: PlayMode,
    pub players: Vec<ParticipantSnapshot>,
    pub red: Vec<ParticipantId>,
    pub blue: Vec<ParticipantId>,
    pub spectators: Vec<ParticipantId>,
    pub current_match: Option<MatchId>,
    pub settings: ArenaSettings,
    pub locations: BTreeMap<LocationKey, Vec3>,
}

/// One arena
pub struct Arena {
    id: String,
    name: String,
    min_players: usize,
    max_players: usize,
    mode: PlayMode,
    inner: Mutex<ArenaInner>,
    ctx: Context,
}

impl Arena {
    pub fn new(definition: &ArenaDefinition, ctx: Context) -> Self {
        let state = if definition.enabled {
            ArenaState::Waiting
        } else {
            ArenaState::Disabled
        };
        Self {
            id: definition.id.clone(),
            name: definition.name.clone(),
            min_players: definition.min_players,
            max_players: definition.max_players,
            mode: definition.mode,
            inner: Mutex::new(ArenaInner {
                state,
                locations: definition.locations.clone(),
                settings: definition.settings,
                roster: Vec::new(),
                red: Vec::new(),
                blue: Vec::new(),
                spectators: Vec::new(),
                current_match: None,
            }),
            ctx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_players(&self) -> usize {
        self.min_players
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn state(&self) -> ArenaState {
        self.inner.lock().state
    }

    pub fn player_count(&self) -> usize {
        self.inner.lock().roster.len()
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.inner.lock().member(id).is_some()
    }

    pub fn member_ids(&self) -> Vec<ParticipantId> {
        self.inner.lock().member_ids()
    }

    pub fn participant(&self, id: ParticipantId) -> Option<ParticipantSnapshot> {
        self.inner.lock().member(id).map(Participant::snapshot)
    }

    pub fn settings(&self) -> ArenaSettings {
        self.inner.lock().settings
    }

    pub fn location(&self, key: LocationKey) -> Option<Vec3> {
        self.inner.lock().locations.get(&key).copied()
    }

    pub fn set_location(&self, key: LocationKey, position: Vec3) {
        self.inner.lock().locations.insert(key, position);
        debug!("Arena {} location {} set to {:?}", self.id, key, position);
    }

    /// All required locations are present
    pub fn is_setup(&self) -> bool {
        let inner = self.inner.lock();
        LocationKey::REQUIRED
            .iter()
            .all(|key| inner.locations.contains_key(key))
    }

    pub fn current_match(&self) -> Option<MatchId> {
        self.inner.lock().current_match
    }

    /// (red alive, blue alive)
    pub fn alive_counts(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.alive_count(Team::Red), inner.alive_count(Team::Blue))
    }

    /// Run `f` inside the arena's exclusive section
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ArenaInner) -> R) -> R {
        let mut inner = self.inner.lock();
        f(&mut inner)
    }

    pub fn snapshot(&self) -> ArenaSnapshot {
        let inner = self.inner.lock();
        ArenaSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            state: inner.state,
            min_players: self.min_players,
            max_players: self.max_players,
            mode: self.mode,
            players: inner.roster.iter().map(Participant::snapshot).collect(),
            red: inner.red.clone(),
            blue: inner.blue.clone(),
            spectators: inner.spectators.clone(),
            current_match: inner.current_match,
            settings: inner.settings,
            locations: inner.locations.clone(),
        }
    }

    /// Definition reflecting the current locations and enabled flag
    pub fn definition(&self) -> ArenaDefinition {
        let inner = self.inner.lock();
        ArenaDefinition {
            id: self.id.clone(),
            name: self.name.clone(),
            min_players: self.min_players,
            max_players: self.max_players,
            mode: self.mode,
            enabled: inner.state != ArenaState::Disabled,
            locations: inner.locations.clone(),
            settings: inner.settings,
        }
    }

    /// Add a participant
    pub fn join(&self, participant: Participant) -> Result<JoinOutcome, ArenaError> {
        let name = participant.name.clone();
        let (outcome, recipients, starting) = {
            let mut inner = self.inner.lock();

            if inner.roster.len() >= self.max_players {
                return Err(ArenaError::CapacityExceeded);
            }
            if !inner.state.accepts_joins() {
                return Err(ArenaError::InvalidTransition { state: inner.state });
            }
            if inner.member(participant.id).is_some() {
                return Err(ArenaError::AlreadyPresent);
            }

            inner.roster.push(participant);
            inner.balance_teams();

            let player_count = inner.roster.len();
            let became_ready =
                player_count >= self.min_players && inner.state == ArenaState::Waiting;
            if became_ready {
                inner.state = ArenaState::Starting;
                inner.balance_teams();
            }
            (
                JoinOutcome {
                    became_ready,
                    player_count,
                },
                inner.member_ids(),
                became_ready,
            )
        };

        debug!(
            "{} joined arena {} ({}/{})",
            name, self.id, outcome.player_count, self.max_players
        );
        self.broadcast_to(
            &recipients,
            &format!("{} joined! ({}/{})", name, outcome.player_count, self.max_players),
        );
        if starting {
            debug!("Arena {} Waiting -> Starting", self.id);
            self.broadcast_to(&recipients, "Game starting soon!");
        }
        Ok(outcome)
    }

    /// Remove a participant
    pub fn leave(&self, id: ParticipantId) -> Result<Departure, ArenaError> {
        let (departure, recipients) = {
            let mut inner = self.inner.lock();
            let index = inner
                .roster
                .iter()
                .position(|p| p.id == id)
                .ok_or(ArenaError::NotPresent)?;

            let participant = inner.roster.remove(index);
            inner.red.retain(|p| *p != id);
            inner.blue.retain(|p| *p != id);
            inner.spectators.retain(|p| *p != id);

            let needs_win_check = inner.state == ArenaState::InGame;
            let became_waiting =
                inner.state == ArenaState::Starting && inner.roster.len() < self.min_players;
            if became_waiting {
                inner.state = ArenaState::Waiting;
            }

            (
                Departure {
                    participant,
                    needs_win_check,
                    became_waiting,
                },
                inner.member_ids(),
            )
        };

        debug!(
            "{} left arena {} ({}/{})",
            departure.participant.name,
            self.id,
            recipients.len(),
            self.max_players
        );
        self.broadcast_to(
            &recipients,
            &format!(
                "{} left! ({}/{})",
                departure.participant.name,
                recipients.len(),
                self.max_players
            ),
        );
        if departure.became_waiting {
            debug!("Arena {} Starting -> Waiting", self.id);
        }
        Ok(departure)
    }

    /// Transition to `new`, running its entry hook; returns false when unchanged
    pub fn set_state(&self, new: ArenaState) -> bool {
        let (old, recipients) = {
            let mut inner = self.inner.lock();
            let old = inner.state;
            if old == new {
                return false;
            }
            inner.state = new;
            match new {
                ArenaState::Starting => inner.balance_teams(),
                ArenaState::Resetting => {
                    inner.reset_members();
                    inner.current_match = None;
                    inner.state = ArenaState::Waiting;
                }
                _ => {}
            }
            (old, inner.member_ids())
        };

        debug!("Arena {} {:?} -> {:?}", self.id, old, new);
        if new == ArenaState::Starting {
            self.broadcast_to(&recipients, "Game starting soon!");
        }
        true
    }

    /// Reset every member's per-match state
    pub fn reset_members(&self) {
        self.inner.lock().reset_members();
    }

    pub fn attach_match(&self, id: MatchId) {
        self.inner.lock().current_match = Some(id);
    }

    /// Clear the match reference if it is `id`
    pub fn detach_match(&self, id: MatchId) {
        let mut inner = self.inner.lock();
        if inner.current_match == Some(id) {
            inner.current_match = None;
        }
    }

    /// Send a chat line to every member
    pub fn broadcast(&self, message: &str) {
        let recipients = self.member_ids();
        self.broadcast_to(&recipients, message);
    }

    pub fn action_bar(&self, message: &str) {
        let recipients = self.member_ids();
        self.ctx
            .presentation
            .action_bar(&self.id, &recipients, message);
    }

    /// Teleport every member to a named location; false when it is unset
    pub fn teleport_all(&self, key: LocationKey) -> bool {
        let Some(target) = self.with_state(|inner| {
            let target = inner.locations.get(&key).copied()?;
            for participant in &mut inner.roster {
                participant.position = target;
            }
            Some((target, inner.member_ids()))
        }) else {
            return false;
        };

        let (location, members) = target;
        for id in members {
            self.ctx.presentation.teleport(id, location);
        }
        true
    }

    fn broadcast_to(&self, recipients: &[ParticipantId], message: &str) {
        self.ctx
            .presentation
            .broadcast(&self.id, recipients, message);
    }
}
