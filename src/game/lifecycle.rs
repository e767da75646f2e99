//! Match lifecycle controller
//!
//! Owns the registry of running matches (one per arena), their countdown
//! timers and the end-of-match bookkeeping. Drives arena transitions into
//! InGame and Ending and seeds balls through the physics engine.
//!
//! Lock order: match map, then a match, then its arena. Timers are
//! cancelled with no match lock held.

use hashbrown::HashMap;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::arena::machine::{Arena, ArenaState, MatchId};
use crate::arena::settings::LocationKey;
use crate::game::ball::Ball;
use crate::game::ball_engine::BallPhysicsEngine;
use crate::game::constants::game::*;
use crate::game::constants::{format_clock, secs_to_ticks};
use crate::game::match_result::{
    elimination_outcome, time_up_outcome, MatchLine, MatchOutcome, MatchSummary,
};
use crate::game::team::{PlayMode, Team};
use crate::host::clock::TaskHandle;
use crate::host::Context;
use crate::util::vec3::Vec3;

/// Match phase, tracked separately from the arena state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Preparing,
    Active,
    Ended,
}

/// Why a match could not start
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("A match is already running in this arena")]
    AlreadyRunning,
    #[error("Cannot start a match while the arena is {state:?}")]
    InvalidTransition { state: ArenaState },
    #[error("Arena is missing location {0}")]
    MissingSetupLocation(LocationKey),
}

/// A running (or just finished) match
pub struct Match {
    pub id: MatchId,
    pub arena: Arc<Arena>,
    pub mode: PlayMode,
    pub phase: MatchPhase,
    pub remaining_secs: u32,
    pub timer: Option<TaskHandle>,
    pub outcome: Option<MatchOutcome>,
    pub started_at_ms: u64,
}

/// Read-only view of a match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInfo {
    pub id: MatchId,
    pub arena: String,
    pub mode: PlayMode,
    pub phase: MatchPhase,
    pub remaining_secs: u32,
    pub outcome: Option<MatchOutcome>,
    pub started_at_ms: u64,
}

/// Starts, times and ends matches
pub struct MatchController {
    ctx: Context,
    engine: Arc<BallPhysicsEngine>,
    matches: Mutex<HashMap<String, Arc<Mutex<Match>>>>,
    next_id: AtomicU64,
    reset_delay_ticks: u64,
    completed: AtomicU64,
}

impl MatchController {
    pub fn new(ctx: Context, engine: Arc<BallPhysicsEngine>, reset_delay_secs: u64) -> Self {
        Self {
            reset_delay_ticks: secs_to_ticks(reset_delay_secs, ctx.clock.tick_rate()),
            ctx,
            engine,
            matches: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            completed: AtomicU64::new(0),
        }
    }

    /// Start a match in `arena`
    pub fn start(self: &Arc<Self>, arena: &Arc<Arena>) -> Result<MatchId, StartError> {
        let mut matches = self.matches.lock();
        if matches.contains_key(arena.id()) {
            return Err(StartError::AlreadyRunning);
        }

        let state = arena.state();
        if !matches!(state, ArenaState::Waiting | ArenaState::Starting) {
            return Err(StartError::InvalidTransition { state });
        }

        let spawns = arena
            .location(LocationKey::Team1Spawn)
            .ok_or(StartError::MissingSetupLocation(LocationKey::Team1Spawn))
            .and_then(|red| {
                arena
                    .location(LocationKey::Team2Spawn)
                    .map(|blue| (red, blue))
                    .ok_or(StartError::MissingSetupLocation(LocationKey::Team2Spawn))
            });
        let (red_spawn, blue_spawn) = match spawns {
            Ok(spawns) => spawns,
            Err(e) => {
                warn!("Arena {} cannot start: {}", arena.id(), e);
                return Err(e);
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = self.ctx.clock.now_millis();
        let settings = arena.settings();

        arena.set_state(ArenaState::InGame);
        let teleports = arena.with_state(|inner| {
            let mut teleports = Vec::with_capacity(inner.roster.len());
            for participant in &mut inner.roster {
                participant.reset();
                participant.projectiles = STARTING_PROJECTILES;
                let spawn = match participant.team {
                    Some(Team::Red) => Some(red_spawn),
                    Some(Team::Blue) => Some(blue_spawn),
                    _ => None,
                };
                if let Some(spawn) = spawn {
                    participant.position = spawn;
                    teleports.push((participant.id, spawn));
                }
            }
            inner.current_match = Some(id);
            teleports
        });
        for (player, location) in teleports {
            self.ctx.presentation.teleport(player, location);
        }

        if let Some(center) = arena.location(LocationKey::Center) {
            let mut rng = rand::thread_rng();
            for _ in 0..NEUTRAL_BALL_COUNT {
                let offset = Vec3::new(
                    rng.gen_range(-NEUTRAL_BALL_JITTER..NEUTRAL_BALL_JITTER),
                    NEUTRAL_BALL_LIFT,
                    rng.gen_range(-NEUTRAL_BALL_JITTER..NEUTRAL_BALL_JITTER),
                );
                self.engine.spawn(Ball::neutral(
                    arena.clone(),
                    center + offset,
                    Vec3::ZERO,
                    settings.ball_model,
                    now,
                ));
            }
        }

        let controller = self.clone();
        let arena_id = arena.id().to_string();
        let timer = self.ctx.clock.schedule_repeating(
            secs_to_ticks(1, self.ctx.clock.tick_rate()),
            Arc::new(move || controller.on_second(&arena_id)),
        );

        matches.insert(
            arena.id().to_string(),
            Arc::new(Mutex::new(Match {
                id,
                arena: arena.clone(),
                mode: arena.mode(),
                phase: MatchPhase::Active,
                remaining_secs: settings.game_duration_secs,
                timer: Some(timer),
                outcome: None,
                started_at_ms: now,
            })),
        );
        drop(matches);

        arena.broadcast("GAME STARTED!");
        info!(
            "Match {} started in arena {} ({} players, {}s)",
            id,
            arena.id(),
            arena.player_count(),
            settings.game_duration_secs
        );
        Ok(id)
    }

    /// Countdown step, once per second
    fn on_second(self: &Arc<Self>, arena_id: &str) {
        let Some(current) = self.get(arena_id) else {
            return;
        };

        let decided = {
            let mut m = current.lock();
            if m.phase != MatchPhase::Active {
                return;
            }
            m.remaining_secs = m.remaining_secs.saturating_sub(1);
            let (red, blue) = m.arena.alive_counts();

            if m.remaining_secs == 0 {
                m.arena.broadcast("TIME'S UP!");
                Some(time_up_outcome(red, blue))
            } else {
                if TIME_WARNINGS.contains(&m.remaining_secs) {
                    m.arena
                        .broadcast(&format!("{} seconds remaining!", m.remaining_secs));
                }
                m.arena.action_bar(&format!(
                    "Time {} | Red {} | Blue {}",
                    format_clock(m.remaining_secs as u64),
                    red,
                    blue
                ));
                elimination_outcome(red, blue)
            }
        };

        if let Some(outcome) = decided {
            self.end(arena_id, Some(outcome));
        }
    }

    /// Evaluate the elimination condition and end the match when decided
    pub fn check_win(self: &Arc<Self>, arena_id: &str) -> Option<MatchOutcome> {
        let current = self.get(arena_id)?;
        let outcome = {
            let m = current.lock();
            if m.phase != MatchPhase::Active {
                return None;
            }
            let (red, blue) = m.arena.alive_counts();
            elimination_outcome(red, blue)?
        };
        self.end(arena_id, Some(outcome));
        Some(outcome)
    }

    /// End the match in `arena_id`
    ///
    /// Idempotent: returns `None` when no match is running there. An
    /// undecided match ends in a draw.
    pub fn end(
        self: &Arc<Self>,
        arena_id: &str,
        outcome: Option<MatchOutcome>,
    ) -> Option<MatchSummary> {
        let current = self.get(arena_id)?;

        let (id, arena, timer, outcome, started_at) = {
            let mut m = current.lock();
            if m.phase == MatchPhase::Ended {
                return None;
            }
            m.phase = MatchPhase::Ended;
            let outcome = outcome.or(m.outcome).unwrap_or(MatchOutcome::Draw);
            m.outcome = Some(outcome);
            (m.id, m.arena.clone(), m.timer.take(), outcome, m.started_at_ms)
        };

        if let Some(timer) = timer {
            self.ctx.clock.cancel(timer);
        }
        arena.set_state(ArenaState::Ending);

        let duration_ms = self.ctx.clock.now_millis().saturating_sub(started_at);
        let summary = MatchSummary {
            arena: arena.id().to_string(),
            outcome,
            duration_ms,
            lines: arena
                .snapshot()
                .players
                .iter()
                .map(MatchLine::from_snapshot)
                .collect(),
        };
        for line in summary.broadcast_lines() {
            arena.broadcast(&line);
        }

        let records = arena.with_state(|inner| {
            inner
                .roster
                .iter_mut()
                .map(|participant| {
                    match outcome.winner() {
                        Some(winner) if participant.team == Some(winner) => {
                            participant.stats.record_win()
                        }
                        Some(_) => participant.stats.record_loss(),
                        None => {}
                    }
                    participant.stats.add_playtime(duration_ms);
                    (participant.id, participant.stats)
                })
                .collect::<Vec<_>>()
        });
        for (player, stats) in records {
            if let Err(e) = self.ctx.persistence.save_counters(player, &stats) {
                warn!("Failed to save stats for {}: {}", player, e);
            }
        }

        self.engine.despawn_arena(arena.id());
        arena.reset_members();

        {
            let mut matches = self.matches.lock();
            if matches
                .get(arena.id())
                .is_some_and(|m| Arc::ptr_eq(m, &current))
            {
                matches.remove(arena.id());
            }
        }
        arena.detach_match(id);
        self.completed.fetch_add(1, Ordering::Relaxed);

        let resetting = arena.clone();
        self.ctx.clock.schedule_once(
            self.reset_delay_ticks,
            Arc::new(move || {
                if resetting.state() != ArenaState::Ending {
                    return;
                }
                resetting.set_state(ArenaState::Resetting);
                resetting.teleport_all(LocationKey::Lobby);
                debug!("Arena {} reset", resetting.id());
            }),
        );

        info!(
            "Match {} in arena {} ended: {:?} after {}",
            id,
            arena.id(),
            outcome,
            format_clock(duration_ms / 1000)
        );
        Some(summary)
    }

    fn get(&self, arena_id: &str) -> Option<Arc<Mutex<Match>>> {
        self.matches.lock().get(arena_id).cloned()
    }

    pub fn is_running(&self, arena_id: &str) -> bool {
        self.get(arena_id)
            .is_some_and(|m| m.lock().phase == MatchPhase::Active)
    }

    pub fn info(&self, arena_id: &str) -> Option<MatchInfo> {
        let current = self.get(arena_id)?;
        let m = current.lock();
        Some(MatchInfo {
            id: m.id,
            arena: m.arena.id().to_string(),
            mode: m.mode,
            phase: m.phase,
            remaining_secs: m.remaining_secs,
            outcome: m.outcome,
            started_at_ms: m.started_at_ms,
        })
    }

    pub fn running_count(&self) -> usize {
        self.matches.lock().len()
    }

    /// Arena ids with a registered match
    pub fn running_arenas(&self) -> Vec<String> {
        self.matches.lock().keys().cloned().collect()
    }

    /// Matches ended since startup
    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}
