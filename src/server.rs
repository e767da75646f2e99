//! Server orchestrator
//!
//! Owns the arena registry, the match controller and the ball engine, runs
//! the physics driver on the injected clock and exposes the player and
//! admin operations the hosting world calls into.
//!
//! Lock order: registry, then arena. The registry lock is never held while
//! calling into the match controller or cancelling a clock task.

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::arena::machine::{Arena, ArenaError, ArenaState, Departure, MatchId};
use crate::arena::registry::{ArenaInfo, ArenaRegistry, RegistryError};
use crate::arena::settings::{ArenaDefinition, LocationKey};
use crate::config::ServerConfig;
use crate::game::ball::Ball;
use crate::game::ball_engine::{BallEvent, BallPhysicsEngine};
use crate::game::constants::secs_to_ticks;
use crate::game::lifecycle::{MatchController, StartError};
use crate::game::match_result::MatchSummary;
use crate::game::participant::{Participant, ParticipantId};
use crate::game::stats::PlayerStats;
use crate::game::systems::kinematics::launch_velocity;
use crate::host::clock::TaskHandle;
use crate::host::persistence::PersistenceError;
use crate::host::presentation::Effect;
use crate::host::Context;
use crate::metrics::Metrics;
use crate::util::vec3::Vec3;

/// Admin operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Start(#[from] StartError),
    #[error("No players in arena")]
    EmptyArena,
    #[error("No match is running in this arena")]
    NoMatchRunning,
}

/// Point-in-time server totals, logged periodically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSummary {
    pub arenas: usize,
    pub players: usize,
    pub matches_running: usize,
    pub active_balls: usize,
    pub matches_completed: u64,
}

pub struct DodgeballServer {
    ctx: Context,
    config: ServerConfig,
    arenas: RwLock<ArenaRegistry>,
    engine: Arc<BallPhysicsEngine>,
    matches: Arc<MatchController>,
    metrics: Arc<Metrics>,
    driver: Mutex<Option<TaskHandle>>,
    countdowns: Mutex<HashMap<String, TaskHandle>>,
}

impl DodgeballServer {
    pub fn new(ctx: Context, config: ServerConfig, metrics: Arc<Metrics>) -> Arc<Self> {
        let engine = Arc::new(BallPhysicsEngine::new(ctx.clone()));
        let matches = Arc::new(MatchController::new(
            ctx.clone(),
            engine.clone(),
            config.reset_delay_secs,
        ));
        Arc::new(Self {
            arenas: RwLock::new(ArenaRegistry::new(ctx.clone(), config.max_arenas)),
            ctx,
            config,
            engine,
            matches,
            metrics,
            driver: Mutex::new(None),
            countdowns: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<BallPhysicsEngine> {
        &self.engine
    }

    pub fn matches(&self) -> &Arc<MatchController> {
        &self.matches
    }

    pub fn arena(&self, id: &str) -> Option<Arc<Arena>> {
        self.arenas.read().get(id)
    }

    pub fn arena_of(&self, player: ParticipantId) -> Option<Arc<Arena>> {
        self.arenas.read().arena_of(player)
    }

    pub fn list_arenas(&self) -> Vec<ArenaInfo> {
        self.arenas.read().list()
    }

    fn require_arena(&self, id: &str) -> Result<Arc<Arena>, ServerError> {
        self.arena(id)
            .ok_or(ServerError::Registry(RegistryError::ArenaNotFound))
    }

    // ---- Arena administration ----

    /// Register a new arena and store its definition
    pub fn create_arena(&self, definition: &ArenaDefinition) -> Result<Arc<Arena>, ServerError> {
        let arena = self.arenas.write().create(definition)?;
        self.store_definition(&arena);
        Ok(arena)
    }

    /// Remove an arena: end its match, evict members and forget its definition
    pub fn delete_arena(&self, id: &str) -> Result<(), ServerError> {
        let arena = self.require_arena(id)?;
        self.cancel_countdown(id);
        self.matches.end(id, None);

        for member in arena.member_ids() {
            self.evict(member);
        }
        self.arenas.write().remove(id);
        self.engine.despawn_arena(id);

        if let Err(e) = self.ctx.persistence.delete_arena_definition(id) {
            warn!("Failed to delete stored arena {}: {}", id, e);
        }
        Ok(())
    }

    /// Register every stored arena definition; invalid ones are skipped
    pub fn load_arenas(&self) -> Result<usize, PersistenceError> {
        let definitions = self.ctx.persistence.load_arena_definitions()?;
        let mut loaded = 0;
        {
            let mut registry = self.arenas.write();
            for definition in &definitions {
                match registry.create(definition) {
                    Ok(_) => loaded += 1,
                    Err(e) => warn!("Skipping stored arena {}: {}", definition.id, e),
                }
            }
        }
        info!("Loaded {} of {} stored arenas", loaded, definitions.len());
        Ok(loaded)
    }

    /// Store every arena definition; returns how many were saved
    pub fn save_arenas(&self) -> usize {
        let arenas = self.arenas.read().arenas();
        arenas
            .iter()
            .filter(|arena| self.store_definition(arena))
            .count()
    }

    pub fn set_location(
        &self,
        arena_id: &str,
        key: LocationKey,
        position: Vec3,
    ) -> Result<(), ServerError> {
        let arena = self.require_arena(arena_id)?;
        arena.set_location(key, position);
        self.store_definition(&arena);
        Ok(())
    }

    /// Enable (Disabled -> Waiting) or disable an arena; returns whether it changed
    pub fn set_enabled(&self, arena_id: &str, enabled: bool) -> Result<bool, ServerError> {
        let arena = self.require_arena(arena_id)?;
        let changed = if enabled {
            arena.state() == ArenaState::Disabled && arena.set_state(ArenaState::Waiting)
        } else {
            self.cancel_countdown(arena_id);
            self.matches.end(arena_id, None);
            arena.set_state(ArenaState::Disabled)
        };
        if changed {
            info!(
                "Arena {} {}",
                arena_id,
                if enabled { "enabled" } else { "disabled" }
            );
            self.store_definition(&arena);
        }
        Ok(changed)
    }

    pub fn force_start(self: &Arc<Self>, arena_id: &str) -> Result<MatchId, ServerError> {
        let arena = self.require_arena(arena_id)?;
        if arena.player_count() == 0 {
            return Err(ServerError::EmptyArena);
        }
        self.cancel_countdown(arena_id);
        Ok(self.matches.start(&arena)?)
    }

    /// End the running match; undecided matches end in a draw
    pub fn force_end(&self, arena_id: &str) -> Result<MatchSummary, ServerError> {
        self.require_arena(arena_id)?;
        self.matches
            .end(arena_id, None)
            .ok_or(ServerError::NoMatchRunning)
    }

    // ---- Player operations ----

    /// Add a player to an arena, loading their stored counters
    pub fn join(self: &Arc<Self>, arena_id: &str, player: ParticipantId, name: &str) -> bool {
        let Some(arena) = self.arena(arena_id) else {
            self.ctx.presentation.message(player, "Arena not found!");
            return false;
        };
        if !arena.is_setup() {
            self.ctx.presentation.message(player, "This arena is not set up!");
            return false;
        }

        let stats = match self.ctx.persistence.load_counters(player) {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Failed to load stats for {}: {}", player, e);
                PlayerStats::default()
            }
        };

        let result = self
            .arenas
            .write()
            .join(arena_id, Participant::new(player, name.to_string(), stats));

        match result {
            Ok(outcome) => {
                self.ctx
                    .presentation
                    .message(player, &format!("Joined arena: {}", arena.name()));
                if outcome.became_ready {
                    self.schedule_countdown(&arena);
                }
                true
            }
            Err(e) => {
                debug!("{} could not join arena {}: {}", name, arena_id, e);
                let reason = match e {
                    RegistryError::Arena(ArenaError::CapacityExceeded) => "Arena is full!",
                    RegistryError::Arena(ArenaError::InvalidTransition { .. }) => {
                        "Game already in progress!"
                    }
                    RegistryError::AlreadyInArena => "You are already in an arena!",
                    _ => "Failed to join arena!",
                };
                self.ctx.presentation.message(player, reason);
                false
            }
        }
    }

    /// Remove a player from their arena, saving their counters
    pub fn leave(&self, player: ParticipantId) -> bool {
        let Some((arena, departure)) = self.evict(player) else {
            return false;
        };

        if departure.needs_win_check {
            self.matches.check_win(arena.id());
        }
        if departure.became_waiting {
            self.cancel_countdown(arena.id());
        }
        self.ctx.presentation.message(player, "You left the arena.");
        true
    }

    /// A disconnect is an ordinary leave
    pub fn disconnect(&self, player: ParticipantId) -> bool {
        self.leave(player)
    }

    fn evict(&self, player: ParticipantId) -> Option<(Arc<Arena>, Departure)> {
        let result = self.arenas.write().leave(player);
        match result {
            Ok((arena, departure)) => {
                self.save_counters(player, &departure.participant.stats);
                Some((arena, departure))
            }
            Err(e) => {
                debug!("Leave for {} ignored: {}", player, e);
                None
            }
        }
    }

    /// Throw one held ball from the player's eye point
    pub fn throw_ball(&self, player: ParticipantId, direction: Vec3) -> bool {
        if !direction.is_finite() || direction.length_sq() == 0.0 {
            return false;
        }
        let Some(arena) = self.arena_of(player) else {
            return false;
        };
        if !self.matches.is_running(arena.id()) {
            return false;
        }

        let now = self.ctx.clock.now_millis();
        let thrown = arena.with_state(|inner| {
            if inner.state != ArenaState::InGame {
                return None;
            }
            let settings = inner.settings;
            let thrower = inner.member_mut(player)?;
            if !thrower.alive || thrower.projectiles == 0 {
                return None;
            }
            thrower.projectiles -= 1;
            thrower.balls_thrown += 1;
            thrower.stats.throws += 1;

            let origin = thrower.eye_position();
            let ball = Ball::thrown(
                arena.clone(),
                thrower,
                origin,
                launch_velocity(direction, settings.ball_speed),
                settings.ball_model,
                now,
            );
            Some((origin, ball))
        });

        let Some((origin, ball)) = thrown else {
            return false;
        };
        let id = self.engine.spawn(ball);
        // A match ending meanwhile has already swept the arena's balls
        if arena.state() != ArenaState::InGame {
            self.engine.remove(id);
            return false;
        }
        self.ctx.presentation.play_effect(origin, Effect::Throw);
        self.metrics.throws.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Movement reported by the hosting world
    ///
    /// While a match runs, a position outside the arena bounds is refused
    /// and the stored position stays as it was.
    pub fn update_position(&self, player: ParticipantId, position: Vec3) -> bool {
        if !position.is_finite() {
            return false;
        }
        let Some(arena) = self.arena_of(player) else {
            return false;
        };

        let accepted = arena.with_state(|inner| {
            if inner.state == ArenaState::InGame {
                let bounds = (
                    inner.locations.get(&LocationKey::MinBound).copied(),
                    inner.locations.get(&LocationKey::MaxBound).copied(),
                );
                if let (Some(min), Some(max)) = bounds {
                    if !position.within(min, max) {
                        return false;
                    }
                }
            }
            match inner.member_mut(player) {
                Some(participant) => {
                    participant.position = position;
                    true
                }
                None => false,
            }
        });

        if !accepted {
            self.ctx.presentation.action_bar(
                arena.id(),
                &[player],
                "You can't leave the arena!",
            );
        }
        accepted
    }

    // ---- Driver ----

    /// One physics step; hits trigger the win check of their arena
    pub fn tick(&self) -> Vec<BallEvent> {
        let start = Instant::now();
        let events = self.engine.tick();

        let mut hit_arenas: Vec<&str> = Vec::new();
        for event in &events {
            match event {
                BallEvent::Hit { arena, .. } => {
                    self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                    if !hit_arenas.contains(&arena.as_str()) {
                        hit_arenas.push(arena);
                    }
                }
                BallEvent::Caught { .. } => {
                    self.metrics.catches.fetch_add(1, Ordering::Relaxed);
                }
                BallEvent::PickedUp { .. } => {
                    self.metrics.pickups.fetch_add(1, Ordering::Relaxed);
                }
                BallEvent::Faulted { .. } => {
                    self.metrics.ball_faults.fetch_add(1, Ordering::Relaxed);
                }
                BallEvent::Expired { .. } => {}
            }
        }
        for arena in hit_arenas {
            self.matches.check_win(arena);
        }

        self.metrics.record_tick_time(start.elapsed());
        self.refresh_gauges();
        events
    }

    /// Schedule the physics driver on the clock
    pub fn run(self: &Arc<Self>) {
        let mut driver = self.driver.lock();
        if driver.is_some() {
            return;
        }
        let server = self.clone();
        *driver = Some(
            self.ctx
                .clock
                .schedule_repeating(1, Arc::new(move || {
                    server.tick();
                })),
        );
        info!("Physics driver running at {} Hz", self.config.tick_rate);
    }

    /// Stop the driver, end every match and evict every player
    pub fn shutdown(&self) {
        let driver = self.driver.lock().take();
        if let Some(handle) = driver {
            self.ctx.clock.cancel(handle);
        }
        let countdowns: Vec<TaskHandle> = self.countdowns.lock().drain().map(|(_, h)| h).collect();
        for handle in countdowns {
            self.ctx.clock.cancel(handle);
        }

        for arena_id in self.matches.running_arenas() {
            self.matches.end(&arena_id, None);
        }
        self.engine.clear();
        let saved = self.save_arenas();

        let players = self.arenas.read().player_ids();
        for player in &players {
            self.evict(*player);
        }
        self.refresh_gauges();
        info!(
            "Shutdown complete: {} arenas saved, {} players evicted",
            saved,
            players.len()
        );
    }

    pub fn summary(&self) -> ServerSummary {
        let (arenas, players) = {
            let registry = self.arenas.read();
            (registry.arena_count(), registry.player_count())
        };
        ServerSummary {
            arenas,
            players,
            matches_running: self.matches.running_count(),
            active_balls: self.engine.active_count(),
            matches_completed: self.matches.completed_count(),
        }
    }

    fn refresh_gauges(&self) {
        let summary = self.summary();
        self.metrics.arenas.store(summary.arenas as u64, Ordering::Relaxed);
        self.metrics.participants.store(summary.players as u64, Ordering::Relaxed);
        self.metrics
            .matches_running
            .store(summary.matches_running as u64, Ordering::Relaxed);
        self.metrics
            .active_balls
            .store(summary.active_balls as u64, Ordering::Relaxed);
        self.metrics
            .matches_completed
            .store(summary.matches_completed, Ordering::Relaxed);
    }

    // ---- Lobby countdown ----

    fn schedule_countdown(self: &Arc<Self>, arena: &Arc<Arena>) {
        self.cancel_countdown(arena.id());

        let server = self.clone();
        let arena_id = arena.id().to_string();
        let handle = self.ctx.clock.schedule_once(
            secs_to_ticks(self.config.start_countdown_secs, self.ctx.clock.tick_rate()),
            Arc::new(move || server.countdown_elapsed(&arena_id)),
        );
        self.countdowns.lock().insert(arena.id().to_string(), handle);
        debug!(
            "Arena {} starting in {}s",
            arena.id(),
            self.config.start_countdown_secs
        );
    }

    fn cancel_countdown(&self, arena_id: &str) {
        let handle = self.countdowns.lock().remove(arena_id);
        if let Some(handle) = handle {
            self.ctx.clock.cancel(handle);
        }
    }

    fn countdown_elapsed(&self, arena_id: &str) {
        self.countdowns.lock().remove(arena_id);
        let Some(arena) = self.arena(arena_id) else {
            return;
        };
        if arena.state() != ArenaState::Starting {
            return;
        }
        if let Err(e) = self.matches.start(&arena) {
            debug!("Countdown in arena {} ended without a match: {}", arena_id, e);
        }
    }

    // ---- Persistence helpers ----

    fn save_counters(&self, player: ParticipantId, stats: &PlayerStats) {
        if let Err(e) = self.ctx.persistence.save_counters(player, stats) {
            warn!("Failed to save stats for {}: {}", player, e);
        }
    }

    fn store_definition(&self, arena: &Arena) -> bool {
        match self.ctx.persistence.save_arena_definition(&arena.definition()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to save arena {}: {}", arena.id(), e);
                false
            }
        }
    }
}
