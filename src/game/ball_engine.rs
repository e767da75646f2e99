//! Ball physics engine
//!
//! Owns every active ball across all arenas. Each tick:
//! - snapshot the active set
//! - advance every ball in parallel (rayon), isolating panics per ball
//! - resolve player contacts inside the owning arena's section
//! - drop finished balls from the active set after the scan

use parking_lot::{Mutex, RwLock};
use hashbrown::HashMap;
use rayon::prelude::*;
use smallvec::SmallVec;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

use crate::game::ball::{Ball, BallId, BallSnapshot};
use crate::game::participant::ParticipantId;
use crate::game::systems::collision::{find_candidate, resolve_contact, ContactOutcome};
use crate::game::systems::kinematics::{self, GroundContact};
use crate::host::presentation::Effect;
use crate::host::Context;

/// Per-ball failures; the faulty ball is removed and the tick goes on
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineFault {
    #[error("Ball {0} has a non-finite position or velocity")]
    NonFinite(BallId),
    #[error("Ball {ball} panicked: {message}")]
    Panicked { ball: BallId, message: String },
}

/// Notable things that happened to a ball during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum BallEvent {
    Hit {
        arena: String,
        ball: BallId,
        victim: ParticipantId,
        thrower: Option<ParticipantId>,
    },
    Caught {
        arena: String,
        ball: BallId,
        catcher: ParticipantId,
        thrower: Option<ParticipantId>,
    },
    PickedUp {
        arena: String,
        ball: BallId,
        picker: ParticipantId,
    },
    Expired {
        arena: String,
        ball: BallId,
    },
    Faulted {
        arena: String,
        fault: EngineFault,
    },
}

type TickEvents = SmallVec<[BallEvent; 2]>;

struct BallTick {
    id: BallId,
    remove: bool,
    events: TickEvents,
}

/// Active ball registry and simulation
pub struct BallPhysicsEngine {
    ctx: Context,
    balls: RwLock<HashMap<BallId, Arc<Mutex<Ball>>>>,
}

impl BallPhysicsEngine {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            balls: RwLock::new(HashMap::new()),
        }
    }

    /// Register a ball and show it to every current member of its arena
    pub fn spawn(&self, mut ball: Ball) -> BallId {
        let id = ball.entity_id;
        let view = ball.view();
        let members = ball.arena.member_ids();
        for viewer in members {
            if ball.viewers.insert(viewer) {
                self.ctx.presentation.show_ball(&view, viewer);
            }
        }
        self.balls.write().insert(id, Arc::new(Mutex::new(ball)));
        id
    }

    /// Advance every ball one tick
    pub fn tick(&self) -> Vec<BallEvent> {
        let snapshot: Vec<(BallId, Arc<Mutex<Ball>>)> = self
            .balls
            .read()
            .iter()
            .map(|(id, ball)| (*id, ball.clone()))
            .collect();

        if snapshot.is_empty() {
            return Vec::new();
        }

        let results: Vec<BallTick> = snapshot
            .par_iter()
            .map(|(id, ball)| self.tick_isolated(*id, ball))
            .collect();

        let mut events = Vec::new();
        let mut finished = Vec::new();
        for result in results {
            if result.remove {
                finished.push(result.id);
            }
            events.extend(result.events);
        }

        if !finished.is_empty() {
            let mut balls = self.balls.write();
            for id in &finished {
                balls.remove(id);
            }
        }
        events
    }

    fn tick_isolated(&self, id: BallId, ball: &Arc<Mutex<Ball>>) -> BallTick {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut guard = ball.lock();
            self.step(&mut guard)
        }));

        match outcome {
            Ok(Ok((remove, events))) => BallTick { id, remove, events },
            Ok(Err(fault)) => self.fault(id, ball, fault),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.fault(id, ball, EngineFault::Panicked { ball: id, message })
            }
        }
    }

    fn fault(&self, id: BallId, ball: &Arc<Mutex<Ball>>, fault: EngineFault) -> BallTick {
        let arena = {
            let mut guard = ball.lock();
            guard.active = false;
            guard.arena.id().to_string()
        };
        error!("Removing ball {} in arena {}: {}", id, arena, fault);
        let mut events = TickEvents::new();
        events.push(BallEvent::Faulted { arena, fault });
        BallTick {
            id,
            remove: true,
            events,
        }
    }

    /// One simulation step; returns whether the ball is finished
    fn step(&self, ball: &mut Ball) -> Result<(bool, TickEvents), EngineFault> {
        let mut events = TickEvents::new();
        if !ball.active {
            return Ok((true, events));
        }

        ball.age_ticks += 1;
        kinematics::apply_gravity(&mut ball.velocity, ball.resting);
        kinematics::apply_air_resistance(&mut ball.velocity);

        let candidate = kinematics::candidate_position(ball.position, ball.velocity);
        if !candidate.is_finite() || !ball.velocity.is_finite() {
            return Err(EngineFault::NonFinite(ball.entity_id));
        }

        if self.ctx.environment.is_solid_or_out_of_bounds(candidate) {
            let contact = kinematics::ground_contact(&mut ball.velocity, &mut ball.resting);
            if let GroundContact::Bounce { .. } = contact {
                self.ctx.presentation.play_effect(ball.position, Effect::Bounce);
            }
        } else {
            ball.position = candidate;
        }

        let now_ms = self.ctx.clock.now_millis();
        let arena = ball.arena.clone();
        let contact = arena.with_state(|inner| {
            find_candidate(&inner.roster, ball.position)
                .map(|index| resolve_contact(ball, inner, index, now_ms))
        });

        if let Some(event) = contact.and_then(|outcome| self.dispatch_contact(ball, outcome)) {
            events.push(event);
            self.despawn(ball);
            return Ok((true, events));
        }

        let view = ball.view();
        let viewers: Vec<ParticipantId> = ball.viewers.iter().copied().collect();
        self.ctx.presentation.move_ball(&view, &viewers);

        if ball.trail_due() {
            self.ctx
                .presentation
                .play_effect(ball.position, Effect::Trail(ball.team));
        }

        if ball.should_expire() {
            self.despawn(ball);
            events.push(BallEvent::Expired {
                arena: ball.arena.id().to_string(),
                ball: ball.entity_id,
            });
            return Ok((true, events));
        }

        Ok((false, events))
    }

    /// Messages and effects for a contact, outside the arena section
    ///
    /// Returns the event for outcomes that consume the ball.
    fn dispatch_contact(&self, ball: &Ball, outcome: ContactOutcome) -> Option<BallEvent> {
        let presentation = &self.ctx.presentation;
        let arena = ball.arena.id().to_string();
        let event = match outcome {
            ContactOutcome::Hit {
                victim,
                victim_name,
                thrower,
                thrower_name,
            } => {
                presentation.message(victim, &format!("You were hit by {}!", thrower_name));
                if let Some(thrower) = thrower {
                    presentation.message(thrower, &format!("You hit {}!", victim_name));
                }
                presentation.play_effect(ball.position, Effect::Hit);
                debug!("{} hit {} in arena {}", thrower_name, victim_name, arena);
                BallEvent::Hit {
                    arena,
                    ball: ball.entity_id,
                    victim,
                    thrower,
                }
            }
            ContactOutcome::Caught {
                catcher,
                catcher_name,
                thrower,
            } => {
                presentation.message(catcher, "Nice catch!");
                if let Some(thrower) = thrower {
                    presentation.message(thrower, &format!("{} caught your ball!", catcher_name));
                }
                presentation.play_effect(ball.position, Effect::Catch);
                BallEvent::Caught {
                    arena,
                    ball: ball.entity_id,
                    catcher,
                    thrower,
                }
            }
            ContactOutcome::PickedUp { picker } => {
                presentation.play_effect(ball.position, Effect::Pickup);
                BallEvent::PickedUp {
                    arena,
                    ball: ball.entity_id,
                    picker,
                }
            }
            ContactOutcome::Ignored(_) => return None,
        };
        Some(event)
    }

    /// Hide from all viewers and deactivate
    fn despawn(&self, ball: &mut Ball) {
        for viewer in ball.viewers.drain() {
            self.ctx.presentation.hide_ball(ball.entity_id, viewer);
        }
        ball.active = false;
    }

    /// Remove one ball; returns false when it was already gone
    pub fn remove(&self, id: BallId) -> bool {
        let removed = self.balls.write().remove(&id);
        match removed {
            Some(ball) => {
                self.despawn(&mut ball.lock());
                true
            }
            None => false,
        }
    }

    /// Remove every ball belonging to `arena`; returns how many were removed
    pub fn despawn_arena(&self, arena: &str) -> usize {
        let removed: Vec<Arc<Mutex<Ball>>> = {
            let mut balls = self.balls.write();
            let ids: Vec<BallId> = balls
                .iter()
                .filter(|(_, ball)| ball.lock().arena.id() == arena)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| balls.remove(id)).collect()
        };

        for ball in &removed {
            self.despawn(&mut ball.lock());
        }
        if !removed.is_empty() {
            debug!("Despawned {} balls in arena {}", removed.len(), arena);
        }
        removed.len()
    }

    /// Remove every ball
    pub fn clear(&self) {
        let removed: Vec<_> = self.balls.write().drain().map(|(_, ball)| ball).collect();
        for ball in &removed {
            self.despawn(&mut ball.lock());
        }
    }

    pub fn active_count(&self) -> usize {
        self.balls.read().len()
    }

    pub fn arena_ball_count(&self, arena: &str) -> usize {
        self.balls
            .read()
            .values()
            .filter(|ball| ball.lock().arena.id() == arena)
            .count()
    }

    pub fn ball(&self, id: BallId) -> Option<BallSnapshot> {
        self.balls.read().get(&id).map(|ball| ball.lock().snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::machine::Arena;
    use crate::arena::settings::ArenaDefinition;
    use crate::game::constants::ball::MAX_AGE_TICKS;
    use crate::game::constants::physics::BOUNCE_FACTOR;
    use crate::game::participant::Participant;
    use crate::game::stats::PlayerStats;
    use crate::host::clock::ManualClock;
    use crate::host::environment::Environment;
    use crate::host::persistence::MemoryPersistence;
    use crate::host::presentation::{ChannelPresentation, PresentationEvent};
    use crate::host::testing::TestHost;
    use crate::util::vec3::Vec3;
    use uuid::Uuid;

    fn arena(host: &TestHost) -> Arc<Arena> {
        Arc::new(Arena::new(
            &ArenaDefinition::new("court", "Court").with_capacity(2, 4),
            host.ctx.clone(),
        ))
    }

    fn join(arena: &Arena, name: &str, position: Vec3) -> ParticipantId {
        let mut p = Participant::new(Uuid::new_v4(), name.to_string(), PlayerStats::default());
        p.position = position;
        let id = p.id;
        arena.join(p).unwrap();
        id
    }

    fn high_ball(arena: &Arc<Arena>) -> Ball {
        Ball::neutral(
            arena.clone(),
            Vec3::new(0.0, 10_000.0, 0.0),
            Vec3::new(0.5, 0.0, 0.0),
            1,
            0,
        )
    }

    #[test]
    fn test_spawn_shows_to_members() {
        let host = TestHost::new();
        let arena = arena(&host);
        join(&arena, "a", Vec3::ZERO);
        join(&arena, "b", Vec3::new(10.0, 0.0, 0.0));
        host.drain();

        let engine = BallPhysicsEngine::new(host.ctx.clone());
        engine.spawn(high_ball(&arena));

        let shows = host
            .drain()
            .into_iter()
            .filter(|e| matches!(e, PresentationEvent::ShowBall { .. }))
            .count();
        assert_eq!(shows, 2);
        assert_eq!(engine.active_count(), 1);
        assert_eq!(engine.arena_ball_count("court"), 1);
    }

    #[test]
    fn test_ball_expires_after_max_age() {
        let host = TestHost::new();
        let arena = arena(&host);
        let engine = BallPhysicsEngine::new(host.ctx.clone());
        let id = engine.spawn(high_ball(&arena));

        for _ in 0..MAX_AGE_TICKS {
            assert!(engine.tick().is_empty());
        }
        assert_eq!(engine.ball(id).unwrap().age_ticks, MAX_AGE_TICKS);

        let events = engine.tick();
        assert_eq!(
            events,
            vec![BallEvent::Expired {
                arena: "court".to_string(),
                ball: id
            }]
        );
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn test_ground_bounce() {
        let host = TestHost::new();
        let arena = arena(&host);
        let engine = BallPhysicsEngine::new(host.ctx.clone());
        let id = engine.spawn(Ball::neutral(
            arena.clone(),
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            1,
            0,
        ));

        engine.tick();

        let ball = engine.ball(id).unwrap();
        let falling: f64 = (-1.0 - 0.03) * 0.99;
        assert!(ball.resting);
        assert!((ball.velocity.y - falling.abs() * BOUNCE_FACTOR).abs() < 1e-9);
        assert_eq!(ball.position, Vec3::new(0.0, 0.5, 0.0));
        assert!(host
            .drain()
            .iter()
            .any(|e| matches!(e, PresentationEvent::Effect { effect: Effect::Bounce, .. })));
    }

    #[test]
    fn test_thrown_ball_hits_opponent() {
        let host = TestHost::new();
        let arena = arena(&host);
        let red = join(&arena, "p1", Vec3::ZERO);
        let blue = join(&arena, "p2", Vec3::new(6.0, 0.0, 0.0));
        let thrower = arena.with_state(|inner| inner.member(red).cloned()).unwrap();

        let engine = BallPhysicsEngine::new(host.ctx.clone());
        let eye = thrower.eye_position();
        let ball = Ball::thrown(
            arena.clone(),
            &thrower,
            eye,
            kinematics::launch_velocity(Vec3::new(1.0, 0.0, 0.0), 1.5),
            1,
            0,
        );
        let id = engine.spawn(ball);

        let mut hit = None;
        for _ in 0..10 {
            for event in engine.tick() {
                if let BallEvent::Hit { victim, .. } = event {
                    hit = Some(victim);
                }
            }
            if hit.is_some() {
                break;
            }
        }

        assert_eq!(hit, Some(blue));
        assert!(!arena.participant(blue).unwrap().alive);
        assert_eq!(arena.participant(red).unwrap().successful_hits, 1);
        assert!(engine.ball(id).is_none());
    }

    /// Victim (red) at the origin, then blue throwers and red fillers far away
    fn crowded_arena(host: &TestHost) -> (Arc<Arena>, ParticipantId, Vec<ParticipantId>) {
        let arena = Arc::new(Arena::new(
            &ArenaDefinition::new("court", "Court").with_capacity(2, 8),
            host.ctx.clone(),
        ));
        let victim = join(&arena, "victim", Vec3::ZERO);
        let mut throwers = Vec::new();
        for i in 0..3 {
            let offset = 10.0 * i as f64;
            throwers.push(join(&arena, &format!("t{}", i), Vec3::new(100.0 + offset, 0.0, 0.0)));
            if i < 2 {
                join(&arena, &format!("f{}", i), Vec3::new(-100.0 - offset, 0.0, 0.0));
            }
        }
        (arena, victim, throwers)
    }

    /// Spawn `per_thrower` motionless balls from each thrower at the victim's eye
    fn surround(
        engine: &BallPhysicsEngine,
        arena: &Arc<Arena>,
        victim: ParticipantId,
        throwers: &[ParticipantId],
        per_thrower: usize,
    ) {
        let eye = arena.participant(victim).unwrap().position + Vec3::new(0.0, 1.62, 0.0);
        for thrower in throwers {
            let thrower = arena.with_state(|inner| inner.member(*thrower).cloned()).unwrap();
            for _ in 0..per_thrower {
                engine.spawn(Ball::thrown(arena.clone(), &thrower, eye, Vec3::ZERO, 1, 0));
            }
        }
    }

    #[test]
    fn test_simultaneous_hits_record_one_outcome() {
        let host = TestHost::new();
        let (arena, victim, throwers) = crowded_arena(&host);
        let engine = BallPhysicsEngine::new(host.ctx.clone());
        surround(&engine, &arena, victim, &throwers, 20);

        let events = engine.tick();

        let hits: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, BallEvent::Hit { .. }))
            .collect();
        assert_eq!(hits.len(), 1);
        assert!(matches!(hits[0], BallEvent::Hit { victim: v, .. } if *v == victim));

        let state = arena.participant(victim).unwrap();
        assert!(!state.alive);
        assert_eq!(state.stats.deaths, 1);
        let kills: u32 = throwers
            .iter()
            .map(|t| arena.participant(*t).unwrap().stats.kills)
            .sum();
        assert_eq!(kills, 1);
        assert_eq!(engine.active_count(), 3 * 20 - 1);
    }

    #[test]
    fn test_departed_victim_not_hit() {
        let host = TestHost::new();
        let (arena, victim, throwers) = crowded_arena(&host);
        let engine = BallPhysicsEngine::new(host.ctx.clone());
        surround(&engine, &arena, victim, &throwers, 2);
        arena.leave(victim).unwrap();

        let events = engine.tick();

        assert!(!events.iter().any(|e| matches!(e, BallEvent::Hit { .. })));
        assert_eq!(engine.active_count(), 6);
        let kills: u32 = throwers
            .iter()
            .map(|t| arena.participant(*t).unwrap().stats.kills)
            .sum();
        assert_eq!(kills, 0);
    }

    #[test]
    fn test_remove_single_ball() {
        let host = TestHost::new();
        let arena = arena(&host);
        join(&arena, "a", Vec3::ZERO);
        let engine = BallPhysicsEngine::new(host.ctx.clone());
        let id = engine.spawn(high_ball(&arena));
        let other = engine.spawn(high_ball(&arena));
        host.drain();

        assert!(engine.remove(id));
        assert!(!engine.remove(id));
        assert!(engine.ball(id).is_none());
        assert!(engine.ball(other).is_some());
        assert!(host
            .drain()
            .iter()
            .any(|e| matches!(e, PresentationEvent::HideBall { .. })));
    }

    #[test]
    fn test_neutral_ball_picked_up() {
        let host = TestHost::new();
        let arena = arena(&host);
        let picker = join(&arena, "p1", Vec3::new(0.0, 1.0, 0.0));
        let engine = BallPhysicsEngine::new(host.ctx.clone());
        let eye = arena.participant(picker).unwrap().position + Vec3::new(0.0, 1.62, 0.0);
        engine.spawn(Ball::neutral(arena.clone(), eye, Vec3::ZERO, 1, 0));

        let events = engine.tick();

        assert!(matches!(&events[..], [BallEvent::PickedUp { picker: p, .. }] if *p == picker));
        let state = arena.participant(picker).unwrap();
        assert!(state.alive);
        assert_eq!(state.projectiles, 1);
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn test_non_finite_ball_is_isolated() {
        let host = TestHost::new();
        let arena = arena(&host);
        let engine = BallPhysicsEngine::new(host.ctx.clone());
        let bad = engine.spawn(Ball::neutral(
            arena.clone(),
            Vec3::new(0.0, 50.0, 0.0),
            Vec3::new(f64::NAN, 0.0, 0.0),
            1,
            0,
        ));
        let good = engine.spawn(high_ball(&arena));

        let events = engine.tick();

        assert!(matches!(
            &events[..],
            [BallEvent::Faulted { fault: EngineFault::NonFinite(id), .. }] if *id == bad
        ));
        assert!(engine.ball(bad).is_none());
        assert_eq!(engine.ball(good).unwrap().age_ticks, 1);
    }

    struct TrapWorld;

    impl Environment for TrapWorld {
        fn is_solid_or_out_of_bounds(&self, position: Vec3) -> bool {
            if position.x > 1_000.0 {
                panic!("trap at {:?}", position);
            }
            position.y <= 0.0
        }
    }

    #[test]
    fn test_panicking_ball_is_isolated() {
        let (presentation, _events) = ChannelPresentation::new(1024);
        let ctx = Context::new(
            Arc::new(presentation),
            Arc::new(MemoryPersistence::new()),
            Arc::new(TrapWorld),
            Arc::new(ManualClock::new()),
        );
        let arena = Arc::new(Arena::new(&ArenaDefinition::new("court", "Court"), ctx.clone()));
        let engine = BallPhysicsEngine::new(ctx);

        let trapped = engine.spawn(Ball::neutral(
            arena.clone(),
            Vec3::new(2_000.0, 50.0, 0.0),
            Vec3::ZERO,
            1,
            0,
        ));
        let fine = engine.spawn(high_ball(&arena));

        let events = engine.tick();

        assert!(matches!(
            &events[..],
            [BallEvent::Faulted { fault: EngineFault::Panicked { ball, .. }, .. }] if *ball == trapped
        ));
        assert_eq!(engine.active_count(), 1);
        assert_eq!(engine.ball(fine).unwrap().age_ticks, 1);
        // The arena section is usable after the panic
        assert_eq!(arena.player_count(), 0);
    }

    #[test]
    fn test_despawn_arena_and_clear() {
        let host = TestHost::new();
        let court = arena(&host);
        let other = Arc::new(Arena::new(&ArenaDefinition::new("other", "Other"), host.ctx.clone()));
        let engine = BallPhysicsEngine::new(host.ctx.clone());
        engine.spawn(high_ball(&court));
        engine.spawn(high_ball(&court));
        engine.spawn(high_ball(&other));

        assert_eq!(engine.despawn_arena("court"), 2);
        assert_eq!(engine.arena_ball_count("court"), 0);
        assert_eq!(engine.active_count(), 1);

        engine.clear();
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn test_dropped_ball_eventually_expires() {
        let host = TestHost::new();
        let arena = arena(&host);
        let engine = BallPhysicsEngine::new(host.ctx.clone());
        engine.spawn(Ball::neutral(arena.clone(), Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO, 1, 0));

        let mut expired_at = None;
        for tick in 1..=MAX_AGE_TICKS + 1 {
            if engine
                .tick()
                .iter()
                .any(|e| matches!(e, BallEvent::Expired { .. }))
            {
                expired_at = Some(tick);
                break;
            }
        }
        assert!(expired_at.is_some());
        assert_eq!(engine.active_count(), 0);
    }
}
