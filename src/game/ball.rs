use hashbrown::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::arena::machine::Arena;
use crate::game::constants::ball::*;
use crate::game::participant::{Participant, ParticipantId};
use crate::game::team::Team;
use crate::host::presentation::BallView;
use crate::util::vec3::Vec3;

/// Presentation entity id of a ball, also its key in the engine
pub type BallId = u64;

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(FIRST_ENTITY_ID);

fn next_entity_id() -> BallId {
    NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed)
}

/// Who threw a ball
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thrower {
    pub id: ParticipantId,
    pub name: String,
}

/// A live projectile
pub struct Ball {
    pub entity_id: BallId,
    pub uuid: Uuid,
    pub arena: Arc<Arena>,
    /// `None` for neutral balls
    pub thrower: Option<Thrower>,
    /// Thrower's team at throw time
    pub team: Option<Team>,
    pub position: Vec3,
    pub velocity: Vec3,
    pub resting: bool,
    pub age_ticks: u32,
    pub active: bool,
    pub spawned_at_ms: u64,
    /// Victim id -> clock time of the last registered hit
    pub last_hits: HashMap<ParticipantId, u64>,
    pub viewers: HashSet<ParticipantId>,
    pub item_model: u32,
}

impl Ball {
    /// Ball thrown by `thrower`, inheriting their team
    pub fn thrown(
        arena: Arc<Arena>,
        thrower: &Participant,
        position: Vec3,
        velocity: Vec3,
        item_model: u32,
        now_ms: u64,
    ) -> Self {
        let mut ball = Self::base(arena, position, velocity, item_model, now_ms);
        ball.thrower = Some(Thrower {
            id: thrower.id,
            name: thrower.name.clone(),
        });
        ball.team = thrower.team;
        ball
    }

    /// Ball with no owner, pickable by anyone
    pub fn neutral(
        arena: Arc<Arena>,
        position: Vec3,
        velocity: Vec3,
        item_model: u32,
        now_ms: u64,
    ) -> Self {
        Self::base(arena, position, velocity, item_model, now_ms)
    }

    fn base(arena: Arc<Arena>, position: Vec3, velocity: Vec3, item_model: u32, now_ms: u64) -> Self {
        Self {
            entity_id: next_entity_id(),
            uuid: Uuid::new_v4(),
            arena,
            thrower: None,
            team: None,
            position,
            velocity,
            resting: false,
            age_ticks: 0,
            active: true,
            spawned_at_ms: now_ms,
            last_hits: HashMap::new(),
            viewers: HashSet::new(),
            item_model,
        }
    }

    #[inline]
    pub fn is_neutral(&self) -> bool {
        self.thrower.is_none()
    }

    pub fn thrower_id(&self) -> Option<ParticipantId> {
        self.thrower.as_ref().map(|t| t.id)
    }

    #[inline]
    pub fn speed_sq(&self) -> f64 {
        self.velocity.length_sq()
    }

    /// Too old, or resting and nearly still
    pub fn should_expire(&self) -> bool {
        self.age_ticks > MAX_AGE_TICKS || (self.resting && self.speed_sq() < REST_DESPAWN_SPEED_SQ)
    }

    /// Trail particles are due this tick
    pub fn trail_due(&self) -> bool {
        self.age_ticks % TRAIL_INTERVAL_TICKS == 0 && self.speed_sq() > TRAIL_MIN_SPEED_SQ
    }

    /// Whether `victim` was hit by this ball less than the debounce window ago
    pub fn recently_hit(&self, victim: ParticipantId, now_ms: u64) -> bool {
        self.last_hits
            .get(&victim)
            .is_some_and(|at| now_ms.saturating_sub(*at) < HIT_DEBOUNCE_MS)
    }

    pub fn view(&self) -> BallView {
        BallView {
            entity_id: self.entity_id,
            position: self.position,
            item_model: self.item_model,
            team: self.team,
        }
    }

    pub fn snapshot(&self) -> BallSnapshot {
        BallSnapshot {
            entity_id: self.entity_id,
            uuid: self.uuid,
            arena: self.arena.id().to_string(),
            thrower: self.thrower_id(),
            team: self.team,
            position: self.position,
            velocity: self.velocity,
            resting: self.resting,
            age_ticks: self.age_ticks,
            active: self.active,
            spawned_at_ms: self.spawned_at_ms,
        }
    }
}

/// Read-only copy of a ball
#[derive(Debug, Clone, PartialEq)]
pub struct BallSnapshot {
    pub entity_id: BallId,
    pub uuid: Uuid,
    pub arena: String,
    pub thrower: Option<ParticipantId>,
    pub team: Option<Team>,
    pub position: Vec3,
    pub velocity: Vec3,
    pub resting: bool,
    pub age_ticks: u32,
    pub active: bool,
    pub spawned_at_ms: u64,
}
