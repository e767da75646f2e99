use uuid::Uuid;

use crate::game::constants::player::EYE_HEIGHT;
use crate::game::stats::PlayerStats;
use crate::game::team::Team;
use crate::util::vec3::Vec3;

/// Unique participant identifier
pub type ParticipantId = Uuid;

/// A player inside an arena roster
///
/// Per-match fields are reset at match start and at arena reset; `stats`
/// carries the lifetime counters between matches.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    /// Assigned by team balancing; `None` until the first balance
    pub team: Option<Team>,
    pub alive: bool,
    pub can_catch: bool,
    /// Clock time of the last successful catch (ms, 0 = never)
    pub last_catch_ms: u64,
    pub balls_thrown: u32,
    pub balls_caught: u32,
    pub successful_hits: u32,
    /// Throwable balls currently held
    pub projectiles: u32,
    /// Feet position as last reported by the hosting world
    pub position: Vec3,
    pub stats: PlayerStats,
}

impl Participant {
    pub fn new(id: ParticipantId, name: String, stats: PlayerStats) -> Self {
        Self {
            id,
            name,
            team: None,
            alive: true,
            can_catch: true,
            last_catch_ms: 0,
            balls_thrown: 0,
            balls_caught: 0,
            successful_hits: 0,
            projectiles: 0,
            position: Vec3::ZERO,
            stats,
        }
    }

    /// Reset per-match state (alive, catch-eligible, counters)
    pub fn reset(&mut self) {
        self.alive = true;
        self.can_catch = true;
        self.last_catch_ms = 0;
        self.balls_thrown = 0;
        self.balls_caught = 0;
        self.successful_hits = 0;
    }

    /// Catching requires both the flag and being alive
    pub fn is_catch_eligible(&self) -> bool {
        self.can_catch && self.alive
    }

    /// Reference point used for ball contact
    pub fn eye_position(&self) -> Vec3 {
        self.position + Vec3::new(0.0, EYE_HEIGHT, 0.0)
    }

    /// Read-only copy for callers outside the arena section
    pub fn snapshot(&self) -> ParticipantSnapshot {
        ParticipantSnapshot {
            id: self.id,
            name: self.name.clone(),
            team: self.team,
            alive: self.alive,
            balls_thrown: self.balls_thrown,
            balls_caught: self.balls_caught,
            successful_hits: self.successful_hits,
            projectiles: self.projectiles,
            position: self.position,
            stats: self.stats,
        }
    }
}

/// Immutable view of a participant
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantSnapshot {
    pub id: ParticipantId,
    pub name: String,
    pub team: Option<Team>,
    pub alive: bool,
    pub balls_thrown: u32,
    pub balls_caught: u32,
    pub successful_hits: u32,
    pub projectiles: u32,
    pub position: Vec3,
    pub stats: PlayerStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant() -> Participant {
        Participant::new(Uuid::new_v4(), "Test".to_string(), PlayerStats::default())
    }

    #[test]
    fn test_new_defaults() {
        let p = participant();
        assert!(p.alive);
        assert!(p.is_catch_eligible());
        assert!(p.team.is_none());
        assert_eq!(p.projectiles, 0);
    }

    #[test]
    fn test_reset_keeps_stats_and_team() {
        let mut p = participant();
        p.team = Some(Team::Blue);
        p.alive = false;
        p.can_catch = false;
        p.successful_hits = 4;
        p.balls_caught = 2;
        p.stats.kills = 9;

        p.reset();

        assert!(p.alive);
        assert!(p.can_catch);
        assert_eq!(p.successful_hits, 0);
        assert_eq!(p.balls_caught, 0);
        assert_eq!(p.team, Some(Team::Blue));
        assert_eq!(p.stats.kills, 9);
    }

    #[test]
    fn test_dead_player_cannot_catch() {
        let mut p = participant();
        p.alive = false;
        assert!(!p.is_catch_eligible());
    }

    #[test]
    fn test_eye_position() {
        let mut p = participant();
        p.position = Vec3::new(1.0, 64.0, -2.0);
        assert!(p.eye_position().approx_eq(Vec3::new(1.0, 64.0 + EYE_HEIGHT, -2.0), 1e-9));
    }
}
