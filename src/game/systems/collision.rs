//! Ball-to-player contact detection and resolution
//!
//! Both functions run inside the owning arena's exclusive section, so each
//! contact records exactly one outcome.

use crate::arena::machine::ArenaInner;
use crate::game::ball::Ball;
use crate::game::constants::ball::*;
use crate::game::participant::{Participant, ParticipantId};
use crate::util::vec3::Vec3;

/// Why a contact had no effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The thrower touched their own ball right after throwing it
    ThrowerGrace,
    /// Teammate ball that could not be caught (too slow or catcher ineligible)
    NotCatchable,
    /// Victim was hit by this ball moments ago
    Debounced,
}

/// Result of resolving one contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactOutcome {
    Ignored(IgnoreReason),
    Caught {
        catcher: ParticipantId,
        catcher_name: String,
        thrower: Option<ParticipantId>,
    },
    PickedUp {
        picker: ParticipantId,
    },
    Hit {
        victim: ParticipantId,
        victim_name: String,
        thrower: Option<ParticipantId>,
        thrower_name: String,
    },
}

impl ContactOutcome {
    /// The ball is consumed by this outcome
    pub fn consumes_ball(&self) -> bool {
        !matches!(self, ContactOutcome::Ignored(_))
    }
}

/// First alive roster member (join order) whose eye point is within reach
pub fn find_candidate(roster: &[Participant], ball_position: Vec3) -> Option<usize> {
    roster.iter().position(|p| {
        p.alive && p.eye_position().distance_sq_to(ball_position) < HIT_RADIUS * HIT_RADIUS
    })
}

/// Apply the effect of `ball` touching `inner.roster[index]`
pub fn resolve_contact(
    ball: &mut Ball,
    inner: &mut ArenaInner,
    index: usize,
    now_ms: u64,
) -> ContactOutcome {
    let thrower_id = ball.thrower_id();
    let candidate = &inner.roster[index];
    let candidate_id = candidate.id;

    if thrower_id == Some(candidate_id) && ball.age_ticks < THROWER_GRACE_TICKS {
        return ContactOutcome::Ignored(IgnoreReason::ThrowerGrace);
    }

    let Some(thrower) = ball.thrower.clone() else {
        let picker = &mut inner.roster[index];
        picker.projectiles += 1;
        return ContactOutcome::PickedUp { picker: picker.id };
    };

    if candidate.team == ball.team {
        if !candidate.is_catch_eligible() || ball.speed_sq() <= MIN_CATCH_SPEED_SQ {
            return ContactOutcome::Ignored(IgnoreReason::NotCatchable);
        }
        let catcher = &mut inner.roster[index];
        catcher.balls_caught += 1;
        catcher.stats.catches += 1;
        catcher.last_catch_ms = now_ms;
        catcher.projectiles += 1;
        return ContactOutcome::Caught {
            catcher: catcher.id,
            catcher_name: catcher.name.clone(),
            thrower: Some(thrower.id),
        };
    }

    if ball.recently_hit(candidate_id, now_ms) {
        return ContactOutcome::Ignored(IgnoreReason::Debounced);
    }
    ball.last_hits.insert(candidate_id, now_ms);

    let victim = &mut inner.roster[index];
    victim.alive = false;
    victim.stats.deaths += 1;
    let victim_name = victim.name.clone();

    if let Some(shooter) = inner.member_mut(thrower.id) {
        shooter.successful_hits += 1;
        shooter.stats.kills += 1;
    }

    ContactOutcome::Hit {
        victim: candidate_id,
        victim_name,
        thrower: Some(thrower.id),
        thrower_name: thrower.name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::machine::Arena;
    use crate::arena::settings::ArenaDefinition;
    use crate::game::stats::PlayerStats;
    use crate::game::team::Team;
    use crate::host::testing::TestHost;
    use std::sync::Arc;
    use uuid::Uuid;

    struct Fixture {
        arena: Arc<Arena>,
        red: ParticipantId,
        blue: ParticipantId,
        red_mate: ParticipantId,
    }

    // Roster order: red, blue, red_mate
    fn fixture(host: &TestHost) -> Fixture {
        let arena = Arc::new(Arena::new(
            &ArenaDefinition::new("court", "Court").with_capacity(2, 4),
            host.ctx.clone(),
        ));
        let ids: Vec<_> = ["red", "blue", "red_mate"]
            .iter()
            .map(|name| {
                let p = Participant::new(Uuid::new_v4(), name.to_string(), PlayerStats::default());
                let id = p.id;
                arena.join(p).unwrap();
                id
            })
            .collect();
        Fixture {
            arena,
            red: ids[0],
            blue: ids[1],
            red_mate: ids[2],
        }
    }

    fn thrown_by(fx: &Fixture, thrower: ParticipantId, speed: f64) -> Ball {
        let participant = fx
            .arena
            .with_state(|inner| inner.member(thrower).cloned())
            .unwrap();
        Ball::thrown(
            fx.arena.clone(),
            &participant,
            Vec3::ZERO,
            Vec3::new(speed, 0.0, 0.0),
            1,
            0,
        )
    }

    fn resolve(fx: &Fixture, ball: &mut Ball, target: ParticipantId, now_ms: u64) -> ContactOutcome {
        fx.arena.with_state(|inner| {
            let index = inner.roster.iter().position(|p| p.id == target).unwrap();
            resolve_contact(ball, inner, index, now_ms)
        })
    }

    #[test]
    fn test_find_candidate_first_in_roster_order() {
        let mut a = Participant::new(Uuid::new_v4(), "a".into(), PlayerStats::default());
        let mut b = Participant::new(Uuid::new_v4(), "b".into(), PlayerStats::default());
        a.position = Vec3::new(0.5, 0.0, 0.0);
        b.position = Vec3::ZERO;
        let ball = Vec3::new(0.1, crate::game::constants::player::EYE_HEIGHT, 0.0);

        // b is nearer but a joined first
        assert_eq!(find_candidate(&[a.clone(), b.clone()], ball), Some(0));

        a.alive = false;
        assert_eq!(find_candidate(&[a, b], ball), Some(1));
    }

    #[test]
    fn test_find_candidate_out_of_reach() {
        let p = Participant::new(Uuid::new_v4(), "a".into(), PlayerStats::default());
        assert_eq!(find_candidate(&[p], Vec3::new(5.0, 1.6, 0.0)), None);
    }

    #[test]
    fn test_opponent_hit() {
        let host = TestHost::new();
        let fx = fixture(&host);
        let mut ball = thrown_by(&fx, fx.red, 1.5);
        ball.age_ticks = 4;

        let outcome = resolve(&fx, &mut ball, fx.blue, 1_000);

        assert!(matches!(outcome, ContactOutcome::Hit { victim, .. } if victim == fx.blue));
        let blue = fx.arena.participant(fx.blue).unwrap();
        let red = fx.arena.participant(fx.red).unwrap();
        assert!(!blue.alive);
        assert_eq!(blue.stats.deaths, 1);
        assert_eq!(red.successful_hits, 1);
        assert_eq!(red.stats.kills, 1);
    }

    #[test]
    fn test_hit_debounced_within_window() {
        let host = TestHost::new();
        let fx = fixture(&host);
        let mut ball = thrown_by(&fx, fx.red, 1.5);

        assert!(resolve(&fx, &mut ball, fx.blue, 1_000).consumes_ball());
        fx.arena
            .with_state(|inner| inner.member_mut(fx.blue).unwrap().alive = true);

        assert_eq!(
            resolve(&fx, &mut ball, fx.blue, 1_400),
            ContactOutcome::Ignored(IgnoreReason::Debounced)
        );
        assert_eq!(fx.arena.participant(fx.red).unwrap().successful_hits, 1);

        assert!(resolve(&fx, &mut ball, fx.blue, 1_500).consumes_ball());
        assert_eq!(fx.arena.participant(fx.red).unwrap().successful_hits, 2);
    }

    #[test]
    fn test_thrower_grace() {
        let host = TestHost::new();
        let fx = fixture(&host);
        let mut ball = thrown_by(&fx, fx.red, 1.5);
        ball.age_ticks = THROWER_GRACE_TICKS - 1;

        assert_eq!(
            resolve(&fx, &mut ball, fx.red, 0),
            ContactOutcome::Ignored(IgnoreReason::ThrowerGrace)
        );
    }

    #[test]
    fn test_teammate_catch() {
        let host = TestHost::new();
        let fx = fixture(&host);
        let mut ball = thrown_by(&fx, fx.red, 1.0);
        ball.age_ticks = 10;

        let outcome = resolve(&fx, &mut ball, fx.red_mate, 2_000);

        assert!(matches!(outcome, ContactOutcome::Caught { catcher, .. } if catcher == fx.red_mate));
        let mate = fx.arena.participant(fx.red_mate).unwrap();
        assert!(mate.alive);
        assert_eq!(mate.balls_caught, 1);
        assert_eq!(mate.stats.catches, 1);
        assert_eq!(mate.projectiles, 1);
        assert_eq!(mate.team, Some(Team::Red));
    }

    #[test]
    fn test_slow_teammate_ball_not_catchable() {
        let host = TestHost::new();
        let fx = fixture(&host);
        let mut ball = thrown_by(&fx, fx.red, 0.2);
        ball.age_ticks = 10;

        assert_eq!(
            resolve(&fx, &mut ball, fx.red_mate, 0),
            ContactOutcome::Ignored(IgnoreReason::NotCatchable)
        );
        assert_eq!(fx.arena.participant(fx.red_mate).unwrap().balls_caught, 0);
    }

    #[test]
    fn test_ineligible_teammate_cannot_catch() {
        let host = TestHost::new();
        let fx = fixture(&host);
        fx.arena
            .with_state(|inner| inner.member_mut(fx.red_mate).unwrap().can_catch = false);
        let mut ball = thrown_by(&fx, fx.red, 1.5);
        ball.age_ticks = 10;

        assert!(!resolve(&fx, &mut ball, fx.red_mate, 0).consumes_ball());
    }

    #[test]
    fn test_neutral_pickup() {
        let host = TestHost::new();
        let fx = fixture(&host);
        let mut ball = Ball::neutral(fx.arena.clone(), Vec3::ZERO, Vec3::ZERO, 1, 0);

        let outcome = resolve(&fx, &mut ball, fx.blue, 0);

        assert_eq!(outcome, ContactOutcome::PickedUp { picker: fx.blue });
        let blue = fx.arena.participant(fx.blue).unwrap();
        assert!(blue.alive);
        assert_eq!(blue.projectiles, 1);
    }

    #[test]
    fn test_hit_after_thrower_left() {
        let host = TestHost::new();
        let fx = fixture(&host);
        let mut ball = thrown_by(&fx, fx.red, 1.5);
        fx.arena.leave(fx.red).unwrap();

        let outcome = resolve(&fx, &mut ball, fx.blue, 0);
        assert!(outcome.consumes_ball());
        assert!(!fx.arena.participant(fx.blue).unwrap().alive);
    }
}
