//! Ball integration math
//!
//! Pure functions over position and velocity; no world or arena access.

use crate::game::constants::physics::*;
use crate::util::vec3::Vec3;

/// Outcome of a ground contact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundContact {
    /// First contact; the ball bounces (or is clamped to a stop) and is now resting
    Bounce { clamped: bool },
    /// Contact while already resting
    Rolling,
}

/// Gravity, skipped once the ball is resting
#[inline]
pub fn apply_gravity(velocity: &mut Vec3, resting: bool) {
    if !resting {
        velocity.y -= GRAVITY;
    }
}

#[inline]
pub fn apply_air_resistance(velocity: &mut Vec3) {
    *velocity *= AIR_RESISTANCE;
}

/// Position the ball would move to this tick
#[inline]
pub fn candidate_position(position: Vec3, velocity: Vec3) -> Vec3 {
    position + velocity
}

/// Apply the ground response to `velocity` and update `resting`
pub fn ground_contact(velocity: &mut Vec3, resting: &mut bool) -> GroundContact {
    if *resting {
        velocity.y = 0.0;
        *velocity *= RESTING_DAMPING;
        return GroundContact::Rolling;
    }

    *resting = true;
    velocity.y = velocity.y.abs() * BOUNCE_FACTOR;
    let clamped = velocity.y < MIN_BOUNCE_VELOCITY;
    if clamped {
        velocity.y = 0.0;
        *velocity *= CLAMPED_BOUNCE_DAMPING;
    }
    GroundContact::Bounce { clamped }
}

/// Velocity of a thrown ball
pub fn launch_velocity(direction: Vec3, speed: f64) -> Vec3 {
    direction.normalize() * speed
}
