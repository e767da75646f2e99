/// Ball physics constants (per tick, world units)
pub mod physics {
    /// Downward acceleration applied while a ball is airborne
    pub const GRAVITY: f64 = 0.03;
    /// Air resistance, applied as: velocity *= AIR_RESISTANCE
    pub const AIR_RESISTANCE: f64 = 0.99;
    /// Restitution applied to vertical speed on the first ground contact
    pub const BOUNCE_FACTOR: f64 = 0.6;
    /// Bounces weaker than this are clamped to a full vertical stop
    pub const MIN_BOUNCE_VELOCITY: f64 = 0.1;
    /// Horizontal damping applied when a bounce is clamped
    pub const CLAMPED_BOUNCE_DAMPING: f64 = 0.8;
    /// Damping applied on every ground contact after the ball is resting
    pub const RESTING_DAMPING: f64 = 0.9;
    /// Default server tick rate in Hz
    pub const TICK_RATE: u32 = 20;
}

/// Ball lifetime, interaction and effect constants
pub mod ball {
    /// Distance from a player's eye point that counts as contact
    pub const HIT_RADIUS: f64 = 0.8;
    /// Ticks during which a thrower cannot be hit by their own ball
    pub const THROWER_GRACE_TICKS: u32 = 5;
    /// Minimum speed squared for a teammate's ball to be catchable
    pub const MIN_CATCH_SPEED_SQ: f64 = 0.1;
    /// Per-victim window in which the same ball cannot register another hit
    pub const HIT_DEBOUNCE_MS: u64 = 500;
    /// Balls older than this are despawned
    pub const MAX_AGE_TICKS: u32 = 200;
    /// A resting ball slower than this (squared) is despawned
    pub const REST_DESPAWN_SPEED_SQ: f64 = 0.001;
    /// Trail particles are emitted every N ticks
    pub const TRAIL_INTERVAL_TICKS: u32 = 2;
    /// Trail particles only while faster than this (squared)
    pub const TRAIL_MIN_SPEED_SQ: f64 = 0.01;
    /// First presentation entity id handed out
    pub const FIRST_ENTITY_ID: u64 = 100_000;
}

/// Participant constants
pub mod player {
    /// Eye height above the reported (feet) position
    pub const EYE_HEIGHT: f64 = 1.62;
}

/// Match flow constants
pub mod game {
    /// Neutral balls seeded at the arena center when a match starts
    pub const NEUTRAL_BALL_COUNT: usize = 5;
    /// Horizontal jitter (+/-) applied to each neutral ball
    pub const NEUTRAL_BALL_JITTER: f64 = 2.0;
    /// Height above CENTER at which neutral balls appear
    pub const NEUTRAL_BALL_LIFT: f64 = 1.0;
    /// Projectiles handed to every participant at match start
    pub const STARTING_PROJECTILES: u32 = 3;
    /// Remaining-time values that trigger a broadcast warning
    pub const TIME_WARNINGS: [u32; 4] = [60, 30, 10, 5];
    /// Default delay between match end and arena reset
    pub const RESET_DELAY_SECS: u64 = 10;
}

/// Arena defaults
pub mod arena {
    pub const DEFAULT_MIN_PLAYERS: usize = 2;
    pub const DEFAULT_MAX_PLAYERS: usize = 10;
    /// Default match length in seconds
    pub const DEFAULT_DURATION_SECS: u32 = 300;
    pub const DEFAULT_BALL_SPEED: f64 = 1.5;
    pub const DEFAULT_BALL_DAMAGE: u32 = 4;
    pub const DEFAULT_BALL_MODEL: u32 = 1;
}

/// Convert seconds to scheduler ticks at `tick_rate` Hz
#[inline]
pub fn secs_to_ticks(secs: u64, tick_rate: u32) -> u64 {
    secs * tick_rate as u64
}

/// Format seconds as mm:ss
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
