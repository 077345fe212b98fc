//! Simulation constants shared by client and server.
//!
//! The constants are the canonical tuning values. [`GameConfig`] gathers them into
//! a value so tests and tools can run the simulation with different numbers
//! without touching the globals.

use std::f32::consts::PI;
use std::time::Duration;

pub const ARENA_SIZE: f32 = 500.0;
pub const WALL_HEIGHT: f32 = 8.0;
/// Distance inside the walls at which a vehicle is already considered out.
pub const ARENA_MARGIN: f32 = 2.0;
/// Vehicles whose height drops below this are eliminated.
pub const FLOOR_Y: f32 = 0.0;
pub const RIDE_HEIGHT: f32 = 1.0;

pub const MIN_SPEED: f32 = 20.0;
pub const MAX_SPEED: f32 = 40.0;
pub const ACCELERATION: f32 = 10.0;
pub const DECELERATION: f32 = 20.0;

/// Angular rate while a turn key is held (rad/s).
pub const TURN_RATE: f32 = PI;
/// Angular rate used to settle onto the 90° grid after a turn is released (rad/s).
pub const SNAP_RATE: f32 = 2.0 * PI;

pub const JUMP_HEIGHT: f32 = 3.0;
pub const JUMP_DURATION: f32 = 0.6;
pub const JUMP_COOLDOWN: f32 = 1.5;

pub const TRAIL_MAX_POINTS: usize = 2000;
pub const TRAIL_MIN_POINT_DISTANCE: f32 = 1.0;
/// Grace period after spawn before the trail becomes collidable.
pub const ACTIVATION_DELAY: f32 = 3.0;

pub const COLLISION_THRESHOLD: f32 = 0.6;
/// Number of physics ticks worth of travel exempt from self-collision.
pub const SELF_EXEMPTION_TICKS: f32 = 6.0;
pub const TICK_INTERVAL: f32 = 1.0 / 60.0;

pub const RESPAWN_DELAY: Duration = Duration::from_secs(3);

pub const MAX_PLAYERS: usize = 16;
pub const MIN_PLAYERS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub arena_size: f32,
    pub wall_height: f32,
    pub arena_margin: f32,
    pub floor_y: f32,
    pub ride_height: f32,

    pub min_speed: f32,
    pub max_speed: f32,
    pub acceleration: f32,
    pub deceleration: f32,
    pub turn_rate: f32,
    pub snap_rate: f32,

    pub jump_height: f32,
    pub jump_duration: f32,
    pub jump_cooldown: f32,

    pub trail_max_points: usize,
    pub trail_min_point_distance: f32,
    pub activation_delay: f32,

    pub collision_threshold: f32,
    pub self_exemption_ticks: f32,
    pub tick_interval: f32,
    pub respawn_delay: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            arena_size: ARENA_SIZE,
            wall_height: WALL_HEIGHT,
            arena_margin: ARENA_MARGIN,
            floor_y: FLOOR_Y,
            ride_height: RIDE_HEIGHT,
            min_speed: MIN_SPEED,
            max_speed: MAX_SPEED,
            acceleration: ACCELERATION,
            deceleration: DECELERATION,
            turn_rate: TURN_RATE,
            snap_rate: SNAP_RATE,
            jump_height: JUMP_HEIGHT,
            jump_duration: JUMP_DURATION,
            jump_cooldown: JUMP_COOLDOWN,
            trail_max_points: TRAIL_MAX_POINTS,
            trail_min_point_distance: TRAIL_MIN_POINT_DISTANCE,
            activation_delay: ACTIVATION_DELAY,
            collision_threshold: COLLISION_THRESHOLD,
            self_exemption_ticks: SELF_EXEMPTION_TICKS,
            tick_interval: TICK_INTERVAL,
            respawn_delay: RESPAWN_DELAY,
        }
    }
}

impl GameConfig {
    /// Arc length of a vehicle's own trail, measured back from its position,
    /// that cannot kill it. Scales with speed so the exempt distance is the
    /// same at any frame rate.
    pub fn self_exemption_distance(&self, speed: f32) -> f32 {
        let travelled = speed * self.tick_interval * self.self_exemption_ticks;
        travelled.max(self.collision_threshold + self.trail_min_point_distance)
    }
}
