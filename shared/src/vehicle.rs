//! Light-cycle kinematics and trail state machine

use crate::config::GameConfig;
use crate::geometry::{heading_vector, nearest_grid_heading, normalize_angle};
use crate::template::VehicleTemplate;
use crate::trail::Trail;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Logical participant identity. Survives reconnects and respawns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One spawned instance of a player. Each respawn bumps the generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub player: PlayerId,
    pub generation: u32,
}

impl EntityKey {
    pub fn new(player: PlayerId, generation: u32) -> Self {
        Self { player, generation }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.player, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnIntent {
    Left,
    #[default]
    Straight,
    Right,
}

impl TurnIntent {
    pub fn sign(self) -> f32 {
        match self {
            TurnIntent::Left => -1.0,
            TurnIntent::Straight => 0.0,
            TurnIntent::Right => 1.0,
        }
    }

    pub fn from_keys(left: bool, right: bool) -> Self {
        match (left, right) {
            (true, false) => TurnIntent::Left,
            (false, true) => TurnIntent::Right,
            _ => TurnIntent::Straight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleState {
    Spawning,
    ActiveNoTrail,
    ActiveWithTrail,
    Eliminated,
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    key: EntityKey,
    template: Arc<VehicleTemplate>,
    state: VehicleState,
    position: Vec3,
    heading: f32,
    speed: f32,
    turn: TurnIntent,
    base_height: f32,
    trail: Trail,
    created_at: Duration,
    jump_started: Option<Duration>,
    jump_ready_at: Duration,
}

impl Vehicle {
    pub fn new(
        key: EntityKey,
        template: Arc<VehicleTemplate>,
        config: &GameConfig,
        position: Vec3,
        heading: f32,
        now: Duration,
    ) -> Self {
        let trail = Trail::new(template.trail_max_points, template.trail_min_point_distance);
        Self {
            key,
            template,
            state: VehicleState::Spawning,
            position,
            heading: normalize_angle(heading),
            speed: config.min_speed,
            turn: TurnIntent::Straight,
            base_height: position.y,
            trail,
            created_at: now,
            jump_started: None,
            jump_ready_at: now,
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.key.player
    }

    pub fn template(&self) -> &Arc<VehicleTemplate> {
        &self.template
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn heading(&self) -> f32 {
        self.heading
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn turn(&self) -> TurnIntent {
        self.turn
    }

    pub fn trail(&self) -> &Trail {
        &self.trail
    }

    pub fn created_at(&self) -> Duration {
        self.created_at
    }

    pub fn is_alive(&self) -> bool {
        self.state != VehicleState::Eliminated
    }

    pub fn is_trail_active(&self) -> bool {
        self.state == VehicleState::ActiveWithTrail
    }

    pub fn is_jumping(&self) -> bool {
        self.jump_started.is_some()
    }

    pub fn set_turn(&mut self, turn: TurnIntent) {
        self.turn = turn;
    }

    pub fn set_speed(&mut self, speed: f32, config: &GameConfig) {
        self.speed = speed.clamp(config.min_speed, config.max_speed);
    }

    /// Starts a jump unless one is running or the cooldown has not elapsed.
    pub fn jump(&mut self, now: Duration, config: &GameConfig) -> bool {
        if !self.is_alive() || self.jump_started.is_some() || now < self.jump_ready_at {
            return false;
        }
        self.jump_started = Some(now);
        self.jump_ready_at = now + Duration::from_secs_f32(config.jump_cooldown);
        true
    }

    /// Advances the lifecycle from the vehicle's age.
    pub fn refresh_activation(&mut self, now: Duration, config: &GameConfig) {
        match self.state {
            VehicleState::Spawning => {
                self.state = VehicleState::ActiveNoTrail;
                self.refresh_activation(now, config);
            }
            VehicleState::ActiveNoTrail => {
                let age = now.saturating_sub(self.created_at).as_secs_f32();
                if age >= config.activation_delay {
                    self.state = VehicleState::ActiveWithTrail;
                }
            }
            VehicleState::ActiveWithTrail | VehicleState::Eliminated => {}
        }
    }

    /// One physics step for a locally simulated vehicle.
    pub fn update(&mut self, dt: f32, now: Duration, config: &GameConfig) {
        if !self.is_alive() {
            return;
        }
        self.refresh_activation(now, config);

        let turning = self.turn != TurnIntent::Straight;
        self.speed = if turning {
            (self.speed - config.deceleration * dt).max(config.min_speed)
        } else {
            (self.speed + config.acceleration * dt).min(config.max_speed)
        };

        if turning {
            self.heading += self.turn.sign() * config.turn_rate * dt;
        } else {
            self.settle_heading(config.snap_rate * dt);
        }
        self.heading = normalize_angle(self.heading);

        self.position += heading_vector(self.heading) * self.speed * dt;
        self.position.y = self.base_height + self.jump_offset(now, config);

        self.record_trail_point();
    }

    /// Moves the heading toward the nearest 90° multiple by at most `max_step`.
    fn settle_heading(&mut self, max_step: f32) {
        let target = nearest_grid_heading(self.heading);
        let delta = target - self.heading;
        if delta.abs() <= max_step {
            self.heading = target;
        } else {
            self.heading += max_step * delta.signum();
        }
    }

    fn jump_offset(&mut self, now: Duration, config: &GameConfig) -> f32 {
        let Some(started) = self.jump_started else {
            return 0.0;
        };

        let t = now.saturating_sub(started).as_secs_f32();
        if t >= config.jump_duration {
            self.jump_started = None;
            return 0.0;
        }
        config.jump_height * (PI * t / config.jump_duration).sin()
    }

    /// Places a vehicle whose motion is driven from outside, e.g. by network
    /// snapshots.
    pub fn set_transform(&mut self, position: Vec3, heading: f32) {
        if !self.is_alive() {
            return;
        }
        self.position = position;
        self.heading = normalize_angle(heading);
    }

    /// Appends the current position to the trail when the trail is live.
    pub fn record_trail_point(&mut self) -> bool {
        if !self.is_trail_active() || !self.template.records_trail {
            return false;
        }
        self.trail.record(self.position)
    }

    pub fn eliminate(&mut self) {
        self.state = VehicleState::Eliminated;
        self.turn = TurnIntent::Straight;
        self.jump_started = None;
    }
}
