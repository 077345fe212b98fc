//! Server-driven bot riders for load testing
//!
//! Bots are dead reckoned on the server and announced to clients with the
//! same `player_moved` frames humans produce. Clients judge collisions with
//! them like any other remote vehicle.

use glam::Vec3;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::config::{ARENA_MARGIN, ARENA_SIZE, RIDE_HEIGHT};
use shared::geometry::{heading_vector, normalize_angle};
use shared::{PlayerId, PlayerInfo, WirePosition};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, FRAC_PI_8};
use std::ops::Range;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    pub count: usize,
    pub prefix: String,
    pub enable_trails: bool,
    pub max_active_trails: usize,
    pub max_concurrent_spawns: usize,
    pub spawn_interval: Duration,
    pub spawn_check_interval: Duration,
    pub update_interval: Duration,
    pub speed: Range<f32>,
    pub turn_probability: f32,
    pub arena_size: f32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            count: 0,
            prefix: "bot_".to_string(),
            enable_trails: true,
            max_active_trails: 2,
            max_concurrent_spawns: 3,
            spawn_interval: Duration::from_secs(5),
            spawn_check_interval: Duration::from_secs(1),
            update_interval: Duration::from_millis(100),
            speed: 40.0..80.0,
            turn_probability: 0.01,
            arena_size: ARENA_SIZE,
        }
    }
}

impl BotConfig {
    /// Bots turn around one unit inside the playable area so clients never
    /// see them cross the kill line.
    pub fn bounce_extent(&self) -> f32 {
        self.arena_size / 2.0 - ARENA_MARGIN - 1.0
    }
}

#[derive(Debug, Clone)]
pub struct BotPlayer {
    id: PlayerId,
    use_trails: bool,
    speed: f32,
    heading: f32,
    position: Vec3,
    active: bool,
    spawn_at: Duration,
    /// Seconds of simulated motion; drives the scheduled turns.
    elapsed: f32,
    next_turn_at: f32,
    /// Motion owed since the last position update.
    pending: f32,
    last_update: Option<Duration>,
}

impl BotPlayer {
    pub fn new<R: Rng + ?Sized>(
        id: PlayerId,
        use_trails: bool,
        spawn_at: Duration,
        config: &BotConfig,
        rng: &mut R,
    ) -> Self {
        let extent = config.bounce_extent();
        let position = Vec3::new(
            rng.gen_range(-extent..extent),
            RIDE_HEIGHT,
            rng.gen_range(-extent..extent),
        );
        let bot = Self {
            id,
            use_trails,
            speed: rng.gen_range(config.speed.clone()),
            heading: rng.gen_range(0.0..std::f32::consts::TAU),
            position,
            active: spawn_at.is_zero(),
            spawn_at,
            elapsed: 0.0,
            next_turn_at: rng.gen_range(1.0..5.0),
            pending: 0.0,
            last_update: None,
        };
        debug!(
            "Bot {} created: speed={:.1}, trails={}, pos=({:.1}, {:.1}), spawn at {:.1}s",
            bot.id,
            bot.speed,
            use_trails,
            position.x,
            position.z,
            spawn_at.as_secs_f32()
        );
        bot
    }

    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn uses_trails(&self) -> bool {
        self.use_trails
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

    pub fn spawn_at(&self) -> Duration {
        self.spawn_at
    }

    pub fn wire_position(&self) -> WirePosition {
        WirePosition {
            use_trails: Some(self.use_trails),
            ..WirePosition::from_transform(self.position, self.heading)
        }
    }

    pub fn to_info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id.clone(),
            position: Some(self.wire_position()),
            is_eliminated: false,
            score: 0,
            is_bot: true,
            use_light_trails: Some(self.use_trails),
        }
    }

    /// Advances the bot by `dt`. Position updates are throttled to the
    /// configured interval; motion in between is carried over, not lost.
    pub fn update<R: Rng + ?Sized>(&mut self, now: Duration, dt: f32, config: &BotConfig, rng: &mut R) -> BotUpdate {
        if !self.active {
            if now < self.spawn_at {
                return BotUpdate::Idle;
            }
            self.active = true;
            self.last_update = Some(now);
            info!("Bot {} activated", self.id);
            return BotUpdate::Activated;
        }

        self.elapsed += dt;
        self.pending += dt;
        if let Some(last) = self.last_update {
            if now.saturating_sub(last) < config.update_interval {
                return BotUpdate::Idle;
            }
        }
        self.last_update = Some(now);

        if self.elapsed >= self.next_turn_at {
            let side = if rng.gen_bool(0.5) { -1.0 } else { 1.0 };
            self.heading = normalize_angle(self.heading + side * rng.gen_range(FRAC_PI_4..FRAC_PI_2));
            self.next_turn_at = self.elapsed + rng.gen_range(1.0..5.0);
        } else if rng.gen::<f32>() < config.turn_probability {
            let side = if rng.gen_bool(0.5) { -1.0 } else { 1.0 };
            self.heading = normalize_angle(self.heading + side * rng.gen_range(FRAC_PI_8..FRAC_PI_4));
        }

        let step = std::mem::take(&mut self.pending);
        self.position += heading_vector(self.heading) * self.speed * step;
        self.bounce(config.bounce_extent(), rng);
        BotUpdate::Moved
    }

    /// Reflects the heading off whichever walls the bot has reached, with a
    /// little jitter so bots don't settle into fixed loops.
    fn bounce<R: Rng + ?Sized>(&mut self, extent: f32, rng: &mut R) {
        if self.position.x.abs() > extent {
            self.position.x = extent.copysign(self.position.x);
            self.heading = -self.heading + rng.gen_range(-0.2..0.2);
        }
        if self.position.z.abs() > extent {
            self.position.z = extent.copysign(self.position.z);
            self.heading = std::f32::consts::PI - self.heading + rng.gen_range(-0.2..0.2);
        }
        self.heading = normalize_angle(self.heading);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotUpdate {
    Idle,
    Activated,
    Moved,
}

/// What changed during one bot tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BotTick {
    pub activated: Vec<PlayerId>,
    pub moved: Vec<(PlayerId, WirePosition)>,
}

pub struct BotManager {
    config: BotConfig,
    bots: Vec<BotPlayer>,
    last_spawn_check: Option<Duration>,
    rng: StdRng,
}

impl BotManager {
    pub fn new(config: BotConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: BotConfig, rng: StdRng) -> Self {
        Self {
            config,
            bots: Vec::new(),
            last_spawn_check: None,
            rng,
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Creates `count` bots with staggered spawn times starting from `now`.
    /// Only the first few get trails.
    pub fn create_bots(&mut self, count: usize, now: Duration) -> Vec<PlayerId> {
        let mut trails = self.bots.iter().filter(|b| b.use_trails).count();
        let base = self.bots.len();
        let mut created = Vec::with_capacity(count);

        for i in 0..count {
            let delay = self.config.spawn_interval.mul_f32(i as f32)
                + Duration::from_secs_f32(self.rng.gen_range(0.5..2.0));
            let use_trails = self.config.enable_trails && trails < self.config.max_active_trails;
            if use_trails {
                trails += 1;
            }

            let id = PlayerId::new(format!("{}{}", self.config.prefix, base + i + 1));
            let bot = BotPlayer::new(id.clone(), use_trails, now + delay, &self.config, &mut self.rng);
            self.bots.push(bot);
            created.push(id);
        }

        info!("Created {} bots ({} with trails)", count, trails);
        created
    }

    pub fn update_all(&mut self, now: Duration, dt: f32) -> BotTick {
        self.spread_spawns(now);

        let mut tick = BotTick::default();
        for bot in &mut self.bots {
            match bot.update(now, dt, &self.config, &mut self.rng) {
                BotUpdate::Idle => {}
                BotUpdate::Activated => tick.activated.push(bot.id.clone()),
                BotUpdate::Moved => tick.moved.push((bot.id.clone(), bot.wire_position())),
            }
        }
        tick
    }

    /// Once per check window, pushes back spawns beyond the concurrency limit
    /// that would land in the coming window.
    fn spread_spawns(&mut self, now: Duration) {
        let window = self.config.spawn_check_interval;
        if let Some(last) = self.last_spawn_check {
            if now.saturating_sub(last) < window {
                return;
            }
        }
        self.last_spawn_check = Some(now);

        let mut due: Vec<&mut BotPlayer> = self
            .bots
            .iter_mut()
            .filter(|b| !b.active && b.spawn_at < now + window)
            .collect();
        if due.len() <= self.config.max_concurrent_spawns {
            return;
        }

        due.sort_by_key(|b| b.spawn_at);
        for bot in due.into_iter().skip(self.config.max_concurrent_spawns) {
            bot.spawn_at += window * 2;
            debug!("Postponed bot {} spawn to {:.1}s", bot.id, bot.spawn_at.as_secs_f32());
        }
    }

    pub fn bots(&self) -> &[BotPlayer] {
        &self.bots
    }

    pub fn active_bots(&self) -> impl Iterator<Item = &BotPlayer> + '_ {
        self.bots.iter().filter(|b| b.active)
    }

    pub fn active_infos(&self) -> Vec<PlayerInfo> {
        self.active_bots().map(BotPlayer::to_info).collect()
    }

    pub fn is_bot(&self, id: &PlayerId) -> bool {
        self.bots.iter().any(|b| &b.id == id)
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }
}
