//! Client game loop state: local vehicle, remote vehicles, rules and events
//!
//! [`Game::tick`] runs one frame in a fixed order: drain the network, run due
//! tasks, advance physics, apply rules, settle eliminations, report the local
//! transform, then interpolate remote vehicles. Everything the viewer needs is
//! read through [`Game::snapshot`] or the event topics.

use crate::events::{
    ChatEvent, EffectKind, EffectRequest, EliminationEvent, KillEvent, PortalEvent, Topic,
};
use crate::network::{ConnectionStatus, NetworkClient};
use crate::quality::QualityController;
use crate::reconciler::{Reconciler, Snapshot};
use crate::rules::{Elimination, EliminationCause, RuleEngine};
use crate::scheduler::{Scheduler, TaskId};
use glam::Vec3;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    Arena, EntityKey, GameConfig, GamePhase, GameStateData, PlayerId, Portal, ServerMessage,
    TurnIntent, Vehicle, VehicleKind, VehicleResources,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

pub const ENEMY_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GameTask {
    RespawnLocal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnemyPosition {
    pub player: PlayerId,
    pub position: Vec3,
    pub heading: f32,
}

/// Read-only view of one vehicle for the viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleView {
    pub player: PlayerId,
    pub position: Vec3,
    pub heading: f32,
    pub speed: f32,
    pub trail: Vec<Vec3>,
    pub trail_active: bool,
    pub jumping: bool,
    pub body_color: [u8; 4],
    pub trail_color: [u8; 4],
}

impl VehicleView {
    fn of(vehicle: &Vehicle) -> Self {
        Self {
            player: vehicle.player_id().clone(),
            position: vehicle.position(),
            heading: vehicle.heading(),
            speed: vehicle.speed(),
            trail: vehicle.trail().to_vec(),
            trail_active: vehicle.is_trail_active(),
            jumping: vehicle.is_jumping(),
            body_color: vehicle.template().body_color,
            trail_color: vehicle.template().trail_color,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameSnapshot {
    pub local: Option<VehicleView>,
    pub remotes: Vec<VehicleView>,
    pub enemy_positions: Vec<EnemyPosition>,
    pub arena_size: f32,
    pub portals: Vec<Portal>,
    pub connection: ConnectionStatus,
    pub phase: GamePhase,
    pub respawn_in: Option<Duration>,
}

#[derive(Default)]
pub struct GameTopics {
    pub kills: Topic<KillEvent>,
    pub eliminations: Topic<EliminationEvent>,
    pub chat: Topic<ChatEvent>,
    pub portals: Topic<PortalEvent>,
    pub effects: Topic<EffectRequest>,
    pub enemy_positions: Topic<Vec<EnemyPosition>>,
}

pub struct Game {
    config: GameConfig,
    arena: Arena,
    resources: VehicleResources,
    rules: RuleEngine,
    reconciler: Reconciler,
    scheduler: Scheduler<GameTask>,
    network: NetworkClient,
    quality: QualityController,
    rng: StdRng,

    local: Option<Vehicle>,
    local_generation: Option<u32>,
    respawn: Option<(TaskId, Duration)>,
    current_portal: Option<String>,
    started: bool,
    phase: GamePhase,

    now: Duration,
    last_enemy_refresh: Option<Duration>,
    enemy_positions: Vec<EnemyPosition>,
    recent_victims: HashMap<PlayerId, Duration>,

    pub topics: GameTopics,
}

impl Game {
    pub fn new(config: GameConfig, network: NetworkClient) -> Self {
        Self::with_rng(config, network, StdRng::from_entropy())
    }

    pub fn with_rng(config: GameConfig, network: NetworkClient, rng: StdRng) -> Self {
        let resources = VehicleResources::new(&config);
        Self {
            arena: Arena::new(&config),
            rules: RuleEngine::new(&config),
            reconciler: Reconciler::new(&config, resources.clone()),
            resources,
            scheduler: Scheduler::new(),
            network,
            quality: QualityController::default(),
            rng,
            local: None,
            local_generation: None,
            respawn: None,
            current_portal: None,
            started: false,
            phase: GamePhase::Waiting,
            now: Duration::ZERO,
            last_enemy_refresh: None,
            enemy_positions: Vec::new(),
            recent_victims: HashMap::new(),
            topics: GameTopics::default(),
            config,
        }
    }

    pub fn with_quality(mut self, quality: QualityController) -> Self {
        self.quality = quality;
        self
    }

    pub fn player_id(&self) -> &PlayerId {
        self.network.player_id()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    pub fn local(&self) -> Option<&Vehicle> {
        self.local.as_ref()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn network(&self) -> &NetworkClient {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut NetworkClient {
        &mut self.network
    }

    pub fn quality(&self) -> &QualityController {
        &self.quality
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Spawns the local vehicle at a random position.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.spawn_local();
    }

    /// Spawns the local vehicle at a chosen position.
    pub fn start_at(&mut self, position: Vec3, heading: f32) {
        if self.started {
            return;
        }
        self.started = true;
        self.spawn_local_at(position, heading);
    }

    pub fn turn(&mut self, intent: TurnIntent) {
        if let Some(local) = self.local.as_mut() {
            local.set_turn(intent);
        }
    }

    pub fn jump(&mut self) -> bool {
        match self.local.as_mut() {
            Some(local) => local.jump(self.now, &self.config),
            None => false,
        }
    }

    pub fn send_chat(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.network.send_chat(text)
    }

    fn spawn_local(&mut self) {
        let (position, heading) = self
            .arena
            .random_spawn(&mut self.rng, self.config.ride_height);
        self.spawn_local_at(position, heading);
    }

    fn spawn_local_at(&mut self, position: Vec3, heading: f32) {
        let generation = self.local_generation.map_or(0, |g| g + 1);
        self.local_generation = Some(generation);

        let key = EntityKey::new(self.player_id().clone(), generation);
        info!("Spawning local vehicle {} at {:?}", key, position);
        let vehicle = Vehicle::new(
            key,
            self.resources.template(VehicleKind::Local),
            &self.config,
            position,
            heading,
            self.now,
        );

        self.topics.effects.publish(EffectRequest {
            kind: EffectKind::Respawn,
            position,
            color: vehicle.template().body_color,
        });
        self.local = Some(vehicle);
        self.current_portal = None;
    }

    /// Advances the game by one frame of length `dt`.
    pub fn tick(&mut self, dt: Duration) {
        self.now += dt;
        self.quality.record_frame(dt);
        let now = self.now;

        for message in self.network.poll() {
            self.apply_message(message);
        }

        for task in self.scheduler.due(now) {
            match task {
                GameTask::RespawnLocal => {
                    self.respawn = None;
                    self.spawn_local();
                }
            }
        }
        self.reconciler.run_due(now);

        if let Some(local) = self.local.as_mut() {
            local.update(dt.as_secs_f32(), now, &self.config);
        }

        let eliminations = {
            let field: Vec<&Vehicle> = self
                .local
                .iter()
                .chain(self.reconciler.vehicles())
                .collect();
            self.rules.evaluate(&field, &self.arena)
        };
        for elimination in eliminations {
            self.handle_elimination(elimination);
        }

        self.check_portals();

        if let Some(local) = self.local.as_ref() {
            let (position, heading) = (local.position(), local.heading());
            self.network.send_position(now, position, heading);
        }

        let local_position = self.local.as_ref().map(|v| v.position());
        self.reconciler.tick(now, local_position, &self.quality);

        self.refresh_enemy_positions();
        self.recent_victims
            .retain(|_, until| now < *until);
    }

    fn handle_elimination(&mut self, elimination: Elimination) {
        let Elimination {
            victim,
            cause,
            position,
        } = elimination;
        let hold_until = self.now + self.config.respawn_delay;

        let is_local = self.local.as_ref().is_some_and(|v| v.key() == &victim);
        let color = if is_local {
            let Some(mut vehicle) = self.local.take() else {
                return;
            };
            vehicle.eliminate();
            info!("Local vehicle {} eliminated: {:?}", victim, cause);

            self.network.report_elimination();
            self.network
                .report_kill(cause.killer_id(), victim.player.clone());

            let task = self.scheduler.schedule(hold_until, GameTask::RespawnLocal);
            self.respawn = Some((task, hold_until));
            vehicle.template().trail_color
        } else {
            let Some(mut vehicle) = self
                .reconciler
                .evict_and_hold_off(&victim.player, hold_until)
            else {
                warn!("Eliminated vehicle {} already gone", victim);
                return;
            };
            vehicle.eliminate();
            info!("Remote vehicle {} eliminated: {:?}", victim, cause);
            vehicle.template().trail_color
        };

        self.recent_victims.insert(victim.player.clone(), hold_until);
        self.topics.kills.publish(KillEvent {
            cause,
            victim: victim.player.clone(),
        });
        self.topics.eliminations.publish(EliminationEvent {
            player: victim.player,
            position,
            local: is_local,
        });
        self.topics.effects.publish(EffectRequest {
            kind: EffectKind::Explosion,
            position,
            color,
        });
    }

    fn check_portals(&mut self) {
        let Some(local) = self.local.as_ref() else {
            return;
        };
        let entered = self.arena.portal_at(local.position()).map(|p| p.id.clone());

        if entered != self.current_portal {
            if let Some(portal_id) = entered.clone() {
                self.topics.portals.publish(PortalEvent {
                    portal_id,
                    player: local.player_id().clone(),
                });
            }
            self.current_portal = entered;
        }
    }

    fn refresh_enemy_positions(&mut self) {
        if let Some(last) = self.last_enemy_refresh {
            if self.now.saturating_sub(last) < ENEMY_REFRESH_INTERVAL {
                return;
            }
        }
        self.last_enemy_refresh = Some(self.now);

        // Without a local vehicle every remote counts as visible.
        let local_position = self.local.as_ref().map(|v| v.position());
        let radius = self.quality.visibility_radius();
        self.enemy_positions = self
            .reconciler
            .vehicles()
            .filter(|v| local_position.map_or(true, |local| local.distance(v.position()) <= radius))
            .map(|v| EnemyPosition {
                player: v.player_id().clone(),
                position: v.position(),
                heading: v.heading(),
            })
            .collect();
        self.topics
            .enemy_positions
            .publish(self.enemy_positions.clone());
    }

    fn apply_message(&mut self, message: ServerMessage) {
        let now = self.now;
        match message {
            ServerMessage::GameState(state) => self.apply_game_state(state),

            ServerMessage::PlayerJoined { player_id } => {
                debug!("Player {} joined", player_id);
            }

            ServerMessage::PlayerLeft { player_id } => {
                info!("Player {} left", player_id);
                self.reconciler.forget(&player_id);
            }

            ServerMessage::PlayerMoved {
                player_id,
                position,
            } => {
                if &player_id == self.player_id() {
                    return;
                }
                self.reconciler
                    .admit(&player_id, Snapshot::from(&position), now);
            }

            ServerMessage::PlayerEliminated { player_id } => {
                if &player_id == self.player_id() {
                    return;
                }
                let hold_until = now + self.config.respawn_delay;
                if let Some(vehicle) = self.reconciler.evict_and_hold_off(&player_id, hold_until) {
                    let position = vehicle.position();
                    self.topics.eliminations.publish(EliminationEvent {
                        player: player_id,
                        position,
                        local: false,
                    });
                    self.topics.effects.publish(EffectRequest {
                        kind: EffectKind::Explosion,
                        position,
                        color: vehicle.template().trail_color,
                    });
                }
            }

            ServerMessage::PlayerKill { killer, victim } => {
                if &victim == self.player_id() || self.recent_victims.contains_key(&victim) {
                    return;
                }
                self.recent_victims
                    .insert(victim.clone(), now + self.config.respawn_delay);
                self.topics.kills.publish(KillEvent {
                    cause: EliminationCause::from_killer_id(&killer),
                    victim,
                });
            }

            ServerMessage::ChatMessage {
                player_name,
                message,
            } => {
                self.topics.chat.publish(ChatEvent {
                    player_name,
                    message,
                });
            }
        }
    }

    fn apply_game_state(&mut self, state: GameStateData) {
        self.phase = state.game_phase;

        let roster: HashSet<&PlayerId> = state.players.keys().collect();
        let stale: Vec<PlayerId> = self
            .reconciler
            .tracked_ids()
            .filter(|id| !roster.contains(id))
            .cloned()
            .collect();
        for id in stale {
            warn!("Evicting {}: missing from game state", id);
            self.reconciler.evict(&id);
        }

        let hold_until = self.now + self.config.respawn_delay;
        for (id, info) in &state.players {
            if id == self.network.player_id() {
                continue;
            }
            if info.is_eliminated {
                if self.reconciler.evict_and_hold_off(id, hold_until).is_some() {
                    debug!("Evicted {}: eliminated in game state", id);
                }
                continue;
            }
            if let Some(position) = info.position.as_ref() {
                self.reconciler.admit(id, Snapshot::from(position), self.now);
            }
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            local: self.local.as_ref().map(VehicleView::of),
            remotes: self.reconciler.vehicles().map(VehicleView::of).collect(),
            enemy_positions: self.enemy_positions.clone(),
            arena_size: self.arena.size(),
            portals: self.arena.portals().to_vec(),
            connection: self.network.status().clone(),
            phase: self.phase,
            respawn_in: self
                .respawn
                .map(|(_, at)| at.saturating_sub(self.now)),
        }
    }

    /// Detaches every vehicle and stops the transport.
    pub fn shutdown(&mut self) {
        info!("Shutting down game");
        self.network.close();
        self.reconciler.clear();
        self.scheduler.clear();
        self.local = None;
        self.respawn = None;
        self.started = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ClientConfig, TransportEndpoint, TransportEvent};
    use shared::{ClientMessage, PlayerInfo, WirePosition};
    use std::f32::consts::FRAC_PI_2;

    const FRAME: Duration = Duration::from_micros(16_667);

    fn connected_game() -> (Game, TransportEndpoint) {
        let (network, endpoint) =
            NetworkClient::detached(PlayerId::from("me"), &ClientConfig::default());
        endpoint
            .events
            .send(TransportEvent::Status(ConnectionStatus::Connected))
            .unwrap();
        let game = Game::with_rng(GameConfig::default(), network, StdRng::seed_from_u64(1));
        (game, endpoint)
    }

    fn deliver(endpoint: &TransportEndpoint, message: ServerMessage) {
        endpoint.events.send(TransportEvent::Message(message)).unwrap();
    }

    fn moved(id: &str, x: f32, z: f32, rotation: f32) -> ServerMessage {
        ServerMessage::PlayerMoved {
            player_id: PlayerId::from(id),
            position: WirePosition {
                x,
                y: 1.0,
                z,
                rotation,
                use_trails: None,
            },
        }
    }

    fn sent(endpoint: &mut TransportEndpoint) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = endpoint.outgoing.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_start_spawns_local_vehicle_in_bounds() {
        let (mut game, _endpoint) = connected_game();
        assert!(game.local().is_none());

        game.start();
        let local = game.local().unwrap();
        assert!(!game.arena().is_out_of_bounds(local.position()));
        assert_eq!(local.key().generation, 0);
    }

    #[test]
    fn test_position_reports_follow_fixed_cadence() {
        let (mut game, mut endpoint) = connected_game();
        game.start_at(Vec3::new(0.0, 1.0, 0.0), 0.0);

        for _ in 0..60 {
            game.tick(FRAME);
        }

        let moves = sent(&mut endpoint)
            .into_iter()
            .filter(|m| matches!(m, ClientMessage::PlayerMove { .. }))
            .count();
        // One second at a 50 ms cadence.
        assert!((18..=21).contains(&moves), "sent {} moves", moves);
    }

    #[test]
    fn test_leaving_arena_eliminates_and_respawns_local() {
        let (mut game, mut endpoint) = connected_game();
        let mut kills = game.topics.kills.subscribe();
        let mut effects = game.topics.effects.subscribe();

        let limit = game.arena().playable_half_extent();
        game.start_at(Vec3::new(limit - 0.1, 1.0, 0.0), FRAC_PI_2);
        game.tick(FRAME);

        assert!(game.local().is_none());
        let kill = kills.try_recv().unwrap();
        assert_eq!(kill.cause, EliminationCause::Arena);
        assert_eq!(kill.victim, PlayerId::from("me"));
        assert!(effects
            .drain()
            .iter()
            .any(|e| e.kind == EffectKind::Explosion));

        let reports = sent(&mut endpoint);
        assert!(reports.contains(&ClientMessage::PlayerEliminated {}));
        assert!(reports.contains(&ClientMessage::PlayerKill {
            killer: PlayerId::from("Arena"),
            victim: PlayerId::from("me"),
        }));

        let respawn_in = game.snapshot().respawn_in.unwrap();
        assert!(respawn_in <= game.config().respawn_delay);

        let mut elapsed = Duration::ZERO;
        while elapsed < Duration::from_millis(3100) {
            game.tick(FRAME);
            elapsed += FRAME;
        }
        let local = game.local().unwrap();
        assert_eq!(local.key().generation, 1);
        assert!(game.snapshot().respawn_in.is_none());
    }

    #[test]
    fn test_remote_snapshots_are_admitted_with_throttle() {
        let (mut game, endpoint) = connected_game();
        game.start_at(Vec3::new(0.0, 1.0, -200.0), 0.0);

        deliver(&endpoint, moved("r1", 10.0, 10.0, 0.0));
        deliver(&endpoint, moved("r2", -10.0, 10.0, 0.0));
        game.tick(FRAME);

        assert!(game.reconciler().contains(&PlayerId::from("r1")));
        assert!(game.reconciler().is_pending(&PlayerId::from("r2")));

        for _ in 0..7 {
            game.tick(FRAME);
        }
        assert!(game.reconciler().contains(&PlayerId::from("r2")));
    }

    #[test]
    fn test_own_echoes_are_ignored() {
        let (mut game, endpoint) = connected_game();
        game.start_at(Vec3::new(0.0, 1.0, 0.0), 0.0);
        let mut kills = game.topics.kills.subscribe();

        deliver(&endpoint, moved("me", 50.0, 50.0, 0.0));
        deliver(
            &endpoint,
            ServerMessage::PlayerEliminated {
                player_id: PlayerId::from("me"),
            },
        );
        deliver(
            &endpoint,
            ServerMessage::PlayerKill {
                killer: PlayerId::from("Arena"),
                victim: PlayerId::from("me"),
            },
        );
        game.tick(FRAME);

        assert!(game.reconciler().is_empty());
        assert!(game.local().is_some());
        assert!(kills.try_recv().is_none());
    }

    #[test]
    fn test_player_left_and_eliminated_evict_remotes() {
        let (mut game, endpoint) = connected_game();
        let mut eliminations = game.topics.eliminations.subscribe();

        deliver(&endpoint, moved("r1", 10.0, 10.0, 0.0));
        game.tick(FRAME);
        deliver(&endpoint, moved("r2", 20.0, 10.0, 0.0));
        for _ in 0..10 {
            game.tick(FRAME);
        }
        assert_eq!(game.reconciler().len(), 2);

        deliver(
            &endpoint,
            ServerMessage::PlayerLeft {
                player_id: PlayerId::from("r1"),
            },
        );
        deliver(
            &endpoint,
            ServerMessage::PlayerEliminated {
                player_id: PlayerId::from("r2"),
            },
        );
        // A stale move after the elimination must not resurrect r2.
        deliver(&endpoint, moved("r2", 21.0, 10.0, 0.0));
        game.tick(FRAME);

        assert!(game.reconciler().is_empty());
        let events = eliminations.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].player, PlayerId::from("r2"));
    }

    #[test]
    fn test_game_state_admits_roster_and_sets_phase() {
        let (mut game, endpoint) = connected_game();

        let mut players = HashMap::new();
        for (id, eliminated) in [("me", false), ("r1", false), ("r2", true)] {
            players.insert(
                PlayerId::from(id),
                PlayerInfo {
                    id: PlayerId::from(id),
                    position: Some(WirePosition::from_transform(Vec3::new(5.0, 1.0, 5.0), 0.0)),
                    is_eliminated: eliminated,
                    score: 0,
                    is_bot: false,
                    use_light_trails: None,
                },
            );
        }
        deliver(
            &endpoint,
            ServerMessage::GameState(GameStateData {
                players,
                eliminated_players: vec![PlayerId::from("r2")],
                game_phase: GamePhase::Playing,
                current_round: 1,
                player_count: 3,
                max_players: 16,
                min_players: 2,
            }),
        );
        game.tick(FRAME);

        assert_eq!(game.phase(), GamePhase::Playing);
        assert!(game.reconciler().contains(&PlayerId::from("r1")));
        assert!(!game.reconciler().contains(&PlayerId::from("me")));
        assert!(!game.reconciler().contains(&PlayerId::from("r2")));
    }

    fn roster(entries: &[(&str, bool)]) -> ServerMessage {
        let players = entries
            .iter()
            .map(|&(id, eliminated)| {
                let info = PlayerInfo {
                    id: PlayerId::from(id),
                    position: Some(WirePosition::from_transform(Vec3::new(5.0, 1.0, 5.0), 0.0)),
                    is_eliminated: eliminated,
                    score: 0,
                    is_bot: false,
                    use_light_trails: None,
                };
                (PlayerId::from(id), info)
            })
            .collect();
        ServerMessage::GameState(GameStateData {
            players,
            eliminated_players: Vec::new(),
            game_phase: GamePhase::Playing,
            current_round: 1,
            player_count: entries.len(),
            max_players: 16,
            min_players: 2,
        })
    }

    #[test]
    fn test_game_state_evicts_eliminated_and_unlisted_remotes() {
        let (mut game, endpoint) = connected_game();
        let r1 = PlayerId::from("r1");
        let r2 = PlayerId::from("r2");

        deliver(&endpoint, moved("r1", 10.0, 10.0, 0.0));
        deliver(&endpoint, moved("r2", 20.0, 10.0, 0.0));
        game.tick(FRAME);
        assert!(game.reconciler().contains(&r1));
        assert!(game.reconciler().is_pending(&r2));

        // r1 is listed as out; r2 is not listed at all.
        deliver(&endpoint, roster(&[("me", false), ("r1", true)]));
        game.tick(FRAME);
        assert!(!game.reconciler().contains(&r1));
        assert!(!game.reconciler().is_pending(&r2));
        assert_eq!(game.reconciler().scheduled_retries(), 0);

        // Moves still in flight from before the crash do not bring r1 back.
        deliver(&endpoint, moved("r1", 11.0, 10.0, 0.0));
        for _ in 0..10 {
            game.tick(FRAME);
        }
        assert!(game.reconciler().is_empty());
        assert!(game.reconciler().is_held_off(&r1, game.now()));
    }

    #[test]
    fn test_elimination_of_missing_remote_is_ignored() {
        let (mut game, _endpoint) = connected_game();
        let mut kills = game.topics.kills.subscribe();
        let mut effects = game.topics.effects.subscribe();

        game.handle_elimination(Elimination {
            victim: EntityKey::new(PlayerId::from("ghost"), 0),
            cause: EliminationCause::Arena,
            position: Vec3::new(1.0, 1.0, 1.0),
        });

        assert!(kills.try_recv().is_none());
        assert!(effects.try_recv().is_none());
        assert!(game.recent_victims.is_empty());
    }

    #[test]
    fn test_server_kill_for_locally_eliminated_remote_is_not_repeated() {
        let (mut game, endpoint) = connected_game();
        let mut kills = game.topics.kills.subscribe();

        deliver(&endpoint, moved("r1", 10.0, 10.0, 0.0));
        game.tick(FRAME);
        let key = game.reconciler().get(&PlayerId::from("r1")).unwrap().key().clone();

        game.handle_elimination(Elimination {
            victim: key,
            cause: EliminationCause::Arena,
            position: Vec3::new(10.0, 1.0, 10.0),
        });
        deliver(
            &endpoint,
            ServerMessage::PlayerKill {
                killer: PlayerId::from("Arena"),
                victim: PlayerId::from("r1"),
            },
        );
        game.tick(FRAME);

        let events = kills.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].victim, PlayerId::from("r1"));
    }

    #[test]
    fn test_enemy_positions_only_list_visible_remotes() {
        let (mut game, endpoint) = connected_game();
        let radius = game.quality().visibility_radius();
        game.start_at(Vec3::new(0.0, 1.0, -200.0), 0.0);

        deliver(&endpoint, moved("near", 10.0, -190.0, 0.0));
        deliver(&endpoint, moved("far", 0.0, -200.0 + radius + 50.0, 0.0));
        for _ in 0..30 {
            game.tick(FRAME);
        }
        assert_eq!(game.reconciler().len(), 2);

        let listed: Vec<PlayerId> = game
            .snapshot()
            .enemy_positions
            .into_iter()
            .map(|e| e.player)
            .collect();
        assert_eq!(listed, vec![PlayerId::from("near")]);
    }

    #[test]
    fn test_chat_flows_both_ways() {
        let (mut game, mut endpoint) = connected_game();
        let mut chat = game.topics.chat.subscribe();
        game.tick(FRAME);

        assert!(game.send_chat("  hello  "));
        assert!(!game.send_chat("   "));
        assert_eq!(
            sent(&mut endpoint),
            vec![ClientMessage::Chat {
                message: "hello".to_string()
            }]
        );

        deliver(
            &endpoint,
            ServerMessage::ChatMessage {
                player_name: "r1".to_string(),
                message: "gg".to_string(),
            },
        );
        game.tick(FRAME);
        assert_eq!(chat.try_recv().unwrap().message, "gg");
    }

    #[test]
    fn test_remote_trail_eliminates_local_with_remote_as_killer() {
        let (mut game, mut endpoint) = connected_game();
        let mut kills = game.topics.kills.subscribe();

        // Local drives +Z and reaches the origin about 3.5 s in, after both
        // grace periods. The remote sweeps across x at z = 0 from t = 3 s.
        game.start_at(Vec3::new(0.0, 1.0, -120.0), 0.0);
        deliver(&endpoint, moved("remote", -10.0, 0.0, FRAC_PI_2));

        let mut killed = None;
        for _ in 0..300 {
            let t = game.now().as_secs_f32();
            if t >= 3.0 {
                let x = (-10.0 + 40.0 * (t - 3.0)).min(30.0);
                deliver(&endpoint, moved("remote", x, 0.0, FRAC_PI_2));
            }
            game.tick(FRAME);
            if let Some(kill) = kills.try_recv() {
                killed = Some(kill);
                break;
            }
        }

        let kill = killed.unwrap();
        assert_eq!(kill.victim, PlayerId::from("me"));
        assert_eq!(
            kill.cause,
            EliminationCause::Trail {
                killer: PlayerId::from("remote")
            }
        );
        assert!(sent(&mut endpoint).contains(&ClientMessage::PlayerKill {
            killer: PlayerId::from("remote"),
            victim: PlayerId::from("me"),
        }));
    }

    #[test]
    fn test_portal_entry_is_published_once() {
        let (mut game, _endpoint) = connected_game();
        game.arena_mut().register_portal(Portal::new(
            "gate",
            Vec3::new(0.0, 1.0, 5.0),
            Vec3::new(3.0, 3.0, 2.0),
        ));
        let mut portals = game.topics.portals.subscribe();

        game.start_at(Vec3::new(0.0, 1.0, 0.0), 0.0);
        for _ in 0..60 {
            game.tick(FRAME);
        }

        let events = portals.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].portal_id, "gate");
    }

    #[test]
    fn test_shutdown_detaches_everything() {
        let (mut game, endpoint) = connected_game();
        game.start_at(Vec3::new(0.0, 1.0, 0.0), 0.0);
        deliver(&endpoint, moved("r1", 10.0, 10.0, 0.0));
        game.tick(FRAME);

        game.shutdown();
        assert!(game.local().is_none());
        assert!(game.reconciler().is_empty());
        assert_eq!(game.snapshot().connection, ConnectionStatus::Disconnected);
    }
}
