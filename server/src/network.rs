//! TCP relay: one task per connection feeding a single event loop
//!
//! Connection tasks parse the handshake, decode frames and forward them as
//! [`ServerEvent`]s. All roster and broadcast decisions happen in [`Relay`],
//! driven sequentially by [`Server::run`].

use crate::bots::{BotConfig, BotManager};
use crate::client_manager::{ClientManager, ConnectionId, Registration};
use crate::game::GameState;
use crate::ServerError;
use log::{debug, error, info, warn};
use shared::config::{MAX_PLAYERS, MIN_PLAYERS};
use shared::protocol::{self, ARENA_KILLER};
use shared::{ClientMessage, PlayerId, ServerMessage};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, timeout, MissedTickBehavior};

pub const MAX_CHAT_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_players: usize,
    pub min_players: usize,
    pub tick_duration: Duration,
    pub handshake_timeout: Duration,
    pub idle_timeout: Duration,
    pub bots: BotConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_players: MAX_PLAYERS,
            min_players: MIN_PLAYERS,
            tick_duration: Duration::from_millis(50),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(120),
            bots: BotConfig::default(),
        }
    }
}

/// Messages sent from connection tasks to the relay loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        player_id: PlayerId,
        connection_id: ConnectionId,
        sender: UnboundedSender<String>,
    },
    Message {
        player_id: PlayerId,
        connection_id: ConnectionId,
        message: ClientMessage,
    },
    Disconnected {
        player_id: PlayerId,
        connection_id: ConnectionId,
    },
}

/// Roster, connections and bots, updated one event at a time.
pub struct Relay {
    clients: ClientManager,
    game_state: GameState,
    bots: BotManager,
    config: ServerConfig,
}

impl Relay {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_bots(BotManager::new(config.bots.clone()), config)
    }

    pub fn with_bots(bots: BotManager, config: ServerConfig) -> Self {
        Self {
            clients: ClientManager::new(config.max_players),
            game_state: GameState::new(config.max_players, config.min_players),
            bots,
            config,
        }
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    pub fn bots(&self) -> &BotManager {
        &self.bots
    }

    pub fn bots_mut(&mut self) -> &mut BotManager {
        &mut self.bots
    }

    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected {
                player_id,
                connection_id,
                sender,
            } => self.connect(player_id, connection_id, sender),
            ServerEvent::Message {
                player_id,
                connection_id,
                message,
            } => {
                if !self.clients.is_current(&player_id, connection_id) {
                    debug!("Dropping frame from stale connection {} ({})", connection_id, player_id);
                    return;
                }
                self.clients.touch(&player_id);
                self.handle_message(&player_id, message);
            }
            ServerEvent::Disconnected {
                player_id,
                connection_id,
            } => {
                if self.clients.remove_client(&player_id, connection_id) {
                    self.drop_player(&player_id);
                }
            }
        }
    }

    fn connect(&mut self, player_id: PlayerId, connection_id: ConnectionId, sender: UnboundedSender<String>) {
        if self.bots.is_bot(&player_id) {
            warn!("Rejecting connection claiming bot id {}", player_id);
            return;
        }

        let Some(registration) = self.clients.add_client(player_id.clone(), connection_id, sender) else {
            warn!("Server full, rejecting {}", player_id);
            return;
        };
        if !self.game_state.add_player(&player_id) {
            warn!("Roster full, rejecting {}", player_id);
            self.clients.remove_client(&player_id, connection_id);
            return;
        }
        self.game_state.maybe_start();

        let state = ServerMessage::GameState(self.game_state.get_state(self.bots.active_infos()));
        self.send_to(&player_id, &state);

        match registration {
            Registration::New => self.broadcast(
                &ServerMessage::PlayerJoined {
                    player_id: player_id.clone(),
                },
                Some(&player_id),
            ),
            Registration::Replaced => info!("Player {} reconnected", player_id),
        }
    }

    fn handle_message(&mut self, player_id: &PlayerId, message: ClientMessage) {
        match message {
            // The claimed id in the frame is ignored; the connection's id wins.
            ClientMessage::PlayerMove { position, .. } => {
                if !position.is_finite() {
                    warn!("Dropping non-finite position from {}", player_id);
                    return;
                }
                self.game_state.update_player_position(player_id, position);
                self.broadcast(
                    &ServerMessage::PlayerMoved {
                        player_id: player_id.clone(),
                        position,
                    },
                    Some(player_id),
                );
            }
            ClientMessage::PlayerEliminated {} => {
                if self.game_state.eliminate_player(player_id) {
                    info!("Player {} eliminated", player_id);
                }
                self.broadcast(
                    &ServerMessage::PlayerEliminated {
                        player_id: player_id.clone(),
                    },
                    None,
                );
            }
            ClientMessage::PlayerKill { killer, victim } => {
                if killer.as_str() != ARENA_KILLER && killer != victim {
                    self.game_state.add_score(&killer, 1);
                }
                info!("{} eliminated {}", killer, victim);
                self.broadcast(&ServerMessage::PlayerKill { killer, victim }, Some(player_id));
            }
            // Receiving the frame already refreshed the connection.
            ClientMessage::Heartbeat {} => {}
            ClientMessage::Chat { message } => {
                let message: String = message.trim().chars().take(MAX_CHAT_LEN).collect();
                if message.is_empty() {
                    return;
                }
                self.broadcast(
                    &ServerMessage::ChatMessage {
                        player_name: player_id.to_string(),
                        message,
                    },
                    None,
                );
            }
        }
    }

    fn drop_player(&mut self, player_id: &PlayerId) {
        self.game_state.remove_player(player_id);
        self.broadcast(
            &ServerMessage::PlayerLeft {
                player_id: player_id.clone(),
            },
            None,
        );
    }

    /// Advances bots and expires idle connections. `now` is time since the
    /// relay started.
    pub fn tick(&mut self, now: Duration, dt: f32) {
        let update = self.bots.update_all(now, dt);
        for player_id in update.activated {
            self.broadcast(&ServerMessage::PlayerJoined { player_id }, None);
        }
        for (player_id, position) in update.moved {
            self.broadcast(&ServerMessage::PlayerMoved { player_id, position }, None);
        }

        for player_id in self.clients.check_timeouts(self.config.idle_timeout) {
            self.drop_player(&player_id);
        }
    }

    fn send_to(&self, player_id: &PlayerId, message: &ServerMessage) {
        match protocol::encode(message) {
            Ok(line) => {
                if !self.clients.send_to(player_id, &line) {
                    debug!("No live queue for {}", player_id);
                }
            }
            Err(e) => error!("Failed to encode {}: {}", message.kind(), e),
        }
    }

    fn broadcast(&self, message: &ServerMessage, exclude: Option<&PlayerId>) {
        match protocol::encode(message) {
            Ok(line) => {
                self.clients.broadcast(&line, exclude);
            }
            Err(e) => error!("Failed to encode {}: {}", message.kind(), e),
        }
    }
}

pub struct Server {
    listener: TcpListener,
    relay: Relay,
    tick_duration: Duration,
    handshake_timeout: Duration,
    events_tx: UnboundedSender<ServerEvent>,
    events_rx: UnboundedReceiver<ServerEvent>,
    next_connection_id: ConnectionId,
}

impl Server {
    pub async fn bind(addr: &str, config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Server {
            listener,
            tick_duration: config.tick_duration,
            handshake_timeout: config.handshake_timeout,
            relay: Relay::new(config),
            events_tx,
            events_rx,
            next_connection_id: 1,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn relay_mut(&mut self) -> &mut Relay {
        &mut self.relay
    }

    /// Main loop: accepts connections, applies their events in arrival order
    /// and ticks the bots.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let started = Instant::now();
        let bot_count = self.relay.bots.config().count;
        if bot_count > 0 {
            self.relay.bots.create_bots(bot_count, Duration::ZERO);
        }

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!("Accept failed: {}", e),
                    }
                },

                event = self.events_rx.recv() => {
                    // The loop holds a sender, so the channel never closes.
                    if let Some(event) = event {
                        self.relay.handle_event(event);
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;
                    self.relay.tick(started.elapsed(), dt);
                },
            }
        }
    }

    fn spawn_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        let connection_id = self.next_connection_id;
        self.next_connection_id += 1;
        debug!("Accepted {} as connection {}", addr, connection_id);

        let events = self.events_tx.clone();
        let handshake_timeout = self.handshake_timeout;
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, connection_id, events, handshake_timeout).await {
                warn!("Connection {} from {} ended: {}", connection_id, addr, e);
            }
        });
    }
}

/// Serves one socket until either side closes it.
async fn handle_connection(
    stream: TcpStream,
    connection_id: ConnectionId,
    events: UnboundedSender<ServerEvent>,
    handshake_timeout: Duration,
) -> Result<(), ServerError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let handshake = timeout(handshake_timeout, lines.next_line())
        .await
        .map_err(|_| ServerError::HandshakeTimeout)??
        .ok_or(ServerError::ClosedDuringHandshake)?;
    let player_id = protocol::parse_handshake(&handshake)?;

    let (sender, mut outgoing) = mpsc::unbounded_channel::<String>();
    events
        .send(ServerEvent::Connected {
            player_id: player_id.clone(),
            connection_id,
            sender,
        })
        .map_err(|_| ServerError::RelayClosed)?;

    let result = loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match protocol::decode::<ClientMessage>(&line) {
                        Ok(message) => {
                            let event = ServerEvent::Message {
                                player_id: player_id.clone(),
                                connection_id,
                                message,
                            };
                            if events.send(event).is_err() {
                                break Err(ServerError::RelayClosed);
                            }
                        }
                        Err(e) => warn!("Dropping frame from {}: {}", player_id, e),
                    },
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e.into()),
                }
            },

            out = outgoing.recv() => {
                match out {
                    Some(mut line) => {
                        line.push('\n');
                        if let Err(e) = writer.write_all(line.as_bytes()).await {
                            break Err(e.into());
                        }
                    }
                    // The relay dropped this connection.
                    None => break Ok(()),
                }
            },
        }
    };

    let _ = events.send(ServerEvent::Disconnected {
        player_id,
        connection_id,
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::{GamePhase, WirePosition};
    use tokio_test::assert_ok;

    fn id(s: &str) -> PlayerId {
        PlayerId::from(s)
    }

    fn relay() -> Relay {
        let config = ServerConfig::default();
        Relay::with_bots(BotManager::with_rng(config.bots.clone(), StdRng::seed_from_u64(1)), config)
    }

    fn connect(relay: &mut Relay, name: &str, connection_id: ConnectionId) -> UnboundedReceiver<String> {
        let (sender, receiver) = mpsc::unbounded_channel();
        relay.handle_event(ServerEvent::Connected {
            player_id: id(name),
            connection_id,
            sender,
        });
        receiver
    }

    fn send(relay: &mut Relay, name: &str, connection_id: ConnectionId, message: ClientMessage) {
        relay.handle_event(ServerEvent::Message {
            player_id: id(name),
            connection_id,
            message,
        });
    }

    fn received(rx: &mut UnboundedReceiver<String>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(line) = rx.try_recv() {
            messages.push(protocol::decode(&line).unwrap());
        }
        messages
    }

    #[test]
    fn test_newcomer_gets_state_and_others_see_join() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "alice", 1);
        let first = received(&mut a);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind(), "game_state");

        let mut b = connect(&mut relay, "bob", 2);
        match &received(&mut b)[..] {
            [ServerMessage::GameState(state)] => {
                assert_eq!(state.player_count, 2);
                assert_eq!(state.game_phase, GamePhase::Playing);
                assert_eq!(state.current_round, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            received(&mut a),
            vec![ServerMessage::PlayerJoined { player_id: id("bob") }]
        );
    }

    #[test]
    fn test_move_is_relayed_to_others_only() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "alice", 1);
        let mut b = connect(&mut relay, "bob", 2);
        received(&mut a);
        received(&mut b);

        let position = WirePosition {
            x: 3.0,
            y: 1.0,
            z: -4.0,
            rotation: 1.5,
            use_trails: None,
        };
        send(
            &mut relay,
            "alice",
            1,
            ClientMessage::PlayerMove {
                player_id: id("mallory"),
                position,
            },
        );

        assert!(received(&mut a).is_empty());
        assert_eq!(
            received(&mut b),
            vec![ServerMessage::PlayerMoved {
                player_id: id("alice"),
                position,
            }]
        );
        assert_eq!(relay.game_state().player(&id("alice")).unwrap().position, Some(position));
    }

    #[test]
    fn test_non_finite_move_is_dropped() {
        let mut relay = relay();
        let _a = connect(&mut relay, "alice", 1);
        let mut b = connect(&mut relay, "bob", 2);
        received(&mut b);

        send(
            &mut relay,
            "alice",
            1,
            ClientMessage::PlayerMove {
                player_id: id("alice"),
                position: WirePosition {
                    x: f32::NAN,
                    ..WirePosition::default()
                },
            },
        );
        assert!(received(&mut b).is_empty());
    }

    #[test]
    fn test_elimination_and_kill_scoring() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "alice", 1);
        let mut b = connect(&mut relay, "bob", 2);
        received(&mut a);
        received(&mut b);

        send(&mut relay, "bob", 2, ClientMessage::PlayerEliminated {});
        send(
            &mut relay,
            "bob",
            2,
            ClientMessage::PlayerKill {
                killer: id("alice"),
                victim: id("bob"),
            },
        );

        // Elimination goes to everyone, the kill to everyone but the reporter.
        assert_eq!(
            received(&mut b),
            vec![ServerMessage::PlayerEliminated { player_id: id("bob") }]
        );
        assert_eq!(
            received(&mut a),
            vec![
                ServerMessage::PlayerEliminated { player_id: id("bob") },
                ServerMessage::PlayerKill {
                    killer: id("alice"),
                    victim: id("bob"),
                },
            ]
        );
        assert_eq!(relay.game_state().player(&id("alice")).unwrap().score, 1);
        assert!(relay.game_state().player(&id("bob")).unwrap().is_eliminated);
    }

    #[test]
    fn test_arena_and_self_kills_score_nothing() {
        let mut relay = relay();
        let _a = connect(&mut relay, "alice", 1);
        for killer in [ARENA_KILLER, "alice"] {
            send(
                &mut relay,
                "alice",
                1,
                ClientMessage::PlayerKill {
                    killer: id(killer),
                    victim: id("alice"),
                },
            );
        }
        assert_eq!(relay.game_state().player(&id("alice")).unwrap().score, 0);
    }

    #[test]
    fn test_chat_is_trimmed_and_echoed_to_all() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "alice", 1);
        received(&mut a);

        send(&mut relay, "alice", 1, ClientMessage::Chat { message: "  gg  ".into() });
        send(&mut relay, "alice", 1, ClientMessage::Chat { message: "   ".into() });

        assert_eq!(
            received(&mut a),
            vec![ServerMessage::ChatMessage {
                player_name: "alice".into(),
                message: "gg".into(),
            }]
        );
    }

    #[test]
    fn test_disconnect_broadcasts_left() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "alice", 1);
        let _b = connect(&mut relay, "bob", 2);
        received(&mut a);

        relay.handle_event(ServerEvent::Disconnected {
            player_id: id("bob"),
            connection_id: 2,
        });
        assert_eq!(received(&mut a), vec![ServerMessage::PlayerLeft { player_id: id("bob") }]);
        assert!(relay.game_state().player(&id("bob")).is_none());
    }

    #[test]
    fn test_reconnect_replaces_and_ignores_stale_close() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "alice", 1);
        let _old = connect(&mut relay, "bob", 2);
        let mut new = connect(&mut relay, "bob", 3);
        received(&mut a);

        // The replaced connection closing must not remove the player.
        relay.handle_event(ServerEvent::Disconnected {
            player_id: id("bob"),
            connection_id: 2,
        });
        assert!(relay.clients().contains(&id("bob")));
        assert!(received(&mut a).is_empty());

        // Frames still in flight from the old connection are ignored too.
        send(&mut relay, "bob", 2, ClientMessage::Chat { message: "old".into() });
        assert!(received(&mut a).is_empty());

        assert_eq!(received(&mut new)[0].kind(), "game_state");
    }

    #[test]
    fn test_heartbeats_keep_quiet_connection_alive() {
        let config = ServerConfig {
            idle_timeout: Duration::from_millis(150),
            ..ServerConfig::default()
        };
        let mut relay = Relay::new(config);
        let mut a = connect(&mut relay, "alice", 1);
        let _b = connect(&mut relay, "bob", 2);
        received(&mut a);

        for _ in 0..4 {
            std::thread::sleep(Duration::from_millis(60));
            send(&mut relay, "alice", 1, ClientMessage::Heartbeat {});
            send(&mut relay, "bob", 2, ClientMessage::Heartbeat {});
            relay.tick(Duration::ZERO, 0.0);
        }
        assert!(relay.clients().contains(&id("bob")));
        // Heartbeats are not relayed and nobody left.
        assert!(received(&mut a).is_empty());

        std::thread::sleep(Duration::from_millis(200));
        relay.tick(Duration::ZERO, 0.0);
        assert!(!relay.clients().contains(&id("bob")));
    }

    #[test]
    fn test_full_server_rejects_newcomer() {
        let config = ServerConfig {
            max_players: 1,
            ..ServerConfig::default()
        };
        let mut relay = Relay::new(config);
        let _a = connect(&mut relay, "alice", 1);
        let mut b = connect(&mut relay, "bob", 2);

        assert!(received(&mut b).is_empty());
        assert!(b.try_recv().is_err());
        assert_eq!(relay.clients().len(), 1);
        assert!(relay.game_state().player(&id("bob")).is_none());
    }

    #[test]
    fn test_tick_announces_bots() {
        let mut relay = relay();
        relay.bots_mut().create_bots(1, Duration::ZERO);
        let mut a = connect(&mut relay, "alice", 1);
        received(&mut a);

        relay.tick(Duration::from_secs(3), 0.05);
        relay.tick(Duration::from_millis(3200), 0.2);

        let messages = received(&mut a);
        assert_eq!(messages[0], ServerMessage::PlayerJoined { player_id: id("bot_1") });
        assert!(matches!(&messages[1], ServerMessage::PlayerMoved { player_id, .. } if player_id == &id("bot_1")));

        // Late joiners see active bots in their roster.
        let mut b = connect(&mut relay, "bob", 2);
        match &received(&mut b)[..] {
            [ServerMessage::GameState(state)] => assert!(state.players[&id("bot_1")].is_bot),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handshake_and_relay_over_tcp() {
        let server = Server::bind("127.0.0.1:0", ServerConfig::default()).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer
            .write_all(format!("{}\n", protocol::handshake_line(&id("alice"))).as_bytes())
            .await
            .unwrap();
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let message: ServerMessage = protocol::decode(&line).unwrap();
        assert_eq!(message.kind(), "game_state");

        assert_ok!(
            writer
                .write_all(b"{\"type\":\"chat\",\"data\":{\"message\":\"hello\"}}\n")
                .await
        );
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(
            line,
            "{\"type\":\"chat_message\",\"data\":{\"player_name\":\"alice\",\"message\":\"hello\"}}"
        );
    }

    #[tokio::test]
    async fn test_bad_handshake_closes_connection() {
        let server = Server::bind("127.0.0.1:0", ServerConfig::default()).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        assert_ok!(writer.write_all(b"GET / HTTP/1.1\n").await);

        let line = timeout(Duration::from_secs(2), lines.next_line()).await.unwrap();
        assert!(matches!(line, Ok(None) | Err(_)));
    }
}
