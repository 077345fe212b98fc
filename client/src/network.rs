//! Connection to the game server
//!
//! The socket lives in a tokio task ([`run_transport`]) and talks to the game
//! loop only through two unbounded channels. The loop side, [`NetworkClient`],
//! never blocks: outgoing messages are pushed onto a channel and inbound ones
//! are drained once per tick by [`NetworkClient::poll`].

use crate::events::{ChatEvent, Topic};
use log::{debug, error, info, warn};
use shared::protocol::{self, ProtocolError};
use shared::{ClientMessage, GameStateData, PlayerId, ServerMessage, WirePosition};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep, timeout, Instant};

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    Io(#[from] io::Error),
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub connect_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub max_reconnect_attempts: u32,
    pub position_interval: Duration,
    /// Longest quiet gap before the transport sends a heartbeat. Must stay
    /// well under the server's idle timeout.
    pub heartbeat_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8000".to_string(),
            connect_timeout: Duration::from_secs(3),
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(8),
            max_reconnect_attempts: 5,
            position_interval: Duration::from_millis(50),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting { attempt: u32, retry_in: Duration },
    /// Terminal. The transport gave up or was closed.
    Disconnected,
}

/// Exponential reconnect delay, doubling from `base` up to `cap`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(self.attempt);
        let delay = self.base.saturating_mul(factor).min(self.cap);
        self.attempt += 1;
        Some(delay)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Status(ConnectionStatus),
    Message(ServerMessage),
    Malformed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub malformed_dropped: u64,
    pub outgoing_dropped: u64,
    pub reconnects: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerMoved {
    pub player_id: PlayerId,
    pub position: WirePosition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KillReport {
    pub killer: PlayerId,
    pub victim: PlayerId,
}

/// One topic per inbound message kind, plus connection status.
#[derive(Default)]
pub struct NetworkTopics {
    pub game_state: Topic<GameStateData>,
    pub player_joined: Topic<PlayerId>,
    pub player_left: Topic<PlayerId>,
    pub player_moved: Topic<PlayerMoved>,
    pub player_eliminated: Topic<PlayerId>,
    pub player_kill: Topic<KillReport>,
    pub chat_message: Topic<ChatEvent>,
    pub status: Topic<ConnectionStatus>,
}

impl NetworkTopics {
    fn publish(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::GameState(state) => self.game_state.publish(state.clone()),
            ServerMessage::PlayerJoined { player_id } => self.player_joined.publish(player_id.clone()),
            ServerMessage::PlayerLeft { player_id } => self.player_left.publish(player_id.clone()),
            ServerMessage::PlayerMoved {
                player_id,
                position,
            } => self.player_moved.publish(PlayerMoved {
                player_id: player_id.clone(),
                position: *position,
            }),
            ServerMessage::PlayerEliminated { player_id } => {
                self.player_eliminated.publish(player_id.clone())
            }
            ServerMessage::PlayerKill { killer, victim } => self.player_kill.publish(KillReport {
                killer: killer.clone(),
                victim: victim.clone(),
            }),
            ServerMessage::ChatMessage {
                player_name,
                message,
            } => self.chat_message.publish(ChatEvent {
                player_name: player_name.clone(),
                message: message.clone(),
            }),
        }
    }
}

/// The transport's ends of the channels, for driving a client without a socket.
pub struct TransportEndpoint {
    pub events: UnboundedSender<TransportEvent>,
    pub outgoing: UnboundedReceiver<ClientMessage>,
}

pub struct NetworkClient {
    player_id: PlayerId,
    outgoing: Option<UnboundedSender<ClientMessage>>,
    inbox: UnboundedReceiver<TransportEvent>,
    status: ConnectionStatus,
    stats: NetworkStats,
    position_interval: Duration,
    last_position_sent: Option<Duration>,
    pub topics: NetworkTopics,
}

impl NetworkClient {
    /// Starts the transport task on `handle` and returns the loop side.
    pub fn spawn(handle: &Handle, config: ClientConfig, player_id: PlayerId) -> Self {
        let (client, endpoint) = Self::detached(player_id.clone(), &config);
        handle.spawn(run_transport(config, player_id, endpoint));
        client
    }

    /// A client whose transport is whoever holds the returned endpoint.
    pub fn detached(player_id: PlayerId, config: &ClientConfig) -> (Self, TransportEndpoint) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let client = Self {
            player_id,
            outgoing: Some(out_tx),
            inbox: event_rx,
            status: ConnectionStatus::Connecting,
            stats: NetworkStats::default(),
            position_interval: config.position_interval,
            last_position_sent: None,
            topics: NetworkTopics::default(),
        };
        let endpoint = TransportEndpoint {
            events: event_tx,
            outgoing: out_rx,
        };
        (client, endpoint)
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    /// Drains everything the transport delivered since the last call.
    ///
    /// Status changes and messages are published to [`NetworkTopics`]; the
    /// messages are also returned so the caller can apply them in order.
    pub fn poll(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        loop {
            let event = match self.inbox.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.status != ConnectionStatus::Disconnected {
                        self.set_status(ConnectionStatus::Disconnected);
                    }
                    break;
                }
            };

            match event {
                TransportEvent::Status(status) => self.set_status(status),
                TransportEvent::Message(message) => {
                    self.stats.messages_received += 1;
                    self.topics.publish(&message);
                    messages.push(message);
                }
                TransportEvent::Malformed(reason) => {
                    self.stats.malformed_dropped += 1;
                    warn!("Dropped malformed message: {}", reason);
                }
            }
        }
        messages
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if matches!(status, ConnectionStatus::Reconnecting { .. }) {
            self.stats.reconnects += 1;
        }
        if status == ConnectionStatus::Connected {
            self.last_position_sent = None;
        }
        info!("Connection status: {:?}", status);
        self.status = status.clone();
        self.topics.status.publish(status);
    }

    fn send(&mut self, message: ClientMessage) -> bool {
        if !self.is_connected() {
            self.stats.outgoing_dropped += 1;
            debug!("Not connected, dropping {:?}", message);
            return false;
        }
        match &self.outgoing {
            Some(outgoing) if outgoing.send(message).is_ok() => {
                self.stats.messages_sent += 1;
                true
            }
            _ => {
                self.stats.outgoing_dropped += 1;
                false
            }
        }
    }

    /// Sends the local transform unless one went out less than the position
    /// interval ago.
    pub fn send_position(&mut self, now: Duration, position: glam::Vec3, heading: f32) -> bool {
        if let Some(last) = self.last_position_sent {
            if now.saturating_sub(last) < self.position_interval {
                return false;
            }
        }
        let sent = self.send(ClientMessage::PlayerMove {
            player_id: self.player_id.clone(),
            position: WirePosition::from_transform(position, heading),
        });
        if sent {
            self.last_position_sent = Some(now);
        }
        sent
    }

    pub fn report_elimination(&mut self) -> bool {
        self.send(ClientMessage::PlayerEliminated {})
    }

    pub fn report_kill(&mut self, killer: PlayerId, victim: PlayerId) -> bool {
        self.send(ClientMessage::PlayerKill { killer, victim })
    }

    pub fn send_chat(&mut self, message: impl Into<String>) -> bool {
        self.send(ClientMessage::Chat {
            message: message.into(),
        })
    }

    /// Stops the transport. The client stays usable but sends nothing.
    pub fn close(&mut self) {
        if self.outgoing.take().is_some() {
            self.set_status(ConnectionStatus::Disconnected);
        }
    }
}

enum SessionEnd {
    Shutdown,
    Lost(NetworkError),
}

async fn connect(config: &ClientConfig, player_id: &PlayerId) -> Result<TcpStream, NetworkError> {
    let mut stream = timeout(config.connect_timeout, TcpStream::connect(&config.server_addr))
        .await
        .map_err(|_| NetworkError::Timeout(config.connect_timeout))??;
    stream.set_nodelay(true)?;

    let mut handshake = protocol::handshake_line(player_id);
    handshake.push('\n');
    stream.write_all(handshake.as_bytes()).await?;
    Ok(stream)
}

async fn run_session(
    stream: TcpStream,
    outgoing: &mut UnboundedReceiver<ClientMessage>,
    events: &UnboundedSender<TransportEvent>,
    heartbeat_interval: Duration,
) -> SessionEnd {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let heartbeat = sleep(heartbeat_interval);
    tokio::pin!(heartbeat);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let event = match protocol::decode::<ServerMessage>(&line) {
                        Ok(message) => TransportEvent::Message(message),
                        Err(ProtocolError::Empty) => continue,
                        Err(e) => TransportEvent::Malformed(e.to_string()),
                    };
                    if events.send(event).is_err() {
                        return SessionEnd::Shutdown;
                    }
                }
                Ok(None) => {
                    return SessionEnd::Lost(NetworkError::Io(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "server closed the connection",
                    )));
                }
                Err(e) => return SessionEnd::Lost(e.into()),
            },

            message = outgoing.recv() => {
                let Some(message) = message else {
                    let _ = writer.shutdown().await;
                    return SessionEnd::Shutdown;
                };
                let mut line = match protocol::encode(&message) {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Failed to encode {:?}: {}", message, e);
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    return SessionEnd::Lost(e.into());
                }
                heartbeat.as_mut().reset(Instant::now() + heartbeat_interval);
            },

            _ = &mut heartbeat => {
                let line = match protocol::encode(&ClientMessage::Heartbeat {}) {
                    Ok(line) => line + "\n",
                    Err(e) => {
                        error!("Failed to encode heartbeat: {}", e);
                        return SessionEnd::Lost(e.into());
                    }
                };
                debug!("Sending heartbeat");
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    return SessionEnd::Lost(e.into());
                }
                heartbeat.as_mut().reset(Instant::now() + heartbeat_interval);
            },
        }
    }
}

/// Waits out a backoff delay, discarding anything queued meanwhile.
/// Returns false if the client went away.
async fn wait_discarding(delay: Duration, outgoing: &mut UnboundedReceiver<ClientMessage>) -> bool {
    let deadline = sleep(delay);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => return true,
            message = outgoing.recv() => {
                if message.is_none() {
                    return false;
                }
            },
        }
    }
}

/// Owns the socket for the lifetime of a [`NetworkClient`], reconnecting with
/// the same identity until the backoff runs out.
pub async fn run_transport(config: ClientConfig, player_id: PlayerId, endpoint: TransportEndpoint) {
    let TransportEndpoint {
        events,
        mut outgoing,
    } = endpoint;
    let mut backoff = Backoff::new(
        config.backoff_base,
        config.backoff_cap,
        config.max_reconnect_attempts,
    );

    loop {
        if events
            .send(TransportEvent::Status(ConnectionStatus::Connecting))
            .is_err()
        {
            return;
        }

        match connect(&config, &player_id).await {
            Ok(stream) => {
                info!("Connected to {} as {}", config.server_addr, player_id);
                backoff.reset();
                // Anything queued before the connection existed is stale.
                while outgoing.try_recv().is_ok() {}
                if events
                    .send(TransportEvent::Status(ConnectionStatus::Connected))
                    .is_err()
                {
                    return;
                }

                match run_session(stream, &mut outgoing, &events, config.heartbeat_interval).await {
                    SessionEnd::Shutdown => {
                        info!("Transport closed");
                        return;
                    }
                    SessionEnd::Lost(e) => warn!("Connection lost: {}", e),
                }
            }
            Err(e) => warn!("Could not reach {}: {}", config.server_addr, e),
        }

        let Some(delay) = backoff.next_delay() else {
            error!(
                "Giving up on {} after {} attempts",
                config.server_addr,
                backoff.attempt()
            );
            let _ = events.send(TransportEvent::Status(ConnectionStatus::Disconnected));
            return;
        };

        let status = ConnectionStatus::Reconnecting {
            attempt: backoff.attempt(),
            retry_in: delay,
        };
        if events.send(TransportEvent::Status(status)).is_err() {
            return;
        }
        if !wait_discarding(delay, &mut outgoing).await {
            return;
        }
    }
}
