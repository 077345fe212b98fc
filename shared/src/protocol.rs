//! Line-delimited JSON wire protocol.
//!
//! Every frame is one JSON object `{"type": ..., "data": {...}}` followed by a
//! newline. A connection opens with a single handshake line naming the
//! endpoint path, `CONNECT /ws/<player_id>`.

use crate::vehicle::PlayerId;
use glam::Vec3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub const ENDPOINT_PREFIX: &str = "/ws/";
pub const HANDSHAKE_VERB: &str = "CONNECT";
/// Killer name used when the arena itself eliminated a vehicle.
pub const ARENA_KILLER: &str = "Arena";
pub const MAX_PLAYER_ID_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad handshake: {0:?}")]
    BadHandshake(String),
    #[error("invalid player id: {0:?}")]
    InvalidPlayerId(String),
}

/// Position as it travels on the wire. Remote bots also announce whether they
/// leave a trail.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WirePosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default)]
    pub rotation: f32,
    #[serde(rename = "useTrails", default, skip_serializing_if = "Option::is_none")]
    pub use_trails: Option<bool>,
}

impl WirePosition {
    pub fn from_transform(position: Vec3, heading: f32) -> Self {
        Self {
            x: position.x,
            y: position.y,
            z: position.z,
            rotation: heading,
            use_trails: None,
        }
    }

    pub fn to_vec3(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.rotation.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    #[default]
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub position: Option<WirePosition>,
    pub is_eliminated: bool,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_light_trails: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateData {
    pub players: HashMap<PlayerId, PlayerInfo>,
    #[serde(default)]
    pub eliminated_players: Vec<PlayerId>,
    #[serde(default)]
    pub game_phase: GamePhase,
    #[serde(default)]
    pub current_round: u32,
    pub player_count: usize,
    pub max_players: usize,
    pub min_players: usize,
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    GameState(GameStateData),
    PlayerJoined { player_id: PlayerId },
    PlayerLeft { player_id: PlayerId },
    PlayerMoved {
        player_id: PlayerId,
        position: WirePosition,
    },
    PlayerEliminated { player_id: PlayerId },
    PlayerKill { killer: PlayerId, victim: PlayerId },
    ChatMessage { player_name: String, message: String },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::GameState(_) => "game_state",
            ServerMessage::PlayerJoined { .. } => "player_joined",
            ServerMessage::PlayerLeft { .. } => "player_left",
            ServerMessage::PlayerMoved { .. } => "player_moved",
            ServerMessage::PlayerEliminated { .. } => "player_eliminated",
            ServerMessage::PlayerKill { .. } => "player_kill",
            ServerMessage::ChatMessage { .. } => "chat_message",
        }
    }
}

/// Frames sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    PlayerMove {
        player_id: PlayerId,
        position: WirePosition,
    },
    PlayerEliminated {},
    PlayerKill { killer: PlayerId, victim: PlayerId },
    Chat { message: String },
    /// Keeps an otherwise quiet connection from idling out.
    Heartbeat {},
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}

pub fn validate_player_id(id: &str) -> Result<PlayerId, ProtocolError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_PLAYER_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(PlayerId::from(id))
    } else {
        Err(ProtocolError::InvalidPlayerId(id.to_string()))
    }
}

pub fn endpoint_path(player_id: &PlayerId) -> String {
    format!("{}{}", ENDPOINT_PREFIX, player_id)
}

pub fn handshake_line(player_id: &PlayerId) -> String {
    format!("{} {}", HANDSHAKE_VERB, endpoint_path(player_id))
}

/// Extracts the participant identity from a handshake line.
pub fn parse_handshake(line: &str) -> Result<PlayerId, ProtocolError> {
    let bad = || ProtocolError::BadHandshake(line.to_string());

    let mut parts = line.trim().splitn(2, ' ');
    if parts.next() != Some(HANDSHAKE_VERB) {
        return Err(bad());
    }
    let path = parts.next().ok_or_else(bad)?;
    let id = path.strip_prefix(ENDPOINT_PREFIX).ok_or_else(bad)?;
    validate_player_id(id)
}
