//! Relay-side roster: who is connected, where they last reported themselves,
//! who is out and the match phase.

use log::info;
use shared::config::{MAX_PLAYERS, MIN_PLAYERS};
use shared::{GamePhase, GameStateData, PlayerId, PlayerInfo, WirePosition};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerPlayer {
    pub id: PlayerId,
    /// None until the player reports a position.
    pub position: Option<WirePosition>,
    pub is_eliminated: bool,
    pub score: u32,
}

impl ServerPlayer {
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            position: None,
            is_eliminated: false,
            score: 0,
        }
    }

    pub fn to_info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id.clone(),
            position: self.position,
            is_eliminated: self.is_eliminated,
            score: self.score,
            is_bot: false,
            use_light_trails: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameState {
    players: HashMap<PlayerId, ServerPlayer>,
    eliminated_players: Vec<PlayerId>,
    phase: GamePhase,
    current_round: u32,
    max_players: usize,
    min_players: usize,
}

impl GameState {
    pub fn new(max_players: usize, min_players: usize) -> Self {
        Self {
            players: HashMap::new(),
            eliminated_players: Vec::new(),
            phase: GamePhase::Waiting,
            current_round: 0,
            max_players,
            min_players,
        }
    }

    /// Registers a player. An id that is already present keeps its record.
    pub fn add_player(&mut self, id: &PlayerId) -> bool {
        if self.players.contains_key(id) {
            return true;
        }
        if self.players.len() >= self.max_players {
            return false;
        }

        self.players.insert(id.clone(), ServerPlayer::new(id.clone()));
        info!("Added player {} ({} present)", id, self.players.len());
        true
    }

    pub fn remove_player(&mut self, id: &PlayerId) -> bool {
        self.eliminated_players.retain(|p| p != id);
        let removed = self.players.remove(id).is_some();
        if removed {
            info!("Removed player {}", id);
        }
        removed
    }

    /// Stores the latest reported position. A player who reports movement
    /// after being eliminated has respawned and counts as alive again.
    pub fn update_player_position(&mut self, id: &PlayerId, position: WirePosition) -> bool {
        let Some(player) = self.players.get_mut(id) else {
            return false;
        };
        player.position = Some(position);
        if player.is_eliminated {
            player.is_eliminated = false;
            self.eliminated_players.retain(|p| p != id);
        }
        true
    }

    /// Returns false when the player is unknown or already out.
    pub fn eliminate_player(&mut self, id: &PlayerId) -> bool {
        match self.players.get_mut(id) {
            Some(player) if !player.is_eliminated => {
                player.is_eliminated = true;
                self.eliminated_players.push(id.clone());
                true
            }
            _ => false,
        }
    }

    pub fn add_score(&mut self, id: &PlayerId, points: u32) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.score += points;
                true
            }
            None => false,
        }
    }

    pub fn player(&self, id: &PlayerId) -> Option<&ServerPlayer> {
        self.players.get(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn eliminated_players(&self) -> &[PlayerId] {
        &self.eliminated_players
    }

    pub fn can_start_game(&self) -> bool {
        self.players.len() >= self.min_players
    }

    pub fn start_game(&mut self) -> bool {
        if !self.can_start_game() {
            return false;
        }
        self.phase = GamePhase::Playing;
        self.current_round = 1;
        self.eliminated_players.clear();
        for player in self.players.values_mut() {
            player.is_eliminated = false;
        }
        info!("Round {} started with {} players", self.current_round, self.players.len());
        true
    }

    pub fn end_game(&mut self) {
        self.phase = GamePhase::Finished;
    }

    /// Moves from `waiting` to `playing` once enough players are present.
    pub fn maybe_start(&mut self) -> bool {
        self.phase == GamePhase::Waiting && self.start_game()
    }

    /// Snapshot for a newcomer. `extra` lists non-human participants (bots)
    /// that appear in the roster but do not count toward capacity.
    pub fn get_state(&self, extra: impl IntoIterator<Item = PlayerInfo>) -> GameStateData {
        let mut players: HashMap<PlayerId, PlayerInfo> = self
            .players
            .iter()
            .map(|(id, player)| (id.clone(), player.to_info()))
            .collect();
        for info in extra {
            players.entry(info.id.clone()).or_insert(info);
        }

        GameStateData {
            players,
            eliminated_players: self.eliminated_players.clone(),
            game_phase: self.phase,
            current_round: self.current_round,
            player_count: self.players.len(),
            max_players: self.max_players,
            min_players: self.min_players,
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(MAX_PLAYERS, MIN_PLAYERS)
    }
}
