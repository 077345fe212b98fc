//! Connected clients and their outbound queues
//!
//! Each connection task owns its socket. The manager only keeps the sending
//! half of the task's outbound queue, so removing a client drops that queue and
//! the task closes the socket on its own.

use log::{debug, info};
use shared::PlayerId;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

pub type ConnectionId = u64;

#[derive(Debug)]
pub struct Client {
    pub player_id: PlayerId,
    /// Distinguishes a reconnect under the same id from the stale connection.
    pub connection_id: ConnectionId,
    pub last_seen: Instant,
    sender: UnboundedSender<String>,
}

impl Client {
    pub fn new(player_id: PlayerId, connection_id: ConnectionId, sender: UnboundedSender<String>) -> Self {
        Self {
            player_id,
            connection_id,
            last_seen: Instant::now(),
            sender,
        }
    }

    pub fn send(&self, line: &str) -> bool {
        self.sender.send(line.to_string()).is_ok()
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    New,
    /// The id was already connected; the old connection was dropped.
    Replaced,
}

pub struct ClientManager {
    clients: HashMap<PlayerId, Client>,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Returns None when the server is full. A known id always gets in and
    /// takes over from its previous connection.
    pub fn add_client(
        &mut self,
        player_id: PlayerId,
        connection_id: ConnectionId,
        sender: UnboundedSender<String>,
    ) -> Option<Registration> {
        let registration = if self.clients.contains_key(&player_id) {
            Registration::Replaced
        } else if self.clients.len() >= self.max_clients {
            return None;
        } else {
            Registration::New
        };

        info!("Client {} connected (connection {})", player_id, connection_id);
        let client = Client::new(player_id.clone(), connection_id, sender);
        self.clients.insert(player_id, client);
        Some(registration)
    }

    /// Removes the client only if `connection_id` is still its live connection.
    pub fn remove_client(&mut self, player_id: &PlayerId, connection_id: ConnectionId) -> bool {
        if !self.is_current(player_id, connection_id) {
            debug!("Ignoring close of stale connection {} for {}", connection_id, player_id);
            return false;
        }
        self.clients.remove(player_id);
        info!("Client {} disconnected", player_id);
        true
    }

    pub fn is_current(&self, player_id: &PlayerId, connection_id: ConnectionId) -> bool {
        self.clients
            .get(player_id)
            .is_some_and(|c| c.connection_id == connection_id)
    }

    pub fn touch(&mut self, player_id: &PlayerId) {
        if let Some(client) = self.clients.get_mut(player_id) {
            client.last_seen = Instant::now();
        }
    }

    pub fn send_to(&self, player_id: &PlayerId, line: &str) -> bool {
        self.clients.get(player_id).is_some_and(|c| c.send(line))
    }

    /// Queues `line` for every client except `exclude`. Returns how many
    /// queues accepted it.
    pub fn broadcast(&self, line: &str, exclude: Option<&PlayerId>) -> usize {
        self.clients
            .values()
            .filter(|c| Some(&c.player_id) != exclude)
            .filter(|c| c.send(line))
            .count()
    }

    /// Drops clients that have been silent longer than `timeout` and returns
    /// their ids.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<PlayerId> {
        let timed_out: Vec<PlayerId> = self
            .clients
            .values()
            .filter(|c| c.is_timed_out(timeout))
            .map(|c| c.player_id.clone())
            .collect();

        for player_id in &timed_out {
            self.clients.remove(player_id);
            info!("Client {} timed out", player_id);
        }
        timed_out
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<&Client> {
        self.clients.get(player_id)
    }

    pub fn get_mut(&mut self, player_id: &PlayerId) -> Option<&mut Client> {
        self.clients.get_mut(player_id)
    }

    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.clients.contains_key(player_id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
