//! # Light-Cycle Relay Server
//!
//! The server does not simulate the arena. Every client is authoritative for
//! its own vehicle; the server keeps the roster, relays position reports,
//! eliminations, kills and chat between clients, and drives optional bot
//! riders for load testing.
//!
//! ## Architecture
//!
//! ### Connection tasks
//! Each TCP connection gets its own task. It reads the `CONNECT /ws/<id>`
//! handshake, decodes one JSON frame per line and forwards everything to the
//! relay loop over an unbounded channel. Outbound frames come back through a
//! per-connection queue.
//!
//! ### Single relay loop
//! All state changes happen on one task, one event at a time, so there is no
//! locking around the roster. The same loop ticks the bots and expires idle
//! connections.
//!
//! ## Module Organization
//!
//! - `client_manager`: live connections, reconnect replacement, timeouts
//! - `game`: roster, scores, eliminations and the match phase
//! - `bots`: staggered bot spawning and dead-reckoned movement
//! - `network`: listener, connection tasks and the relay rules
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:8000", ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bots;
pub mod client_manager;
pub mod game;
pub mod network;

use shared::protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("no handshake received in time")]
    HandshakeTimeout,
    #[error("connection closed before handshake")]
    ClosedDuringHandshake,
    #[error("relay loop is gone")]
    RelayClosed,
}
