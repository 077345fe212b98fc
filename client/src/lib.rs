//! # Light-Cycle Client Library
//!
//! Client-side core of the arena game. The local vehicle is simulated here
//! and is authoritative for itself; remote vehicles are reconstructed from the
//! position snapshots other clients relay through the server.
//!
//! ## Module Organization
//!
//! ### Game (`game`)
//! The per-frame orchestrator. Owns the arena, the local vehicle, the
//! reconciler and the rule engine, and runs them in a fixed order every tick.
//!
//! ### Rules (`rules`)
//! Bounds and trail-contact checks, producing eliminations with a killer.
//!
//! ### Reconciler (`reconciler`)
//! Remote vehicles: throttled spawn admission, eviction, and interpolation
//! toward the latest snapshot on the visual cadence.
//!
//! ### Network (`network`)
//! One TCP connection carrying line-delimited JSON. Reconnects with
//! exponential backoff and publishes every inbound message kind on its own
//! typed topic.
//!
//! ### Support
//! - `events`: typed publish/subscribe topics
//! - `scheduler`: cancellable deferred tasks polled each tick
//! - `quality`: frame-time driven interpolation budget
//! - `identity`: stable participant id persisted per session
//! - `input` / `rendering`: keyboard mapping and a top-down macroquad viewer
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::Game;
//! use client::network::{ClientConfig, NetworkClient};
//! use shared::{GameConfig, PlayerId, TurnIntent};
//! use std::time::Duration;
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let network = NetworkClient::spawn(
//!     runtime.handle(),
//!     ClientConfig::default(),
//!     PlayerId::from("player_1a2b3c4d"),
//! );
//! let mut game = Game::new(GameConfig::default(), network);
//! let mut kills = game.topics.kills.subscribe();
//!
//! game.start();
//! loop {
//!     game.turn(TurnIntent::Right);
//!     game.tick(Duration::from_millis(16));
//!     for kill in kills.drain() {
//!         println!("{}", kill);
//!     }
//! }
//! ```

pub mod events;
pub mod game;
pub mod identity;
pub mod input;
pub mod network;
pub mod quality;
pub mod reconciler;
pub mod rendering;
pub mod rules;
pub mod scheduler;
