pub mod arena;
pub mod config;
pub mod geometry;
pub mod protocol;
pub mod template;
pub mod trail;
pub mod vehicle;

pub use arena::{Arena, Portal};
pub use config::GameConfig;
pub use protocol::{ClientMessage, GamePhase, GameStateData, PlayerInfo, ServerMessage, WirePosition};
pub use template::{VehicleKind, VehicleResources, VehicleTemplate};
pub use trail::Trail;
pub use vehicle::{EntityKey, PlayerId, TurnIntent, Vehicle, VehicleState};
