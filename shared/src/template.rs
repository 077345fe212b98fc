//! Per-kind vehicle templates shared across every spawned instance.
//!
//! Templates are built once by whoever owns the simulation and handed to each
//! [`Vehicle`](crate::vehicle::Vehicle) as an `Arc`, so spawning a vehicle never
//! rebuilds its look or trail parameters.

use crate::config::GameConfig;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleKind {
    Local,
    Remote,
    /// Remote participant that announced it does not leave a trail.
    RemoteUntrailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleTemplate {
    pub kind: VehicleKind,
    pub body_color: [u8; 4],
    pub trail_color: [u8; 4],
    pub trail_max_points: usize,
    pub trail_min_point_distance: f32,
    pub records_trail: bool,
}

/// Owner of the templates. Cloning a handle is a reference-count bump.
#[derive(Debug, Clone)]
pub struct VehicleResources {
    local: Arc<VehicleTemplate>,
    remote: Arc<VehicleTemplate>,
    remote_untrailed: Arc<VehicleTemplate>,
}

impl VehicleResources {
    pub fn new(config: &GameConfig) -> Self {
        let base = VehicleTemplate {
            kind: VehicleKind::Local,
            body_color: [0, 230, 255, 255],
            trail_color: [0, 180, 255, 200],
            trail_max_points: config.trail_max_points,
            trail_min_point_distance: config.trail_min_point_distance,
            records_trail: true,
        };

        let remote = VehicleTemplate {
            kind: VehicleKind::Remote,
            body_color: [255, 90, 40, 255],
            trail_color: [255, 120, 40, 200],
            ..base.clone()
        };

        let remote_untrailed = VehicleTemplate {
            kind: VehicleKind::RemoteUntrailed,
            records_trail: false,
            ..remote.clone()
        };

        Self {
            local: Arc::new(base),
            remote: Arc::new(remote),
            remote_untrailed: Arc::new(remote_untrailed),
        }
    }

    pub fn template(&self, kind: VehicleKind) -> Arc<VehicleTemplate> {
        match kind {
            VehicleKind::Local => Arc::clone(&self.local),
            VehicleKind::Remote => Arc::clone(&self.remote),
            VehicleKind::RemoteUntrailed => Arc::clone(&self.remote_untrailed),
        }
    }
}
