//! Arena bounds, walls and portal trigger volumes

use crate::config::GameConfig;
use glam::Vec3;
use rand::Rng;
use std::f32::consts::FRAC_PI_2;

/// Axis-aligned trigger volume. Entering one is reported, nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct Portal {
    pub id: String,
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl Portal {
    pub fn new(id: impl Into<String>, center: Vec3, half_extents: Vec3) -> Self {
        Self {
            id: id.into(),
            center,
            half_extents,
        }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        let offset = (point - self.center).abs();
        offset.x <= self.half_extents.x
            && offset.y <= self.half_extents.y
            && offset.z <= self.half_extents.z
    }
}

#[derive(Debug, Clone)]
pub struct Arena {
    size: f32,
    wall_height: f32,
    margin: f32,
    floor_y: f32,
    portals: Vec<Portal>,
}

impl Arena {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            size: config.arena_size,
            wall_height: config.wall_height,
            margin: config.arena_margin,
            floor_y: config.floor_y,
            portals: Vec::new(),
        }
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn wall_height(&self) -> f32 {
        self.wall_height
    }

    /// Largest |x| or |z| a live vehicle may have.
    pub fn playable_half_extent(&self) -> f32 {
        self.size / 2.0 - self.margin
    }

    /// Out of bounds is an elimination, so nothing here clamps.
    pub fn is_out_of_bounds(&self, position: Vec3) -> bool {
        let limit = self.playable_half_extent();
        position.x.abs() > limit || position.z.abs() > limit || position.y < self.floor_y
    }

    /// Wall segments along the floor, corner to corner.
    pub fn walls(&self) -> [(Vec3, Vec3); 4] {
        let h = self.size / 2.0;
        let corners = [
            Vec3::new(-h, 0.0, -h),
            Vec3::new(h, 0.0, -h),
            Vec3::new(h, 0.0, h),
            Vec3::new(-h, 0.0, h),
        ];
        [
            (corners[0], corners[1]),
            (corners[1], corners[2]),
            (corners[2], corners[3]),
            (corners[3], corners[0]),
        ]
    }

    /// Registers a portal, replacing any existing one with the same id.
    pub fn register_portal(&mut self, portal: Portal) {
        self.portals.retain(|p| p.id != portal.id);
        self.portals.push(portal);
    }

    pub fn unregister_portal(&mut self, id: &str) -> bool {
        let before = self.portals.len();
        self.portals.retain(|p| p.id != id);
        self.portals.len() != before
    }

    pub fn portals(&self) -> &[Portal] {
        &self.portals
    }

    pub fn portal_at(&self, position: Vec3) -> Option<&Portal> {
        self.portals.iter().find(|p| p.contains(position))
    }

    /// Random grid-aligned spawn well inside the walls.
    pub fn random_spawn<R: Rng + ?Sized>(&self, rng: &mut R, ride_height: f32) -> (Vec3, f32) {
        let extent = self.playable_half_extent() * 0.8;
        let x = rng.gen_range(-extent..=extent);
        let z = rng.gen_range(-extent..=extent);
        let heading = rng.gen_range(0..4) as f32 * FRAC_PI_2;
        (Vec3::new(x, ride_height, z), heading)
    }
}
