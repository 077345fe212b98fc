//! Remote vehicles driven by network snapshots
//!
//! Snapshots only move a record's target. The vehicle itself is pulled toward
//! that target on the visual cadence, and it keeps accumulating trail points
//! whether or not it is close enough to be interpolated, so collision sees the
//! same geometry regardless of quality level.
//!
//! Spawning is rate limited: a new remote vehicle is admitted at most once per
//! [`JOIN_THROTTLE`]. A join that arrives too early is parked as a pending
//! record with exactly one scheduled retry; later snapshots for the same id
//! merge into it.

use crate::quality::QualityController;
use crate::scheduler::{Scheduler, TaskId};
use glam::Vec3;
use log::{debug, info, warn};
use shared::geometry::lerp_angle;
use shared::{
    EntityKey, GameConfig, PlayerId, Vehicle, VehicleKind, VehicleResources, WirePosition,
};
use std::collections::HashMap;
use std::time::Duration;

pub const JOIN_THROTTLE: Duration = Duration::from_millis(100);
pub const MAX_JOIN_ATTEMPTS: u32 = 10;
pub const MAX_REMOTE_VEHICLES: usize = 15;
pub const INTERPOLATION_FACTOR: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub position: Vec3,
    pub heading: f32,
    pub trails: bool,
}

impl Snapshot {
    pub fn new(position: Vec3, heading: f32) -> Self {
        Self {
            position,
            heading,
            trails: true,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.heading.is_finite()
    }
}

impl From<&WirePosition> for Snapshot {
    fn from(wire: &WirePosition) -> Self {
        Self {
            position: wire.to_vec3(),
            heading: wire.rotation,
            trails: wire.use_trails.unwrap_or(true),
        }
    }
}

#[derive(Debug)]
pub struct RemoteVehicleRecord {
    vehicle: Vehicle,
    target_position: Vec3,
    target_heading: f32,
    last_snapshot: Duration,
}

impl RemoteVehicleRecord {
    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn target_position(&self) -> Vec3 {
        self.target_position
    }

    pub fn target_heading(&self) -> f32 {
        self.target_heading
    }

    pub fn last_snapshot(&self) -> Duration {
        self.last_snapshot
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingJoin {
    pub snapshot: Snapshot,
    pub attempts: u32,
    pub task: TaskId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Capacity,
    HeldOff,
    InvalidSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Updated,
    Spawned,
    Pending,
    Merged,
    Rejected(RejectReason),
}

pub struct Reconciler {
    config: GameConfig,
    resources: VehicleResources,
    records: HashMap<PlayerId, RemoteVehicleRecord>,
    pending: HashMap<PlayerId, PendingJoin>,
    held_off: HashMap<PlayerId, Duration>,
    generations: HashMap<PlayerId, u32>,
    retries: Scheduler<PlayerId>,
    last_admission: Option<Duration>,
    last_visual_update: Option<Duration>,
    capacity: usize,
}

impl Reconciler {
    pub fn new(config: &GameConfig, resources: VehicleResources) -> Self {
        Self {
            config: config.clone(),
            resources,
            records: HashMap::new(),
            pending: HashMap::new(),
            held_off: HashMap::new(),
            generations: HashMap::new(),
            retries: Scheduler::new(),
            last_admission: None,
            last_visual_update: None,
            capacity: MAX_REMOTE_VEHICLES,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn admit(&mut self, id: &PlayerId, snapshot: Snapshot, now: Duration) -> Admission {
        if !snapshot.is_finite() {
            warn!("Ignoring non-finite snapshot for {}", id);
            return Admission::Rejected(RejectReason::InvalidSnapshot);
        }

        if let Some(record) = self.records.get_mut(id) {
            record.target_position = snapshot.position;
            record.target_heading = snapshot.heading;
            record.last_snapshot = now;
            return Admission::Updated;
        }

        if let Some(pending) = self.pending.get_mut(id) {
            pending.snapshot = snapshot;
            return Admission::Merged;
        }

        if let Some(&until) = self.held_off.get(id) {
            if now < until {
                return Admission::Rejected(RejectReason::HeldOff);
            }
            self.held_off.remove(id);
        }

        if self.records.len() + self.pending.len() >= self.capacity {
            debug!("Remote capacity reached, rejecting {}", id);
            return Admission::Rejected(RejectReason::Capacity);
        }

        if self.throttled(now) {
            let task = self.retries.schedule(now + JOIN_THROTTLE, id.clone());
            self.pending.insert(
                id.clone(),
                PendingJoin {
                    snapshot,
                    attempts: 1,
                    task,
                },
            );
            debug!("Join of {} deferred", id);
            return Admission::Pending;
        }

        self.spawn(id, snapshot, now);
        Admission::Spawned
    }

    fn throttled(&self, now: Duration) -> bool {
        self.last_admission
            .is_some_and(|last| now.saturating_sub(last) < JOIN_THROTTLE)
    }

    fn spawn(&mut self, id: &PlayerId, snapshot: Snapshot, now: Duration) {
        let generation = self
            .generations
            .entry(id.clone())
            .and_modify(|g| *g += 1)
            .or_insert(0);
        let kind = if snapshot.trails {
            VehicleKind::Remote
        } else {
            VehicleKind::RemoteUntrailed
        };

        let key = EntityKey::new(id.clone(), *generation);
        info!("Spawning remote vehicle {}", key);
        let vehicle = Vehicle::new(
            key,
            self.resources.template(kind),
            &self.config,
            snapshot.position,
            snapshot.heading,
            now,
        );

        self.records.insert(
            id.clone(),
            RemoteVehicleRecord {
                vehicle,
                target_position: snapshot.position,
                target_heading: snapshot.heading,
                last_snapshot: now,
            },
        );
        self.last_admission = Some(now);
    }

    /// Fires due join retries. Returns the ids spawned.
    pub fn run_due(&mut self, now: Duration) -> Vec<PlayerId> {
        self.held_off.retain(|_, until| now < *until);
        let mut spawned = Vec::new();

        for id in self.retries.due(now) {
            let Some(mut pending) = self.pending.remove(&id) else {
                continue;
            };

            if self.records.contains_key(&id) {
                continue;
            }

            if self.records.len() >= self.capacity {
                warn!("Dropping join of {}: remote capacity reached", id);
                continue;
            }

            if !self.throttled(now) {
                self.spawn(&id, pending.snapshot, now);
                spawned.push(id);
                continue;
            }

            if pending.attempts >= MAX_JOIN_ATTEMPTS {
                warn!("Dropping join of {} after {} attempts", id, pending.attempts);
                continue;
            }

            pending.attempts += 1;
            pending.task = self.retries.schedule(now + JOIN_THROTTLE, id.clone());
            self.pending.insert(id, pending);
        }

        spawned
    }

    /// Removes a remote vehicle and any pending join for it. Idempotent.
    pub fn evict(&mut self, id: &PlayerId) -> Option<Vehicle> {
        if let Some(pending) = self.pending.remove(id) {
            self.retries.cancel(pending.task);
        }
        self.records.remove(id).map(|record| {
            debug!("Evicted remote vehicle {}", record.vehicle.key());
            record.vehicle
        })
    }

    /// Evicts and refuses re-admission until `until`, so snapshots still in
    /// flight cannot bring an eliminated vehicle back.
    pub fn evict_and_hold_off(&mut self, id: &PlayerId, until: Duration) -> Option<Vehicle> {
        self.held_off.insert(id.clone(), until);
        self.evict(id)
    }

    /// Evicts a player who left the session and drops everything kept for
    /// them, including the generation counter.
    pub fn forget(&mut self, id: &PlayerId) -> Option<Vehicle> {
        self.held_off.remove(id);
        self.generations.remove(id);
        self.evict(id)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.pending.clear();
        self.held_off.clear();
        self.retries.clear();
        self.last_visual_update = None;
    }

    /// Moves every remote vehicle toward its target at the visual cadence.
    ///
    /// Returns false when the cadence skipped this call.
    pub fn tick(
        &mut self,
        now: Duration,
        local_position: Option<Vec3>,
        quality: &QualityController,
    ) -> bool {
        if let Some(last) = self.last_visual_update {
            if now.saturating_sub(last) < quality.visual_update_interval() {
                return false;
            }
        }
        self.last_visual_update = Some(now);

        let radius = quality.visibility_radius();
        for record in self.records.values_mut() {
            let vehicle = &mut record.vehicle;
            vehicle.refresh_activation(now, &self.config);

            let visible = local_position
                .map_or(true, |local| local.distance(vehicle.position()) <= radius);

            let (position, heading) = if visible {
                (
                    vehicle
                        .position()
                        .lerp(record.target_position, INTERPOLATION_FACTOR),
                    lerp_angle(vehicle.heading(), record.target_heading, INTERPOLATION_FACTOR),
                )
            } else {
                (record.target_position, record.target_heading)
            };

            vehicle.set_transform(position, heading);
            vehicle.record_trail_point();
        }
        true
    }

    pub fn get(&self, id: &PlayerId) -> Option<&Vehicle> {
        self.records.get(id).map(|r| &r.vehicle)
    }

    pub fn record(&self, id: &PlayerId) -> Option<&RemoteVehicleRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.records.contains_key(id)
    }

    pub fn is_pending(&self, id: &PlayerId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_join(&self, id: &PlayerId) -> Option<&PendingJoin> {
        self.pending.get(id)
    }

    pub fn scheduled_retries(&self) -> usize {
        self.retries.len()
    }

    /// Ids with a live vehicle or a pending join.
    pub fn tracked_ids(&self) -> impl Iterator<Item = &PlayerId> + '_ {
        self.records.keys().chain(self.pending.keys())
    }

    pub fn is_held_off(&self, id: &PlayerId, now: Duration) -> bool {
        self.held_off.get(id).is_some_and(|until| now < *until)
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> + '_ {
        self.records.values().map(|r| &r.vehicle)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
