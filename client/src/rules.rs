//! Elimination rules: arena bounds and trail contact
//!
//! Every live vehicle is checked against the bounds first and then, once its
//! own trail is active, against every active trail on the field (its own
//! included, minus a short exempt suffix behind it). All vehicles are judged
//! against the same tick-start state, so two vehicles can eliminate each other
//! in one tick.

use glam::Vec3;
use shared::protocol::ARENA_KILLER;
use shared::{Arena, EntityKey, GameConfig, PlayerId, Vehicle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EliminationCause {
    Arena,
    Trail { killer: PlayerId },
}

impl EliminationCause {
    /// Killer as reported over the wire.
    pub fn killer_id(&self) -> PlayerId {
        match self {
            EliminationCause::Arena => PlayerId::from(ARENA_KILLER),
            EliminationCause::Trail { killer } => killer.clone(),
        }
    }

    pub fn from_killer_id(killer: &PlayerId) -> Self {
        if killer.as_str() == ARENA_KILLER {
            EliminationCause::Arena
        } else {
            EliminationCause::Trail {
                killer: killer.clone(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Elimination {
    pub victim: EntityKey,
    pub cause: EliminationCause,
    pub position: Vec3,
}

pub struct RuleEngine {
    config: GameConfig,
}

impl RuleEngine {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// First rule `subject` violates this tick, if any.
    pub fn check_vehicle(
        &self,
        subject: &Vehicle,
        field: &[&Vehicle],
        arena: &Arena,
    ) -> Option<EliminationCause> {
        if !subject.is_alive() {
            return None;
        }

        let position = subject.position();
        if arena.is_out_of_bounds(position) {
            return Some(EliminationCause::Arena);
        }

        if !subject.is_trail_active() {
            return None;
        }

        let threshold = self.config.collision_threshold;
        for other in field.iter().filter(|v| v.is_trail_active()) {
            let hit = if other.key() == subject.key() {
                let skip = self.config.self_exemption_distance(subject.speed());
                other.trail().hits(position, Some(position), skip, threshold)
            } else {
                other.trail().hits(position, None, 0.0, threshold)
            };

            if hit {
                return Some(EliminationCause::Trail {
                    killer: other.player_id().clone(),
                });
            }
        }
        None
    }

    pub fn evaluate(&self, field: &[&Vehicle], arena: &Arena) -> Vec<Elimination> {
        field
            .iter()
            .filter_map(|subject| {
                self.check_vehicle(subject, field, arena)
                    .map(|cause| Elimination {
                        victim: subject.key().clone(),
                        cause,
                        position: subject.position(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{VehicleKind, VehicleResources};
    use std::time::Duration;

    fn config() -> GameConfig {
        GameConfig::default()
    }

    fn vehicle(id: &str, position: Vec3, heading: f32, born: Duration) -> Vehicle {
        let config = config();
        let resources = VehicleResources::new(&config);
        Vehicle::new(
            EntityKey::new(PlayerId::from(id), 0),
            resources.template(VehicleKind::Local),
            &config,
            position,
            heading,
            born,
        )
    }

    /// Vehicle whose trail runs along +Z from z=5 to z=10.
    fn trail_owner(now: Duration) -> Vehicle {
        let config = config();
        let mut owner = vehicle("owner", Vec3::new(0.0, 1.0, 5.0), 0.0, Duration::ZERO);
        owner.refresh_activation(now, &config);
        for z in 5..=10 {
            owner.set_transform(Vec3::new(0.0, 1.0, z as f32), 0.0);
            owner.record_trail_point();
        }
        owner.set_transform(Vec3::new(0.0, 1.0, 40.0), 0.0);
        owner
    }

    #[test]
    fn test_crossing_active_trail_kills_with_owner_as_killer() {
        let config = config();
        let now = Duration::from_secs(10);
        let owner = trail_owner(now);

        let mut subject = vehicle("subject", Vec3::new(0.0, 1.0, 7.0), 1.0, Duration::ZERO);
        subject.refresh_activation(now, &config);
        assert!(subject.is_trail_active());

        let engine = RuleEngine::new(&config);
        let arena = Arena::new(&config);
        let cause = engine.check_vehicle(&subject, &[&owner, &subject], &arena);
        assert_eq!(
            cause,
            Some(EliminationCause::Trail {
                killer: PlayerId::from("owner")
            })
        );
    }

    #[test]
    fn test_grace_period_grants_trail_immunity() {
        let config = config();
        let now = Duration::from_secs(10);
        let owner = trail_owner(now);

        // Spawned one second ago, still inside its grace period.
        let mut subject = vehicle(
            "subject",
            Vec3::new(0.0, 1.0, 7.0),
            1.0,
            now - Duration::from_secs(1),
        );
        subject.refresh_activation(now, &config);
        assert!(!subject.is_trail_active());

        let engine = RuleEngine::new(&config);
        let arena = Arena::new(&config);
        assert_eq!(engine.check_vehicle(&subject, &[&owner, &subject], &arena), None);
    }

    #[test]
    fn test_bounds_apply_during_grace_period() {
        let config = config();
        let half = config.arena_size / 2.0;
        let subject = vehicle("subject", Vec3::new(half + 1.0, 1.0, 0.0), 0.0, Duration::ZERO);

        let engine = RuleEngine::new(&config);
        let arena = Arena::new(&config);
        assert_eq!(
            engine.check_vehicle(&subject, &[&subject], &arena),
            Some(EliminationCause::Arena)
        );
    }

    #[test]
    fn test_own_recent_trail_is_exempt() {
        let config = config();
        let mut subject = vehicle("subject", Vec3::new(0.0, 1.0, 0.0), 0.0, Duration::ZERO);

        let dt = config.tick_interval;
        let mut now = Duration::ZERO;
        for _ in 0..300 {
            now += Duration::from_secs_f32(dt);
            subject.update(dt, now, &config);
        }
        assert!(subject.is_trail_active());

        let engine = RuleEngine::new(&config);
        let arena = Arena::new(&config);
        assert_eq!(engine.check_vehicle(&subject, &[&subject], &arena), None);
    }

    #[test]
    fn test_evaluate_reports_mutual_eliminations() {
        let config = config();
        let now = Duration::from_secs(10);
        let half = config.arena_size / 2.0;

        let mut a = vehicle("a", Vec3::new(half + 5.0, 1.0, 0.0), 0.0, Duration::ZERO);
        let mut b = vehicle("b", Vec3::new(0.0, 1.0, -(half + 5.0)), 0.0, Duration::ZERO);
        a.refresh_activation(now, &config);
        b.refresh_activation(now, &config);

        let engine = RuleEngine::new(&config);
        let arena = Arena::new(&config);
        let eliminations = engine.evaluate(&[&a, &b], &arena);
        assert_eq!(eliminations.len(), 2);
        assert!(eliminations.iter().all(|e| e.cause == EliminationCause::Arena));
    }

    #[test]
    fn test_killer_id_roundtrip() {
        let arena = EliminationCause::Arena;
        assert_eq!(arena.killer_id().as_str(), "Arena");
        assert_eq!(EliminationCause::from_killer_id(&arena.killer_id()), arena);

        let trail = EliminationCause::Trail {
            killer: PlayerId::from("p2"),
        };
        assert_eq!(EliminationCause::from_killer_id(&trail.killer_id()), trail);
    }
}
