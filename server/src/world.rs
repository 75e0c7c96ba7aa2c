//! The authoritative world
//!
//! `World` ties the registry, the update scheduler and the physics
//! collaborator together. Every mutation that changes what clients should see
//! goes through here so that the affected entity is forced into the next
//! broadcast.

use crate::error::GameError;
use crate::physics::{KinematicWorld, Physics};
use crate::registry::{Capsule, Entity, EntityKind, Registry};
use crate::scheduler::UpdateScheduler;
use crate::session::SessionId;
use log::info;
use shared::messages::{AddObject, ThingState};
use shared::Vec3;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Where freshly logged in players appear
pub const PLAYER_SPAWN: Vec3 = Vec3::new(0.0, -20.0, 3.0);
pub const PLAYER_PREFIX: &str = "Player";

pub struct World {
    registry: Registry,
    scheduler: UpdateScheduler,
    physics: Box<dyn Physics>,
}

impl Default for World {
    fn default() -> Self {
        Self::new(Box::new(KinematicWorld::new()))
    }
}

impl World {
    pub fn new(physics: Box<dyn Physics>) -> Self {
        Self {
            registry: Registry::new(),
            scheduler: UpdateScheduler::default(),
            physics,
        }
    }

    pub fn with_intervals(
        physics: Box<dyn Physics>,
        moving_interval: Duration,
        stationary_interval: Duration,
    ) -> Self {
        Self {
            registry: Registry::new(),
            scheduler: UpdateScheduler::new(moving_interval, stationary_interval),
            physics,
        }
    }

    /// Registers an entity, places its body and schedules an immediate broadcast
    pub fn spawn(&mut self, prefix: &str, kind: EntityKind, position: Vec3, now: Instant) -> String {
        let name = self.registry.register(prefix, kind, now);
        self.physics.add_body(&name, position);

        if let Ok(entity) = self.registry.get_mut(&name) {
            self.scheduler.force_update(entity, now);
        }
        name
    }

    pub fn spawn_thing(&mut self, prefix: &str, position: Vec3, now: Instant) -> String {
        self.spawn(prefix, EntityKind::Thing, position, now)
    }

    pub fn spawn_living(
        &mut self,
        prefix: &str,
        capsule: Capsule,
        position: Vec3,
        now: Instant,
    ) -> String {
        self.spawn(prefix, EntityKind::Living(capsule), position, now)
    }

    pub fn spawn_player(&mut self, session: SessionId, now: Instant) -> String {
        let name = self.spawn(
            PLAYER_PREFIX,
            EntityKind::Player {
                body: Capsule::PLAYER,
                session,
            },
            PLAYER_SPAWN,
            now,
        );
        info!("Spawned {} for session {}", name, session);
        name
    }

    /// Removes the entity; it disappears from every client on the next sync
    pub fn despawn(&mut self, name: &str) -> Result<Entity, GameError> {
        let entity = self.registry.unregister(name)?;
        self.physics.remove_body(name);
        info!("Despawned {}", name);
        Ok(entity)
    }

    pub fn move_to(&mut self, name: &str, position: Vec3, now: Instant) -> Result<(), GameError> {
        let entity = self.registry.get_mut(name)?;
        self.physics.set_position(name, position);
        self.scheduler.force_update(entity, now);
        Ok(())
    }

    /// Sets the entity's velocity in its own frame of reference
    pub fn set_velocity(&mut self, name: &str, velocity: Vec3, now: Instant) -> Result<(), GameError> {
        let entity = self.registry.get_mut(name)?;
        entity.velocity = velocity;
        self.physics.set_linear_movement(name, velocity);
        self.scheduler.force_update(entity, now);
        Ok(())
    }

    pub fn set_angular_velocity(
        &mut self,
        name: &str,
        rate: f32,
        now: Instant,
    ) -> Result<(), GameError> {
        let entity = self.registry.get_mut(name)?;
        entity.angular_velocity = rate;
        self.physics.set_angular_movement(name, rate);
        self.scheduler.force_update(entity, now);
        Ok(())
    }

    pub fn force_update(&mut self, name: &str, now: Instant) -> Result<(), GameError> {
        let entity = self.registry.get_mut(name)?;
        self.scheduler.force_update(entity, now);
        Ok(())
    }

    pub fn entity(&self, name: &str) -> Result<&Entity, GameError> {
        self.registry.get(name)
    }

    pub fn position(&self, name: &str) -> Result<Vec3, GameError> {
        self.physics
            .position(name)
            .ok_or_else(|| GameError::NotFound(name.to_string()))
    }

    pub fn heading(&self, name: &str) -> Result<f32, GameError> {
        self.physics
            .heading(name)
            .ok_or_else(|| GameError::NotFound(name.to_string()))
    }

    /// Static attributes sent when the entity first becomes visible
    pub fn add_object(&self, name: &str) -> Result<AddObject, GameError> {
        let entity = self.registry.get(name)?;
        let (height, radius) = entity
            .kind
            .capsule()
            .map(|capsule| (capsule.height, capsule.radius))
            .unwrap_or((0.0, 0.0));

        Ok(AddObject {
            tag: entity.name.clone(),
            height,
            radius,
        })
    }

    /// Current kinematic state as sent to clients
    pub fn thing_state(&self, name: &str) -> Result<ThingState, GameError> {
        let entity = self.registry.get(name)?;
        Ok(ThingState {
            tag: entity.name.clone(),
            location: self.position(name)?,
            velocity: entity.velocity,
            heading: self.heading(name)?,
            angular_velocity: entity.angular_velocity,
        })
    }

    /// Entities due for a broadcast this tick, already rescheduled
    pub fn collect_due(&mut self, now: Instant) -> BTreeSet<String> {
        self.scheduler.collect_due(&mut self.registry, now)
    }

    pub fn advance(&mut self, dt: f32) {
        self.physics.advance(dt);
    }

    pub fn list_all(&self) -> BTreeSet<String> {
        self.registry.list_all()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
