//! Entity registry
//!
//! The registry exclusively owns every live entity and hands out names. A
//! name is a human readable prefix plus the value of a counter that only ever
//! goes up, so a name is never reused for the lifetime of the process.

use crate::error::GameError;
use crate::session::SessionId;
use log::debug;
use shared::Vec3;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// Capsule extents forwarded to clients for rendering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    pub height: f32,
    pub radius: f32,
}

impl Capsule {
    pub const PLAYER: Capsule = Capsule {
        height: 1.75,
        radius: 0.4,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    /// A generic synchronized object
    Thing,
    Living(Capsule),
    /// A living thing controlled by the client on `session`
    Player { body: Capsule, session: SessionId },
}

impl EntityKind {
    pub fn capsule(&self) -> Option<Capsule> {
        match self {
            EntityKind::Thing => None,
            EntityKind::Living(body) | EntityKind::Player { body, .. } => Some(*body),
        }
    }
}

/// Kinematic and scheduling state of one entity
///
/// Position and heading belong to the physics collaborator and are looked up
/// by name; everything the scheduler needs is kept here.
#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    /// Local-frame velocity
    pub velocity: Vec3,
    /// Degrees per second
    pub angular_velocity: f32,
    pub update_due: Instant,
}

impl Entity {
    pub fn is_moving(&self) -> bool {
        !self.velocity.is_zero() || self.angular_velocity != 0.0
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    entities: HashMap<String, Entity>,
    counter: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new entity under `prefix` + counter and returns its name
    ///
    /// The entity starts out due for an update at `now`; scheduling it is
    /// the caller's job.
    pub fn register(&mut self, prefix: &str, kind: EntityKind, now: Instant) -> String {
        self.counter += 1;
        let name = format!("{}{}", prefix, self.counter);

        debug!("Registered {} as {:?}", name, kind);
        self.entities.insert(
            name.clone(),
            Entity {
                name: name.clone(),
                kind,
                velocity: Vec3::ZERO,
                angular_velocity: 0.0,
                update_due: now,
            },
        );
        name
    }

    pub fn unregister(&mut self, name: &str) -> Result<Entity, GameError> {
        self.entities
            .remove(name)
            .ok_or_else(|| GameError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Result<&Entity, GameError> {
        self.entities
            .get(name)
            .ok_or_else(|| GameError::NotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Entity, GameError> {
        self.entities
            .get_mut(name)
            .ok_or_else(|| GameError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Snapshot of every live entity name, in a stable order
    pub fn list_all(&self) -> BTreeSet<String> {
        self.entities.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
