//! Client-side mirror of the synchronized world
//!
//! The server tells the client which entities exist and, every so often, where
//! they are and how they move. Between updates the mirror dead-reckons each
//! entity forward from its last reported state.

use log::debug;
use shared::messages::{AddObject, RemoveObject, ThingState};
use shared::{wrap_degrees, Vec3};
use std::collections::HashMap;
use std::time::Instant;

/// Last known state of one remote entity
#[derive(Debug, Clone, PartialEq)]
pub struct MirroredThing {
    pub tag: String,
    pub height: f32,
    pub radius: f32,
    pub location: Vec3,
    /// Local-frame velocity as reported by the server
    pub velocity: Vec3,
    pub heading: f32,
    pub angular_velocity: f32,
    /// When the last state arrived; `None` until the first one does
    pub updated_at: Option<Instant>,
}

impl MirroredThing {
    fn new(add: AddObject) -> Self {
        Self {
            tag: add.tag,
            height: add.height,
            radius: add.radius,
            location: Vec3::ZERO,
            velocity: Vec3::ZERO,
            heading: 0.0,
            angular_velocity: 0.0,
            updated_at: None,
        }
    }

    ///Returns the predicted location and heading at `now`.
    pub fn extrapolate(&self, now: Instant) -> (Vec3, f32) {
        let Some(updated_at) = self.updated_at else {
            return (self.location, self.heading);
        };

        let dt = now.saturating_duration_since(updated_at).as_secs_f32();
        let heading = wrap_degrees(self.heading + self.angular_velocity * dt);
        let travelled = self.velocity.rotate_z(self.heading).scale(dt);

        (self.location.add(&travelled), heading)
    }
}

/// Everything the client currently knows about the world
#[derive(Debug, Default)]
pub struct WorldMirror {
    things: HashMap<String, MirroredThing>,
    player: Option<String>,
}

impl WorldMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the entity this client controls
    pub fn start(&mut self, player: String) {
        self.player = Some(player);
    }

    pub fn player(&self) -> Option<&str> {
        self.player.as_deref()
    }

    pub fn in_world(&self) -> bool {
        self.player.is_some()
    }

    pub fn apply_add(&mut self, add: AddObject) {
        debug!("Now tracking {}", add.tag);
        self.things.insert(add.tag.clone(), MirroredThing::new(add));
    }

    /// Returns false if the entity was not known
    pub fn apply_remove(&mut self, remove: &RemoveObject) -> bool {
        self.things.remove(&remove.tag).is_some()
    }

    /// Applies a state update; updates for unknown entities are dropped
    pub fn apply_state(&mut self, state: ThingState, now: Instant) -> bool {
        let Some(thing) = self.things.get_mut(&state.tag) else {
            debug!("Ignoring state for unknown entity {}", state.tag);
            return false;
        };

        thing.location = state.location;
        thing.velocity = state.velocity;
        thing.heading = state.heading;
        thing.angular_velocity = state.angular_velocity;
        thing.updated_at = Some(now);
        true
    }

    pub fn get(&self, tag: &str) -> Option<&MirroredThing> {
        self.things.get(tag)
    }

    pub fn len(&self) -> usize {
        self.things.len()
    }

    pub fn is_empty(&self) -> bool {
        self.things.is_empty()
    }
}
