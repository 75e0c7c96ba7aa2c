//! Physics collaborator
//!
//! The world only talks to physics through [`Physics`]: it places bodies,
//! hands over desired movement, reads back positions and headings, and asks
//! for time to advance. [`KinematicWorld`] is the implementation the server
//! runs with; it integrates movement and nothing else.

use shared::{wrap_degrees, Vec3};
use std::collections::HashMap;

pub trait Physics: Send {
    fn add_body(&mut self, name: &str, position: Vec3);
    fn remove_body(&mut self, name: &str);
    fn position(&self, name: &str) -> Option<Vec3>;
    fn set_position(&mut self, name: &str, position: Vec3);
    /// Velocity in the body's local frame, rotated by its heading each step
    fn set_linear_movement(&mut self, name: &str, velocity: Vec3);
    /// Turn rate in degrees per second
    fn set_angular_movement(&mut self, name: &str, rate: f32);
    /// Heading in degrees, in `[0, 360)`
    fn heading(&self, name: &str) -> Option<f32>;
    fn advance(&mut self, dt: f32);
}

///Represents a body that moves but never collides.
#[derive(Debug, Clone, Copy, Default)]
pub struct Body {
    pub position: Vec3,
    pub heading: f32,
    pub linear: Vec3,
    pub angular: f32,
}

impl Body {
    ///Advances the body by `dt` seconds: turn first, then move along the new heading.
    pub fn simulate(&mut self, dt: f32) {
        if self.angular != 0.0 {
            self.heading = wrap_degrees(self.heading + self.angular * dt);
        }

        if !self.linear.is_zero() {
            let world_velocity = self.linear.rotate_z(self.heading);
            self.position = self.position.add(&world_velocity.scale(dt));
        }
    }
}

/// Moves bodies by their velocities; no gravity and no collisions
#[derive(Debug, Default)]
pub struct KinematicWorld {
    bodies: HashMap<String, Body>,
}

impl KinematicWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl Physics for KinematicWorld {
    fn add_body(&mut self, name: &str, position: Vec3) {
        self.bodies.insert(
            name.to_string(),
            Body {
                position,
                ..Body::default()
            },
        );
    }

    fn remove_body(&mut self, name: &str) {
        self.bodies.remove(name);
    }

    fn position(&self, name: &str) -> Option<Vec3> {
        self.bodies.get(name).map(|body| body.position)
    }

    fn set_position(&mut self, name: &str, position: Vec3) {
        if let Some(body) = self.bodies.get_mut(name) {
            body.position = position;
        }
    }

    fn set_linear_movement(&mut self, name: &str, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(name) {
            body.linear = velocity;
        }
    }

    fn set_angular_movement(&mut self, name: &str, rate: f32) {
        if let Some(body) = self.bodies.get_mut(name) {
            body.angular = rate;
        }
    }

    fn heading(&self, name: &str) -> Option<f32> {
        self.bodies.get(name).map(|body| body.heading)
    }

    fn advance(&mut self, dt: f32) {
        for body in self.bodies.values_mut() {
            body.simulate(dt);
        }
    }
}
