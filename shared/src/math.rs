use serde::{Deserialize, Serialize};

/// Represents a vector in 3D space.
///
/// The world is Z-up: X points right, Y points forward and Z points up,
/// matching the frame the server's physics collaborator integrates in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec3 {
        Vec3::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    /// Rotates the vector around the Z axis by `heading` degrees,
    /// counter-clockwise when seen from above.
    pub fn rotate_z(&self, heading: f32) -> Vec3 {
        let (sin, cos) = heading.to_radians().sin_cos();
        Vec3::new(
            self.x * cos - self.y * sin,
            self.x * sin + self.y * cos,
            self.z,
        )
    }
}

/// Wraps an angle in degrees into `[0, 360)`.
///
/// `rem_euclid` alone rounds tiny negative angles up to exactly 360.0.
pub fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped >= 360.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vec3_add_and_scale() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(-1.0, 0.5, 2.0);

        assert_eq!(a.add(&b), Vec3::new(0.0, 2.5, 5.0));
        assert_eq!(a.scale(2.0), Vec3::new(2.0, 4.0, 6.0));
    }

    #[test]
    fn test_vec3_zero() {
        assert!(Vec3::ZERO.is_zero());
        assert!(Vec3::default().is_zero());
        assert!(!Vec3::new(0.0, 0.0, 0.1).is_zero());
    }

    #[test]
    fn test_rotate_z_quarter_turn() {
        let forward = Vec3::new(0.0, 1.0, 0.0);
        let turned = forward.rotate_z(90.0);

        assert_approx_eq!(turned.x, -1.0, 1e-5);
        assert_approx_eq!(turned.y, 0.0, 1e-5);
        assert_approx_eq!(turned.magnitude(), 1.0, 1e-5);
    }

    #[test]
    fn test_wrap_degrees_stays_below_full_turn() {
        assert_eq!(wrap_degrees(370.0), 10.0);
        assert_eq!(wrap_degrees(-90.0), 270.0);
        assert_eq!(wrap_degrees(360.0), 0.0);

        let tiny = wrap_degrees(-90.0 * 1e-9);
        assert!((0.0..360.0).contains(&tiny), "heading {} outside [0, 360)", tiny);
    }
}
