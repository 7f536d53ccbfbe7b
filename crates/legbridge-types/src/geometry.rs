//! Rigid-body geometry primitives shared by every crate.
//!
//! Rotations are unit quaternions in (w, x, y, z) order.  A [`Transform3D`]
//! expresses the pose of a child frame in its parent: to move a point from the
//! child frame into the parent, rotate it by `rotation` then add
//! `translation`.

use serde::{Deserialize, Serialize};

/// Norm deviation tolerated before a quaternion is considered non-unit.
pub const UNIT_TOLERANCE: f64 = 1e-3;

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D translation vector in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A rotation quaternion (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Create a quaternion.  No normalisation is performed; see
    /// [`Quaternion::normalized`].
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `yaw` radians about the +Z axis.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw * 0.5;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Heading (rotation about +Z) encoded by this quaternion, in radians.
    pub fn yaw(self) -> f64 {
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        siny_cosp.atan2(cosy_cosp)
    }

    pub fn norm(self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// `true` when |q| is within [`UNIT_TOLERANCE`] of one.
    pub fn is_unit(self) -> bool {
        (self.norm() - 1.0).abs() <= UNIT_TOLERANCE
    }

    /// Scale to unit length.  Returns `None` for a zero or non-finite
    /// quaternion, which encodes no rotation at all.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if !n.is_finite() || n < f64::EPSILON {
            return None;
        }
        Some(Self::new(self.w / n, self.x / n, self.y / n, self.z / n))
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body transform: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    /// Compose two transforms.  If `self` = T_A_B and `other` = T_B_C the
    /// result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// Inverse transform: T_A_B becomes T_B_A.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        Self::new(inv_rot.rotate(self.translation.neg()), inv_rot)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Twist
// ────────────────────────────────────────────────────────────────────────────

/// Linear and angular velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Twist {
    /// Planar twist: forward, lateral, yaw rate.
    pub fn planar(x: f64, y: f64, angular_z: f64) -> Self {
        Self {
            linear: Vec3::new(x, y, 0.0),
            angular: Vec3::new(0.0, 0.0, angular_z),
        }
    }
}
