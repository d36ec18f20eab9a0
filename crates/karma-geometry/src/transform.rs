//! Rigid-body frame algebra on 4×4 homogeneous matrices.
//!
//! All planning math is expressed as products of [`Transform`]s: a local
//! frame around the target, a tangential approach frame on a circle, a hand
//! orientation correction and finally the inverse of the tool frame.
//!
//! # Contract
//!
//! Every [`Transform`] is assumed to be rigid: an orthonormal 3×3 rotation
//! block and a bottom row of exactly `[0, 0, 0, 1]`. The constructors in this
//! module only ever produce such matrices, and callers must not build them
//! from unchecked external input. [`Transform::invert_rigid`] relies on it.
//!
//! # Example
//!
//! ```rust
//! use karma_geometry::{AxisAngle, Transform, Vec3};
//!
//! let yaw = Transform::from_axis_angle(&AxisAngle::new(Vec3::new(0.0, 0.0, 1.0), 0.5))
//!     .with_translation(Vec3::new(0.3, -0.1, 0.05));
//! let back = yaw.compose(&yaw.invert_rigid());
//! assert!(back.distance(&Transform::identity()) < 1e-12);
//! ```

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Convert degrees to radians.
pub fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}


// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector in meters (positions, offsets) or a unit rotation axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Euclidean norm.
    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;

    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// AxisAngle
// ────────────────────────────────────────────────────────────────────────────

/// Orientation as a rotation axis plus an angle in radians.
///
/// The axis is unit-norm for every value produced by
/// [`Transform::to_axis_angle`]. For the identity rotation the axis is
/// reported as `+z` with a zero angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisAngle {
    pub axis: Vec3,
    pub angle: f64,
}

impl AxisAngle {
    pub const fn new(axis: Vec3, angle: f64) -> Self {
        Self { axis, angle }
    }

    /// The no-rotation orientation.
    pub const fn identity() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 1.0), 0.0)
    }

    /// Build from an axis and an angle in degrees.
    pub fn from_degrees(axis: Vec3, angle_deg: f64) -> Self {
        Self::new(axis, deg_to_rad(angle_deg))
    }

    /// The `[ax, ay, az, angle]` 4-vector the controllers exchange.
    pub fn to_array(self) -> [f64; 4] {
        [self.axis.x, self.axis.y, self.axis.z, self.angle]
    }

    /// Norm of the difference between the two 4-vector encodings.
    ///
    /// This is the orientation error used to score simulated draws.
    pub fn distance(&self, other: &AxisAngle) -> f64 {
        self.to_array()
            .iter()
            .zip(other.to_array())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

impl Default for AxisAngle {
    fn default() -> Self {
        Self::identity()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform
// ────────────────────────────────────────────────────────────────────────────

/// A 4×4 homogeneous rigid transform, stored row-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    m: [[f64; 4]; 4],
}

impl Transform {
    pub const fn identity() -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Build from a row-major 3×3 rotation block and a translation.
    ///
    /// The block must be orthonormal.
    pub const fn from_parts(rotation: [[f64; 3]; 3], translation: Vec3) -> Self {
        let r = rotation;
        Self {
            m: [
                [r[0][0], r[0][1], r[0][2], translation.x],
                [r[1][0], r[1][1], r[1][2], translation.y],
                [r[2][0], r[2][1], r[2][2], translation.z],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// A pure translation.
    pub const fn from_translation(t: Vec3) -> Self {
        Self::from_parts([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]], t)
    }

    /// A pure rotation (zero translation column) from axis-angle.
    ///
    /// Rodrigues' formula; the axis is used as given, so callers pass a unit
    /// axis. A zero angle yields the identity.
    pub fn from_axis_angle(aa: &AxisAngle) -> Self {
        if aa.angle == 0.0 {
            return Self::identity();
        }
        let (x, y, z) = (aa.axis.x, aa.axis.y, aa.axis.z);
        let c = aa.angle.cos();
        let s = aa.angle.sin();
        let k = 1.0 - c;
        Self::from_parts(
            [
                [x * x * k + c, x * y * k - z * s, z * x * k + y * s],
                [x * y * k + z * s, y * y * k + c, y * z * k - x * s],
                [z * x * k - y * s, y * z * k + x * s, z * z * k + c],
            ],
            Vec3::zero(),
        )
    }

    /// The first three entries of column `c` (an axis for `c < 3`, the
    /// translation for `c == 3`).
    pub fn column(&self, c: usize) -> Vec3 {
        Vec3::new(self.m[0][c], self.m[1][c], self.m[2][c])
    }

    pub fn translation(&self) -> Vec3 {
        self.column(3)
    }

    /// Copy of `self` with its translation column replaced.
    pub fn with_translation(mut self, t: Vec3) -> Self {
        self.m[0][3] = t.x;
        self.m[1][3] = t.y;
        self.m[2][3] = t.z;
        self
    }

    /// The row-major 3×3 rotation block.
    pub fn rotation(&self) -> [[f64; 3]; 3] {
        let mut r = [[0.0; 3]; 3];
        for (i, row) in r.iter_mut().enumerate() {
            row.copy_from_slice(&self.m[i][..3]);
        }
        r
    }

    /// Copy of `self` with its rotation block replaced.
    pub fn with_rotation(mut self, rotation: [[f64; 3]; 3]) -> Self {
        for (i, row) in rotation.iter().enumerate() {
            self.m[i][..3].copy_from_slice(row);
        }
        self
    }

    /// Matrix product `self · rhs`.
    ///
    /// If `self` = T_A_B and `rhs` = T_B_C, the result is T_A_C.
    pub fn compose(&self, rhs: &Transform) -> Transform {
        let mut out = [[0.0; 4]; 4];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.m[i][k] * rhs.m[k][j]).sum();
            }
        }
        Transform { m: out }
    }

    /// Rigid-body inverse: transposed rotation, translation `-Rᵀ·t`.
    pub fn invert_rigid(&self) -> Transform {
        let r = self.rotation();
        let mut rt = [[0.0; 3]; 3];
        for (i, row) in rt.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = r[j][i];
            }
        }
        let t = self.translation();
        let inv_t = Vec3::new(
            -(rt[0][0] * t.x + rt[0][1] * t.y + rt[0][2] * t.z),
            -(rt[1][0] * t.x + rt[1][1] * t.y + rt[1][2] * t.z),
            -(rt[2][0] * t.x + rt[2][1] * t.y + rt[2][2] * t.z),
        );
        Transform::from_parts(rt, inv_t)
    }

    /// Rotate `v` by the rotation block only.
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }

    /// Map a point through the full transform.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotate(p) + self.translation()
    }

    /// Extract the axis-angle of the rotation block.
    ///
    /// The angle lies in `[0, π]`. The identity maps to `+z` / `0`; a
    /// half-turn recovers its axis from the symmetric rotation block.
    pub fn to_axis_angle(&self) -> AxisAngle {
        let m = &self.m;
        let v = Vec3::new(m[2][1] - m[1][2], m[0][2] - m[2][0], m[1][0] - m[0][1]);
        let n = v.norm();
        let trace = m[0][0] + m[1][1] + m[2][2];
        let angle = (0.5 * n).atan2(0.5 * (trace - 1.0));

        if n >= 1e-9 {
            return AxisAngle::new(v.scale(1.0 / n), angle);
        }
        if angle < std::f64::consts::FRAC_PI_2 {
            return AxisAngle::identity();
        }

        // Half-turn: R = 2·n·nᵀ − I. Anchor on the largest diagonal entry.
        let k = (0..3)
            .max_by(|&a, &b| m[a][a].total_cmp(&m[b][b]))
            .unwrap_or(0);
        let nk = ((m[k][k] + 1.0) * 0.5).max(0.0).sqrt();
        let mut axis = [0.0; 3];
        for (j, a) in axis.iter_mut().enumerate() {
            *a = if j == k {
                nk
            } else {
                (m[k][j] + m[j][k]) / (4.0 * nk)
            };
        }
        let axis = Vec3::new(axis[0], axis[1], axis[2]);
        AxisAngle::new(axis.scale(1.0 / axis.norm()), std::f64::consts::PI)
    }

    /// Frobenius norm of the full 4×4 matrix.
    pub fn frobenius_norm(&self) -> f64 {
        self.m
            .iter()
            .flat_map(|row| row.iter())
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
    }

    /// Frobenius norm of `self − other`, used as a pose-matching error.
    pub fn distance(&self, other: &Transform) -> f64 {
        let mut acc = 0.0;
        for i in 0..4 {
            for j in 0..4 {
                let d = self.m[i][j] - other.m[i][j];
                acc += d * d;
            }
        }
        acc.sqrt()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        self.compose(&rhs)
    }
}

impl Mul<&Transform> for &Transform {
    type Output = Transform;

    fn mul(self, rhs: &Transform) -> Transform {
        self.compose(rhs)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
