//! Planar rigid-body pose (SE2) and angle utilities
//!
//! The decision variables of the elastic band live in SE(2): a 2D position
//! plus a heading angle. Headings are kept normalized to the half-open
//! interval (−π, π] by every operation that produces one.

use nalgebra::Vector2;
use std::f64::consts::PI;
use std::fmt;

/// Normalize an angle to the interval (−π, π].
pub fn normalize_theta(theta: f64) -> f64 {
    let wrapped = theta.rem_euclid(2.0 * PI);
    if wrapped > PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}

/// Circular mean of two angles, normalized to (−π, π].
pub fn average_angles(theta1: f64, theta2: f64) -> f64 {
    let x = theta1.cos() + theta2.cos();
    let y = theta1.sin() + theta2.sin();
    if x == 0.0 && y == 0.0 {
        // antipodal headings have no unique mean, fall back to the midpoint
        normalize_theta(theta1 + 0.5 * normalize_theta(theta2 - theta1))
    } else {
        y.atan2(x)
    }
}

/// A pose in the plane: position (x, y) and heading θ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSE2 {
    position: Vector2<f64>,
    theta: f64,
}

impl PoseSE2 {
    /// Create a pose from coordinates and a heading. The heading is normalized.
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            position: Vector2::new(x, y),
            theta: normalize_theta(theta),
        }
    }

    /// Create a pose from a position vector and a heading.
    pub fn from_position(position: Vector2<f64>, theta: f64) -> Self {
        Self {
            position,
            theta: normalize_theta(theta),
        }
    }

    pub fn x(&self) -> f64 {
        self.position.x
    }

    pub fn y(&self) -> f64 {
        self.position.y
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn position(&self) -> Vector2<f64> {
        self.position
    }

    /// Unit vector pointing along the heading.
    pub fn orientation_unit_vec(&self) -> Vector2<f64> {
        Vector2::new(self.theta.cos(), self.theta.sin())
    }

    /// Set the heading, normalizing it to (−π, π].
    pub fn set_theta(&mut self, theta: f64) {
        self.theta = normalize_theta(theta);
    }

    pub fn set_position(&mut self, position: Vector2<f64>) {
        self.position = position;
    }

    /// Translate and rotate by a tangent-space increment (δx, δy, δθ).
    ///
    /// Used by the solver when applying an update step; the heading is
    /// re-normalized afterwards.
    pub fn plus(&mut self, dx: f64, dy: f64, dtheta: f64) {
        self.position.x += dx;
        self.position.y += dy;
        self.theta = normalize_theta(self.theta + dtheta);
    }

    /// Mean of two poses: arithmetic mean of the positions and circular mean
    /// of the headings.
    pub fn average(pose1: &PoseSE2, pose2: &PoseSE2) -> PoseSE2 {
        PoseSE2::from_position(
            0.5 * (pose1.position + pose2.position),
            average_angles(pose1.theta, pose2.theta),
        )
    }
}

impl fmt::Display for PoseSE2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.4}, {:.4}, {:.4})",
            self.position.x, self.position.y, self.theta
        )
    }
}
