//! Footprint models and the cost-map collaborator contract
//!
//! The obstacle and safety residuals measure clearance between an agent body
//! and something else in the world. The body is approximated by a footprint
//! model: a point for the default robot, a disc for humans. The cost-map
//! model is an external collaborator consulted only by the feasibility
//! check; a negative footprint cost denotes an infeasible pose.

use crate::obstacles::Obstacle;
use crate::se2::PoseSE2;
use nalgebra::Vector2;

/// Body approximation used by clearance residuals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FootprintModel {
    /// The body collapses to the pose position.
    Point,
    /// A disc of the given radius centered on the pose position.
    Circular { radius: f64 },
}

impl FootprintModel {
    /// Radius of the smallest circle containing the body.
    pub fn circumscribed_radius(&self) -> f64 {
        match self {
            FootprintModel::Point => 0.0,
            FootprintModel::Circular { radius } => *radius,
        }
    }

    /// Clearance between the body at `pose` and an obstacle boundary.
    pub fn distance_to_obstacle(&self, pose: &PoseSE2, obstacle: &Obstacle) -> f64 {
        let center_dist = obstacle.min_distance(&pose.position());
        center_dist - self.circumscribed_radius()
    }

    /// Clearance between the body at `pose` and a bare point.
    pub fn distance_to_point(&self, pose: &PoseSE2, point: &Vector2<f64>) -> f64 {
        (point - pose.position()).norm() - self.circumscribed_radius()
    }
}

/// Contract of the external cost-map collision service.
///
/// Consulted synchronously from `is_trajectory_feasible`; implementations
/// return a negative value for poses whose footprint collides.
pub trait CostmapModel {
    /// Cost of placing `footprint` at (x, y, theta). Negative means infeasible.
    fn footprint_cost(
        &self,
        x: f64,
        y: f64,
        theta: f64,
        footprint: &[Vector2<f64>],
        inscribed_radius: f64,
        circumscribed_radius: f64,
    ) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_footprint_distance() {
        let model = FootprintModel::Point;
        let pose = PoseSE2::new(0.0, 0.0, 0.0);
        let obst = Obstacle::point(3.0, 4.0);
        assert_relative_eq!(model.distance_to_obstacle(&pose, &obst), 5.0);
    }

    #[test]
    fn test_circular_footprint_subtracts_radius() {
        let model = FootprintModel::Circular { radius: 0.5 };
        let pose = PoseSE2::new(0.0, 0.0, 0.0);
        let obst = Obstacle::point(2.0, 0.0);
        assert_relative_eq!(model.distance_to_obstacle(&pose, &obst), 1.5);
        assert_relative_eq!(model.circumscribed_radius(), 0.5);
    }

    #[test]
    fn test_distance_to_point() {
        let model = FootprintModel::Circular { radius: 0.35 };
        let pose = PoseSE2::new(1.0, 1.0, 0.3);
        assert_relative_eq!(
            model.distance_to_point(&pose, &Vector2::new(1.0, 3.0)),
            1.65
        );
    }
}
