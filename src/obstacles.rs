//! Obstacles and via-points
//!
//! Obstacles are a tagged variant rather than a class hierarchy: every
//! geometric query is a match on the shape, and the dynamic case carries its
//! constant velocity inline. Static shapes report their centroid unchanged
//! when asked for a predicted position.

use nalgebra::Vector2;

/// A soft attractor point the robot trajectory is biased to pass near.
pub type ViaPoint = Vector2<f64>;

/// Distance from `point` to the segment `[start, end]`.
pub fn distance_point_to_segment(
    point: &Vector2<f64>,
    start: &Vector2<f64>,
    end: &Vector2<f64>,
) -> f64 {
    let diff = end - start;
    let sq_norm = diff.norm_squared();
    if sq_norm == 0.0 {
        return (point - start).norm();
    }
    let u = (point - start).dot(&diff) / sq_norm;
    if u <= 0.0 {
        (point - start).norm()
    } else if u >= 1.0 {
        (point - end).norm()
    } else {
        (point - (start + u * diff)).norm()
    }
}

/// Distance from `point` to a closed polygon boundary (zero inside is not
/// detected; the band only ever cares about clearance to the outline).
pub fn distance_point_to_polygon(point: &Vector2<f64>, vertices: &[Vector2<f64>]) -> f64 {
    match vertices.len() {
        0 => f64::INFINITY,
        1 => (point - vertices[0]).norm(),
        _ => {
            let mut dist = f64::INFINITY;
            for i in 0..vertices.len() {
                let j = (i + 1) % vertices.len();
                dist = dist.min(distance_point_to_segment(point, &vertices[i], &vertices[j]));
            }
            dist
        }
    }
}

/// An obstacle known to the planner.
#[derive(Debug, Clone)]
pub enum Obstacle {
    /// A static point obstacle
    Point { position: Vector2<f64> },
    /// A static line obstacle
    Line {
        start: Vector2<f64>,
        end: Vector2<f64>,
    },
    /// A static polygonal obstacle (closed outline)
    Polygon { vertices: Vec<Vector2<f64>> },
    /// A moving circular obstacle with constant-velocity prediction
    DynamicCircle {
        position: Vector2<f64>,
        radius: f64,
        velocity: Vector2<f64>,
    },
}

impl Obstacle {
    /// Convenience constructor for a static point obstacle.
    pub fn point(x: f64, y: f64) -> Self {
        Obstacle::Point {
            position: Vector2::new(x, y),
        }
    }

    /// Convenience constructor for a moving circular obstacle.
    pub fn dynamic_circle(x: f64, y: f64, radius: f64, vx: f64, vy: f64) -> Self {
        Obstacle::DynamicCircle {
            position: Vector2::new(x, y),
            radius,
            velocity: Vector2::new(vx, vy),
        }
    }

    /// Whether the obstacle moves; dynamic obstacles are handled by a
    /// dedicated edge family.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Obstacle::DynamicCircle { .. })
    }

    /// Reference point of the obstacle.
    pub fn centroid(&self) -> Vector2<f64> {
        match self {
            Obstacle::Point { position } => *position,
            Obstacle::Line { start, end } => 0.5 * (start + end),
            Obstacle::Polygon { vertices } => {
                if vertices.is_empty() {
                    Vector2::zeros()
                } else {
                    vertices.iter().sum::<Vector2<f64>>() / vertices.len() as f64
                }
            }
            Obstacle::DynamicCircle { position, .. } => *position,
        }
    }

    /// Geometric distance from a point to the obstacle boundary.
    pub fn min_distance(&self, point: &Vector2<f64>) -> f64 {
        match self {
            Obstacle::Point { position } => (point - position).norm(),
            Obstacle::Line { start, end } => distance_point_to_segment(point, start, end),
            Obstacle::Polygon { vertices } => distance_point_to_polygon(point, vertices),
            Obstacle::DynamicCircle {
                position, radius, ..
            } => ((point - position).norm() - radius).max(0.0),
        }
    }

    /// Predicted centroid after `t` seconds under the constant-velocity
    /// model. Static obstacles do not move.
    pub fn predict_centroid(&self, t: f64) -> Vector2<f64> {
        match self {
            Obstacle::DynamicCircle {
                position, velocity, ..
            } => position + velocity * t,
            _ => self.centroid(),
        }
    }

    /// Body radius for circular obstacles, zero otherwise.
    pub fn radius(&self) -> f64 {
        match self {
            Obstacle::DynamicCircle { radius, .. } => *radius,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_distance() {
        let obst = Obstacle::point(1.0, 0.0);
        assert_relative_eq!(obst.min_distance(&Vector2::new(4.0, 4.0)), 5.0);
        assert!(!obst.is_dynamic());
    }

    #[test]
    fn test_segment_distance_projection_cases() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(2.0, 0.0);
        // beyond the start
        assert_relative_eq!(distance_point_to_segment(&Vector2::new(-1.0, 0.0), &a, &b), 1.0);
        // beyond the end
        assert_relative_eq!(distance_point_to_segment(&Vector2::new(3.0, 0.0), &a, &b), 1.0);
        // perpendicular foot inside
        assert_relative_eq!(distance_point_to_segment(&Vector2::new(1.0, 2.0), &a, &b), 2.0);
    }

    #[test]
    fn test_polygon_distance() {
        let square = Obstacle::Polygon {
            vertices: vec![
                Vector2::new(0.0, 0.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(1.0, 1.0),
                Vector2::new(0.0, 1.0),
            ],
        };
        assert_relative_eq!(square.min_distance(&Vector2::new(2.0, 0.5)), 1.0);
        assert_relative_eq!(square.centroid().x, 0.5);
    }

    #[test]
    fn test_dynamic_prediction() {
        let obst = Obstacle::dynamic_circle(0.0, 0.0, 0.3, 1.0, -0.5);
        assert!(obst.is_dynamic());
        let predicted = obst.predict_centroid(2.0);
        assert_relative_eq!(predicted.x, 2.0);
        assert_relative_eq!(predicted.y, -1.0);
        // distance accounts for the body radius
        assert_relative_eq!(obst.min_distance(&Vector2::new(1.0, 0.0)), 0.7);
    }

    #[test]
    fn test_static_obstacle_does_not_move() {
        let obst = Obstacle::point(3.0, 4.0);
        assert_relative_eq!(obst.predict_centroid(10.0).x, 3.0);
        assert_relative_eq!(obst.predict_centroid(10.0).y, 4.0);
    }
}
