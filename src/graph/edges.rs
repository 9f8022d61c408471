//! Edge families and their residual functions
//!
//! Every edge carries an explicit family tag, a diagonal information vector
//! and a payload describing the vertices it touches plus the snapshot of
//! configuration values it needs. Classification during cost breakdown is a
//! tag read. Bound constraints use the one-sided penalty form
//! `max(0, x - x_max)`; equality-style terms return the raw deviation and
//! are squared by the solver.

use super::{BandState, VertexRef};
use crate::footprint::FootprintModel;
use crate::obstacles::{Obstacle, ViaPoint};
use crate::se2::{normalize_theta, PoseSE2};
use nalgebra::{DVector, Vector2};

/// Guard for time differences appearing in denominators.
const DT_EPS: f64 = 1e-9;

/// One-sided penalty keeping `var` above the bound `a` with margin `epsilon`.
pub fn penalty_bound_from_below(var: f64, a: f64, epsilon: f64) -> f64 {
    if var >= a + epsilon {
        0.0
    } else {
        -var + (a + epsilon)
    }
}

/// Two-sided penalty keeping `var` inside `[lower, upper]` with margin
/// `epsilon`.
pub fn penalty_bound_to_interval(var: f64, lower: f64, upper: f64, epsilon: f64) -> f64 {
    if var < lower + epsilon {
        -var + (lower + epsilon)
    } else if var <= upper - epsilon {
        0.0
    } else {
        var - (upper - epsilon)
    }
}

/// Signed translational and angular velocity between two consecutive band
/// poses. The sign of the translational part follows the projection of the
/// displacement onto the heading of the first pose.
pub fn extract_velocity(pose1: &PoseSE2, pose2: &PoseSE2, dt: f64) -> (f64, f64) {
    let delta = pose2.position() - pose1.position();
    let projection = delta.dot(&pose1.orientation_unit_vec());
    let sign = if projection > 0.0 {
        1.0
    } else if projection < 0.0 {
        -1.0
    } else {
        0.0
    };
    let dt = dt.max(DT_EPS);
    let v = sign * delta.norm() / dt;
    let omega = normalize_theta(pose2.theta() - pose1.theta()) / dt;
    (v, omega)
}

/// Planar velocity vector between two consecutive band poses.
fn planar_velocity(pose1: &PoseSE2, pose2: &PoseSE2, dt: f64) -> Vector2<f64> {
    (pose2.position() - pose1.position()) / dt.max(DT_EPS)
}

/// Translational and angular velocity caps.
#[derive(Debug, Clone, Copy)]
pub struct VelocityLimits {
    pub max_vel_x: f64,
    pub max_vel_x_backwards: f64,
    pub max_vel_theta: f64,
    pub epsilon: f64,
}

/// Acceleration caps.
#[derive(Debug, Clone, Copy)]
pub struct AccelerationLimits {
    pub acc_lim_x: f64,
    pub acc_lim_theta: f64,
    pub epsilon: f64,
}

/// Cost-term family tag; classification during cost breakdown reads this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeFamily {
    TimeOptimal,
    Velocity,
    VelocityHuman,
    Acceleration,
    AccelerationHuman,
    KinematicsDiffDrive,
    KinematicsCarlike,
    Obstacle,
    DynamicObstacle,
    ViaPoint,
    HumanRobotSafety,
    HumanHumanSafety,
    HumanRobotTtc,
    HumanRobotDirectional,
}

/// Edge payload: attached vertices plus the configuration snapshot needed by
/// the residual.
#[derive(Debug, Clone)]
pub enum EdgeKind {
    TimeOptimal {
        dt: VertexRef,
    },
    Velocity {
        from: VertexRef,
        to: VertexRef,
        dt: VertexRef,
        limits: VelocityLimits,
    },
    VelocityHuman {
        from: VertexRef,
        to: VertexRef,
        dt: VertexRef,
        limits: VelocityLimits,
        nominal_vel_x: f64,
    },
    Acceleration {
        first: VertexRef,
        second: VertexRef,
        third: VertexRef,
        dt1: VertexRef,
        dt2: VertexRef,
        limits: AccelerationLimits,
    },
    AccelerationStart {
        first: VertexRef,
        second: VertexRef,
        dt: VertexRef,
        start_vel: Vector2<f64>,
        limits: AccelerationLimits,
    },
    AccelerationGoal {
        first: VertexRef,
        second: VertexRef,
        dt: VertexRef,
        goal_vel: Vector2<f64>,
        limits: AccelerationLimits,
    },
    KinematicsDiffDrive {
        from: VertexRef,
        to: VertexRef,
    },
    KinematicsCarlike {
        from: VertexRef,
        to: VertexRef,
        min_turning_radius: f64,
    },
    Obstacle {
        pose: VertexRef,
        obstacle: Obstacle,
        footprint: FootprintModel,
        min_dist: f64,
        epsilon: f64,
    },
    DynamicObstacle {
        pose: VertexRef,
        dt: VertexRef,
        index: usize,
        obstacle: Obstacle,
        footprint: FootprintModel,
        min_dist: f64,
        epsilon: f64,
    },
    ViaPoint {
        pose: VertexRef,
        target: ViaPoint,
    },
    /// Proximity clearance between two bodies; shared by the human-robot,
    /// human-human and mode-2 approach terms (the family tag tells them
    /// apart).
    SafetyClearance {
        first: VertexRef,
        second: VertexRef,
        first_footprint: FootprintModel,
        second_radius: f64,
        min_dist: f64,
        epsilon: f64,
    },
    Ttc {
        robot_from: VertexRef,
        robot_to: VertexRef,
        robot_dt: VertexRef,
        human_from: VertexRef,
        human_to: VertexRef,
        human_dt: VertexRef,
        radius_sum: f64,
        threshold: f64,
    },
    Directional {
        robot_from: VertexRef,
        robot_to: VertexRef,
        robot_dt: VertexRef,
        human_from: VertexRef,
        human_to: VertexRef,
        human_dt: VertexRef,
        cone_angle: f64,
    },
}

/// A cost term of the graph.
#[derive(Debug, Clone)]
pub struct Edge {
    family: EdgeFamily,
    information: Vec<f64>,
    kind: EdgeKind,
}

impl Edge {
    pub fn family(&self) -> EdgeFamily {
        self.family
    }

    /// Diagonal of the information (weight) matrix, one entry per residual
    /// row.
    pub fn information(&self) -> &[f64] {
        &self.information
    }

    pub fn kind(&self) -> &EdgeKind {
        &self.kind
    }

    /// Number of residual rows.
    pub fn dimension(&self) -> usize {
        self.information.len()
    }

    /// The vertices this edge touches, in payload order.
    pub fn vertices(&self) -> Vec<VertexRef> {
        match &self.kind {
            EdgeKind::TimeOptimal { dt } => vec![*dt],
            EdgeKind::Velocity { from, to, dt, .. }
            | EdgeKind::VelocityHuman { from, to, dt, .. } => vec![*from, *to, *dt],
            EdgeKind::Acceleration {
                first,
                second,
                third,
                dt1,
                dt2,
                ..
            } => vec![*first, *second, *third, *dt1, *dt2],
            EdgeKind::AccelerationStart {
                first, second, dt, ..
            }
            | EdgeKind::AccelerationGoal {
                first, second, dt, ..
            } => vec![*first, *second, *dt],
            EdgeKind::KinematicsDiffDrive { from, to }
            | EdgeKind::KinematicsCarlike { from, to, .. } => vec![*from, *to],
            EdgeKind::Obstacle { pose, .. } => vec![*pose],
            EdgeKind::DynamicObstacle { pose, dt, .. } => vec![*pose, *dt],
            EdgeKind::ViaPoint { pose, .. } => vec![*pose],
            EdgeKind::SafetyClearance { first, second, .. } => vec![*first, *second],
            EdgeKind::Ttc {
                robot_from,
                robot_to,
                robot_dt,
                human_from,
                human_to,
                human_dt,
                ..
            }
            | EdgeKind::Directional {
                robot_from,
                robot_to,
                robot_dt,
                human_from,
                human_to,
                human_dt,
                ..
            } => vec![
                *robot_from,
                *robot_to,
                *robot_dt,
                *human_from,
                *human_to,
                *human_dt,
            ],
        }
    }

    /// Evaluate the residual vector at the current band state.
    pub fn residual<S: BandState + ?Sized>(&self, state: &S) -> DVector<f64> {
        match &self.kind {
            EdgeKind::TimeOptimal { dt } => DVector::from_vec(vec![state.time_diff(*dt)]),

            EdgeKind::Velocity {
                from,
                to,
                dt,
                limits,
            } => {
                let (v, omega) = extract_velocity(
                    &state.pose(*from),
                    &state.pose(*to),
                    state.time_diff(*dt),
                );
                DVector::from_vec(vec![
                    penalty_bound_to_interval(
                        v,
                        -limits.max_vel_x_backwards,
                        limits.max_vel_x,
                        limits.epsilon,
                    ),
                    penalty_bound_to_interval(
                        omega,
                        -limits.max_vel_theta,
                        limits.max_vel_theta,
                        limits.epsilon,
                    ),
                ])
            }

            EdgeKind::VelocityHuman {
                from,
                to,
                dt,
                limits,
                nominal_vel_x,
            } => {
                let (v, omega) = extract_velocity(
                    &state.pose(*from),
                    &state.pose(*to),
                    state.time_diff(*dt),
                );
                DVector::from_vec(vec![
                    penalty_bound_to_interval(
                        v,
                        -limits.max_vel_x_backwards,
                        limits.max_vel_x,
                        limits.epsilon,
                    ),
                    penalty_bound_to_interval(
                        omega,
                        -limits.max_vel_theta,
                        limits.max_vel_theta,
                        limits.epsilon,
                    ),
                    v - nominal_vel_x,
                ])
            }

            EdgeKind::Acceleration {
                first,
                second,
                third,
                dt1,
                dt2,
                limits,
            } => {
                let dt1 = state.time_diff(*dt1);
                let dt2 = state.time_diff(*dt2);
                let (v1, omega1) =
                    extract_velocity(&state.pose(*first), &state.pose(*second), dt1);
                let (v2, omega2) =
                    extract_velocity(&state.pose(*second), &state.pose(*third), dt2);
                let denom = (dt1 + dt2).max(DT_EPS);
                let acc_lin = 2.0 * (v2 - v1) / denom;
                let acc_rot = 2.0 * (omega2 - omega1) / denom;
                DVector::from_vec(vec![
                    penalty_bound_to_interval(
                        acc_lin,
                        -limits.acc_lim_x,
                        limits.acc_lim_x,
                        limits.epsilon,
                    ),
                    penalty_bound_to_interval(
                        acc_rot,
                        -limits.acc_lim_theta,
                        limits.acc_lim_theta,
                        limits.epsilon,
                    ),
                ])
            }

            EdgeKind::AccelerationStart {
                first,
                second,
                dt,
                start_vel,
                limits,
            } => {
                let dt = state.time_diff(*dt).max(DT_EPS);
                let (v, omega) = extract_velocity(&state.pose(*first), &state.pose(*second), dt);
                let acc_lin = (v - start_vel.x) / dt;
                let acc_rot = (omega - start_vel.y) / dt;
                DVector::from_vec(vec![
                    penalty_bound_to_interval(
                        acc_lin,
                        -limits.acc_lim_x,
                        limits.acc_lim_x,
                        limits.epsilon,
                    ),
                    penalty_bound_to_interval(
                        acc_rot,
                        -limits.acc_lim_theta,
                        limits.acc_lim_theta,
                        limits.epsilon,
                    ),
                ])
            }

            EdgeKind::AccelerationGoal {
                first,
                second,
                dt,
                goal_vel,
                limits,
            } => {
                let dt = state.time_diff(*dt).max(DT_EPS);
                let (v, omega) = extract_velocity(&state.pose(*first), &state.pose(*second), dt);
                let acc_lin = (goal_vel.x - v) / dt;
                let acc_rot = (goal_vel.y - omega) / dt;
                DVector::from_vec(vec![
                    penalty_bound_to_interval(
                        acc_lin,
                        -limits.acc_lim_x,
                        limits.acc_lim_x,
                        limits.epsilon,
                    ),
                    penalty_bound_to_interval(
                        acc_rot,
                        -limits.acc_lim_theta,
                        limits.acc_lim_theta,
                        limits.epsilon,
                    ),
                ])
            }

            EdgeKind::KinematicsDiffDrive { from, to } => {
                let p1 = state.pose(*from);
                let p2 = state.pose(*to);
                let delta = p2.position() - p1.position();
                let nonholonomic = ((p1.theta().cos() + p2.theta().cos()) * delta.y
                    - (p1.theta().sin() + p2.theta().sin()) * delta.x)
                    .abs();
                let forward = penalty_bound_from_below(
                    delta.dot(&p1.orientation_unit_vec()),
                    0.0,
                    0.0,
                );
                DVector::from_vec(vec![nonholonomic, forward])
            }

            EdgeKind::KinematicsCarlike {
                from,
                to,
                min_turning_radius,
            } => {
                let p1 = state.pose(*from);
                let p2 = state.pose(*to);
                let delta = p2.position() - p1.position();
                let nonholonomic = ((p1.theta().cos() + p2.theta().cos()) * delta.y
                    - (p1.theta().sin() + p2.theta().sin()) * delta.x)
                    .abs();
                let angle_diff = normalize_theta(p2.theta() - p1.theta());
                let turning = if angle_diff.abs() < 1e-4 {
                    0.0 // straight segment, infinite radius
                } else {
                    let radius = delta.norm() / angle_diff.abs();
                    penalty_bound_from_below(radius, *min_turning_radius, 0.0)
                };
                DVector::from_vec(vec![nonholonomic, turning])
            }

            EdgeKind::Obstacle {
                pose,
                obstacle,
                footprint,
                min_dist,
                epsilon,
            } => {
                let dist = footprint.distance_to_obstacle(&state.pose(*pose), obstacle);
                DVector::from_vec(vec![penalty_bound_from_below(dist, *min_dist, *epsilon)])
            }

            EdgeKind::DynamicObstacle {
                pose,
                dt,
                index,
                obstacle,
                footprint,
                min_dist,
                epsilon,
            } => {
                let t = *index as f64 * state.time_diff(*dt);
                let predicted = obstacle.predict_centroid(t);
                let dist = footprint.distance_to_point(&state.pose(*pose), &predicted)
                    - obstacle.radius();
                DVector::from_vec(vec![penalty_bound_from_below(dist, *min_dist, *epsilon)])
            }

            EdgeKind::ViaPoint { pose, target } => {
                let dist = (state.pose(*pose).position() - target).norm();
                DVector::from_vec(vec![dist])
            }

            EdgeKind::SafetyClearance {
                first,
                second,
                first_footprint,
                second_radius,
                min_dist,
                epsilon,
            } => {
                let other = state.pose(*second).position();
                let dist =
                    first_footprint.distance_to_point(&state.pose(*first), &other) - second_radius;
                DVector::from_vec(vec![penalty_bound_from_below(dist, *min_dist, *epsilon)])
            }

            EdgeKind::Ttc {
                robot_from,
                robot_to,
                robot_dt,
                human_from,
                human_to,
                human_dt,
                radius_sum,
                threshold,
            } => {
                let robot_pose = state.pose(*robot_from);
                let human_pose = state.pose(*human_from);
                let robot_vel = planar_velocity(
                    &robot_pose,
                    &state.pose(*robot_to),
                    state.time_diff(*robot_dt),
                );
                let human_vel = planar_velocity(
                    &human_pose,
                    &state.pose(*human_to),
                    state.time_diff(*human_dt),
                );
                let ttc = time_to_collision(
                    human_pose.position() - robot_pose.position(),
                    robot_vel - human_vel,
                    *radius_sum,
                );
                DVector::from_vec(vec![penalty_bound_from_below(ttc, *threshold, 0.0)])
            }

            EdgeKind::Directional {
                robot_from,
                robot_to,
                robot_dt,
                human_from,
                human_to,
                human_dt,
                cone_angle,
            } => {
                let robot_pose = state.pose(*robot_from);
                let human_pose = state.pose(*human_from);
                let robot_vel = planar_velocity(
                    &robot_pose,
                    &state.pose(*robot_to),
                    state.time_diff(*robot_dt),
                );
                let human_vel = planar_velocity(
                    &human_pose,
                    &state.pose(*human_to),
                    state.time_diff(*human_dt),
                );
                let closing = directional_closing_speed(
                    human_pose.position() - robot_pose.position(),
                    robot_vel - human_vel,
                    *cone_angle,
                );
                DVector::from_vec(vec![closing])
            }
        }
    }

    // -- constructors, one per family -----------------------------------

    pub fn time_optimal(dt: VertexRef, weight: f64) -> Self {
        Edge {
            family: EdgeFamily::TimeOptimal,
            information: vec![weight],
            kind: EdgeKind::TimeOptimal { dt },
        }
    }

    pub fn velocity(
        from: VertexRef,
        to: VertexRef,
        dt: VertexRef,
        limits: VelocityLimits,
        weight_vel_x: f64,
        weight_vel_theta: f64,
    ) -> Self {
        Edge {
            family: EdgeFamily::Velocity,
            information: vec![weight_vel_x, weight_vel_theta],
            kind: EdgeKind::Velocity {
                from,
                to,
                dt,
                limits,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn velocity_human(
        from: VertexRef,
        to: VertexRef,
        dt: VertexRef,
        limits: VelocityLimits,
        nominal_vel_x: f64,
        weight_vel_x: f64,
        weight_vel_theta: f64,
        weight_nominal: f64,
    ) -> Self {
        Edge {
            family: EdgeFamily::VelocityHuman,
            information: vec![weight_vel_x, weight_vel_theta, weight_nominal],
            kind: EdgeKind::VelocityHuman {
                from,
                to,
                dt,
                limits,
                nominal_vel_x,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn acceleration(
        family: EdgeFamily,
        first: VertexRef,
        second: VertexRef,
        third: VertexRef,
        dt1: VertexRef,
        dt2: VertexRef,
        limits: AccelerationLimits,
        weight_acc_x: f64,
        weight_acc_theta: f64,
    ) -> Self {
        Edge {
            family,
            information: vec![weight_acc_x, weight_acc_theta],
            kind: EdgeKind::Acceleration {
                first,
                second,
                third,
                dt1,
                dt2,
                limits,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn acceleration_start(
        family: EdgeFamily,
        first: VertexRef,
        second: VertexRef,
        dt: VertexRef,
        start_vel: Vector2<f64>,
        limits: AccelerationLimits,
        weight_acc_x: f64,
        weight_acc_theta: f64,
    ) -> Self {
        Edge {
            family,
            information: vec![weight_acc_x, weight_acc_theta],
            kind: EdgeKind::AccelerationStart {
                first,
                second,
                dt,
                start_vel,
                limits,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn acceleration_goal(
        family: EdgeFamily,
        first: VertexRef,
        second: VertexRef,
        dt: VertexRef,
        goal_vel: Vector2<f64>,
        limits: AccelerationLimits,
        weight_acc_x: f64,
        weight_acc_theta: f64,
    ) -> Self {
        Edge {
            family,
            information: vec![weight_acc_x, weight_acc_theta],
            kind: EdgeKind::AccelerationGoal {
                first,
                second,
                dt,
                goal_vel,
                limits,
            },
        }
    }

    pub fn kinematics_diff_drive(
        from: VertexRef,
        to: VertexRef,
        weight_nh: f64,
        weight_forward_drive: f64,
    ) -> Self {
        Edge {
            family: EdgeFamily::KinematicsDiffDrive,
            information: vec![weight_nh, weight_forward_drive],
            kind: EdgeKind::KinematicsDiffDrive { from, to },
        }
    }

    pub fn kinematics_carlike(
        from: VertexRef,
        to: VertexRef,
        min_turning_radius: f64,
        weight_nh: f64,
        weight_turning_radius: f64,
    ) -> Self {
        Edge {
            family: EdgeFamily::KinematicsCarlike,
            information: vec![weight_nh, weight_turning_radius],
            kind: EdgeKind::KinematicsCarlike {
                from,
                to,
                min_turning_radius,
            },
        }
    }

    pub fn obstacle(
        pose: VertexRef,
        obstacle: Obstacle,
        footprint: FootprintModel,
        min_dist: f64,
        epsilon: f64,
        weight: f64,
    ) -> Self {
        Edge {
            family: EdgeFamily::Obstacle,
            information: vec![weight],
            kind: EdgeKind::Obstacle {
                pose,
                obstacle,
                footprint,
                min_dist,
                epsilon,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn dynamic_obstacle(
        pose: VertexRef,
        dt: VertexRef,
        index: usize,
        obstacle: Obstacle,
        footprint: FootprintModel,
        min_dist: f64,
        epsilon: f64,
        weight: f64,
    ) -> Self {
        Edge {
            family: EdgeFamily::DynamicObstacle,
            information: vec![weight],
            kind: EdgeKind::DynamicObstacle {
                pose,
                dt,
                index,
                obstacle,
                footprint,
                min_dist,
                epsilon,
            },
        }
    }

    pub fn via_point(pose: VertexRef, target: ViaPoint, weight: f64) -> Self {
        Edge {
            family: EdgeFamily::ViaPoint,
            information: vec![weight],
            kind: EdgeKind::ViaPoint { pose, target },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn safety_clearance(
        family: EdgeFamily,
        first: VertexRef,
        second: VertexRef,
        first_footprint: FootprintModel,
        second_radius: f64,
        min_dist: f64,
        epsilon: f64,
        weight: f64,
    ) -> Self {
        Edge {
            family,
            information: vec![weight],
            kind: EdgeKind::SafetyClearance {
                first,
                second,
                first_footprint,
                second_radius,
                min_dist,
                epsilon,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn human_robot_ttc(
        robot: [VertexRef; 3],
        human: [VertexRef; 3],
        radius_sum: f64,
        threshold: f64,
        weight: f64,
    ) -> Self {
        Edge {
            family: EdgeFamily::HumanRobotTtc,
            information: vec![weight],
            kind: EdgeKind::Ttc {
                robot_from: robot[0],
                robot_to: robot[1],
                robot_dt: robot[2],
                human_from: human[0],
                human_to: human[1],
                human_dt: human[2],
                radius_sum,
                threshold,
            },
        }
    }

    pub fn human_robot_directional(
        robot: [VertexRef; 3],
        human: [VertexRef; 3],
        cone_angle: f64,
        weight: f64,
    ) -> Self {
        Edge {
            family: EdgeFamily::HumanRobotDirectional,
            information: vec![weight],
            kind: EdgeKind::Directional {
                robot_from: robot[0],
                robot_to: robot[1],
                robot_dt: robot[2],
                human_from: human[0],
                human_to: human[1],
                human_dt: human[2],
                cone_angle,
            },
        }
    }
}

/// Smallest positive time until the moving point reaches distance
/// `radius_sum` from the origin-anchored offset `c`, given the relative
/// velocity `v` of the pursuer. Infinity when the bodies are diverging or
/// miss each other; zero when they already overlap.
fn time_to_collision(c: Vector2<f64>, v: Vector2<f64>, radius_sum: f64) -> f64 {
    if c.norm() <= radius_sum {
        return 0.0;
    }
    let a = v.norm_squared();
    if a < DT_EPS {
        return f64::INFINITY;
    }
    let b = c.dot(&v);
    if b <= 0.0 {
        // moving apart
        return f64::INFINITY;
    }
    let discriminant = b * b - a * (c.norm_squared() - radius_sum * radius_sum);
    if discriminant < 0.0 {
        return f64::INFINITY;
    }
    (b - discriminant.sqrt()) / a
}

/// Speed at which the robot closes in on the human, counted only when the
/// relative velocity lies inside the approach cone around the robot-to-human
/// bearing.
fn directional_closing_speed(to_human: Vector2<f64>, rel_vel: Vector2<f64>, cone_angle: f64) -> f64 {
    let dist = to_human.norm();
    if dist < DT_EPS {
        return 0.0;
    }
    let closing = rel_vel.dot(&to_human) / dist;
    if closing <= 0.0 {
        return 0.0;
    }
    let speed = rel_vel.norm();
    let cos_angle = closing / speed;
    if cos_angle >= cone_angle.cos() {
        closing
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BandId;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    /// Minimal band state for residual tests.
    #[derive(Default)]
    struct TestState {
        poses: HashMap<VertexRef, PoseSE2>,
        dts: HashMap<VertexRef, f64>,
    }

    impl TestState {
        fn with_pose(mut self, vref: VertexRef, pose: PoseSE2) -> Self {
            self.poses.insert(vref, pose);
            self
        }

        fn with_dt(mut self, vref: VertexRef, dt: f64) -> Self {
            self.dts.insert(vref, dt);
            self
        }
    }

    impl BandState for TestState {
        fn pose(&self, vref: VertexRef) -> PoseSE2 {
            self.poses[&vref]
        }

        fn time_diff(&self, vref: VertexRef) -> f64 {
            self.dts[&vref]
        }
    }

    fn p(i: usize) -> VertexRef {
        VertexRef::pose(BandId::Robot, i)
    }

    fn t(i: usize) -> VertexRef {
        VertexRef::time_diff(BandId::Robot, i)
    }

    fn hp(i: usize) -> VertexRef {
        VertexRef::pose(BandId::Human(1), i)
    }

    fn ht(i: usize) -> VertexRef {
        VertexRef::time_diff(BandId::Human(1), i)
    }

    #[test]
    fn test_penalty_bound_from_below() {
        assert_relative_eq!(penalty_bound_from_below(1.0, 0.5, 0.1), 0.0);
        assert_relative_eq!(penalty_bound_from_below(0.4, 0.5, 0.1), 0.2);
        assert_relative_eq!(penalty_bound_from_below(0.0, 0.5, 0.0), 0.5);
    }

    #[test]
    fn test_penalty_bound_to_interval() {
        assert_relative_eq!(penalty_bound_to_interval(0.0, -1.0, 1.0, 0.1), 0.0);
        assert_relative_eq!(penalty_bound_to_interval(1.5, -1.0, 1.0, 0.1), 0.6);
        assert_relative_eq!(penalty_bound_to_interval(-1.5, -1.0, 1.0, 0.1), 0.6);
    }

    #[test]
    fn test_extract_velocity_forward_and_backward() {
        let a = PoseSE2::new(0.0, 0.0, 0.0);
        let b = PoseSE2::new(1.0, 0.0, 0.0);
        let (v, omega) = extract_velocity(&a, &b, 0.5);
        assert_relative_eq!(v, 2.0);
        assert_relative_eq!(omega, 0.0);

        // displacement against the heading gives a negative speed
        let c = PoseSE2::new(0.0, 0.0, std::f64::consts::PI);
        let (v_back, _) = extract_velocity(&c, &b, 0.5);
        assert_relative_eq!(v_back, -2.0);
    }

    #[test]
    fn test_time_optimal_residual_is_dt() {
        let edge = Edge::time_optimal(t(0), 1.0);
        let state = TestState::default().with_dt(t(0), 0.42);
        assert_relative_eq!(edge.residual(&state)[0], 0.42);
        assert_eq!(edge.family(), EdgeFamily::TimeOptimal);
    }

    #[test]
    fn test_velocity_residual_penalizes_speeding() {
        let limits = VelocityLimits {
            max_vel_x: 0.4,
            max_vel_x_backwards: 0.2,
            max_vel_theta: 0.3,
            epsilon: 0.0,
        };
        let edge = Edge::velocity(p(0), p(1), t(0), limits, 2.0, 1.0);
        // 1 m in 1 s = 1.0 m/s, 0.6 above the cap
        let state = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(1.0, 0.0, 0.0))
            .with_dt(t(0), 1.0);
        let r = edge.residual(&state);
        assert_relative_eq!(r[0], 0.6, epsilon = 1e-12);
        assert_relative_eq!(r[1], 0.0);

        // within limits: zero residual
        let slow = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(0.2, 0.0, 0.0))
            .with_dt(t(0), 1.0);
        let r = edge.residual(&slow);
        assert_relative_eq!(r[0], 0.0);
    }

    #[test]
    fn test_velocity_human_nominal_deviation() {
        let limits = VelocityLimits {
            max_vel_x: 1.3,
            max_vel_x_backwards: 0.2,
            max_vel_theta: 1.1,
            epsilon: 0.0,
        };
        let edge = Edge::velocity_human(p(0), p(1), t(0), limits, 1.0, 2.0, 2.0, 2.0);
        let state = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(0.5, 0.0, 0.0))
            .with_dt(t(0), 1.0);
        let r = edge.residual(&state);
        assert_eq!(r.len(), 3);
        assert_relative_eq!(r[2], -0.5); // walking slower than nominal
    }

    #[test]
    fn test_acceleration_residual_zero_at_constant_speed() {
        let limits = AccelerationLimits {
            acc_lim_x: 0.5,
            acc_lim_theta: 0.5,
            epsilon: 0.0,
        };
        let edge = Edge::acceleration(
            EdgeFamily::Acceleration,
            p(0),
            p(1),
            p(2),
            t(0),
            t(1),
            limits,
            1.0,
            1.0,
        );
        let state = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(0.3, 0.0, 0.0))
            .with_pose(p(2), PoseSE2::new(0.6, 0.0, 0.0))
            .with_dt(t(0), 1.0)
            .with_dt(t(1), 1.0);
        let r = edge.residual(&state);
        assert_relative_eq!(r[0], 0.0);
        assert_relative_eq!(r[1], 0.0);
    }

    #[test]
    fn test_acceleration_residual_survives_tiny_dt() {
        let limits = AccelerationLimits {
            acc_lim_x: 0.5,
            acc_lim_theta: 0.5,
            epsilon: 0.0,
        };
        let edge = Edge::acceleration_start(
            EdgeFamily::Acceleration,
            p(0),
            p(1),
            t(0),
            Vector2::new(0.0, 0.0),
            limits,
            1.0,
            1.0,
        );
        let state = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(1.0, 0.0, 0.0))
            .with_dt(t(0), 0.0);
        let r = edge.residual(&state);
        assert!(r[0].is_finite());
        assert!(r[1].is_finite());
    }

    #[test]
    fn test_kinematics_diff_drive_sideslip() {
        let edge = Edge::kinematics_diff_drive(p(0), p(1), 1000.0, 1.0);
        // pure sideways motion violates the nonholonomic constraint
        let state = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(0.0, 1.0, 0.0));
        let r = edge.residual(&state);
        assert_relative_eq!(r[0], 2.0);

        // straight forward motion satisfies it
        let straight = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(1.0, 0.0, 0.0));
        let r = edge.residual(&straight);
        assert_relative_eq!(r[0], 0.0);
        assert_relative_eq!(r[1], 0.0);
    }

    #[test]
    fn test_kinematics_carlike_turn_in_place() {
        let edge = Edge::kinematics_carlike(p(0), p(1), 0.5, 1000.0, 1.0);
        // pure rotation: radius 0, penalized up to the bound
        let state = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(0.0, 0.0, 1.0));
        let r = edge.residual(&state);
        assert_relative_eq!(r[1], 0.5, epsilon = 1e-12);

        // gentle arc above the bound is free
        let arc = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(1.0, 0.0, 0.1));
        let r = edge.residual(&arc);
        assert_relative_eq!(r[1], 0.0);
    }

    #[test]
    fn test_obstacle_residual() {
        let edge = Edge::obstacle(
            p(0),
            Obstacle::point(1.0, 0.0),
            FootprintModel::Point,
            0.5,
            0.1,
            50.0,
        );
        let close = TestState::default().with_pose(p(0), PoseSE2::new(0.9, 0.0, 0.0));
        assert_relative_eq!(edge.residual(&close)[0], 0.5, epsilon = 1e-12);
        let clear = TestState::default().with_pose(p(0), PoseSE2::new(3.0, 0.0, 0.0));
        assert_relative_eq!(edge.residual(&clear)[0], 0.0);
    }

    #[test]
    fn test_dynamic_obstacle_uses_predicted_position() {
        let edge = Edge::dynamic_obstacle(
            p(2),
            t(2),
            2,
            Obstacle::dynamic_circle(0.0, 0.0, 0.0, 1.0, 0.0),
            FootprintModel::Point,
            0.5,
            0.0,
            50.0,
        );
        // after 2 * 0.5 s the obstacle sits at x = 1.0, right on the pose
        let state = TestState::default()
            .with_pose(p(2), PoseSE2::new(1.0, 0.0, 0.0))
            .with_dt(t(2), 0.5);
        assert_relative_eq!(edge.residual(&state)[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_via_point_residual_is_distance() {
        let edge = Edge::via_point(p(0), Vector2::new(0.0, 2.0), 1.0);
        let state = TestState::default().with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0));
        assert_relative_eq!(edge.residual(&state)[0], 2.0);
    }

    #[test]
    fn test_safety_clearance_residual() {
        let edge = Edge::safety_clearance(
            EdgeFamily::HumanRobotSafety,
            p(0),
            hp(0),
            FootprintModel::Point,
            0.35,
            0.6,
            0.0,
            2.0,
        );
        let state = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(hp(0), PoseSE2::new(0.75, 0.0, 0.0));
        // clearance 0.75 - 0.35 = 0.4, which is 0.2 below the bound
        assert_relative_eq!(edge.residual(&state)[0], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_ttc_head_on() {
        let edge = Edge::human_robot_ttc(
            [p(0), p(1), t(0)],
            [hp(0), hp(1), ht(0)],
            0.35,
            5.0,
            1.0,
        );
        // robot at origin moving +x at 1 m/s, human 4.35 m ahead standing still:
        // contact after 4 s, 1 s under the threshold
        let state = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(1.0, 0.0, 0.0))
            .with_dt(t(0), 1.0)
            .with_pose(hp(0), PoseSE2::new(4.35, 0.0, 0.0))
            .with_pose(hp(1), PoseSE2::new(4.35, 0.0, 0.0))
            .with_dt(ht(0), 1.0);
        assert_relative_eq!(edge.residual(&state)[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ttc_diverging_is_free() {
        let edge = Edge::human_robot_ttc(
            [p(0), p(1), t(0)],
            [hp(0), hp(1), ht(0)],
            0.35,
            5.0,
            1.0,
        );
        let state = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(-1.0, 0.0, 0.0))
            .with_dt(t(0), 1.0)
            .with_pose(hp(0), PoseSE2::new(4.0, 0.0, 0.0))
            .with_pose(hp(1), PoseSE2::new(4.0, 0.0, 0.0))
            .with_dt(ht(0), 1.0);
        assert_relative_eq!(edge.residual(&state)[0], 0.0);
    }

    #[test]
    fn test_directional_head_on_vs_tangent() {
        let edge = Edge::human_robot_directional(
            [p(0), p(1), t(0)],
            [hp(0), hp(1), ht(0)],
            0.7,
            1.0,
        );
        // straight at the human: full closing speed
        let head_on = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(1.0, 0.0, 0.0))
            .with_dt(t(0), 1.0)
            .with_pose(hp(0), PoseSE2::new(3.0, 0.0, 0.0))
            .with_pose(hp(1), PoseSE2::new(3.0, 0.0, 0.0))
            .with_dt(ht(0), 1.0);
        assert_relative_eq!(edge.residual(&head_on)[0], 1.0, epsilon = 1e-9);

        // moving perpendicular to the bearing: outside the cone
        let tangent = TestState::default()
            .with_pose(p(0), PoseSE2::new(0.0, 0.0, 0.0))
            .with_pose(p(1), PoseSE2::new(0.0, 1.0, 0.0))
            .with_dt(t(0), 1.0)
            .with_pose(hp(0), PoseSE2::new(3.0, 0.0, 0.0))
            .with_pose(hp(1), PoseSE2::new(3.0, 0.0, 0.0))
            .with_dt(ht(0), 1.0);
        assert_relative_eq!(edge.residual(&tangent)[0], 0.0);
    }

    #[test]
    fn test_vertices_order_matches_payload() {
        let edge = Edge::velocity(
            p(3),
            p(4),
            t(3),
            VelocityLimits {
                max_vel_x: 1.0,
                max_vel_x_backwards: 1.0,
                max_vel_theta: 1.0,
                epsilon: 0.1,
            },
            1.0,
            1.0,
        );
        assert_eq!(edge.vertices(), vec![p(3), p(4), t(3)]);
        assert_eq!(edge.dimension(), 2);
    }
}
