//! Planner configuration sections.
//!
//! Plain-data structs with serde support so deployments can load them from
//! TOML/YAML through whatever glue hosts the planner; the crate itself does
//! no file I/O. All weights are non-negative and a weight of zero disables
//! the corresponding edge family.

use serde::{Deserialize, Serialize};

/// Which agents are co-optimized during a planning cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanningMode {
    /// Plan for the robot alone; all human bands are discarded.
    #[default]
    RobotOnly,
    /// Jointly refine the robot band and one band per tracked human.
    HumanAware,
    /// Approach a single human; the target pose enters the graph as a fixed vertex.
    Approach,
}

/// Top-level planner configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TebConfig {
    #[serde(default)]
    pub trajectory: TrajectorySection,
    #[serde(default)]
    pub robot: RobotSection,
    #[serde(default)]
    pub human: HumanSection,
    #[serde(default)]
    pub obstacles: ObstacleSection,
    #[serde(default)]
    pub human_aware: HumanAwareSection,
    #[serde(default)]
    pub optim: OptimizationSection,
    #[serde(default)]
    pub planning_mode: PlanningMode,
}

/// Trajectory discretization and warm-start settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrajectorySection {
    /// Desired temporal resolution of the band (seconds)
    pub dt_ref: f64,
    /// Hysteresis around `dt_ref` before the band resizes
    pub dt_hysteresis: f64,
    /// Minimum number of robot band poses
    pub min_samples: usize,
    /// Minimum number of poses per human band
    pub human_min_samples: usize,
    /// Waypoints closer than this to the previous kept one are skipped at init (meters)
    pub teb_init_skip_dist: f64,
    /// Goals farther than this from the current band end force a reinit (meters)
    pub force_reinit_new_goal_dist: f64,
    /// Run auto-resize on every outer iteration
    pub teb_autosize: bool,
    /// Treat via-points as ordered along the trajectory
    pub via_points_ordered: bool,
    /// Publish per-cycle feedback through the hosting middleware
    pub publish_feedback: bool,
}

impl Default for TrajectorySection {
    fn default() -> Self {
        Self {
            dt_ref: 0.3,
            dt_hysteresis: 0.1,
            min_samples: 3,
            human_min_samples: 3,
            teb_init_skip_dist: 0.4,
            force_reinit_new_goal_dist: 1.0,
            teb_autosize: true,
            via_points_ordered: false,
            publish_feedback: false,
        }
    }
}

/// Robot kinodynamic limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RobotSection {
    /// Maximum forward translational velocity (m/s)
    pub max_vel_x: f64,
    /// Maximum backward translational velocity (m/s, absolute value)
    pub max_vel_x_backwards: f64,
    /// Maximum angular velocity (rad/s)
    pub max_vel_theta: f64,
    /// Maximum translational acceleration (m/s^2)
    pub acc_lim_x: f64,
    /// Maximum angular acceleration (rad/s^2)
    pub acc_lim_theta: f64,
    /// Minimum turning radius; zero selects the differential-drive kinematics family
    pub min_turning_radius: f64,
}

impl Default for RobotSection {
    fn default() -> Self {
        Self {
            max_vel_x: 0.4,
            max_vel_x_backwards: 0.2,
            max_vel_theta: 0.3,
            acc_lim_x: 0.5,
            acc_lim_theta: 0.5,
            min_turning_radius: 0.0,
        }
    }
}

/// Limits and nominal values used by the human edge variants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HumanSection {
    /// Maximum human translational velocity (m/s)
    pub max_vel_x: f64,
    /// Maximum human angular velocity (rad/s)
    pub max_vel_theta: f64,
    /// Maximum human translational acceleration (m/s^2)
    pub acc_lim_x: f64,
    /// Maximum human angular acceleration (rad/s^2)
    pub acc_lim_theta: f64,
    /// Preferred human walking speed; deviation is penalized (m/s)
    pub nominal_vel_x: f64,
    /// Radius of the circular human body model (meters)
    pub radius: f64,
}

impl Default for HumanSection {
    fn default() -> Self {
        Self {
            max_vel_x: 1.3,
            max_vel_theta: 1.1,
            acc_lim_x: 0.6,
            acc_lim_theta: 0.8,
            nominal_vel_x: 1.0,
            radius: 0.35,
        }
    }
}

/// Obstacle avoidance settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObstacleSection {
    /// Required clearance between footprint and obstacles (meters)
    pub min_obstacle_dist: f64,
    /// Number of band poses an obstacle term may attach to
    pub obstacle_poses_affected: usize,
}

impl Default for ObstacleSection {
    fn default() -> Self {
        Self {
            min_obstacle_dist: 0.5,
            obstacle_poses_affected: 30,
        }
    }
}

/// Human-aware interaction constraints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HumanAwareSection {
    /// Required clearance between robot and human bodies (meters)
    pub min_human_robot_dist: f64,
    /// Required clearance between two human bodies (meters)
    pub min_human_human_dist: f64,
    /// Time-to-collision values below this are penalized (seconds)
    pub ttc_threshold: f64,
    /// Half-angle of the head-on approach cone (radians)
    pub dir_cone_angle: f64,
    /// Enable the human-robot proximity family
    pub use_human_robot_safety_constraint: bool,
    /// Enable the human-human proximity family
    pub use_human_human_safety_constraint: bool,
    /// Enable the time-to-collision family
    pub use_human_robot_ttc_constraint: bool,
    /// Enable the directional-approach family
    pub use_human_robot_dir_constraint: bool,
}

impl Default for HumanAwareSection {
    fn default() -> Self {
        Self {
            min_human_robot_dist: 0.6,
            min_human_human_dist: 0.4,
            ttc_threshold: 5.0,
            dir_cone_angle: 0.7,
            use_human_robot_safety_constraint: true,
            use_human_human_safety_constraint: true,
            use_human_robot_ttc_constraint: true,
            use_human_robot_dir_constraint: true,
        }
    }
}

/// Solver iteration counts and per-family weights.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizationSection {
    /// Levenberg-Marquardt iterations per graph
    pub no_inner_iterations: usize,
    /// Rebuild-and-solve cycles per planning call
    pub no_outer_iterations: usize,
    /// Master switch; when false every plan call returns false immediately
    pub optimization_activate: bool,
    /// Verbose solver output
    pub optimization_verbose: bool,
    /// Reinitialize the band on every cycle instead of warm starting
    pub disable_warm_start: bool,
    /// Safety margin added inside one-sided bound penalties
    pub penalty_epsilon: f64,
    /// Preserve the original gate for the car-like kinematics family: skip it
    /// when the nonholonomic weight is zero and the turning-radius weight is
    /// nonzero. Disabling the flag skips only when both weights are zero.
    pub legacy_carlike_weight_gate: bool,

    pub weight_max_vel_x: f64,
    pub weight_max_vel_theta: f64,
    pub weight_acc_lim_x: f64,
    pub weight_acc_lim_theta: f64,
    pub weight_kinematics_nh: f64,
    pub weight_kinematics_forward_drive: f64,
    pub weight_kinematics_turning_radius: f64,
    pub weight_optimaltime: f64,
    pub weight_obstacle: f64,
    pub weight_dynamic_obstacle: f64,
    pub weight_viapoint: f64,

    pub weight_max_human_vel_x: f64,
    pub weight_max_human_vel_theta: f64,
    pub weight_nominal_human_vel_x: f64,
    pub weight_human_acc_lim_x: f64,
    pub weight_human_acc_lim_theta: f64,
    pub weight_human_optimaltime: f64,
    pub weight_human_viapoint: f64,

    pub weight_human_robot_safety: f64,
    pub weight_human_human_safety: f64,
    pub weight_human_robot_ttc: f64,
    pub weight_human_robot_dir: f64,
}

impl Default for OptimizationSection {
    fn default() -> Self {
        Self {
            no_inner_iterations: 5,
            no_outer_iterations: 4,
            optimization_activate: true,
            optimization_verbose: false,
            disable_warm_start: false,
            penalty_epsilon: 0.1,
            legacy_carlike_weight_gate: true,
            weight_max_vel_x: 2.0,
            weight_max_vel_theta: 1.0,
            weight_acc_lim_x: 1.0,
            weight_acc_lim_theta: 1.0,
            weight_kinematics_nh: 1000.0,
            weight_kinematics_forward_drive: 1.0,
            weight_kinematics_turning_radius: 1.0,
            weight_optimaltime: 1.0,
            weight_obstacle: 50.0,
            weight_dynamic_obstacle: 50.0,
            weight_viapoint: 1.0,
            weight_max_human_vel_x: 2.0,
            weight_max_human_vel_theta: 2.0,
            weight_nominal_human_vel_x: 2.0,
            weight_human_acc_lim_x: 2.0,
            weight_human_acc_lim_theta: 2.0,
            weight_human_optimaltime: 1.0,
            weight_human_viapoint: 1.0,
            weight_human_robot_safety: 2.0,
            weight_human_human_safety: 2.0,
            weight_human_robot_ttc: 1.0,
            weight_human_robot_dir: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = TebConfig::default();
        assert!(cfg.trajectory.dt_ref > cfg.trajectory.dt_hysteresis);
        assert!(cfg.trajectory.min_samples >= 3);
        assert!(cfg.robot.max_vel_x > 0.01);
        assert_eq!(cfg.planning_mode, PlanningMode::RobotOnly);
        assert!(cfg.optim.optimization_activate);
    }

    #[test]
    fn test_human_limits_independent_of_robot() {
        let cfg = TebConfig::default();
        assert!(cfg.human.max_vel_x > cfg.robot.max_vel_x);
        assert!(cfg.human.radius > 0.0);
    }
}
