//! One-shot registry of symbolic edge and vertex type names
//!
//! Initialized exactly once per process through a one-time barrier, before
//! the first planner can observe it. Re-entrant initialization converges on
//! the same instance. The names feed cost-breakdown displays and debug
//! output.

use super::edges::EdgeFamily;
use std::sync::OnceLock;

static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

/// Symbolic names for the vertex kinds.
pub const VERTEX_TYPE_NAMES: [&str; 2] = ["VERTEX_POSE", "VERTEX_TIMEDIFF"];

/// Immutable mapping from edge families to their symbolic names.
#[derive(Debug)]
pub struct TypeRegistry {
    entries: Vec<(EdgeFamily, &'static str)>,
}

impl TypeRegistry {
    fn build() -> Self {
        let entries = vec![
            (EdgeFamily::TimeOptimal, "EDGE_TIME_OPTIMAL"),
            (EdgeFamily::Velocity, "EDGE_VELOCITY"),
            (EdgeFamily::VelocityHuman, "EDGE_VELOCITY_HUMAN"),
            (EdgeFamily::Acceleration, "EDGE_ACCELERATION"),
            (EdgeFamily::AccelerationHuman, "EDGE_ACCELERATION_HUMAN"),
            (EdgeFamily::KinematicsDiffDrive, "EDGE_KINEMATICS_DIFF_DRIVE"),
            (EdgeFamily::KinematicsCarlike, "EDGE_KINEMATICS_CARLIKE"),
            (EdgeFamily::Obstacle, "EDGE_OBSTACLE"),
            (EdgeFamily::DynamicObstacle, "EDGE_DYNAMIC_OBSTACLE"),
            (EdgeFamily::ViaPoint, "EDGE_VIA_POINT"),
            (EdgeFamily::HumanRobotSafety, "EDGE_HUMAN_ROBOT_SAFETY"),
            (EdgeFamily::HumanHumanSafety, "EDGE_HUMAN_HUMAN_SAFETY"),
            (EdgeFamily::HumanRobotTtc, "EDGE_HUMAN_ROBOT_TTC"),
            (
                EdgeFamily::HumanRobotDirectional,
                "EDGE_HUMAN_ROBOT_DIRECTIONAL",
            ),
        ];
        TypeRegistry { entries }
    }

    /// Symbolic name of an edge family.
    pub fn name(&self, family: EdgeFamily) -> &'static str {
        self.entries
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, name)| *name)
            .unwrap_or("EDGE_UNKNOWN")
    }

    /// All registered families in registration order.
    pub fn families(&self) -> impl Iterator<Item = EdgeFamily> + '_ {
        self.entries.iter().map(|(f, _)| *f)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The process-wide registry; built on first access.
pub fn global() -> &'static TypeRegistry {
    REGISTRY.get_or_init(TypeRegistry::build)
}
