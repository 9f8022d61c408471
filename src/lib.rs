//! # teb-planner
//!
//! A local trajectory optimizer for mobile robots navigating among static
//! obstacles, dynamic obstacles and co-present humans. The planner keeps one
//! timed elastic band for the robot and, optionally, one per tracked human,
//! and jointly refines them by minimizing a weighted sum of soft-constraint
//! residuals over a sparse factor graph with a Levenberg-Marquardt solver.
//!
//! ## Architecture
//!
//! - [`teb`]: the timed elastic band, a sequence of pose vertices
//!   interleaved with positive time differences, with self-resizing and
//!   warm-start pruning.
//! - [`graph`]: the transient factor graph. Vertices are non-owning handles
//!   into the bands; edges are tagged cost terms (velocity, acceleration,
//!   kinematics, obstacles, via-points, human interaction).
//! - [`optimizer`]: the Levenberg-Marquardt inner loop over one built
//!   graph, backed by a sparse Cholesky solve of the damped normal
//!   equations (faer).
//! - [`planner`]: the façade orchestrating `resize -> build -> solve ->
//!   clear` outer iterations, trajectory extraction, feasibility checking
//!   and the per-human bookkeeping.
//!
//! ## Example
//!
//! ```no_run
//! use teb_planner::config::TebConfig;
//! use teb_planner::footprint::FootprintModel;
//! use teb_planner::planner::TebPlanner;
//! use teb_planner::se2::PoseSE2;
//! use std::collections::BTreeMap;
//!
//! let mut planner = TebPlanner::new(
//!     TebConfig::default(),
//!     FootprintModel::Point,
//!     FootprintModel::Circular { radius: 0.35 },
//! );
//! let plan = vec![PoseSE2::new(0.0, 0.0, 0.0), PoseSE2::new(5.0, 0.0, 0.0)];
//! let ok = planner.plan(&plan, None, false, &BTreeMap::new()).unwrap();
//! if ok {
//!     let (v, omega) = planner.velocity_command().unwrap();
//!     println!("command: v = {v:.3} m/s, omega = {omega:.3} rad/s");
//! }
//! ```

pub mod config;
pub mod error;
pub mod footprint;
pub mod graph;
pub mod logger;
pub mod obstacles;
pub mod optimizer;
pub mod planner;
pub mod se2;
pub mod teb;

pub use config::{PlanningMode, TebConfig};
pub use error::{PlannerError, PlannerResult};
pub use footprint::{CostmapModel, FootprintModel};
pub use logger::{init_logger, init_logger_with_level};
pub use obstacles::{Obstacle, ViaPoint};
pub use planner::{HumanPlan, HumanState, TebPlanner, TrajectoryPoint, Velocity};
pub use se2::{normalize_theta, PoseSE2};
pub use teb::TimedElasticBand;
