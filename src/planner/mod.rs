//! Planner façade: owns the bands, drives the outer optimization loop
//!
//! The planner holds the robot band, one band per co-planned human, the
//! world inputs (obstacles, via-points) and the configuration. A planning
//! cycle runs `prepare -> (resize -> build -> solve -> clear) x N ->
//! extract`; every build is paired with a clear, including the failure
//! paths, and the graph never outlives the bands it borrows from.

use std::collections::BTreeMap;
use std::time::Instant;

use nalgebra::Vector2;
use tracing::{debug, error, info, warn};

use crate::config::{PlanningMode, TebConfig};
use crate::error::{PlannerError, PlannerResult};
use crate::footprint::{CostmapModel, FootprintModel};
use crate::graph::edges::{extract_velocity, AccelerationLimits, VelocityLimits};
use crate::graph::{registry, BandId, BandState, BandStateMut, Edge, EdgeFamily, Graph, VertexRef};
use crate::obstacles::{Obstacle, ViaPoint};
use crate::optimizer::{LevenbergMarquardt, LevenbergMarquardtConfig};
use crate::se2::{normalize_theta, PoseSE2};
use crate::teb::TimedElasticBand;

/// Planar twist: translational and angular velocity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity {
    pub linear: f64,
    pub angular: f64,
}

impl Velocity {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }

    fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.linear, self.angular)
    }
}

/// One sample of an extracted trajectory.
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryPoint {
    pub pose: PoseSE2,
    pub velocity: Velocity,
    pub time_from_start: f64,
}

/// Per-cycle input for one tracked human.
#[derive(Debug, Clone, Default)]
pub struct HumanPlan {
    pub plan: Vec<PoseSE2>,
    pub start_vel: Option<Velocity>,
    /// Accepted for interface completeness; goal velocities are never
    /// applied to humans.
    pub goal_vel: Option<Velocity>,
}

/// Everything the planner tracks per human id, mutated atomically.
#[derive(Debug, Clone, Default)]
pub struct HumanState {
    pub teb: TimedElasticBand,
    pub start_vel: Option<Velocity>,
    /// Intentionally never populated; the goal-velocity edge for humans is
    /// structurally disabled.
    pub goal_vel: Option<Velocity>,
}

/// Per-family squared-residual sums of the last solve.
#[derive(Debug, Clone, Default)]
pub struct CostBreakdown {
    pub time_optimal: f64,
    pub velocity: f64,
    pub velocity_human: f64,
    pub acceleration: f64,
    pub acceleration_human: f64,
    pub kinematics_diff_drive: f64,
    pub kinematics_carlike: f64,
    pub obstacle: f64,
    pub dynamic_obstacle: f64,
    pub via_point: f64,
    pub human_robot_safety: f64,
    pub human_human_safety: f64,
    pub human_robot_ttc: f64,
    pub human_robot_dir: f64,
    pub total: f64,
}

impl CostBreakdown {
    fn add(&mut self, family: EdgeFamily, value: f64) {
        match family {
            EdgeFamily::TimeOptimal => self.time_optimal += value,
            EdgeFamily::Velocity => self.velocity += value,
            EdgeFamily::VelocityHuman => self.velocity_human += value,
            EdgeFamily::Acceleration => self.acceleration += value,
            EdgeFamily::AccelerationHuman => self.acceleration_human += value,
            EdgeFamily::KinematicsDiffDrive => self.kinematics_diff_drive += value,
            EdgeFamily::KinematicsCarlike => self.kinematics_carlike += value,
            EdgeFamily::Obstacle => self.obstacle += value,
            EdgeFamily::DynamicObstacle => self.dynamic_obstacle += value,
            EdgeFamily::ViaPoint => self.via_point += value,
            EdgeFamily::HumanRobotSafety => self.human_robot_safety += value,
            EdgeFamily::HumanHumanSafety => self.human_human_safety += value,
            EdgeFamily::HumanRobotTtc => self.human_robot_ttc += value,
            EdgeFamily::HumanRobotDirectional => self.human_robot_dir += value,
        }
    }
}

/// Mutable view over every band the graph may reference during one solve.
struct BandSet<'a> {
    robot: &'a mut TimedElasticBand,
    humans: &'a mut BTreeMap<u64, HumanState>,
    approach: Option<PoseSE2>,
}

impl BandState for BandSet<'_> {
    fn pose(&self, vref: VertexRef) -> PoseSE2 {
        match vref.band {
            BandId::Robot => *self.robot.pose(vref.index),
            BandId::Human(id) => *self.humans[&id].teb.pose(vref.index),
            BandId::Approach => self
                .approach
                .expect("approach vertex registered without an approach pose"),
        }
    }

    fn time_diff(&self, vref: VertexRef) -> f64 {
        match vref.band {
            BandId::Robot => self.robot.time_diff(vref.index),
            BandId::Human(id) => self.humans[&id].teb.time_diff(vref.index),
            BandId::Approach => 0.0,
        }
    }
}

impl BandStateMut for BandSet<'_> {
    fn apply_pose_step(&mut self, vref: VertexRef, dx: f64, dy: f64, dtheta: f64) {
        let pose = match vref.band {
            BandId::Robot => self.robot.pose_mut(vref.index),
            BandId::Human(id) => self
                .humans
                .get_mut(&id)
                .map(|h| h.teb.pose_mut(vref.index))
                .expect("graph references a human band that no longer exists"),
            BandId::Approach => return, // the approach target is fixed
        };
        pose.plus(dx, dy, dtheta);
    }

    fn apply_time_diff_step(&mut self, vref: VertexRef, delta: f64) {
        match vref.band {
            BandId::Robot => {
                let dt = self.robot.time_diff(vref.index);
                self.robot.set_time_diff(vref.index, dt + delta);
            }
            BandId::Human(id) => {
                if let Some(human) = self.humans.get_mut(&id) {
                    let dt = human.teb.time_diff(vref.index);
                    human.teb.set_time_diff(vref.index, dt + delta);
                }
            }
            BandId::Approach => {}
        }
    }
}

/// The trajectory optimizer core.
pub struct TebPlanner {
    config: TebConfig,
    robot_model: FootprintModel,
    human_model: FootprintModel,
    robot_radius: f64,
    human_radius: f64,
    obstacles: Vec<Obstacle>,
    via_points: Vec<ViaPoint>,
    humans_via_points: BTreeMap<u64, Vec<ViaPoint>>,
    teb: TimedElasticBand,
    humans: BTreeMap<u64, HumanState>,
    approach_pose: Option<PoseSE2>,
    vel_start: (bool, Vector2<f64>),
    vel_goal: (bool, Vector2<f64>),
    graph: Graph,
    cost: f64,
    cost_breakdown: Option<CostBreakdown>,
    initialized: bool,
    optimized: bool,
}

impl Default for TebPlanner {
    fn default() -> Self {
        Self {
            config: TebConfig::default(),
            robot_model: FootprintModel::Point,
            human_model: FootprintModel::Circular { radius: 0.35 },
            robot_radius: 0.0,
            human_radius: 0.35,
            obstacles: Vec::new(),
            via_points: Vec::new(),
            humans_via_points: BTreeMap::new(),
            teb: TimedElasticBand::new(),
            humans: BTreeMap::new(),
            approach_pose: None,
            vel_start: (true, Vector2::zeros()),
            vel_goal: (true, Vector2::zeros()),
            graph: Graph::new(),
            cost: f64::INFINITY,
            cost_breakdown: None,
            initialized: false,
            optimized: false,
        }
    }
}

impl TebPlanner {
    /// Create a configured planner.
    pub fn new(config: TebConfig, robot_model: FootprintModel, human_model: FootprintModel) -> Self {
        let mut planner = Self::default();
        planner.initialize(config, robot_model, human_model);
        planner
    }

    /// Configure the planner. Must be called before any other entry point.
    pub fn initialize(
        &mut self,
        config: TebConfig,
        robot_model: FootprintModel,
        human_model: FootprintModel,
    ) {
        // the type registry is built before any planner can observe it
        let registry = registry::global();
        debug!(types = registry.len(), "edge type registry ready");

        self.robot_radius = robot_model.circumscribed_radius();
        self.human_radius = human_model.circumscribed_radius();
        self.config = config;
        self.robot_model = robot_model;
        self.human_model = human_model;
        self.cost = f64::INFINITY;
        self.vel_start = (true, Vector2::zeros());
        self.vel_goal = (true, Vector2::zeros());
        self.initialized = true;
    }

    pub fn set_obstacles(&mut self, obstacles: Vec<Obstacle>) {
        self.obstacles = obstacles;
    }

    pub fn set_via_points(&mut self, via_points: Vec<ViaPoint>) {
        self.via_points = via_points;
    }

    pub fn set_humans_via_points(&mut self, map: BTreeMap<u64, Vec<ViaPoint>>) {
        self.humans_via_points = map;
    }

    pub fn set_velocity_start(&mut self, vel: Velocity) {
        self.vel_start = (true, vel.to_vector());
    }

    pub fn set_velocity_goal(&mut self, vel: Velocity) {
        self.vel_goal = (true, vel.to_vector());
    }

    /// Let the optimizer choose the goal velocity freely.
    pub fn set_velocity_goal_free(&mut self) {
        self.vel_goal.0 = false;
    }

    pub fn config(&self) -> &TebConfig {
        &self.config
    }

    pub fn teb(&self) -> &TimedElasticBand {
        &self.teb
    }

    pub fn humans(&self) -> &BTreeMap<u64, HumanState> {
        &self.humans
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn cost_breakdown(&self) -> Option<&CostBreakdown> {
        self.cost_breakdown.as_ref()
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized
    }

    pub fn approach_pose(&self) -> Option<&PoseSE2> {
        self.approach_pose.as_ref()
    }

    /// Teardown: drop all trajectories and the approach target.
    pub fn clear_planner(&mut self) {
        self.graph.clear();
        self.teb.clear();
        self.humans.clear();
        self.approach_pose = None;
        self.optimized = false;
    }

    // -- planning entry point -------------------------------------------

    /// Run one full planning cycle: prepare the robot band (warm start or
    /// reinit), apply boundary velocities, update the human bookkeeping for
    /// the configured mode, then optimize.
    ///
    /// Returns `Ok(false)` when optimization is disabled or the solver made
    /// no progress; the previous band survives for the next warm start.
    pub fn plan(
        &mut self,
        initial_plan: &[PoseSE2],
        start_vel: Option<Velocity>,
        free_goal_vel: bool,
        human_plans: &BTreeMap<u64, HumanPlan>,
    ) -> PlannerResult<bool> {
        if !self.initialized {
            return Err(PlannerError::NotInitialized);
        }
        if initial_plan.len() < 2 {
            return Err(PlannerError::InvalidInput(format!(
                "initial plan must contain at least 2 poses, got {}",
                initial_plan.len()
            )));
        }

        let prep_start = Instant::now();
        let trajectory = &self.config.trajectory;
        if !self.teb.is_init() || self.config.optim.disable_warm_start {
            self.teb.clear();
            self.teb.init_from_plan(
                initial_plan,
                trajectory.dt_ref,
                trajectory.teb_init_skip_dist,
                trajectory.min_samples,
                true,
            )?;
        } else {
            let start = initial_plan[0];
            let goal = initial_plan[initial_plan.len() - 1];
            if self.teb.size_poses() > 0
                && (goal.position() - self.teb.back_pose().position()).norm()
                    < trajectory.force_reinit_new_goal_dist
            {
                self.teb
                    .update_and_prune(&start, &goal, trajectory.min_samples);
            } else {
                debug!(
                    "new goal is farther than the reinit threshold, reinitializing trajectory"
                );
                self.teb.clear();
                self.teb.init_from_plan(
                    initial_plan,
                    trajectory.dt_ref,
                    trajectory.teb_init_skip_dist,
                    trajectory.min_samples,
                    true,
                )?;
            }
        }

        if let Some(vel) = start_vel {
            self.set_velocity_start(vel);
        }
        if free_goal_vel {
            self.set_velocity_goal_free();
        } else {
            // reactivate the previously set goal velocity (zero unless modified)
            self.vel_goal.0 = true;
        }
        let prep_time = prep_start.elapsed();

        let human_prep_start = Instant::now();
        match self.config.planning_mode {
            PlanningMode::RobotOnly => {
                self.humans.clear();
            }
            PlanningMode::HumanAware => {
                self.prepare_human_bands(human_plans)?;
            }
            PlanningMode::Approach => {
                self.approach_pose = Some(self.select_approach_pose(initial_plan, human_plans));
            }
        }
        let human_prep_time = human_prep_start.elapsed();

        let opt_start = Instant::now();
        let result = self.optimize_teb(
            self.config.optim.no_inner_iterations,
            self.config.optim.no_outer_iterations,
            true,
            1.0,
            1.0,
            false,
        )?;
        let opt_time = opt_start.elapsed();

        let total_time = prep_start.elapsed();
        if total_time.as_secs_f64() > 0.1 {
            debug!(
                total_s = total_time.as_secs_f64(),
                preparation_s = prep_time.as_secs_f64(),
                human_preparation_s = human_prep_time.as_secs_f64(),
                optimize_s = opt_time.as_secs_f64(),
                "plan cycle timing"
            );
        }

        Ok(result)
    }

    fn prepare_human_bands(&mut self, human_plans: &BTreeMap<u64, HumanPlan>) -> PlannerResult<()> {
        // drop humans absent from the new input
        self.humans.retain(|id, _| human_plans.contains_key(id));

        let trajectory = self.config.trajectory.clone();
        let disable_warm_start = self.config.optim.disable_warm_start;

        for (&id, human_plan) in human_plans {
            if human_plan.plan.is_empty() {
                if self.humans.remove(&id).is_some() {
                    debug!(human = id, "human plan is empty, removing trajectory");
                }
                continue;
            }

            let state = self.humans.entry(id).or_default();
            if !state.teb.is_init() || disable_warm_start {
                state.teb.clear();
                state.teb.init_from_plan(
                    &human_plan.plan,
                    trajectory.dt_ref,
                    trajectory.teb_init_skip_dist,
                    trajectory.human_min_samples,
                    true,
                )?;
            } else {
                let start = human_plan.plan[0];
                let goal = human_plan.plan[human_plan.plan.len() - 1];
                if state.teb.size_poses() > 0
                    && (goal.position() - state.teb.back_pose().position()).norm()
                        < trajectory.force_reinit_new_goal_dist
                {
                    state
                        .teb
                        .update_and_prune(&start, &goal, trajectory.human_min_samples);
                } else {
                    debug!(
                        human = id,
                        "new human goal is farther than the reinit threshold, reinitializing"
                    );
                    state.teb.clear();
                    state.teb.init_from_plan(
                        &human_plan.plan,
                        trajectory.dt_ref,
                        trajectory.teb_init_skip_dist,
                        trajectory.human_min_samples,
                        true,
                    )?;
                }
            }

            state.start_vel = Some(human_plan.start_vel.unwrap_or_default());
            state.goal_vel = None;
        }
        Ok(())
    }

    fn select_approach_pose(
        &self,
        initial_plan: &[PoseSE2],
        human_plans: &BTreeMap<u64, HumanPlan>,
    ) -> PoseSE2 {
        if human_plans.len() == 1 {
            if let Some(human_plan) = human_plans.values().next() {
                if human_plan.plan.len() == 1 {
                    return human_plan.plan[0];
                }
            }
            info!("approach target pose missing, falling back to the robot pose");
        } else {
            info!("zero or multiple humans supplied for approaching, falling back to the robot pose");
        }
        initial_plan[0]
    }

    // -- outer optimization loop ----------------------------------------

    /// Run the outer loop: resize, build, solve, clear, N times. On the
    /// final iteration the cost (and its per-family breakdown) is recorded
    /// when `compute_cost` is set.
    pub fn optimize_teb(
        &mut self,
        iterations_inner: usize,
        iterations_outer: usize,
        compute_cost: bool,
        obst_cost_scale: f64,
        viapoint_cost_scale: f64,
        alternative_time_cost: bool,
    ) -> PlannerResult<bool> {
        if !self.config.optim.optimization_activate {
            warn!("optimization is deactivated by configuration");
            return Ok(false);
        }

        self.optimized = false;
        for i in 0..iterations_outer {
            if self.config.trajectory.teb_autosize {
                let trajectory = &self.config.trajectory;
                self.teb
                    .auto_resize(trajectory.dt_ref, trajectory.dt_hysteresis, trajectory.min_samples);
                for state in self.humans.values_mut() {
                    state.teb.auto_resize(
                        trajectory.dt_ref,
                        trajectory.dt_hysteresis,
                        trajectory.min_samples,
                    );
                }
            }

            if let Err(e) = self.build_graph() {
                self.graph.clear();
                return Err(e);
            }
            if !self.optimize_graph(iterations_inner)? {
                self.graph.clear();
                return Ok(false);
            }
            self.optimized = true;

            if compute_cost && i == iterations_outer - 1 {
                self.compute_current_cost(
                    obst_cost_scale,
                    viapoint_cost_scale,
                    alternative_time_cost,
                )?;
            }

            self.graph.clear();
        }

        Ok(true)
    }

    /// One inner solve over the already built graph.
    fn optimize_graph(&mut self, iterations: usize) -> PlannerResult<bool> {
        if self.config.robot.max_vel_x < 0.01 {
            warn!("optimize_graph: robot max velocity below 0.01 m/s, aborting optimization");
            return Ok(false);
        }
        if !self.teb.is_init() || self.teb.size_poses() < self.config.trajectory.min_samples {
            warn!("optimize_graph: band is empty or has too few poses, skipping optimization");
            return Ok(false);
        }

        let mut solver = LevenbergMarquardt::with_config(LevenbergMarquardtConfig {
            max_iterations: iterations,
            verbose: self.config.optim.optimization_verbose,
            ..Default::default()
        });

        let summary = {
            let mut bands = BandSet {
                robot: &mut self.teb,
                humans: &mut self.humans,
                approach: self.approach_pose,
            };
            solver.optimize(&self.graph, &mut bands)
        };

        if self.config.optim.optimization_verbose {
            debug!(%summary, "inner solve finished");
        }

        if summary.iterations == 0 {
            error!(status = %summary.status, "optimize_graph: optimization failed");
            return Ok(false);
        }
        Ok(true)
    }

    // -- graph assembly -------------------------------------------------

    fn build_graph(&mut self) -> PlannerResult<()> {
        if !self.graph.is_empty() {
            warn!("cannot build graph because it is not empty; call clear first");
            return Err(PlannerError::GraphNotEmpty);
        }

        self.add_band_vertices();

        self.add_edges_obstacles();
        self.add_edges_dynamic_obstacles();
        self.add_edges_via_points();
        self.add_edges_velocity();
        self.add_edges_acceleration();
        self.add_edges_time_optimal();

        if self.config.robot.min_turning_radius == 0.0
            || self.config.optim.weight_kinematics_turning_radius == 0.0
        {
            self.add_edges_kinematics_diff_drive();
        } else {
            self.add_edges_kinematics_carlike();
        }

        match self.config.planning_mode {
            PlanningMode::RobotOnly => {}
            PlanningMode::HumanAware => {
                self.add_edges_obstacles_for_humans();
                self.add_edges_via_points_for_humans();
                self.add_edges_velocity_for_humans();
                self.add_edges_acceleration_for_humans();
                self.add_edges_time_optimal_for_humans();
                self.add_edges_kinematics_for_humans();
                if self.config.human_aware.use_human_robot_safety_constraint {
                    self.add_edges_human_robot_safety();
                }
                if self.config.human_aware.use_human_human_safety_constraint {
                    self.add_edges_human_human_safety();
                }
                if self.config.human_aware.use_human_robot_ttc_constraint {
                    self.add_edges_human_robot_ttc();
                }
                if self.config.human_aware.use_human_robot_dir_constraint {
                    self.add_edges_human_robot_directional();
                }
            }
            PlanningMode::Approach => {
                self.add_edges_approach();
            }
        }

        Ok(())
    }

    fn add_band_vertices(&mut self) {
        for i in 0..self.teb.size_poses() {
            self.graph
                .add_vertex(VertexRef::pose(BandId::Robot, i), self.teb.is_pose_fixed(i));
            if i < self.teb.size_time_diffs() {
                self.graph
                    .add_vertex(VertexRef::time_diff(BandId::Robot, i), false);
            }
        }

        match self.config.planning_mode {
            PlanningMode::RobotOnly => {}
            PlanningMode::HumanAware => {
                for (&id, state) in &self.humans {
                    for i in 0..state.teb.size_poses() {
                        self.graph.add_vertex(
                            VertexRef::pose(BandId::Human(id), i),
                            state.teb.is_pose_fixed(i),
                        );
                        if i < state.teb.size_time_diffs() {
                            self.graph
                                .add_vertex(VertexRef::time_diff(BandId::Human(id), i), false);
                        }
                    }
                }
            }
            PlanningMode::Approach => {
                self.graph
                    .add_vertex(VertexRef::pose(BandId::Approach, 0), true);
            }
        }
    }

    /// Primary attachment index for a static obstacle on a band: the
    /// closest pose, or the middle pose when the band is shorter than the
    /// affected-poses window.
    fn obstacle_attachment_index(
        &self,
        band: &TimedElasticBand,
        obstacle: &Obstacle,
    ) -> usize {
        if self.config.obstacles.obstacle_poses_affected >= band.size_poses() {
            band.size_poses() / 2
        } else {
            band.find_closest_pose_to_obstacle(obstacle)
        }
    }

    fn add_edges_obstacles(&mut self) {
        let weight = self.config.optim.weight_obstacle;
        if weight == 0.0 || self.obstacles.is_empty() {
            return;
        }

        let n = self.teb.size_poses();
        let epsilon = self.config.optim.penalty_epsilon;
        let min_dist = self.config.obstacles.min_obstacle_dist;
        let neighbors = self.config.obstacles.obstacle_poses_affected / 2;

        for obstacle in &self.obstacles {
            if obstacle.is_dynamic() {
                continue;
            }

            let index = self.obstacle_attachment_index(&self.teb, obstacle);
            // endpoints are fixed; attaching there has no effect and skews the cost
            if index <= 1 || index > n - 2 {
                continue;
            }

            let mut attach = |idx: usize, graph: &mut Graph| {
                graph.add_edge(Edge::obstacle(
                    VertexRef::pose(BandId::Robot, idx),
                    obstacle.clone(),
                    self.robot_model,
                    min_dist,
                    epsilon,
                    weight,
                ));
            };

            attach(index, &mut self.graph);
            for k in 1..=neighbors {
                if index + k < n {
                    attach(index + k, &mut self.graph);
                }
                if index >= k {
                    attach(index - k, &mut self.graph);
                }
            }
        }
    }

    fn add_edges_obstacles_for_humans(&mut self) {
        let weight = self.config.optim.weight_obstacle;
        if weight == 0.0 || self.obstacles.is_empty() {
            return;
        }

        let epsilon = self.config.optim.penalty_epsilon;
        let min_dist = self.config.obstacles.min_obstacle_dist;
        let neighbors = self.config.obstacles.obstacle_poses_affected / 2;

        for obstacle in &self.obstacles {
            if obstacle.is_dynamic() {
                continue;
            }

            for (&id, state) in &self.humans {
                let n = state.teb.size_poses();
                let index = self.obstacle_attachment_index(&state.teb, obstacle);
                // note the asymmetry with the robot variant: the last pose is
                // accepted here
                if index <= 1 || index > n - 1 {
                    continue;
                }

                let mut attach = |idx: usize, graph: &mut Graph| {
                    graph.add_edge(Edge::obstacle(
                        VertexRef::pose(BandId::Human(id), idx),
                        obstacle.clone(),
                        self.human_model,
                        min_dist,
                        epsilon,
                        weight,
                    ));
                };

                attach(index, &mut self.graph);
                for k in 1..=neighbors {
                    if index + k < n {
                        attach(index + k, &mut self.graph);
                    }
                    if index >= k {
                        attach(index - k, &mut self.graph);
                    }
                }
            }
        }
    }

    fn add_edges_dynamic_obstacles(&mut self) {
        if self.config.optim.weight_obstacle == 0.0 || self.obstacles.is_empty() {
            return;
        }
        let weight = self.config.optim.weight_dynamic_obstacle;
        let epsilon = self.config.optim.penalty_epsilon;
        let min_dist = self.config.obstacles.min_obstacle_dist;

        let n = self.teb.size_poses();
        for obstacle in &self.obstacles {
            if !obstacle.is_dynamic() {
                continue;
            }
            for i in 1..n.saturating_sub(1) {
                self.graph.add_edge(Edge::dynamic_obstacle(
                    VertexRef::pose(BandId::Robot, i),
                    VertexRef::time_diff(BandId::Robot, i),
                    i,
                    obstacle.clone(),
                    self.robot_model,
                    min_dist,
                    epsilon,
                    weight,
                ));
            }
        }
    }

    fn add_edges_via_points(&mut self) {
        let weight = self.config.optim.weight_viapoint;
        if weight == 0.0 || self.via_points.is_empty() {
            return;
        }
        let n = self.teb.size_poses();
        if n < 3 {
            // no degrees of freedom left for reaching via-points
            return;
        }

        let mut start_pose_idx = 0;
        for via_point in &self.via_points {
            let mut index = self.teb.find_closest_pose(via_point, start_pose_idx);
            if self.config.trajectory.via_points_ordered {
                // keep one free pose between consecutive via-points
                start_pose_idx = index + 2;
            }
            index = index.clamp(1, n - 2);

            self.graph.add_edge(Edge::via_point(
                VertexRef::pose(BandId::Robot, index),
                *via_point,
                weight,
            ));
        }
    }

    fn add_edges_via_points_for_humans(&mut self) {
        let weight = self.config.optim.weight_human_viapoint;
        if weight == 0.0 || self.humans_via_points.is_empty() {
            return;
        }
        let robot_n = self.teb.size_poses();
        if robot_n < 3 {
            return;
        }

        for (&id, via_points) in &self.humans_via_points {
            let Some(state) = self.humans.get(&id) else {
                warn!(
                    human = id,
                    "inconsistent data between human bands and human via-points"
                );
                continue;
            };
            let human_n = state.teb.size_poses();

            let mut start_pose_idx = 0;
            for via_point in via_points {
                let mut index = state.teb.find_closest_pose(via_point, start_pose_idx);
                if self.config.trajectory.via_points_ordered {
                    start_pose_idx = index + 2;
                }
                index = index.min(human_n - 1).max(1);

                self.graph.add_edge(Edge::via_point(
                    VertexRef::pose(BandId::Human(id), index),
                    *via_point,
                    weight,
                ));
            }
        }
    }

    fn robot_velocity_limits(&self) -> VelocityLimits {
        VelocityLimits {
            max_vel_x: self.config.robot.max_vel_x,
            max_vel_x_backwards: self.config.robot.max_vel_x_backwards,
            max_vel_theta: self.config.robot.max_vel_theta,
            epsilon: self.config.optim.penalty_epsilon,
        }
    }

    fn human_velocity_limits(&self) -> VelocityLimits {
        VelocityLimits {
            max_vel_x: self.config.human.max_vel_x,
            max_vel_x_backwards: self.config.human.max_vel_x,
            max_vel_theta: self.config.human.max_vel_theta,
            epsilon: self.config.optim.penalty_epsilon,
        }
    }

    fn add_edges_velocity(&mut self) {
        let optim = &self.config.optim;
        if optim.weight_max_vel_x == 0.0 && optim.weight_max_vel_theta == 0.0 {
            return;
        }
        let limits = self.robot_velocity_limits();
        let w_x = optim.weight_max_vel_x;
        let w_theta = optim.weight_max_vel_theta;

        for i in 0..self.teb.size_poses().saturating_sub(1) {
            self.graph.add_edge(Edge::velocity(
                VertexRef::pose(BandId::Robot, i),
                VertexRef::pose(BandId::Robot, i + 1),
                VertexRef::time_diff(BandId::Robot, i),
                limits,
                w_x,
                w_theta,
            ));
        }
    }

    fn add_edges_velocity_for_humans(&mut self) {
        let optim = &self.config.optim;
        if optim.weight_max_human_vel_x == 0.0
            && optim.weight_max_human_vel_theta == 0.0
            && optim.weight_nominal_human_vel_x == 0.0
        {
            return;
        }
        let limits = self.human_velocity_limits();
        let nominal = self.config.human.nominal_vel_x;
        let w_x = optim.weight_max_human_vel_x;
        let w_theta = optim.weight_max_human_vel_theta;
        let w_nominal = optim.weight_nominal_human_vel_x;

        let edges: Vec<Edge> = self
            .humans
            .iter()
            .flat_map(|(&id, state)| {
                (0..state.teb.size_poses().saturating_sub(1)).map(move |i| {
                    Edge::velocity_human(
                        VertexRef::pose(BandId::Human(id), i),
                        VertexRef::pose(BandId::Human(id), i + 1),
                        VertexRef::time_diff(BandId::Human(id), i),
                        limits,
                        nominal,
                        w_x,
                        w_theta,
                        w_nominal,
                    )
                })
            })
            .collect();
        for edge in edges {
            self.graph.add_edge(edge);
        }
    }

    fn robot_acceleration_limits(&self) -> AccelerationLimits {
        AccelerationLimits {
            acc_lim_x: self.config.robot.acc_lim_x,
            acc_lim_theta: self.config.robot.acc_lim_theta,
            epsilon: self.config.optim.penalty_epsilon,
        }
    }

    fn human_acceleration_limits(&self) -> AccelerationLimits {
        AccelerationLimits {
            acc_lim_x: self.config.human.acc_lim_x,
            acc_lim_theta: self.config.human.acc_lim_theta,
            epsilon: self.config.optim.penalty_epsilon,
        }
    }

    fn add_edges_acceleration(&mut self) {
        let optim = &self.config.optim;
        if optim.weight_acc_lim_x == 0.0 && optim.weight_acc_lim_theta == 0.0 {
            return;
        }
        let n = self.teb.size_poses();
        if n < 2 {
            return;
        }
        let limits = self.robot_acceleration_limits();
        let w_x = optim.weight_acc_lim_x;
        let w_theta = optim.weight_acc_lim_theta;

        if self.vel_start.0 {
            self.graph.add_edge(Edge::acceleration_start(
                EdgeFamily::Acceleration,
                VertexRef::pose(BandId::Robot, 0),
                VertexRef::pose(BandId::Robot, 1),
                VertexRef::time_diff(BandId::Robot, 0),
                self.vel_start.1,
                limits,
                w_x,
                w_theta,
            ));
        }

        for i in 0..n.saturating_sub(2) {
            self.graph.add_edge(Edge::acceleration(
                EdgeFamily::Acceleration,
                VertexRef::pose(BandId::Robot, i),
                VertexRef::pose(BandId::Robot, i + 1),
                VertexRef::pose(BandId::Robot, i + 2),
                VertexRef::time_diff(BandId::Robot, i),
                VertexRef::time_diff(BandId::Robot, i + 1),
                limits,
                w_x,
                w_theta,
            ));
        }

        if self.vel_goal.0 {
            self.graph.add_edge(Edge::acceleration_goal(
                EdgeFamily::Acceleration,
                VertexRef::pose(BandId::Robot, n - 2),
                VertexRef::pose(BandId::Robot, n - 1),
                VertexRef::time_diff(BandId::Robot, self.teb.size_time_diffs() - 1),
                self.vel_goal.1,
                limits,
                w_x,
                w_theta,
            ));
        }
    }

    fn add_edges_acceleration_for_humans(&mut self) {
        let optim = &self.config.optim;
        if optim.weight_human_acc_lim_x == 0.0 && optim.weight_human_acc_lim_theta == 0.0 {
            return;
        }
        let limits = self.human_acceleration_limits();
        let w_x = optim.weight_human_acc_lim_x;
        let w_theta = optim.weight_human_acc_lim_theta;

        let mut edges = Vec::new();
        for (&id, state) in &self.humans {
            let n = state.teb.size_poses();
            if n < 2 {
                continue;
            }
            let band = BandId::Human(id);

            if let Some(start_vel) = state.start_vel {
                edges.push(Edge::acceleration_start(
                    EdgeFamily::AccelerationHuman,
                    VertexRef::pose(band, 0),
                    VertexRef::pose(band, 1),
                    VertexRef::time_diff(band, 0),
                    start_vel.to_vector(),
                    limits,
                    w_x,
                    w_theta,
                ));
            }

            for i in 0..n.saturating_sub(2) {
                edges.push(Edge::acceleration(
                    EdgeFamily::AccelerationHuman,
                    VertexRef::pose(band, i),
                    VertexRef::pose(band, i + 1),
                    VertexRef::pose(band, i + 2),
                    VertexRef::time_diff(band, i),
                    VertexRef::time_diff(band, i + 1),
                    limits,
                    w_x,
                    w_theta,
                ));
            }

            if let Some(goal_vel) = state.goal_vel {
                edges.push(Edge::acceleration_goal(
                    EdgeFamily::AccelerationHuman,
                    VertexRef::pose(band, n - 2),
                    VertexRef::pose(band, n - 1),
                    VertexRef::time_diff(band, state.teb.size_time_diffs() - 1),
                    goal_vel.to_vector(),
                    limits,
                    w_x,
                    w_theta,
                ));
            }
        }
        for edge in edges {
            self.graph.add_edge(edge);
        }
    }

    fn add_edges_time_optimal(&mut self) {
        let weight = self.config.optim.weight_optimaltime;
        if weight == 0.0 {
            return;
        }
        for i in 0..self.teb.size_time_diffs() {
            self.graph.add_edge(Edge::time_optimal(
                VertexRef::time_diff(BandId::Robot, i),
                weight,
            ));
        }
    }

    fn add_edges_time_optimal_for_humans(&mut self) {
        let weight = self.config.optim.weight_human_optimaltime;
        if weight == 0.0 {
            return;
        }
        let mut edges = Vec::new();
        for (&id, state) in &self.humans {
            for i in 0..state.teb.size_time_diffs() {
                edges.push(Edge::time_optimal(
                    VertexRef::time_diff(BandId::Human(id), i),
                    weight,
                ));
            }
        }
        for edge in edges {
            self.graph.add_edge(edge);
        }
    }

    fn add_edges_kinematics_diff_drive(&mut self) {
        let optim = &self.config.optim;
        if optim.weight_kinematics_nh == 0.0 && optim.weight_kinematics_forward_drive == 0.0 {
            return;
        }
        let w_nh = optim.weight_kinematics_nh;
        let w_forward = optim.weight_kinematics_forward_drive;

        for i in 0..self.teb.size_poses().saturating_sub(1) {
            self.graph.add_edge(Edge::kinematics_diff_drive(
                VertexRef::pose(BandId::Robot, i),
                VertexRef::pose(BandId::Robot, i + 1),
                w_nh,
                w_forward,
            ));
        }
    }

    fn add_edges_kinematics_carlike(&mut self) {
        let optim = &self.config.optim;
        // the legacy gate reproduces the original skip predicate, which
        // tested the turning-radius weight for truthiness instead of zero
        let skip = if optim.legacy_carlike_weight_gate {
            optim.weight_kinematics_nh == 0.0 && optim.weight_kinematics_turning_radius != 0.0
        } else {
            optim.weight_kinematics_nh == 0.0 && optim.weight_kinematics_turning_radius == 0.0
        };
        if skip {
            return;
        }
        let w_nh = optim.weight_kinematics_nh;
        let w_turn = optim.weight_kinematics_turning_radius;
        let min_radius = self.config.robot.min_turning_radius;

        for i in 0..self.teb.size_poses().saturating_sub(1) {
            self.graph.add_edge(Edge::kinematics_carlike(
                VertexRef::pose(BandId::Robot, i),
                VertexRef::pose(BandId::Robot, i + 1),
                min_radius,
                w_nh,
                w_turn,
            ));
        }
    }

    fn add_edges_kinematics_for_humans(&mut self) {
        let optim = &self.config.optim;
        if optim.weight_kinematics_nh == 0.0 && optim.weight_kinematics_forward_drive == 0.0 {
            return;
        }
        let w_nh = optim.weight_kinematics_nh;
        let w_forward = optim.weight_kinematics_forward_drive;

        let mut edges = Vec::new();
        for (&id, state) in &self.humans {
            for i in 0..state.teb.size_poses().saturating_sub(1) {
                edges.push(Edge::kinematics_diff_drive(
                    VertexRef::pose(BandId::Human(id), i),
                    VertexRef::pose(BandId::Human(id), i + 1),
                    w_nh,
                    w_forward,
                ));
            }
        }
        for edge in edges {
            self.graph.add_edge(edge);
        }
    }

    fn add_edges_human_robot_safety(&mut self) {
        let weight = self.config.optim.weight_human_robot_safety;
        if weight == 0.0 {
            return;
        }
        let min_dist = self.config.human_aware.min_human_robot_dist;
        let epsilon = self.config.optim.penalty_epsilon;
        let robot_n = self.teb.size_poses();

        let mut edges = Vec::new();
        for (&id, state) in &self.humans {
            for i in 0..state.teb.size_poses().min(robot_n) {
                edges.push(Edge::safety_clearance(
                    EdgeFamily::HumanRobotSafety,
                    VertexRef::pose(BandId::Robot, i),
                    VertexRef::pose(BandId::Human(id), i),
                    self.robot_model,
                    self.human_radius,
                    min_dist,
                    epsilon,
                    weight,
                ));
            }
        }
        for edge in edges {
            self.graph.add_edge(edge);
        }
    }

    fn add_edges_human_human_safety(&mut self) {
        let weight = self.config.optim.weight_human_human_safety;
        if weight == 0.0 {
            return;
        }
        let min_dist = self.config.human_aware.min_human_human_dist;
        let epsilon = self.config.optim.penalty_epsilon;

        let ids: Vec<u64> = self.humans.keys().copied().collect();
        let mut edges = Vec::new();
        for (a, &first) in ids.iter().enumerate() {
            for &second in &ids[a + 1..] {
                let len = self.humans[&first]
                    .teb
                    .size_poses()
                    .min(self.humans[&second].teb.size_poses());
                for k in 0..len {
                    edges.push(Edge::safety_clearance(
                        EdgeFamily::HumanHumanSafety,
                        VertexRef::pose(BandId::Human(first), k),
                        VertexRef::pose(BandId::Human(second), k),
                        self.human_model,
                        self.human_radius,
                        min_dist,
                        epsilon,
                        weight,
                    ));
                }
            }
        }
        for edge in edges {
            self.graph.add_edge(edge);
        }
    }

    fn add_edges_human_robot_ttc(&mut self) {
        let weight = self.config.optim.weight_human_robot_ttc;
        if weight == 0.0 {
            return;
        }
        let threshold = self.config.human_aware.ttc_threshold;
        let radius_sum = self.robot_radius + self.human_radius;
        let robot_n = self.teb.size_poses();

        let mut edges = Vec::new();
        for (&id, state) in &self.humans {
            let band = BandId::Human(id);
            let len = state.teb.size_poses().min(robot_n);
            for i in 0..len.saturating_sub(1) {
                edges.push(Edge::human_robot_ttc(
                    [
                        VertexRef::pose(BandId::Robot, i),
                        VertexRef::pose(BandId::Robot, i + 1),
                        VertexRef::time_diff(BandId::Robot, i),
                    ],
                    [
                        VertexRef::pose(band, i),
                        VertexRef::pose(band, i + 1),
                        VertexRef::time_diff(band, i),
                    ],
                    radius_sum,
                    threshold,
                    weight,
                ));
            }
        }
        for edge in edges {
            self.graph.add_edge(edge);
        }
    }

    fn add_edges_human_robot_directional(&mut self) {
        let weight = self.config.optim.weight_human_robot_dir;
        if weight == 0.0 {
            return;
        }
        let cone_angle = self.config.human_aware.dir_cone_angle;
        let robot_n = self.teb.size_poses();

        let mut edges = Vec::new();
        for (&id, state) in &self.humans {
            let band = BandId::Human(id);
            let len = state.teb.size_poses().min(robot_n);
            for i in 0..len.saturating_sub(1) {
                edges.push(Edge::human_robot_directional(
                    [
                        VertexRef::pose(BandId::Robot, i),
                        VertexRef::pose(BandId::Robot, i + 1),
                        VertexRef::time_diff(BandId::Robot, i),
                    ],
                    [
                        VertexRef::pose(band, i),
                        VertexRef::pose(band, i + 1),
                        VertexRef::time_diff(band, i),
                    ],
                    cone_angle,
                    weight,
                ));
            }
        }
        for edge in edges {
            self.graph.add_edge(edge);
        }
    }

    /// Approach mode reuses the human-robot safety term with the fixed
    /// approach target as the second body.
    fn add_edges_approach(&mut self) {
        if self.approach_pose.is_none() {
            error!("approach pose vertex does not exist");
            return;
        }
        let weight = self.config.optim.weight_obstacle;
        let min_dist = self.config.human_aware.min_human_robot_dist;
        let epsilon = self.config.optim.penalty_epsilon;

        for i in 0..self.teb.size_poses() {
            self.graph.add_edge(Edge::safety_clearance(
                EdgeFamily::HumanRobotSafety,
                VertexRef::pose(BandId::Robot, i),
                VertexRef::pose(BandId::Approach, 0),
                self.robot_model,
                self.human_radius,
                min_dist,
                epsilon,
                weight,
            ));
        }
    }

    // -- cost bookkeeping -----------------------------------------------

    /// Classify every edge by its family tag and accumulate squared
    /// residual sums; must run between solve and clear of the last outer
    /// iteration (a transient graph is built when none exists).
    fn compute_current_cost(
        &mut self,
        obst_cost_scale: f64,
        viapoint_cost_scale: f64,
        alternative_time_cost: bool,
    ) -> PlannerResult<()> {
        let rebuilt = if self.graph.is_empty() {
            self.build_graph()?;
            true
        } else {
            false
        };

        let mut breakdown = CostBreakdown::default();
        let mut cost = 0.0;
        if alternative_time_cost {
            // edge-based time cost depends on the sample count, which the
            // resize hysteresis changes between similar bands
            cost += self.teb.sum_of_time_diffs();
        }

        {
            let bands = BandSet {
                robot: &mut self.teb,
                humans: &mut self.humans,
                approach: self.approach_pose,
            };
            for edge in self.graph.edges() {
                let squared = edge.residual(&bands).norm_squared();
                let family = edge.family();
                breakdown.add(family, squared);
                match family {
                    EdgeFamily::TimeOptimal => {
                        if !alternative_time_cost {
                            cost += squared;
                        }
                    }
                    EdgeFamily::Obstacle | EdgeFamily::DynamicObstacle => {
                        cost += squared * obst_cost_scale;
                    }
                    EdgeFamily::ViaPoint => {
                        cost += squared * viapoint_cost_scale;
                    }
                    _ => cost += squared,
                }
            }
        }

        breakdown.total = cost;
        debug!(
            time_optimal = breakdown.time_optimal,
            velocity = breakdown.velocity,
            acceleration = breakdown.acceleration,
            obstacle = breakdown.obstacle,
            dynamic_obstacle = breakdown.dynamic_obstacle,
            via_point = breakdown.via_point,
            human_robot_safety = breakdown.human_robot_safety,
            human_human_safety = breakdown.human_human_safety,
            human_robot_ttc = breakdown.human_robot_ttc,
            human_robot_dir = breakdown.human_robot_dir,
            total = cost,
            "cost breakdown"
        );
        self.cost = cost;
        self.cost_breakdown = Some(breakdown);

        if rebuilt {
            self.graph.clear();
        }
        Ok(())
    }

    // -- extraction -----------------------------------------------------

    /// Immediate velocity command from the first two poses.
    pub fn velocity_command(&self) -> PlannerResult<(f64, f64)> {
        if self.teb.size_poses() < 2 {
            error!("velocity_command: the trajectory contains fewer than 2 poses");
            return Err(PlannerError::NoTrajectory);
        }
        let dt = self.teb.time_diff(0);
        if dt <= 0.0 {
            error!("velocity_command: non-positive first time difference");
            return Err(PlannerError::InvalidInput(
                "first time difference must be positive".to_string(),
            ));
        }
        Ok(extract_velocity(self.teb.pose(0), self.teb.pose(1), dt))
    }

    /// Velocity at every band pose: boundary velocities at the endpoints,
    /// finite differences in between.
    pub fn velocity_profile(&self) -> Vec<Velocity> {
        let n = self.teb.size_poses();
        let mut profile = Vec::with_capacity(n + 1);
        profile.push(Velocity::new(self.vel_start.1.x, self.vel_start.1.y));
        for i in 1..n {
            let (v, omega) = extract_velocity(
                self.teb.pose(i - 1),
                self.teb.pose(i),
                self.teb.time_diff(i - 1),
            );
            profile.push(Velocity::new(v, omega));
        }
        profile.push(Velocity::new(self.vel_goal.1.x, self.vel_goal.1.y));
        profile
    }

    /// One sample per pose with cumulative time; interior velocities are the
    /// mean of the backward and forward finite differences.
    pub fn full_trajectory(&self) -> PlannerResult<Vec<TrajectoryPoint>> {
        let n = self.teb.size_poses();
        if n < 2 {
            return Err(PlannerError::NoTrajectory);
        }

        let mut trajectory = Vec::with_capacity(n);
        let mut current_time = 0.0;

        trajectory.push(TrajectoryPoint {
            pose: *self.teb.pose(0),
            velocity: Velocity::new(self.vel_start.1.x, self.vel_start.1.y),
            time_from_start: current_time,
        });
        current_time += self.teb.time_diff(0);

        for i in 1..n - 1 {
            let (v1, omega1) = extract_velocity(
                self.teb.pose(i - 1),
                self.teb.pose(i),
                self.teb.time_diff(i - 1),
            );
            let (v2, omega2) =
                extract_velocity(self.teb.pose(i), self.teb.pose(i + 1), self.teb.time_diff(i));
            trajectory.push(TrajectoryPoint {
                pose: *self.teb.pose(i),
                velocity: Velocity::new(0.5 * (v1 + v2), 0.5 * (omega1 + omega2)),
                time_from_start: current_time,
            });
            current_time += self.teb.time_diff(i);
        }

        trajectory.push(TrajectoryPoint {
            pose: *self.teb.back_pose(),
            velocity: Velocity::new(self.vel_goal.1.x, self.vel_goal.1.y),
            time_from_start: current_time,
        });

        Ok(trajectory)
    }

    /// Trajectory of one co-planned human; empty when the id is unknown or
    /// the band is too short.
    pub fn full_human_trajectory(&self, human_id: u64) -> Vec<TrajectoryPoint> {
        let Some(state) = self.humans.get(&human_id) else {
            warn!(human = human_id, "no band for the requested human");
            return Vec::new();
        };
        let n = state.teb.size_poses();
        if n < 3 {
            warn!(human = human_id, poses = n, "human band too short to extract");
            return Vec::new();
        }

        let start_vel = state.start_vel.unwrap_or_default();
        let goal_vel = state.goal_vel.unwrap_or_default();
        let band = &state.teb;

        let mut trajectory = Vec::with_capacity(n);
        let mut current_time = 0.0;

        trajectory.push(TrajectoryPoint {
            pose: *band.pose(0),
            velocity: start_vel,
            time_from_start: current_time,
        });
        current_time += band.time_diff(0);

        for i in 1..n - 1 {
            let (v1, omega1) =
                extract_velocity(band.pose(i - 1), band.pose(i), band.time_diff(i - 1));
            let (v2, omega2) = extract_velocity(band.pose(i), band.pose(i + 1), band.time_diff(i));
            trajectory.push(TrajectoryPoint {
                pose: *band.pose(i),
                velocity: Velocity::new(0.5 * (v1 + v2), 0.5 * (omega1 + omega2)),
                time_from_start: current_time,
            });
            current_time += band.time_diff(i);
        }

        trajectory.push(TrajectoryPoint {
            pose: *band.back_pose(),
            velocity: goal_vel,
            time_from_start: current_time,
        });

        trajectory
    }

    // -- feasibility and horizon heuristics -----------------------------

    /// Check the band against the cost-map up to `look_ahead` poses,
    /// re-checking interpolated midpoints wherever consecutive poses are
    /// farther apart than the inscribed radius.
    pub fn is_trajectory_feasible(
        &self,
        costmap_model: &dyn CostmapModel,
        footprint: &[Vector2<f64>],
        inscribed_radius: f64,
        circumscribed_radius: f64,
        look_ahead: Option<usize>,
    ) -> bool {
        let n = self.teb.size_poses();
        if n == 0 {
            return false;
        }
        let look_ahead = look_ahead.unwrap_or(n - 1).min(n - 1);

        for i in 0..=look_ahead {
            let pose = self.teb.pose(i);
            if costmap_model.footprint_cost(
                pose.x(),
                pose.y(),
                pose.theta(),
                footprint,
                inscribed_radius,
                circumscribed_radius,
            ) < 0.0
            {
                return false;
            }

            // obstacles can push two consecutive poses apart until the gap
            // between them covers the obstacle itself
            if i < look_ahead {
                let next = self.teb.pose(i + 1);
                if (next.position() - pose.position()).norm() > inscribed_radius {
                    let center = PoseSE2::average(pose, next);
                    if costmap_model.footprint_cost(
                        center.x(),
                        center.y(),
                        center.theta(),
                        footprint,
                        inscribed_radius,
                        circumscribed_radius,
                    ) < 0.0
                    {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Heuristic: should the caller shrink the planning horizon?
    pub fn is_horizon_reduction_appropriate(&self, initial_plan: &[PoseSE2]) -> bool {
        let n = self.teb.size_poses();
        if (n as f64) < 1.5 * self.config.trajectory.min_samples as f64 {
            // trajectory is short already
            return false;
        }

        let mut dist = 0.0;
        for i in 1..n {
            dist += (self.teb.pose(i).position() - self.teb.pose(i - 1).position()).norm();
            if dist > 2.0 {
                break;
            }
        }
        if dist <= 2.0 {
            return false;
        }

        if normalize_theta(self.teb.pose(0).theta() - self.teb.back_pose().theta()).abs()
            > std::f64::consts::FRAC_PI_2
        {
            debug!("horizon reduction: goal orientation differs from start by more than 90 deg");
            return true;
        }

        if self
            .teb
            .pose(0)
            .orientation_unit_vec()
            .dot(&(self.teb.back_pose().position() - self.teb.pose(0).position()))
            < 0.0
        {
            debug!("horizon reduction: goal lies behind the start heading");
            return true;
        }

        // find the plan pose matching the band start before measuring the
        // remaining reference length
        // TODO: the scan below stops at the first pose with any nonzero
        // offset from the band start; review whether it should seek the
        // closest pose instead
        let mut idx = 0;
        while idx < initial_plan.len() {
            let offset = ((initial_plan[idx].x() - self.teb.pose(0).x()).powi(2)
                + (initial_plan[idx].y() - self.teb.pose(0).y()).powi(2))
            .sqrt();
            if offset != 0.0 {
                break;
            }
            idx += 1;
        }

        let mut ref_path_length = 0.0;
        while idx + 1 < initial_plan.len() {
            ref_path_length +=
                (initial_plan[idx + 1].position() - initial_plan[idx].position()).norm();
            idx += 1;
        }

        let mut teb_length = 0.0;
        for i in 1..n {
            let segment =
                (self.teb.pose(i).position() - self.teb.pose(i - 1).position()).norm();
            if segment > 0.95 * self.config.obstacles.min_obstacle_dist {
                debug!("horizon reduction: consecutive poses further apart than 0.95 * min_obstacle_dist");
                return true;
            }
            teb_length += segment;
        }
        if ref_path_length > 0.0 && teb_length / ref_path_length < 0.7 {
            debug!("horizon reduction: band is at least 30% shorter than the initial plan");
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;
    use approx::assert_relative_eq;

    fn straight_plan(n: usize, spacing: f64) -> Vec<PoseSE2> {
        (0..n)
            .map(|i| PoseSE2::new(i as f64 * spacing, 0.0, 0.0))
            .collect()
    }

    fn planner() -> TebPlanner {
        TebPlanner::new(
            TebConfig::default(),
            FootprintModel::Point,
            FootprintModel::Circular { radius: 0.35 },
        )
    }

    #[test]
    fn test_uninitialized_planner_rejects_plan() {
        let mut planner = TebPlanner::default();
        let result = planner.plan(&straight_plan(2, 1.0), None, true, &BTreeMap::new());
        assert!(matches!(result, Err(PlannerError::NotInitialized)));
    }

    #[test]
    fn test_plan_rejects_short_input() {
        let mut planner = planner();
        let result = planner.plan(&straight_plan(1, 1.0), None, true, &BTreeMap::new());
        assert!(matches!(result, Err(PlannerError::InvalidInput(_))));
    }

    #[test]
    fn test_build_clear_leaves_band_untouched() {
        let mut planner = planner();
        planner
            .teb
            .init_from_plan(&straight_plan(10, 0.5), 0.3, 0.0, 5, true)
            .unwrap();
        let poses_before = planner.teb.size_poses();
        let dts_before = planner.teb.size_time_diffs();

        planner.build_graph().unwrap();
        assert!(planner.graph.num_edges() > 0);
        assert!(planner.graph.num_vertices() > 0);
        planner.graph.clear();

        assert!(planner.graph.is_empty());
        assert_eq!(planner.teb.size_poses(), poses_before);
        assert_eq!(planner.teb.size_time_diffs(), dts_before);
    }

    #[test]
    fn test_double_build_fails_with_graph_not_empty() {
        let mut planner = planner();
        planner
            .teb
            .init_from_plan(&straight_plan(10, 0.5), 0.3, 0.0, 5, true)
            .unwrap();
        planner.build_graph().unwrap();
        assert!(matches!(
            planner.build_graph(),
            Err(PlannerError::GraphNotEmpty)
        ));
        planner.graph.clear();
    }

    #[test]
    fn test_obstacle_attachment_indices() {
        let mut planner = planner();
        planner.config.obstacles.obstacle_poses_affected = 3;
        // plan of 10 poses, obstacle closest to pose 5
        planner
            .teb
            .init_from_plan(&straight_plan(10, 0.5), 0.3, 0.0, 10, true)
            .unwrap();
        assert_eq!(planner.teb.size_poses(), 10);
        planner.set_obstacles(vec![Obstacle::point(2.5, 0.4)]);

        planner.build_graph().unwrap();
        let mut indices: Vec<usize> = planner
            .graph
            .edges()
            .iter()
            .filter_map(|edge| match edge.kind() {
                EdgeKind::Obstacle { pose, .. } => Some(pose.index),
                _ => None,
            })
            .collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices, vec![4, 5, 6]);
        planner.graph.clear();
    }

    #[test]
    fn test_obstacle_near_endpoint_is_skipped() {
        let mut planner = planner();
        planner.config.obstacles.obstacle_poses_affected = 3;
        planner
            .teb
            .init_from_plan(&straight_plan(10, 0.5), 0.3, 0.0, 10, true)
            .unwrap();
        // closest to pose 0, inside the rejected range
        planner.set_obstacles(vec![Obstacle::point(0.0, 0.3)]);

        planner.build_graph().unwrap();
        let obstacle_edges = planner
            .graph
            .edges()
            .iter()
            .filter(|edge| edge.family() == EdgeFamily::Obstacle)
            .count();
        assert_eq!(obstacle_edges, 0);
        planner.graph.clear();
    }

    #[test]
    fn test_kinematics_family_follows_turning_radius() {
        let mut planner = planner();
        planner
            .teb
            .init_from_plan(&straight_plan(10, 0.5), 0.3, 0.0, 5, true)
            .unwrap();

        planner.build_graph().unwrap();
        assert!(planner
            .graph
            .edges()
            .iter()
            .any(|e| e.family() == EdgeFamily::KinematicsDiffDrive));
        assert!(!planner
            .graph
            .edges()
            .iter()
            .any(|e| e.family() == EdgeFamily::KinematicsCarlike));
        planner.graph.clear();

        planner.config.robot.min_turning_radius = 0.5;
        planner.build_graph().unwrap();
        assert!(planner
            .graph
            .edges()
            .iter()
            .any(|e| e.family() == EdgeFamily::KinematicsCarlike));
        planner.graph.clear();
    }

    #[test]
    fn test_legacy_carlike_gate_skips_family() {
        // the preserved predicate skips the car-like family when the
        // nonholonomic weight is zero and the turning-radius weight is not
        let mut planner = planner();
        planner.config.robot.min_turning_radius = 0.5;
        planner.config.optim.weight_kinematics_nh = 0.0;
        planner
            .teb
            .init_from_plan(&straight_plan(10, 0.5), 0.3, 0.0, 5, true)
            .unwrap();

        planner.build_graph().unwrap();
        assert!(!planner
            .graph
            .edges()
            .iter()
            .any(|e| e.family() == EdgeFamily::KinematicsCarlike));
        planner.graph.clear();

        planner.config.optim.legacy_carlike_weight_gate = false;
        planner.build_graph().unwrap();
        assert!(planner
            .graph
            .edges()
            .iter()
            .any(|e| e.family() == EdgeFamily::KinematicsCarlike));
        planner.graph.clear();
    }

    #[test]
    fn test_disabled_optimization_returns_false() {
        let mut planner = planner();
        planner.config.optim.optimization_activate = false;
        let plan = straight_plan(2, 5.0);
        let result = planner.plan(&plan, None, true, &BTreeMap::new()).unwrap();
        assert!(!result);
        assert!(!planner.is_optimized());
    }

    #[test]
    fn test_human_bands_created_and_removed() {
        let mut planner = planner();
        planner.config.planning_mode = PlanningMode::HumanAware;
        let plan = straight_plan(6, 1.0);

        let mut cycle_one = BTreeMap::new();
        cycle_one.insert(
            7,
            HumanPlan {
                plan: straight_plan(5, 0.8),
                start_vel: Some(Velocity::new(0.5, 0.0)),
                goal_vel: None,
            },
        );
        cycle_one.insert(
            9,
            HumanPlan {
                plan: straight_plan(5, 0.8),
                start_vel: None,
                goal_vel: None,
            },
        );
        planner.plan(&plan, None, true, &cycle_one).unwrap();
        assert!(planner.humans().contains_key(&7));
        assert!(planner.humans().contains_key(&9));
        // supplied start velocity recorded, goal velocity never set
        assert_eq!(
            planner.humans()[&7].start_vel,
            Some(Velocity::new(0.5, 0.0))
        );
        assert!(planner.humans()[&7].goal_vel.is_none());

        let mut cycle_two = BTreeMap::new();
        cycle_two.insert(
            9,
            HumanPlan {
                plan: straight_plan(5, 0.8),
                start_vel: None,
                goal_vel: None,
            },
        );
        planner.plan(&plan, None, true, &cycle_two).unwrap();
        assert!(!planner.humans().contains_key(&7));
        assert!(planner.humans().contains_key(&9));
    }

    #[test]
    fn test_empty_human_plan_removes_band() {
        let mut planner = planner();
        planner.config.planning_mode = PlanningMode::HumanAware;
        let plan = straight_plan(6, 1.0);

        let mut cycle_one = BTreeMap::new();
        cycle_one.insert(
            3,
            HumanPlan {
                plan: straight_plan(5, 0.8),
                start_vel: None,
                goal_vel: None,
            },
        );
        planner.plan(&plan, None, true, &cycle_one).unwrap();
        assert!(planner.humans().contains_key(&3));

        let mut cycle_two = BTreeMap::new();
        cycle_two.insert(3, HumanPlan::default());
        planner.plan(&plan, None, true, &cycle_two).unwrap();
        assert!(!planner.humans().contains_key(&3));
    }

    #[test]
    fn test_robot_only_mode_clears_humans() {
        let mut planner = planner();
        planner.config.planning_mode = PlanningMode::HumanAware;
        let plan = straight_plan(6, 1.0);
        let mut humans = BTreeMap::new();
        humans.insert(
            1,
            HumanPlan {
                plan: straight_plan(5, 0.8),
                start_vel: None,
                goal_vel: None,
            },
        );
        planner.plan(&plan, None, true, &humans).unwrap();
        assert_eq!(planner.humans().len(), 1);

        planner.config.planning_mode = PlanningMode::RobotOnly;
        planner.plan(&plan, None, true, &BTreeMap::new()).unwrap();
        assert!(planner.humans().is_empty());
    }

    #[test]
    fn test_velocity_command_requires_trajectory() {
        let planner = planner();
        assert!(matches!(
            planner.velocity_command(),
            Err(PlannerError::NoTrajectory)
        ));
    }

    #[test]
    fn test_velocity_command_finite() {
        let mut planner = planner();
        planner
            .teb
            .init_from_plan(&straight_plan(10, 0.5), 0.3, 0.0, 5, true)
            .unwrap();
        let (v, omega) = planner.velocity_command().unwrap();
        assert!(v.is_finite());
        assert!(omega.is_finite());
        assert!(v > 0.0);
    }

    #[test]
    fn test_full_trajectory_endpoints_match_band() {
        let mut planner = planner();
        planner
            .teb
            .init_from_plan(&straight_plan(10, 0.5), 0.3, 0.0, 5, true)
            .unwrap();
        let trajectory = planner.full_trajectory().unwrap();
        assert_eq!(trajectory.len(), planner.teb.size_poses());
        assert_relative_eq!(trajectory[0].pose.x(), 0.0);
        assert_relative_eq!(trajectory.last().unwrap().pose.x(), 4.5);
        assert_relative_eq!(trajectory[0].time_from_start, 0.0);
        assert_relative_eq!(
            trajectory.last().unwrap().time_from_start,
            planner.teb.sum_of_time_diffs(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_feasibility_with_free_and_blocked_costmap() {
        struct ConstCostmap(f64);
        impl CostmapModel for ConstCostmap {
            fn footprint_cost(
                &self,
                _x: f64,
                _y: f64,
                _theta: f64,
                _footprint: &[Vector2<f64>],
                _inscribed: f64,
                _circumscribed: f64,
            ) -> f64 {
                self.0
            }
        }

        let mut planner = planner();
        planner
            .teb
            .init_from_plan(&straight_plan(10, 0.5), 0.3, 0.0, 5, true)
            .unwrap();
        let footprint = [Vector2::new(0.1, 0.1)];
        assert!(planner.is_trajectory_feasible(&ConstCostmap(1.0), &footprint, 0.2, 0.3, None));
        assert!(!planner.is_trajectory_feasible(&ConstCostmap(-1.0), &footprint, 0.2, 0.3, None));
    }

    #[test]
    fn test_horizon_reduction_short_band() {
        let mut planner = planner();
        planner
            .teb
            .init_from_start_goal(PoseSE2::new(0.0, 0.0, 0.0), PoseSE2::new(0.5, 0.0, 0.0), 3)
            .unwrap();
        assert!(!planner.is_horizon_reduction_appropriate(&straight_plan(5, 0.2)));
    }

    #[test]
    fn test_horizon_reduction_goal_behind_start() {
        let mut planner = planner();
        // long band heading +x whose goal sits behind the start orientation
        let mut plan = Vec::new();
        for i in 0..30 {
            plan.push(PoseSE2::new(-(i as f64) * 0.2, 0.0, 0.0));
        }
        planner.teb.init_from_plan(&plan, 0.3, 0.0, 5, false).unwrap();
        assert!(planner.is_horizon_reduction_appropriate(&plan));
    }

    #[test]
    fn test_clear_planner_drops_state() {
        let mut planner = planner();
        planner
            .teb
            .init_from_plan(&straight_plan(10, 0.5), 0.3, 0.0, 5, true)
            .unwrap();
        planner.clear_planner();
        assert!(!planner.teb().is_init());
        assert!(planner.humans().is_empty());
        assert!(planner.approach_pose().is_none());
    }
}
