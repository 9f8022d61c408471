use std::collections::BTreeMap;

use clap::Parser;
use nalgebra::Vector2;

use teb_planner::config::{PlanningMode, TebConfig};
use teb_planner::footprint::FootprintModel;
use teb_planner::init_logger;
use teb_planner::obstacles::Obstacle;
use teb_planner::planner::{HumanPlan, TebPlanner, Velocity};
use teb_planner::se2::PoseSE2;

#[derive(Parser)]
#[command(name = "plan_scenario")]
#[command(about = "Plan a synthetic corridor scene and print the optimized trajectory")]
struct Args {
    /// Planning mode: "robot", "human_aware" or "approach"
    #[arg(short, long, default_value = "robot")]
    mode: String,

    /// Distance from start to goal in meters
    #[arg(short, long, default_value = "5.0")]
    goal_distance: f64,

    /// Place a static obstacle next to the path midpoint
    #[arg(short, long)]
    obstacle: bool,

    /// Outer optimization iterations
    #[arg(long, default_value = "4")]
    outer_iterations: usize,

    /// Inner solver iterations per graph
    #[arg(long, default_value = "5")]
    inner_iterations: usize,

    /// Enable verbose solver output
    #[arg(short, long)]
    verbose: bool,
}

fn sampled_line(from: Vector2<f64>, to: Vector2<f64>, samples: usize) -> Vec<PoseSE2> {
    let heading = (to.y - from.y).atan2(to.x - from.x);
    (0..samples)
        .map(|i| {
            let fraction = i as f64 / (samples - 1) as f64;
            let p = from + fraction * (to - from);
            PoseSE2::new(p.x, p.y, heading)
        })
        .collect()
}

fn main() {
    init_logger();
    let args = Args::parse();

    let mut config = TebConfig::default();
    config.optim.no_outer_iterations = args.outer_iterations;
    config.optim.no_inner_iterations = args.inner_iterations;
    config.optim.optimization_verbose = args.verbose;
    config.planning_mode = match args.mode.as_str() {
        "human_aware" => PlanningMode::HumanAware,
        "approach" => PlanningMode::Approach,
        _ => PlanningMode::RobotOnly,
    };

    let mut planner = TebPlanner::new(
        config,
        FootprintModel::Point,
        FootprintModel::Circular { radius: 0.35 },
    );

    if args.obstacle {
        planner.set_obstacles(vec![Obstacle::point(args.goal_distance / 2.0, 0.15)]);
    }

    let plan = sampled_line(
        Vector2::zeros(),
        Vector2::new(args.goal_distance, 0.0),
        10,
    );

    let mut human_plans = BTreeMap::new();
    match planner.config().planning_mode {
        PlanningMode::HumanAware => {
            // one human walking the corridor in the opposite direction
            human_plans.insert(
                1,
                HumanPlan {
                    plan: sampled_line(
                        Vector2::new(args.goal_distance, 1.0),
                        Vector2::new(0.0, 1.0),
                        8,
                    ),
                    start_vel: Some(Velocity::new(1.0, 0.0)),
                    goal_vel: None,
                },
            );
        }
        PlanningMode::Approach => {
            human_plans.insert(
                1,
                HumanPlan {
                    plan: vec![PoseSE2::new(args.goal_distance, 0.5, 0.0)],
                    start_vel: None,
                    goal_vel: None,
                },
            );
        }
        PlanningMode::RobotOnly => {}
    }

    match planner.plan(&plan, Some(Velocity::new(0.0, 0.0)), false, &human_plans) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("planning returned without an optimized trajectory");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("planning failed: {e}");
            std::process::exit(1);
        }
    }

    let (v, omega) = planner.velocity_command().expect("trajectory was planned");
    println!("velocity command: v = {v:.3} m/s, omega = {omega:.3} rad/s");
    println!("total cost: {:.4}", planner.cost());

    let trajectory = planner.full_trajectory().expect("trajectory was planned");
    println!("{:<8} {:>8} {:>8} {:>8} {:>8} {:>8}", "t [s]", "x", "y", "theta", "v", "omega");
    for point in &trajectory {
        println!(
            "{:<8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3}",
            point.time_from_start,
            point.pose.x(),
            point.pose.y(),
            point.pose.theta(),
            point.velocity.linear,
            point.velocity.angular,
        );
    }

    if let Some(breakdown) = planner.cost_breakdown() {
        println!("\ncost breakdown:");
        println!("  time optimal:       {:.4}", breakdown.time_optimal);
        println!("  velocity:           {:.4}", breakdown.velocity);
        println!("  acceleration:       {:.4}", breakdown.acceleration);
        println!("  kinematics (dd):    {:.4}", breakdown.kinematics_diff_drive);
        println!("  kinematics (car):   {:.4}", breakdown.kinematics_carlike);
        println!("  obstacle:           {:.4}", breakdown.obstacle);
        println!("  dynamic obstacle:   {:.4}", breakdown.dynamic_obstacle);
        println!("  via point:          {:.4}", breakdown.via_point);
        println!("  human-robot safety: {:.4}", breakdown.human_robot_safety);
        println!("  human-human safety: {:.4}", breakdown.human_human_safety);
        println!("  human-robot ttc:    {:.4}", breakdown.human_robot_ttc);
        println!("  human-robot dir:    {:.4}", breakdown.human_robot_dir);
    }

    for &id in planner.humans().keys() {
        let human_trajectory = planner.full_human_trajectory(id);
        println!("\nhuman {id}: {} trajectory samples", human_trajectory.len());
    }
}
