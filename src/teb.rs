//! Timed elastic band: the time-parameterized trajectory under optimization
//!
//! A band is an ordered sequence of pose vertices interleaved with positive
//! time-difference vertices: `P0, dt0, P1, dt1, ..., dt(n-2), P(n-1)`.
//! Whenever the band is non-empty, `|time_diffs| == |poses| - 1` and every
//! time difference is strictly positive. Start and goal poses are fixed;
//! interior poses and all time differences are free decision variables.

use crate::error::{PlannerError, PlannerResult};
use crate::obstacles::Obstacle;
use crate::se2::PoseSE2;
use nalgebra::Vector2;

/// Hard floor for time differences; enforced on every mutation so the
/// velocity and acceleration residuals never divide by zero.
pub const MIN_TIME_DIFF: f64 = 1e-3;

/// A pose decision variable with its fixed flag.
#[derive(Debug, Clone, Copy)]
pub struct VertexPose {
    pub pose: PoseSE2,
    pub fixed: bool,
}

impl VertexPose {
    pub fn new(pose: PoseSE2, fixed: bool) -> Self {
        Self { pose, fixed }
    }
}

/// A time-difference decision variable. The stored value never drops below
/// [`MIN_TIME_DIFF`].
#[derive(Debug, Clone, Copy)]
pub struct VertexTimeDiff {
    dt: f64,
}

impl VertexTimeDiff {
    pub fn new(dt: f64) -> Self {
        Self {
            dt: dt.max(MIN_TIME_DIFF),
        }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn set_dt(&mut self, dt: f64) {
        self.dt = dt.max(MIN_TIME_DIFF);
    }
}

/// The timed elastic band.
#[derive(Debug, Clone, Default)]
pub struct TimedElasticBand {
    poses: Vec<VertexPose>,
    time_diffs: Vec<VertexTimeDiff>,
}

impl TimedElasticBand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the band has been initialized with a trajectory.
    pub fn is_init(&self) -> bool {
        !self.poses.is_empty()
    }

    pub fn size_poses(&self) -> usize {
        self.poses.len()
    }

    pub fn size_time_diffs(&self) -> usize {
        self.time_diffs.len()
    }

    pub fn pose(&self, index: usize) -> &PoseSE2 {
        &self.poses[index].pose
    }

    pub fn pose_mut(&mut self, index: usize) -> &mut PoseSE2 {
        &mut self.poses[index].pose
    }

    pub fn pose_vertex(&self, index: usize) -> &VertexPose {
        &self.poses[index]
    }

    pub fn is_pose_fixed(&self, index: usize) -> bool {
        self.poses[index].fixed
    }

    pub fn set_pose_fixed(&mut self, index: usize, fixed: bool) {
        self.poses[index].fixed = fixed;
    }

    pub fn time_diff(&self, index: usize) -> f64 {
        self.time_diffs[index].dt()
    }

    pub fn set_time_diff(&mut self, index: usize, dt: f64) {
        self.time_diffs[index].set_dt(dt);
    }

    pub fn front_pose(&self) -> &PoseSE2 {
        &self.poses[0].pose
    }

    pub fn back_pose(&self) -> &PoseSE2 {
        &self.poses[self.poses.len() - 1].pose
    }

    pub fn poses(&self) -> impl Iterator<Item = &VertexPose> {
        self.poses.iter()
    }

    /// Total trajectory duration.
    pub fn sum_of_time_diffs(&self) -> f64 {
        self.time_diffs.iter().map(|td| td.dt()).sum()
    }

    /// Polyline length of the band.
    pub fn length(&self) -> f64 {
        let mut total = 0.0;
        for i in 1..self.poses.len() {
            total += (self.poses[i].pose.position() - self.poses[i - 1].pose.position()).norm();
        }
        total
    }

    /// Drop the whole trajectory.
    pub fn clear(&mut self) {
        self.poses.clear();
        self.time_diffs.clear();
    }

    fn push_pose_and_time_diff(&mut self, pose: PoseSE2, dt: f64, fixed: bool) {
        if !self.poses.is_empty() {
            self.time_diffs.push(VertexTimeDiff::new(dt));
        }
        self.poses.push(VertexPose::new(pose, fixed));
    }

    /// Initialize the band from a sampled path.
    ///
    /// Waypoints closer than `skip_dist` to the previously kept one are
    /// skipped; when `estimate_orient` is set the heading of each kept
    /// interior pose points toward the next plan point. If fewer than
    /// `min_samples` poses result, intermediates are inserted between the
    /// last interior pose and the goal. Endpoints are fixed.
    pub fn init_from_plan(
        &mut self,
        plan: &[PoseSE2],
        dt_ref: f64,
        skip_dist: f64,
        min_samples: usize,
        estimate_orient: bool,
    ) -> PlannerResult<()> {
        if plan.len() < 2 {
            return Err(PlannerError::InvalidInput(format!(
                "initial plan must contain at least 2 poses, got {}",
                plan.len()
            )));
        }
        self.clear();

        self.push_pose_and_time_diff(plan[0], dt_ref, true);

        let mut last_kept = plan[0].position();
        for i in 1..plan.len() - 1 {
            if (plan[i].position() - last_kept).norm() < skip_dist {
                continue;
            }
            let mut pose = plan[i];
            if estimate_orient {
                let toward_next = plan[i + 1].position() - plan[i].position();
                if toward_next.norm() > f64::EPSILON {
                    pose.set_theta(toward_next.y.atan2(toward_next.x));
                }
            }
            last_kept = pose.position();
            self.push_pose_and_time_diff(pose, dt_ref, false);
        }

        let goal = plan[plan.len() - 1];
        // densify toward the goal until the sample floor is met
        while self.poses.len() < min_samples.saturating_sub(1) {
            let filler = PoseSE2::average(self.back_pose(), &goal);
            self.push_pose_and_time_diff(filler, dt_ref, false);
        }
        self.push_pose_and_time_diff(goal, dt_ref, true);

        Ok(())
    }

    /// Initialize the band from a (start, goal) pair with `min_samples - 2`
    /// evenly interpolated intermediates. Time differences are seeded at 1;
    /// auto-resize corrects them before the first solve.
    pub fn init_from_start_goal(
        &mut self,
        start: PoseSE2,
        goal: PoseSE2,
        min_samples: usize,
    ) -> PlannerResult<()> {
        if min_samples < 2 {
            return Err(PlannerError::InvalidInput(format!(
                "min_samples must be at least 2, got {min_samples}"
            )));
        }
        self.clear();

        self.push_pose_and_time_diff(start, 1.0, true);

        let intermediates = min_samples - 2;
        let step = goal.position() - start.position();
        let dtheta = crate::se2::normalize_theta(goal.theta() - start.theta());
        for k in 1..=intermediates {
            let fraction = k as f64 / (intermediates + 1) as f64;
            let pose = PoseSE2::from_position(
                start.position() + fraction * step,
                start.theta() + fraction * dtheta,
            );
            self.push_pose_and_time_diff(pose, 1.0, false);
        }
        self.push_pose_and_time_diff(goal, 1.0, true);

        Ok(())
    }

    /// Warm-start update: discard poses the robot has already passed, pin
    /// the first remaining pose to `new_start` and the last to `new_goal`.
    ///
    /// The front scan is bounded so the band never shrinks below
    /// `min_samples`, and it stops at the first distance increase. Calling
    /// this twice with identical arguments is a no-op the second time.
    pub fn update_and_prune(&mut self, new_start: &PoseSE2, new_goal: &PoseSE2, min_samples: usize) {
        if self.poses.is_empty() {
            return;
        }

        let lookahead = self
            .poses
            .len()
            .saturating_sub(min_samples)
            .min(10);

        let mut dist_cache = (new_start.position() - self.poses[0].pose.position()).norm();
        let mut nearest_idx = 0;
        for i in 1..=lookahead {
            let dist = (new_start.position() - self.poses[i].pose.position()).norm();
            if dist < dist_cache {
                dist_cache = dist;
                nearest_idx = i;
            } else {
                break;
            }
        }

        if nearest_idx > 0 {
            // pose 0 stays allocated and is overwritten below; the passed
            // poses after it are removed together with their time diffs
            self.poses.drain(1..=nearest_idx);
            self.time_diffs.drain(0..nearest_idx);
        }

        self.poses[0] = VertexPose::new(*new_start, true);
        let last = self.poses.len() - 1;
        self.poses[last] = VertexPose::new(*new_goal, true);
    }

    /// Keep every time difference near `dt_ref`: split intervals above the
    /// hysteresis band, merge intervals below it while the sample floor
    /// allows. Endpoints are never removed. Idempotent once the band is
    /// inside the hysteresis window.
    pub fn auto_resize(&mut self, dt_ref: f64, dt_hysteresis: f64, min_samples: usize) {
        let mut modified = true;
        for _ in 0..100 {
            if !modified {
                break;
            }
            modified = false;

            let mut i = 0;
            while i < self.time_diffs.len() {
                let dt = self.time_diffs[i].dt();
                if dt > dt_ref + dt_hysteresis {
                    let half = 0.5 * dt;
                    self.time_diffs[i].set_dt(half);
                    let mid = PoseSE2::average(&self.poses[i].pose, &self.poses[i + 1].pose);
                    self.poses.insert(i + 1, VertexPose::new(mid, false));
                    self.time_diffs.insert(i + 1, VertexTimeDiff::new(half));
                    modified = true;
                } else if dt < dt_ref - dt_hysteresis
                    && self.time_diffs.len() > min_samples.saturating_sub(1)
                {
                    if i < self.time_diffs.len() - 1 {
                        let merged = self.time_diffs[i + 1].dt() + dt;
                        self.time_diffs[i + 1].set_dt(merged);
                        self.time_diffs.remove(i);
                        self.poses.remove(i + 1);
                        modified = true;
                    }
                }
                i += 1;
            }
        }
    }

    /// Index of the band pose closest to `point`, scanning from `begin`.
    pub fn find_closest_pose(&self, point: &Vector2<f64>, begin: usize) -> usize {
        let mut best_idx = begin.min(self.poses.len().saturating_sub(1));
        let mut best_dist = f64::INFINITY;
        for (i, vertex) in self.poses.iter().enumerate().skip(begin) {
            let dist = (vertex.pose.position() - point).norm();
            if dist < best_dist {
                best_dist = dist;
                best_idx = i;
            }
        }
        best_idx
    }

    /// Index of the band pose closest to an obstacle by its geometric
    /// distance (shape aware).
    pub fn find_closest_pose_to_obstacle(&self, obstacle: &Obstacle) -> usize {
        let mut best_idx = 0;
        let mut best_dist = f64::INFINITY;
        for (i, vertex) in self.poses.iter().enumerate() {
            let dist = obstacle.min_distance(&vertex.pose.position());
            if dist < best_dist {
                best_dist = dist;
                best_idx = i;
            }
        }
        best_idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn straight_plan(n: usize, spacing: f64) -> Vec<PoseSE2> {
        (0..n)
            .map(|i| PoseSE2::new(i as f64 * spacing, 0.0, 0.0))
            .collect()
    }

    fn assert_band_valid(teb: &TimedElasticBand) {
        assert_eq!(teb.size_time_diffs(), teb.size_poses() - 1);
        for i in 0..teb.size_time_diffs() {
            assert!(teb.time_diff(i) > 0.0);
        }
    }

    #[test]
    fn test_init_from_plan_endpoints() {
        let plan = straight_plan(10, 0.5);
        let mut teb = TimedElasticBand::new();
        teb.init_from_plan(&plan, 0.3, 0.4, 5, true).unwrap();
        assert_band_valid(&teb);
        assert!(teb.size_poses() >= 5);
        assert_relative_eq!(teb.front_pose().x(), 0.0);
        assert_relative_eq!(teb.back_pose().x(), 4.5);
        assert!(teb.is_pose_fixed(0));
        assert!(teb.is_pose_fixed(teb.size_poses() - 1));
    }

    #[test]
    fn test_init_from_plan_skips_close_points() {
        let plan = straight_plan(10, 0.1); // every interior point within skip_dist
        let mut teb = TimedElasticBand::new();
        teb.init_from_plan(&plan, 0.3, 2.0, 3, true).unwrap();
        assert_band_valid(&teb);
        // interior points skipped, floor re-densifies to min_samples
        assert_eq!(teb.size_poses(), 3);
    }

    #[test]
    fn test_init_from_plan_rejects_short_input() {
        let mut teb = TimedElasticBand::new();
        assert!(teb.init_from_plan(&[], 0.3, 0.4, 3, true).is_err());
        assert!(teb
            .init_from_plan(&[PoseSE2::new(0.0, 0.0, 0.0)], 0.3, 0.4, 3, true)
            .is_err());
        assert!(!teb.is_init());
    }

    #[test]
    fn test_init_from_start_goal() {
        let mut teb = TimedElasticBand::new();
        teb.init_from_start_goal(
            PoseSE2::new(0.0, 0.0, 0.0),
            PoseSE2::new(4.0, 0.0, 0.0),
            5,
        )
        .unwrap();
        assert_band_valid(&teb);
        assert_eq!(teb.size_poses(), 5);
        assert_relative_eq!(teb.pose(2).x(), 2.0);
        assert_relative_eq!(teb.time_diff(0), 1.0);
    }

    #[test]
    fn test_auto_resize_splits_large_intervals() {
        let mut teb = TimedElasticBand::new();
        teb.init_from_start_goal(
            PoseSE2::new(0.0, 0.0, 0.0),
            PoseSE2::new(4.0, 0.0, 0.0),
            5,
        )
        .unwrap();
        teb.auto_resize(0.3, 0.1, 3);
        assert_band_valid(&teb);
        for i in 0..teb.size_time_diffs() {
            assert!(teb.time_diff(i) <= 0.3 + 0.1 + 1e-9);
        }
        // endpoints survived
        assert_relative_eq!(teb.front_pose().x(), 0.0);
        assert_relative_eq!(teb.back_pose().x(), 4.0);
    }

    #[test]
    fn test_auto_resize_merges_small_intervals() {
        let plan = straight_plan(12, 0.5);
        let mut teb = TimedElasticBand::new();
        teb.init_from_plan(&plan, 0.05, 0.0, 3, true).unwrap();
        let before = teb.size_poses();
        teb.auto_resize(0.3, 0.1, 3);
        assert_band_valid(&teb);
        assert!(teb.size_poses() < before);
        assert!(teb.size_poses() >= 3);
    }

    #[test]
    fn test_auto_resize_idempotent_within_hysteresis() {
        let plan = straight_plan(10, 0.5);
        let mut teb = TimedElasticBand::new();
        teb.init_from_plan(&plan, 0.3, 0.0, 5, true).unwrap();
        teb.auto_resize(0.3, 0.1, 3);
        let poses_after_first = teb.size_poses();
        let dts: Vec<f64> = (0..teb.size_time_diffs()).map(|i| teb.time_diff(i)).collect();
        teb.auto_resize(0.3, 0.1, 3);
        assert_eq!(teb.size_poses(), poses_after_first);
        for (i, dt) in dts.iter().enumerate() {
            assert_relative_eq!(teb.time_diff(i), *dt);
        }
    }

    #[test]
    fn test_update_and_prune_advances_front() {
        let plan = straight_plan(10, 0.5);
        let mut teb = TimedElasticBand::new();
        teb.init_from_plan(&plan, 0.3, 0.0, 3, true).unwrap();
        let n_before = teb.size_poses();

        let new_start = PoseSE2::new(1.0, 0.0, 0.0); // robot advanced two samples
        let new_goal = PoseSE2::new(4.6, 0.0, 0.0);
        teb.update_and_prune(&new_start, &new_goal, 3);
        assert_band_valid(&teb);
        assert!(teb.size_poses() < n_before);
        assert_relative_eq!(teb.front_pose().x(), 1.0);
        assert_relative_eq!(teb.back_pose().x(), 4.6);
        assert!(teb.is_pose_fixed(0));
        assert!(teb.is_pose_fixed(teb.size_poses() - 1));
    }

    #[test]
    fn test_update_and_prune_idempotent() {
        let plan = straight_plan(10, 0.5);
        let mut teb = TimedElasticBand::new();
        teb.init_from_plan(&plan, 0.3, 0.0, 3, true).unwrap();

        let new_start = PoseSE2::new(1.0, 0.0, 0.0);
        let new_goal = PoseSE2::new(4.6, 0.0, 0.0);
        teb.update_and_prune(&new_start, &new_goal, 3);
        let n = teb.size_poses();
        teb.update_and_prune(&new_start, &new_goal, 3);
        assert_eq!(teb.size_poses(), n);
        assert_relative_eq!(teb.front_pose().x(), 1.0);
        assert_relative_eq!(teb.back_pose().x(), 4.6);
    }

    #[test]
    fn test_find_closest_pose() {
        let plan = straight_plan(10, 0.5);
        let mut teb = TimedElasticBand::new();
        teb.init_from_plan(&plan, 0.3, 0.0, 3, true).unwrap();
        let idx = teb.find_closest_pose(&Vector2::new(2.05, 0.3), 0);
        assert_eq!(idx, 4);
        // scan start is honored
        let idx_from_6 = teb.find_closest_pose(&Vector2::new(2.05, 0.3), 6);
        assert_eq!(idx_from_6, 6);
    }

    #[test]
    fn test_time_diff_floor() {
        let mut td = VertexTimeDiff::new(-0.5);
        assert!(td.dt() >= MIN_TIME_DIFF);
        td.set_dt(0.0);
        assert!(td.dt() >= MIN_TIME_DIFF);
    }

    #[test]
    fn test_sum_and_length() {
        let mut teb = TimedElasticBand::new();
        teb.init_from_start_goal(
            PoseSE2::new(0.0, 0.0, 0.0),
            PoseSE2::new(3.0, 0.0, 0.0),
            4,
        )
        .unwrap();
        assert_relative_eq!(teb.sum_of_time_diffs(), 3.0);
        assert_relative_eq!(teb.length(), 3.0, epsilon = 1e-12);
    }
}
