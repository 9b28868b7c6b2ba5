//! Randomised reference tasks
//!
//! A task is a waypoint sequence sampled at a fixed rate over the horizon:
//! one speed and heading drawn per task, a random-walk heading disturbance
//! per second, integrated into absolute positions from the start point.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::common::{Position2, TrackingError, TrackingResult};
use crate::path_planning::WaypointSequence;

/// Sampling ranges of the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRanges {
    /// Speed range [m/s]
    pub speed_range: [f64; 2],
    /// Initial heading range [rad]
    pub heading_range: [f64; 2],
    /// Standard deviation of the per-second heading change [rad]
    pub heading_noise: f64,
}

impl TaskRanges {
    pub fn validate(&self) -> TrackingResult<()> {
        let ordered = |r: &[f64; 2]| r[0].is_finite() && r[1].is_finite() && r[0] <= r[1];
        if !ordered(&self.speed_range) || !ordered(&self.heading_range) {
            return Err(TrackingError::Config(
                "task ranges must be finite with min <= max".to_string(),
            ));
        }
        if !(self.heading_noise >= 0.0) {
            return Err(TrackingError::Config("heading_noise must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Task generator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    /// Horizon [s]
    pub horizon: usize,
    pub points_per_sec: usize,
    pub ranges: TaskRanges,
}

impl TaskConfig {
    /// Waypoints after the start point
    pub fn waypoint_count(&self) -> usize {
        self.horizon * self.points_per_sec
    }

    /// Knot times `j / pps` for `j = 0..=horizon·pps`
    pub fn knot_times(&self) -> Vec<f64> {
        (0..=self.waypoint_count())
            .map(|j| j as f64 / self.points_per_sec as f64)
            .collect()
    }
}

/// Seeded task generator
pub struct TaskGenerator {
    config: TaskConfig,
    rng: StdRng,
}

impl TaskGenerator {
    pub fn new(config: TaskConfig, seed: u64) -> TrackingResult<Self> {
        config.ranges.validate()?;
        if config.horizon == 0 || config.points_per_sec == 0 {
            return Err(TrackingError::InvalidInput(
                "task horizon and points_per_sec must be non-zero".to_string(),
            ));
        }
        Ok(TaskGenerator { config, rng: StdRng::seed_from_u64(seed) })
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    fn sample_range(&mut self, range: [f64; 2]) -> f64 {
        if range[0] == range[1] {
            range[0]
        } else {
            self.rng.gen_range(range[0]..range[1])
        }
    }

    /// Sample a new task starting at `start`.
    pub fn generate(&mut self, start: Position2<f64>) -> TrackingResult<WaypointSequence<f64>> {
        let ranges = self.config.ranges.clone();
        let speed = self.sample_range(ranges.speed_range);
        let mut heading = self.sample_range(ranges.heading_range);

        let noise = Normal::new(0.0, ranges.heading_noise)
            .map_err(|e| TrackingError::InvalidInput(format!("heading noise: {}", e)))?;

        let mut speeds = Vec::with_capacity(self.config.horizon);
        let mut headings = Vec::with_capacity(self.config.horizon);
        for _ in 0..self.config.horizon {
            speeds.push(speed);
            headings.push(heading);
            heading += noise.sample(&mut self.rng);
        }

        Self::from_profile(&self.config, &speeds, &headings, start)
    }

    /// Integrate fixed per-second speeds and headings into a task.
    pub fn from_profile(
        config: &TaskConfig,
        speeds: &[f64],
        headings: &[f64],
        start: Position2<f64>,
    ) -> TrackingResult<WaypointSequence<f64>> {
        if speeds.len() != config.horizon || headings.len() != config.horizon {
            return Err(TrackingError::InvalidInput(format!(
                "profile needs {} speeds and headings, got {} and {}",
                config.horizon,
                speeds.len(),
                headings.len()
            )));
        }

        let pps = config.points_per_sec;
        let mut x = Vec::with_capacity(config.waypoint_count() + 1);
        let mut y = Vec::with_capacity(config.waypoint_count() + 1);
        let (mut px, mut py) = (start.x, start.y);
        x.push(px);
        y.push(py);
        for j in 0..config.waypoint_count() {
            let second = j / pps;
            let step = speeds[second] / pps as f64;
            px += step * headings[second].cos();
            py += step * headings[second].sin();
            x.push(px);
            y.push(py);
        }

        WaypointSequence::new(config.knot_times(), x, y)
    }
}

/// Network input for a task: offsets of every waypoint after the first,
/// relative to the first, x-block then y-block.
pub fn task_description(task: &WaypointSequence<f64>) -> Vec<f64> {
    let origin = task.point(0);
    let dx = task.x()[1..].iter().map(|&v| v - origin.x);
    let dy = task.y()[1..].iter().map(|&v| v - origin.y);
    dx.chain(dy).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TaskConfig {
        TaskConfig {
            horizon: 3,
            points_per_sec: 2,
            ranges: TaskRanges {
                speed_range: [0.5, 1.5],
                heading_range: [-0.5, 0.5],
                heading_noise: 0.2,
            },
        }
    }

    #[test]
    fn test_generator_is_deterministic_per_seed() {
        let mut a = TaskGenerator::new(config(), 42).unwrap();
        let mut b = TaskGenerator::new(config(), 42).unwrap();
        let mut c = TaskGenerator::new(config(), 43).unwrap();
        let start = Position2::new(0.0, 0.0);
        let ta = a.generate(start).unwrap();
        assert_eq!(ta, b.generate(start).unwrap());
        assert_ne!(ta, c.generate(start).unwrap());
    }

    #[test]
    fn test_generated_task_shape() {
        let mut generator = TaskGenerator::new(config(), 1).unwrap();
        let task = generator.generate(Position2::new(1.0, -1.0)).unwrap();
        assert_eq!(task.len(), 7);
        assert_eq!(task.times(), &[0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0]);
        assert_eq!(task.point(0), Position2::new(1.0, -1.0));
        assert_eq!(task_description(&task).len(), 12);
    }

    #[test]
    fn test_fixed_profile_straight_line() {
        let task = TaskGenerator::from_profile(
            &config(),
            &[1.0, 1.0, 1.0],
            &[0.0, 0.0, 0.0],
            Position2::new(0.0, 0.0),
        )
        .unwrap();
        for (i, &x) in task.x().iter().enumerate() {
            assert!((x - 0.5 * i as f64).abs() < 1e-12);
        }
        assert!(task.y().iter().all(|y| y.abs() < 1e-12));

        let description = task_description(&task);
        assert!((description[5] - 3.0).abs() < 1e-12);
        assert!(description[6..].iter().all(|y| y.abs() < 1e-12));
    }

    #[test]
    fn test_profile_length_mismatch() {
        let result = TaskGenerator::from_profile(&config(), &[1.0], &[0.0], Position2::new(0.0, 0.0));
        assert!(matches!(result, Err(TrackingError::InvalidInput(_))));
    }

    #[test]
    fn test_degenerate_ranges_are_fixed_values() {
        let mut cfg = config();
        cfg.ranges = TaskRanges { speed_range: [1.0, 1.0], heading_range: [0.0, 0.0], heading_noise: 0.0 };
        let mut generator = TaskGenerator::new(cfg, 3).unwrap();
        let task = generator.generate(Position2::new(0.0, 0.0)).unwrap();
        assert!((task.x()[6] - 3.0).abs() < 1e-12);
    }
}
