//! Time-parameterised cubic spline through 2D waypoints
//!
//! Each axis is a piecewise cubic `a·τ³ + b·τ² + c·τ + d` with `τ = t − t_i`
//! on segment `i`. The `4·(n−1)` coefficients of an axis are the unique
//! solution of a square linear system built from position matches at both
//! ends of every segment, first- and second-derivative continuity at the
//! interior knots, and one boundary rule at each end.
//!
//! The system matrix only depends on the knot times, so it is `f64` and is
//! factorised once with LU. The right-hand side carries the waypoint values
//! (and clamped boundary velocities), which may be dual numbers: the
//! coefficients are linear in them, so solving against unit vectors and
//! recombining gives exact values and exact derivatives.

use nalgebra::{DMatrix, DVector};

use crate::common::{constant, Position2, Scalar, TrackingError, TrackingResult, Velocity2};

/// Slack allowed below the first knot before a query is out of range
const START_TOLERANCE: f64 = 1e-12;

/// Ordered (time, x, y) waypoints with strictly increasing times
#[derive(Debug, Clone, PartialEq)]
pub struct WaypointSequence<T> {
    times: Vec<f64>,
    x: Vec<T>,
    y: Vec<T>,
}

impl<T: Scalar> WaypointSequence<T> {
    pub fn new(times: Vec<f64>, x: Vec<T>, y: Vec<T>) -> TrackingResult<Self> {
        let n = times.len();
        if n != x.len() || n != y.len() {
            return Err(TrackingError::InvalidInput(format!(
                "lengths don't match: {} times, {} x values, {} y values",
                n,
                x.len(),
                y.len()
            )));
        }
        if n < 2 {
            return Err(TrackingError::InvalidInput(format!(
                "need at least 2 waypoints, got {}",
                n
            )));
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(TrackingError::InvalidInput("waypoint times must be finite".to_string()));
        }
        if let Some(w) = times.windows(2).find(|w| w[1] <= w[0]) {
            return Err(TrackingError::InvalidInput(format!(
                "waypoint times must be strictly increasing, found {} then {}",
                w[0], w[1]
            )));
        }
        Ok(Self { times, x, y })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn x(&self) -> &[T] {
        &self.x
    }

    pub fn y(&self) -> &[T] {
        &self.y
    }

    pub fn point(&self, i: usize) -> Position2<T> {
        Position2::new(self.x[i], self.y[i])
    }
}

impl WaypointSequence<f64> {
    /// Lift plain waypoints into any scalar type (zero tangents).
    pub fn lift<U: Scalar>(&self) -> WaypointSequence<U> {
        WaypointSequence {
            times: self.times.clone(),
            x: self.x.iter().map(|&v| constant(v)).collect(),
            y: self.y.iter().map(|&v| constant(v)).collect(),
        }
    }
}

/// Boundary rule applied at the first and last knot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryCondition<T> {
    /// Zero second derivative at both ends
    Natural,
    /// Prescribed first derivative at both ends
    Clamped { start: Velocity2<T>, end: Velocity2<T> },
}

impl<T: Scalar> BoundaryCondition<T> {
    /// Clamped with the vehicle at rest at both ends
    pub fn at_rest() -> Self {
        BoundaryCondition::Clamped { start: Velocity2::origin(), end: Velocity2::origin() }
    }
}

impl<T: Scalar> Default for BoundaryCondition<T> {
    fn default() -> Self {
        Self::at_rest()
    }
}

/// Which quantity to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivative {
    Position,
    Velocity,
    Acceleration,
}

/// Row layout of one segment's four coefficients at a local offset.
fn basis(order: Derivative, tau: f64) -> [f64; 4] {
    match order {
        Derivative::Position => [tau.powi(3), tau.powi(2), tau, 1.0],
        Derivative::Velocity => [3.0 * tau.powi(2), 2.0 * tau, 1.0, 0.0],
        Derivative::Acceleration => [6.0 * tau, 2.0, 0.0, 0.0],
    }
}

/// Dense constraint system for one set of knot times. Rows are filled
/// knot by knot; `rhs` records the non-zero right-hand-side rows.
struct SplineSystem<T> {
    matrix: DMatrix<f64>,
    rhs: Vec<(usize, Position2<T>)>,
    row: usize,
}

impl<T: Scalar> SplineSystem<T> {
    fn new(size: usize) -> Self {
        Self { matrix: DMatrix::zeros(size, size), rhs: Vec::new(), row: 0 }
    }

    /// Emit one row; `terms` are (segment, order, local offset, sign).
    fn push_row(&mut self, terms: &[(usize, Derivative, f64, f64)], value: Option<Position2<T>>) {
        for &(segment, order, tau, sign) in terms {
            for (k, coeff) in basis(order, tau).iter().enumerate() {
                self.matrix[(self.row, 4 * segment + k)] += sign * coeff;
            }
        }
        if let Some(value) = value {
            self.rhs.push((self.row, value));
        }
        self.row += 1;
    }

    fn assemble(waypoints: &WaypointSequence<T>, boundary: &BoundaryCondition<T>) -> Self {
        use Derivative::*;

        let times = waypoints.times();
        let n = times.len();
        let last = n - 1;
        let mut system = Self::new(4 * (n - 1));

        for i in 0..n {
            let point = waypoints.point(i);

            // position rows
            if i != 0 {
                let h = times[i] - times[i - 1];
                system.push_row(&[(i - 1, Position, h, 1.0)], Some(point));
            }
            if i != last {
                system.push_row(&[(i, Position, 0.0, 1.0)], Some(point));
            }

            // first derivative row, degenerating to the boundary rule at the ends
            if i != 0 && i != last {
                let h = times[i] - times[i - 1];
                system.push_row(&[(i - 1, Velocity, h, 1.0), (i, Velocity, 0.0, -1.0)], None);
            } else {
                let (segment, tau) = if i == 0 { (0, 0.0) } else { (last - 1, times[last] - times[last - 1]) };
                match boundary {
                    BoundaryCondition::Natural => {
                        system.push_row(&[(segment, Acceleration, tau, 1.0)], None);
                    }
                    BoundaryCondition::Clamped { start, end } => {
                        let velocity = if i == 0 { *start } else { *end };
                        system.push_row(&[(segment, Velocity, tau, 1.0)], Some(velocity));
                    }
                }
            }

            // second derivative row
            if i != 0 && i != last {
                let h = times[i] - times[i - 1];
                system.push_row(
                    &[(i - 1, Acceleration, h, 1.0), (i, Acceleration, 0.0, -1.0)],
                    None,
                );
            }
        }

        debug_assert_eq!(system.row, 4 * (n - 1));
        system
    }

    /// LU-solve the system for both axes.
    fn solve(self) -> TrackingResult<(Vec<T>, Vec<T>)> {
        let size = self.matrix.nrows();
        let lu = self.matrix.lu();
        if !lu.is_invertible() {
            return Err(TrackingError::NumericalFailure(
                "spline system matrix is singular".to_string(),
            ));
        }

        let mut coefficients_x = vec![T::zero(); size];
        let mut coefficients_y = vec![T::zero(); size];
        for (row, value) in self.rhs {
            let mut unit = DVector::zeros(size);
            unit[row] = 1.0;
            let column = lu.solve(&unit).ok_or_else(|| {
                TrackingError::NumericalFailure("spline system solve failed".to_string())
            })?;
            for (k, &influence) in column.iter().enumerate() {
                coefficients_x[k] += value.x * influence;
                coefficients_y[k] += value.y * influence;
            }
        }

        let all_finite = coefficients_x
            .iter()
            .chain(coefficients_y.iter())
            .all(|c| c.re().is_finite());
        if !all_finite {
            return Err(TrackingError::NumericalFailure(
                "spline coefficients are not finite".to_string(),
            ));
        }
        Ok((coefficients_x, coefficients_y))
    }
}

/// Piecewise-cubic interpolant per axis, immutable once built
#[derive(Debug, Clone)]
pub struct CubicSpline<T> {
    knot_times: Vec<f64>,
    coefficients_x: Vec<T>,
    coefficients_y: Vec<T>,
}

impl<T: Scalar> CubicSpline<T> {
    /// Solve for the spline through `waypoints`.
    ///
    /// `initial_position` replaces the first waypoint, pinning the spline to
    /// where the vehicle actually starts.
    pub fn build(
        waypoints: &WaypointSequence<T>,
        boundary: BoundaryCondition<T>,
        initial_position: Option<Position2<T>>,
    ) -> TrackingResult<Self> {
        let pinned;
        let waypoints = match initial_position {
            Some(p) => {
                let mut w = waypoints.clone();
                w.x[0] = p.x;
                w.y[0] = p.y;
                pinned = w;
                &pinned
            }
            None => waypoints,
        };

        let (coefficients_x, coefficients_y) = SplineSystem::assemble(waypoints, &boundary).solve()?;

        Ok(Self {
            knot_times: waypoints.times().to_vec(),
            coefficients_x,
            coefficients_y,
        })
    }

    /// Build with the default boundary from raw slices
    pub fn from_slices(times: &[f64], x: &[T], y: &[T]) -> TrackingResult<Self> {
        let waypoints = WaypointSequence::new(times.to_vec(), x.to_vec(), y.to_vec())?;
        Self::build(&waypoints, BoundaryCondition::default(), None)
    }

    /// Same interpolant with the derivative parts dropped
    pub fn re(&self) -> CubicSpline<f64> {
        CubicSpline {
            knot_times: self.knot_times.clone(),
            coefficients_x: self.coefficients_x.iter().map(|c| c.re()).collect(),
            coefficients_y: self.coefficients_y.iter().map(|c| c.re()).collect(),
        }
    }

    pub fn knot_times(&self) -> &[f64] {
        &self.knot_times
    }

    pub fn coefficients_x(&self) -> &[T] {
        &self.coefficients_x
    }

    pub fn coefficients_y(&self) -> &[T] {
        &self.coefficients_y
    }

    pub fn segment_count(&self) -> usize {
        self.knot_times.len() - 1
    }

    pub fn start_time(&self) -> f64 {
        self.knot_times[0]
    }

    pub fn end_time(&self) -> f64 {
        self.knot_times[self.knot_times.len() - 1]
    }

    /// Segment containing `t`: `t_i ≤ t < t_{i+1}`, or the last segment at
    /// and beyond the final knot.
    pub fn segment_index(&self, t: f64) -> TrackingResult<usize> {
        if !t.is_finite() || t < self.start_time() - START_TOLERANCE {
            return Err(TrackingError::OutOfRange {
                time: t,
                start: self.start_time(),
                end: self.end_time(),
            });
        }
        let last = self.segment_count() - 1;
        Ok((0..last).find(|&i| t < self.knot_times[i + 1]).unwrap_or(last))
    }

    /// Evaluate position, velocity or acceleration at `t`.
    ///
    /// Times before the first knot are an error; times after the last knot
    /// extrapolate the final segment.
    pub fn evaluate(&self, t: f64, order: Derivative) -> TrackingResult<Position2<T>> {
        let segment = self.segment_index(t)?;
        Ok(self.evaluate_segment(segment, t, order))
    }

    /// Evaluate a given segment's polynomial at `t`, wherever `t` lies.
    pub fn evaluate_segment(&self, segment: usize, t: f64, order: Derivative) -> Position2<T> {
        let tau = t - self.knot_times[segment];
        let base = 4 * segment;
        Position2::new(
            Self::polynomial(&self.coefficients_x[base..base + 4], tau, order),
            Self::polynomial(&self.coefficients_y[base..base + 4], tau, order),
        )
    }

    fn polynomial(c: &[T], tau: f64, order: Derivative) -> T {
        let (a, b, c, d) = (c[0], c[1], c[2], c[3]);
        match order {
            Derivative::Position => ((a * tau + b) * tau + c) * tau + d,
            Derivative::Velocity => (a * (3.0 * tau) + b * 2.0) * tau + c,
            Derivative::Acceleration => a * (6.0 * tau) + b * 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_dual::Dual64;

    const TOL: f64 = 1e-9;

    fn figure_eight() -> WaypointSequence<f64> {
        WaypointSequence::new(
            (0..9).map(|i| i as f64).collect(),
            vec![0.0, 1.0, 2.0, 1.0, 0.0, -1.0, -2.0, -1.0, 0.0],
            vec![0.0, 1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0, 0.0],
        )
        .unwrap()
    }

    fn uneven() -> WaypointSequence<f64> {
        WaypointSequence::new(
            vec![0.0, 0.4, 1.5, 2.0, 3.7],
            vec![0.0, 0.3, 1.2, 0.9, 2.5],
            vec![0.0, -0.5, 0.1, 1.4, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn test_spline_interpolates_every_knot() {
        for boundary in [BoundaryCondition::at_rest(), BoundaryCondition::Natural] {
            for waypoints in [figure_eight(), uneven()] {
                let spline = CubicSpline::build(&waypoints, boundary, None).unwrap();
                for (i, &t) in waypoints.times().iter().enumerate() {
                    let p = spline.evaluate(t, Derivative::Position).unwrap();
                    assert!((p.x - waypoints.x()[i]).abs() < TOL, "x mismatch at knot {}", i);
                    assert!((p.y - waypoints.y()[i]).abs() < TOL, "y mismatch at knot {}", i);
                }
            }
        }
    }

    #[test]
    fn test_spline_first_and_second_derivative_continuity() {
        let waypoints = uneven();
        let spline = CubicSpline::build(&waypoints, BoundaryCondition::default(), None).unwrap();
        for i in 1..waypoints.len() - 1 {
            let t = waypoints.times()[i];
            for order in [Derivative::Velocity, Derivative::Acceleration] {
                let left = spline.evaluate_segment(i - 1, t, order);
                let right = spline.evaluate_segment(i, t, order);
                assert!((left.x - right.x).abs() < 1e-8, "{:?} x jump at knot {}", order, i);
                assert!((left.y - right.y).abs() < 1e-8, "{:?} y jump at knot {}", order, i);
            }
        }
    }

    #[test]
    fn test_clamped_boundary_velocities() {
        let waypoints = uneven();
        let boundary = BoundaryCondition::Clamped {
            start: Velocity2::new(1.0, -0.5),
            end: Velocity2::new(0.0, 2.0),
        };
        let spline = CubicSpline::build(&waypoints, boundary, None).unwrap();

        let start = spline.evaluate(0.0, Derivative::Velocity).unwrap();
        assert!((start.x - 1.0).abs() < TOL);
        assert!((start.y + 0.5).abs() < TOL);

        let end = spline.evaluate(3.7, Derivative::Velocity).unwrap();
        assert!(end.x.abs() < TOL);
        assert!((end.y - 2.0).abs() < TOL);
    }

    #[test]
    fn test_natural_boundary_has_zero_curvature_at_ends() {
        let spline = CubicSpline::build(&uneven(), BoundaryCondition::Natural, None).unwrap();
        let start = spline.evaluate(0.0, Derivative::Acceleration).unwrap();
        let end = spline.evaluate(3.7, Derivative::Acceleration).unwrap();
        assert!(start.x.abs() < TOL && start.y.abs() < TOL);
        assert!(end.x.abs() < TOL && end.y.abs() < TOL);
    }

    #[test]
    fn test_two_point_spline_is_smoothstep() {
        let spline = CubicSpline::from_slices(&[0.0, 2.0], &[0.0, 4.0], &[1.0, 1.0]).unwrap();
        assert_eq!(spline.segment_count(), 1);
        assert_eq!(spline.coefficients_x().len(), 4);
        let mid = spline.evaluate(1.0, Derivative::Position).unwrap();
        assert!((mid.x - 2.0).abs() < TOL);
        assert!((mid.y - 1.0).abs() < TOL);
    }

    #[test]
    fn test_invalid_waypoints_are_rejected() {
        let mismatch = WaypointSequence::new(vec![0.0, 1.0], vec![0.0], vec![0.0, 1.0]);
        assert!(matches!(mismatch, Err(TrackingError::InvalidInput(_))));

        let single = WaypointSequence::new(vec![0.0], vec![0.0], vec![0.0]);
        assert!(matches!(single, Err(TrackingError::InvalidInput(_))));

        let repeated = WaypointSequence::new(vec![0.0, 1.0, 1.0], vec![0.0; 3], vec![0.0; 3]);
        assert!(matches!(repeated, Err(TrackingError::InvalidInput(_))));

        let slices = CubicSpline::from_slices(&[0.0, 1.0, 2.0], &[0.0, 1.0], &[0.0, 1.0, 0.0]);
        assert!(matches!(slices, Err(TrackingError::InvalidInput(_))));
    }

    #[test]
    fn test_out_of_range_policy() {
        let spline = CubicSpline::build(&uneven(), BoundaryCondition::default(), None).unwrap();
        let before = spline.evaluate(-0.1, Derivative::Position);
        assert!(matches!(before, Err(TrackingError::OutOfRange { .. })));
        assert!(spline.evaluate(f64::NAN, Derivative::Position).is_err());

        // past the end the last segment is extrapolated
        let beyond = spline.evaluate(4.0, Derivative::Position).unwrap();
        let last = spline.evaluate_segment(3, 4.0, Derivative::Position);
        assert_eq!(beyond, last);
        assert_eq!(spline.segment_index(3.7).unwrap(), 3);
        assert_eq!(spline.segment_index(0.4).unwrap(), 1);
    }

    #[test]
    fn test_initial_position_override_pins_first_knot() {
        let waypoints = uneven();
        let spline = CubicSpline::build(
            &waypoints,
            BoundaryCondition::default(),
            Some(Position2::new(-1.0, 2.0)),
        )
        .unwrap();
        let start = spline.evaluate(0.0, Derivative::Position).unwrap();
        assert!((start.x + 1.0).abs() < TOL);
        assert!((start.y - 2.0).abs() < TOL);
        let second = spline.evaluate(0.4, Derivative::Position).unwrap();
        assert!((second.x - 0.3).abs() < TOL);
    }

    #[test]
    fn test_three_point_scenario_is_differentiable() {
        let times = [0.0, 1.0, 2.0];
        let plain = CubicSpline::from_slices(&times, &[0.0, 1.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        let p = plain.evaluate(0.5, Derivative::Position).unwrap();
        assert!(p.x > 0.0 && p.x < 1.0, "x = {}", p.x);
        assert!(p.y > 0.0 && p.y < 1.0, "y = {}", p.y);

        // seed the tangent on the middle x waypoint
        let x = [Dual64::from(0.0), Dual64::new(1.0, 1.0), Dual64::from(0.0)];
        let y = [Dual64::from(0.0), Dual64::from(1.0), Dual64::from(0.0)];
        let spline = CubicSpline::from_slices(&times, &x, &y).unwrap();
        let p = spline.evaluate(0.5, Derivative::Position).unwrap();
        assert!((p.x.re - plain.evaluate(0.5, Derivative::Position).unwrap().x).abs() < TOL);
        assert!(p.x.eps.is_finite() && p.x.eps != 0.0);
        assert_eq!(p.y.eps, 0.0);
        assert!(spline.coefficients_x().iter().any(|c| c.eps != 0.0));

        // forward-mode tangent agrees with a central difference
        let h = 1e-6;
        let up = CubicSpline::from_slices(&times, &[0.0, 1.0 + h, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        let down = CubicSpline::from_slices(&times, &[0.0, 1.0 - h, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        let fd = (up.evaluate(0.5, Derivative::Position).unwrap().x
            - down.evaluate(0.5, Derivative::Position).unwrap().x)
            / (2.0 * h);
        assert!((fd - p.x.eps).abs() < 1e-6);
    }

    #[test]
    fn test_real_part_matches_plain_spline() {
        let times = [0.0, 1.0, 2.0];
        let x = [Dual64::from(0.0), Dual64::new(1.0, 1.0), Dual64::from(0.0)];
        let y = [Dual64::from(0.0), Dual64::from(1.0), Dual64::new(0.0, -2.0)];
        let dual = CubicSpline::from_slices(&times, &x, &y).unwrap();
        let plain = CubicSpline::from_slices(&times, &[0.0, 1.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        let real = dual.re();
        for t in [0.0, 0.3, 1.0, 1.7, 2.0] {
            let a = real.evaluate(t, Derivative::Position).unwrap();
            let b = plain.evaluate(t, Derivative::Position).unwrap();
            assert!((a.x - b.x).abs() < TOL && (a.y - b.y).abs() < TOL);
        }
        assert_eq!(real.knot_times(), dual.knot_times());
    }
}
