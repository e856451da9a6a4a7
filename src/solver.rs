//! Stopping rules and the driver loop
//!
//! A [`Solver`] runs any [`Iteration`] until the stationarity measure
//! $`\|r\|_\infty/\gamma`$ drops below a tolerance or the iteration budget
//! runs out, optionally logging a trace line every few steps. A finished
//! [`Solution`] keeps the final state, so a run can be resumed later
//! without starting over.

use crate::error::Result;
use crate::iteration::{Iterates, Iteration, IterationState};
use crate::sequence::Sequence;
use crate::Real;
use ndarray::prelude::*;

/// How a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The stationarity measure is within the tolerance
    Converged,
    /// The iteration budget ran out first
    MaxIterations,
}

/// Outcome of a run
#[derive(Clone, Debug)]
pub struct Solution<S, T> {
    /// The solution estimate of the final state
    pub x: Array1<S>,
    /// Total number of steps, including those of earlier runs when resumed
    pub iterations: usize,
    pub termination: Termination,
    /// The final state, to resume from
    pub state: T,
}

impl<S, T> Solution<S, T> {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// Driver configuration
#[derive(Clone, Debug)]
pub struct Solver<S> {
    tolerance: S,
    max_iterations: usize,
    verbose: bool,
    frequency: usize,
}

impl Default for Solver<f64> {
    fn default() -> Self {
        Solver::new(1e-8)
    }
}

impl Default for Solver<f32> {
    fn default() -> Self {
        Solver::new(1e-4)
    }
}

impl<S: Real> Solver<S> {
    pub fn new(tolerance: S) -> Solver<S> {
        Solver {
            tolerance,
            max_iterations: 1000,
            verbose: false,
            frequency: 10,
        }
    }

    pub fn with_tolerance(mut self, tolerance: S) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Steps allowed per call of [`solve`](Solver::solve) or [`resume`](Solver::resume)
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Logs `iteration | gamma | stationarity` at info level
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Steps between two trace lines
    pub fn with_frequency(mut self, frequency: usize) -> Self {
        self.frequency = frequency;
        self
    }

    /// Runs `iteration` from its initial point
    pub fn solve<I>(&self, iteration: &I) -> Result<Solution<S, I::State>>
    where
        I: Iteration<Scalar = S>,
    {
        let iterates = Iterates::new(iteration)?;
        self.drive(iterates, 0)
    }

    /// Continues an earlier run for up to `max_iterations` further steps
    ///
    /// A solution that already meets the tolerance comes back unchanged.
    pub fn resume<I>(&self, iteration: &I, solution: Solution<S, I::State>) -> Result<Solution<S, I::State>>
    where
        I: Iteration<Scalar = S>,
    {
        let offset = solution.iterations;
        let iterates = Iterates::resume(iteration, solution.state, offset);
        self.drive(iterates, offset)
    }

    fn drive<I>(&self, iterates: Iterates<'_, I>, offset: usize) -> Result<Solution<S, I::State>>
    where
        I: Iteration<Scalar = S>,
    {
        let tolerance = self.tolerance;
        let states = iterates
            .halt(|s| s.stationarity() <= tolerance)
            .take(self.max_iterations.saturating_add(1));
        let (iterations, state) = if self.verbose {
            log::info!("{:>6} | {:>9} | {:>9}", "it", "gamma", "|res|/gamma");
            states
                .enumerate()
                .sample(self.frequency)
                .tee(|k, s| log::info!("{:6} | {:.3e} | {:.3e}", offset + k, s.gamma(), s.stationarity()))
                .run()?
        } else {
            states.run()?
        };

        let stationarity = state.stationarity();
        let termination = if stationarity <= tolerance {
            Termination::Converged
        } else {
            log::warn!(
                "maximum number of iterations reached: iterations={}, |res|/gamma={:.3e}",
                iterations,
                stationarity
            );
            Termination::MaxIterations
        };
        if self.verbose {
            log::info!("{:6} | {:.3e} | {:.3e}", iterations, state.gamma(), stationarity);
        }
        Ok(Solution {
            x: state.solution().to_owned(),
            iterations,
            termination,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fixtures::{lasso_objective, small_lasso, spectral_norm, LeastSquares, NormL1};
    use crate::oracle::ProxFn;
    use crate::prox::{ForwardBackward, LiLin, Panoc, ZeroFpr};
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand::rngs::StdRng;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;

    fn lasso_panoc() -> Panoc<f64, LeastSquares<f64>, NormL1<f64>, Array2<f64>> {
        let (A, b, lambda) = small_lasso::<f64>();
        let gamma = 0.95 / spectral_norm(&A).powi(2);
        Panoc::new(LeastSquares::new(Array2::eye(4), b), NormL1::new(lambda), Array1::zeros(5))
            .with_linear_map(A)
            .with_gamma(gamma)
    }

    #[test]
    fn stops_at_first_stationary_state() {
        let panoc = lasso_panoc();
        let solver = Solver::default().with_tolerance(1e-6);
        let solution = solver.solve(&panoc).unwrap();
        assert!(solution.converged());
        assert_eq!(solution.x, solution.state.solution());

        // no earlier state meets the tolerance
        let mut first = None;
        Iterates::new(&panoc)
            .unwrap()
            .take(solution.iterations + 1)
            .tee(|k, s| {
                if first.is_none() && s.stationarity() <= 1e-6 {
                    first = Some(k);
                }
            })
            .run()
            .unwrap();
        assert_eq!(first, Some(solution.iterations));
    }

    #[test]
    fn resume_after_convergence_is_idempotent() {
        let panoc = lasso_panoc();
        let solver = Solver::default();
        let solution = solver.solve(&panoc).unwrap();
        let (k, x) = (solution.iterations, solution.x.clone());
        let resumed = solver.resume(&panoc, solution).unwrap();
        assert_eq!(resumed.iterations, k);
        assert_eq!(resumed.termination, Termination::Converged);
        assert!(resumed.x == x);
    }

    #[test]
    fn resume_continues_counting() {
        let (A, b, lambda) = small_lasso::<f64>();
        let fb = ForwardBackward::new(LeastSquares::new(Array2::eye(4), b.clone()), NormL1::new(lambda), Array1::zeros(5))
            .with_linear_map(A.clone());
        let solver = Solver::default().with_max_iterations(20);
        let partial = solver.solve(&fb).unwrap();
        assert_eq!(partial.termination, Termination::MaxIterations);
        assert_eq!(partial.iterations, 20);

        let solution = solver.with_max_iterations(5000).resume(&fb, partial).unwrap();
        assert!(solution.converged());
        assert!(solution.iterations > 20);
        assert_abs_diff_eq!(lasso_objective(&A, &b, lambda, solution.x.view()), 7.2757727891, epsilon = 1e-6);
    }

    #[test]
    fn infeasible_start_is_reported() {
        let g = ProxFn::new(
            |x: ArrayView1<f64>| if x[0] >= 0.0 { 0.0 } else { std::f64::INFINITY },
            |x: ArrayView1<f64>, _gamma: f64| {
                let mut x = x.to_owned();
                x[0] = x[0].max(0.0);
                x
            },
        );
        let f = LeastSquares::new(Array2::eye(2), array![1.0, 1.0]);
        let zerofpr = ZeroFpr::new(f, g, array![-1.0, 0.0]);
        assert!(matches!(Solver::default().solve(&zerofpr), Err(Error::InfeasibleStart { .. })));
    }

    #[test]
    fn verbose_trace_matches_quiet_run() {
        let panoc = lasso_panoc();
        let quiet = Solver::default().solve(&panoc).unwrap();
        let loud = Solver::default()
            .with_verbose(true)
            .with_frequency(3)
            .solve(&panoc)
            .unwrap();
        assert_eq!(quiet.iterations, loud.iterations);
        assert!(quiet.x == loud.x);
    }

    #[test]
    fn single_precision() {
        let (A, b, lambda) = small_lasso::<f32>();
        let lilin = LiLin::new(LeastSquares::new(Array2::eye(4), b), NormL1::new(lambda), Array1::zeros(5))
            .with_linear_map(A);
        let solution = Solver::<f32>::default()
            .with_tolerance(1e-3)
            .with_max_iterations(5000)
            .solve(&lilin)
            .unwrap();
        assert!(solution.converged());
        assert!(solution.state.stationarity() <= 1e-3);
    }

    #[test]
    fn random_lasso() {
        let mut rng = StdRng::seed_from_u64(42);
        let A = Array::random_using((20, 10), Normal::new(0., 1.).unwrap(), &mut rng);
        let b = Array::random_using(20, Normal::new(0., 1.).unwrap(), &mut rng);
        let lambda = 0.1 * crate::linop::norm_inf(A.t().dot(&b).view());
        let f = LeastSquares::new(Array2::eye(20), b.clone());
        let g = NormL1::new(lambda);

        let panoc = Panoc::new(&f, &g, Array1::zeros(10)).with_linear_map(&A);
        let fb = ForwardBackward::new(&f, &g, Array1::zeros(10)).with_linear_map(&A);
        let solver = Solver::default().with_max_iterations(50000);
        let fast = solver.solve(&panoc).unwrap();
        let slow = solver.solve(&fb).unwrap();
        assert!(fast.converged());
        assert!(slow.converged());
        assert!(fast.iterations < slow.iterations);
        assert_abs_diff_eq!(fast.x, slow.x, epsilon = 1e-5);
        assert_abs_diff_eq!(
            lasso_objective(&A, &b, lambda, fast.x.view()),
            lasso_objective(&A, &b, lambda, slow.x.view()),
            epsilon = 1e-8
        );
    }
}
