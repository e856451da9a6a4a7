//! Failure conditions of the iterations

use thiserror::Error;

/// Fatal conditions that end a run.
///
/// Exhausting a line search or the iteration budget is not an error:
/// the former falls back to a plain forward-backward step, the latter is
/// reported through [`Termination`](crate::solver::Termination).
#[derive(Debug, Error)]
pub enum Error {
    /// The objective is not finite at the initial point, no step was taken.
    #[error("objective value {value} at the initial point is not finite")]
    InfeasibleStart { value: f64 },

    /// Halving the stepsize never produced a quadratic upper bound of the
    /// smooth term, which is then not locally Lipschitz smooth.
    #[error("stepsize backtracking failed after {attempts} halvings (gamma = {gamma:e})")]
    LipschitzEstimationFailure { attempts: usize, gamma: f64 },

    /// A parameter of the iteration is outside of its domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
