//! The `ndarray-proximal` crate provides proximal splitting algorithms
//! for minimizing composite functions of an `ndarray`,
//! ```math
//! \min_x \; f(Ax) + g(x)
//! ```
//! where $`f`$ is smooth and $`g`$ has an inexpensive proximal mapping.
//!
//! It includes:
//! - Forward-backward splitting, with FISTA extrapolation and restarts
//! - PANOC and ZeroFPR, forward-backward accelerated by L-BFGS directions
//! - Douglas-Rachford splitting and its line search variant DRLS
//! - The nonmonotone accelerated scheme of Li and Lin for nonconvex problems
//!
//! Every algorithm is a state machine behind the [`Iteration`] trait. Its
//! states form a lazy [`Sequence`] that is driven with adapters such as
//! `halt`, `take`, `sample` and `tee`, or by a [`Solver`] that stops on the
//! stationarity measure $`\|r\|_\infty/\gamma`$ and can resume earlier runs.
//!
//! ```ignore
//! let panoc = Panoc::new(f, g, Array1::zeros(n)).with_linear_map(A);
//! let solution = Solver::default().with_tolerance(1e-6).solve(&panoc)?;
//! ```
//!
//! The crate does not install a logger. Stepsize reductions and exhausted
//! line searches are reported at debug level through the `log` facade, and
//! a verbose [`Solver`] writes its trace at info level.

#![cfg_attr(all(rustc_nightly, test), feature(test))]
#[cfg(all(rustc_nightly, test))]
extern crate test;

pub mod direction;
mod error;
pub mod fbe;
pub mod iteration;
pub mod linop;
pub mod oracle;
pub mod prox;
pub mod sequence;
pub mod solver;
pub mod stepsize;

#[cfg(test)]
mod fixtures;

pub use direction::{Directions, Lbfgs, Noaccel};
pub use error::{Error, Result};
pub use iteration::{Iterates, Iteration, IterationState};
pub use linop::Real;
pub use sequence::Sequence;
pub use solver::{Solution, Solver, Termination};
