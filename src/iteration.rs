//! The step protocol shared by all algorithms
//!
//! An [`Iteration`] is an immutable problem description: the terms, the
//! linear map, the initial point and the tuning parameters. Each run owns
//! one state, created by [`Iteration::start`] and advanced in place by
//! [`Iteration::step`]. [`Iterates`] turns the pair into a [`Sequence`].

use crate::error::{Error, Result};
use crate::linop::norm_inf;
use crate::sequence::Sequence;
use crate::Real;
use ndarray::prelude::*;

/// Quantities every algorithm state exposes for monitoring
pub trait IterationState<S: Real> {
    /// Current stepsize
    fn gamma(&self) -> S;

    /// Fixed-point residual, zero exactly at solutions
    fn residual(&self) -> ArrayView1<'_, S>;

    /// Best available estimate of the minimizer
    fn solution(&self) -> ArrayView1<'_, S>;

    /// Stationarity measure $`\|r\|_\infty / \gamma`$
    fn stationarity(&self) -> S {
        norm_inf(self.residual()) / self.gamma()
    }
}

/// An algorithm as a state machine
pub trait Iteration {
    type Scalar: Real;
    type State: IterationState<Self::Scalar>;

    /// Validates the parameters and evaluates the oracles at the initial point
    fn start(&self) -> Result<Self::State>;

    /// Advances the state by one iteration
    fn step(&self, state: &mut Self::State) -> Result<()>;
}

/// The states of a run: the initial state at position 0, then one per step
pub struct Iterates<'a, I: Iteration> {
    iteration: &'a I,
    state: I::State,
    position: usize,
    fresh: bool,
    error: Option<Error>,
}

impl<'a, I: Iteration> Iterates<'a, I> {
    /// Starts a new run, failing before any step if the start is infeasible
    pub fn new(iteration: &'a I) -> Result<Iterates<'a, I>> {
        let state = iteration.start()?;
        Ok(Iterates::resume(iteration, state, 0))
    }

    /// Continues a run from a state already `position` steps in
    ///
    /// The given state is yielded again first, so a stopping predicate it
    /// already satisfies ends the run without stepping.
    pub fn resume(iteration: &'a I, state: I::State, position: usize) -> Iterates<'a, I> {
        Iterates {
            iteration,
            state,
            position,
            fresh: true,
            error: None,
        }
    }
}

impl<'a, I: Iteration> Sequence for Iterates<'a, I> {
    type State = I::State;

    fn next_state(&mut self) -> Option<(usize, &I::State)> {
        if self.error.is_some() {
            return None;
        }
        if self.fresh {
            self.fresh = false;
        } else {
            if let Err(err) = self.iteration.step(&mut self.state) {
                log::error!("iteration {} failed: {}", self.position + 1, err);
                self.error = Some(err);
                return None;
            }
            self.position += 1;
        }
        Some((self.position, &self.state))
    }

    fn finish(self) -> Result<(usize, I::State)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok((self.position, self.state)),
        }
    }
}
