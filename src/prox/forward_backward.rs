//! Forward-backward splitting and its fast variant
#![allow(non_snake_case)]

use super::initial_point;
use crate::error::Result;
use crate::fbe::ForwardBackwardPoint;
use crate::iteration::{Iteration, IterationState};
use crate::linop::{Identity, LinearMap};
use crate::oracle::{Proximable, Smooth};
use crate::stepsize::backtrack;
use crate::Real;
use ndarray::prelude::*;
use ndarray::Zip;

/// Proximal gradient method, optionally with Nesterov extrapolation (FISTA)
///
/// Minimizes $`f(Ax) + g(x)`$ for $`L`$-smooth $`f`$ and prox-friendly $`g`$.
///
/// Algorithm
/// ---------
/// ```math
/// \begin{aligned}
/// z_k &= \mathrm{prox}_{\gamma g}(x_k - \gamma A^H\nabla f(Ax_k)) \\
/// \theta_{k+1} &= \frac{1 + \sqrt{1 + 4\theta_k^2}}{2} \\
/// x_{k+1} &= z_k + \frac{\theta_k - 1}{\theta_{k+1}}(z_k - z_{k-1})
/// \end{aligned}
/// ```
/// where the extrapolation is only used with `fast`, otherwise
/// $`x_{k+1} = z_k`$. With `restart` the momentum is reset whenever
/// $`(x_k - z_k)^H(z_k - z_{k-1}) > 0`$ [\[OC15\]](#references).
///
/// Parameters
/// ----------
/// - __gamma:__     stepsize, at most $`1/\|A\|^2L`$. Estimated when absent,
///                    which makes the run adaptive.
/// - __alpha:__     fraction of $`1/L`$ used for an estimated stepsize (0.95)
/// - __adaptive:__  shrink the stepsize by backtracking when needed
/// - __fast:__      use the extrapolation above
/// - __restart:__   adaptive momentum restart, only used with `fast`
///
/// References
/// ----------
/// \[OC15\]: [ O’Donoghue, B. & Candès, E.
///      "Adaptive Restart for Accelerated Gradient Schemes",
///         Foundations of Computational Mathematics, 15, 715–732 (2015)](https://doi.org/10.1007/s10208-013-9150-3)
#[derive(Clone, Debug)]
pub struct ForwardBackward<S, F, G, M = Identity> {
    f: F,
    g: G,
    A: M,
    x0: Array1<S>,
    gamma: Option<S>,
    alpha: S,
    adaptive: bool,
    fast: bool,
    restart: bool,
}

impl<S: Real, F, G> ForwardBackward<S, F, G> {
    pub fn new(f: F, g: G, x0: Array1<S>) -> ForwardBackward<S, F, G> {
        ForwardBackward {
            f,
            g,
            A: Identity,
            x0,
            gamma: None,
            alpha: S::from(0.95).unwrap(),
            adaptive: false,
            fast: false,
            restart: false,
        }
    }
}

impl<S: Real, F, G, M> ForwardBackward<S, F, G, M> {
    pub fn with_linear_map<M2>(self, A: M2) -> ForwardBackward<S, F, G, M2> {
        ForwardBackward {
            f: self.f,
            g: self.g,
            A,
            x0: self.x0,
            gamma: self.gamma,
            alpha: self.alpha,
            adaptive: self.adaptive,
            fast: self.fast,
            restart: self.restart,
        }
    }

    pub fn with_gamma(mut self, gamma: S) -> Self {
        self.gamma = Some(gamma);
        self
    }

    pub fn with_alpha(mut self, alpha: S) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    pub fn with_restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    fn is_adaptive(&self) -> bool {
        self.adaptive || self.gamma.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct ForwardBackwardState<S> {
    point: ForwardBackwardPoint<S>,
    z_prev: Array1<S>,
    az: Array1<S>,
    theta: S,
}

impl<S: Real> ForwardBackwardState<S> {
    pub fn point(&self) -> &ForwardBackwardPoint<S> {
        &self.point
    }

    /// The point the forward-backward step is taken from
    pub fn x(&self) -> ArrayView1<'_, S> {
        self.point.x()
    }

    pub fn z(&self) -> ArrayView1<'_, S> {
        self.point.z()
    }
}

impl<S: Real> IterationState<S> for ForwardBackwardState<S> {
    fn gamma(&self) -> S {
        self.point.gamma
    }

    fn residual(&self) -> ArrayView1<'_, S> {
        self.point.res.view()
    }

    fn solution(&self) -> ArrayView1<'_, S> {
        self.point.z.view()
    }
}

impl<S, F, G, M> Iteration for ForwardBackward<S, F, G, M>
where
    S: Real,
    F: Smooth<S>,
    G: Proximable<S>,
    M: LinearMap<S>,
{
    type Scalar = S;
    type State = ForwardBackwardState<S>;

    fn start(&self) -> Result<ForwardBackwardState<S>> {
        let point = initial_point(&self.f, &self.A, &self.g, &self.x0, self.gamma, self.alpha)?;
        Ok(ForwardBackwardState {
            az: Array1::zeros(point.ax.len()),
            z_prev: self.x0.clone(),
            theta: S::one(),
            point,
        })
    }

    fn step(&self, state: &mut ForwardBackwardState<S>) -> Result<()> {
        if self.is_adaptive() {
            backtrack(&self.f, &self.A, &self.g, &mut state.point, state.az.view_mut())?;
        }
        let point = &mut state.point;
        if self.fast {
            if self.restart {
                let uphill = Zip::from(&point.res)
                    .and(&point.z)
                    .and(&state.z_prev)
                    .fold(S::zero(), |acc, &r, &z, &zp| acc + r * (z - zp));
                if uphill > S::zero() {
                    state.theta = S::one();
                }
            }
            let two = S::one() + S::one();
            let four = two * two;
            let theta = state.theta;
            let theta_next = (S::one() + (S::one() + four * theta * theta).sqrt()) / two;
            let beta = (theta - S::one()) / theta_next;
            Zip::from(&mut point.x)
                .and(&point.z)
                .and(&state.z_prev)
                .for_each(|x, &z, &zp| *x = z + beta * (z - zp));
            state.z_prev.assign(&point.z);
            state.theta = theta_next;
        } else {
            point.x.assign(&point.z);
        }
        point.evaluate(&self.f, &self.A);
        point.forward_backward(&self.g);
        Ok(())
    }
}
