//! Douglas-Rachford splitting

use super::{check_gamma, check_open};
use crate::error::Result;
use crate::iteration::{Iteration, IterationState};
use crate::oracle::{ensure_finite, Proximable};
use crate::Real;
use ndarray::prelude::*;
use ndarray::Zip;

/// Douglas-Rachford splitting for $`f(x) + g(x)`$, both prox-friendly
///
/// Algorithm
/// ---------
/// ```math
/// \begin{aligned}
/// y_k &= \mathrm{prox}_{\gamma f}(x_k) \\
/// z_k &= \mathrm{prox}_{\gamma g}(2y_k - x_k) \\
/// x_{k+1} &= x_k + \lambda(z_k - y_k)
/// \end{aligned}
/// ```
/// The state at position $`k`$ holds $`y_k, z_k`$ and the already updated
/// $`x_{k+1}`$. The iterates $`y_k`$ converge to a minimizer.
///
/// Parameters
/// ----------
/// - __gamma:__  stepsize, any positive value
/// - __lambda:__ relaxation in (0, 2), 1 by default
#[derive(Clone, Debug)]
pub struct DouglasRachford<S, F, G> {
    f: F,
    g: G,
    x0: Array1<S>,
    gamma: S,
    lambda: S,
}

impl<S: Real, F, G> DouglasRachford<S, F, G> {
    pub fn new(f: F, g: G, x0: Array1<S>, gamma: S) -> DouglasRachford<S, F, G> {
        DouglasRachford {
            f,
            g,
            x0,
            gamma,
            lambda: S::one(),
        }
    }

    pub fn with_gamma(mut self, gamma: S) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_lambda(mut self, lambda: S) -> Self {
        self.lambda = lambda;
        self
    }
}

#[derive(Clone, Debug)]
pub struct DouglasRachfordState<S> {
    x: Array1<S>,
    y: Array1<S>,
    r: Array1<S>,
    z: Array1<S>,
    res: Array1<S>,
    f_y: S,
    g_z: S,
    gamma: S,
}

impl<S: Real> DouglasRachfordState<S> {
    pub fn x(&self) -> ArrayView1<'_, S> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView1<'_, S> {
        self.y.view()
    }

    pub fn z(&self) -> ArrayView1<'_, S> {
        self.z.view()
    }

    /// $`f(y) + g(z)`$
    pub fn objective(&self) -> S {
        self.f_y + self.g_z
    }

    fn update<F, G>(&mut self, f: &F, g: &G, lambda: S)
    where
        F: Proximable<S>,
        G: Proximable<S>,
    {
        let two = S::one() + S::one();
        self.f_y = f.prox_mut(self.y.view_mut(), self.x.view(), self.gamma);
        Zip::from(&mut self.r)
            .and(&self.y)
            .and(&self.x)
            .for_each(|r, &y, &x| *r = two * y - x);
        self.g_z = g.prox_mut(self.z.view_mut(), self.r.view(), self.gamma);
        Zip::from(&mut self.res)
            .and(&self.y)
            .and(&self.z)
            .for_each(|res, &y, &z| *res = y - z);
        self.x.scaled_add(-lambda, &self.res);
    }
}

impl<S: Real> IterationState<S> for DouglasRachfordState<S> {
    fn gamma(&self) -> S {
        self.gamma
    }

    fn residual(&self) -> ArrayView1<'_, S> {
        self.res.view()
    }

    fn solution(&self) -> ArrayView1<'_, S> {
        self.y.view()
    }
}

impl<S, F, G> Iteration for DouglasRachford<S, F, G>
where
    S: Real,
    F: Proximable<S>,
    G: Proximable<S>,
{
    type Scalar = S;
    type State = DouglasRachfordState<S>;

    fn start(&self) -> Result<DouglasRachfordState<S>> {
        check_gamma(Some(self.gamma))?;
        check_open("lambda", self.lambda, S::zero(), S::one() + S::one())?;
        let n = self.x0.len();
        let mut state = DouglasRachfordState {
            x: self.x0.clone(),
            y: Array1::zeros(n),
            r: Array1::zeros(n),
            z: Array1::zeros(n),
            res: Array1::zeros(n),
            f_y: S::zero(),
            g_z: S::zero(),
            gamma: self.gamma,
        };
        state.update(&self.f, &self.g, self.lambda);
        ensure_finite(state.objective())?;
        Ok(state)
    }

    fn step(&self, state: &mut DouglasRachfordState<S>) -> Result<()> {
        state.update(&self.f, &self.g, self.lambda);
        Ok(())
    }
}
