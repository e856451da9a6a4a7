//! ZeroFPR: quasi-Newton steps from the forward-backward point
#![allow(non_snake_case)]

use super::{check_backtracks, check_open, initial_point, merit_tolerance};
use crate::direction::{Directions, Lbfgs};
use crate::error::Result;
use crate::fbe::ForwardBackwardPoint;
use crate::iteration::{Iteration, IterationState};
use crate::linop::{Identity, LinearMap};
use crate::oracle::{Proximable, Smooth};
use crate::stepsize::backtrack;
use crate::Real;
use ndarray::prelude::*;
use ndarray::Zip;

/// Forward-backward splitting with quasi-Newton steps on the residual,
/// taken from the forward-backward point [\[TSP18\]](#references)
///
/// Algorithm
/// ---------
/// ```math
/// \begin{aligned}
/// \bar x_k &= \mathrm{prox}_{\gamma g}(x_k - \gamma A^H\nabla f(Ax_k)) \\
/// d_k &= -H_k r(\bar x_k) \\
/// x_{k+1} &= \bar x_k + \tau_k d_k
/// \end{aligned}
/// ```
/// with $`\tau_k`$ the first of $`1, \frac{1}{2}, \frac{1}{4}, ...`$
/// decreasing the forward-backward envelope like [`Panoc`](super::Panoc)
/// does, the last trial being $`\tau = 0`$. Curvature pairs are formed
/// from consecutive $`\bar x_k`$ and their residuals.
///
/// Parameters
/// ----------
/// Same as [`Panoc`](super::Panoc).
///
/// References
/// ----------
/// \[TSP18\]: [ Themelis, A., Stella, L. & Patrinos, P.
///      "Forward-backward envelope for the sum of two nonconvex functions:
///         Further properties and nonmonotone linesearch algorithms",
///         SIAM Journal on Optimization, 28(3), 2274–2303 (2018)](https://doi.org/10.1137/16M1080240)
#[derive(Clone, Debug)]
pub struct ZeroFpr<S, F, G, M = Identity, D = Lbfgs<S>> {
    f: F,
    g: G,
    A: M,
    x0: Array1<S>,
    gamma: Option<S>,
    alpha: S,
    sigma: S,
    adaptive: bool,
    max_backtracks: usize,
    directions: D,
}

impl<S: Real, F, G> ZeroFpr<S, F, G> {
    pub fn new(f: F, g: G, x0: Array1<S>) -> ZeroFpr<S, F, G> {
        ZeroFpr {
            f,
            g,
            A: Identity,
            x0,
            gamma: None,
            alpha: S::from(0.95).unwrap(),
            sigma: S::from(0.5).unwrap(),
            adaptive: false,
            max_backtracks: 10,
            directions: Lbfgs::new(5),
        }
    }
}

impl<S: Real, F, G, M> ZeroFpr<S, F, G, M, Lbfgs<S>> {
    pub fn with_memory(mut self, memory: usize) -> Self {
        self.directions = Lbfgs::new(memory);
        self
    }
}

impl<S: Real, F, G, M, D> ZeroFpr<S, F, G, M, D> {
    pub fn with_linear_map<M2>(self, A: M2) -> ZeroFpr<S, F, G, M2, D> {
        ZeroFpr {
            f: self.f,
            g: self.g,
            A,
            x0: self.x0,
            gamma: self.gamma,
            alpha: self.alpha,
            sigma: self.sigma,
            adaptive: self.adaptive,
            max_backtracks: self.max_backtracks,
            directions: self.directions,
        }
    }

    pub fn with_directions<D2>(self, directions: D2) -> ZeroFpr<S, F, G, M, D2> {
        ZeroFpr {
            f: self.f,
            g: self.g,
            A: self.A,
            x0: self.x0,
            gamma: self.gamma,
            alpha: self.alpha,
            sigma: self.sigma,
            adaptive: self.adaptive,
            max_backtracks: self.max_backtracks,
            directions,
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

    pub fn with_sigma(mut self, sigma: S) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn with_max_backtracks(mut self, max_backtracks: usize) -> Self {
        self.max_backtracks = max_backtracks;
        self
    }

    fn is_adaptive(&self) -> bool {
        self.adaptive || self.gamma.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct ZeroFprState<S, D> {
    point: ForwardBackwardPoint<S>,
    // forward-backward step taken from point.z
    bar: ForwardBackwardPoint<S>,
    H: D,
    has_prev: bool,
    tau: S,
    fbe: S,
    d: Array1<S>,
    ad: Array1<S>,
    xbar_prev: Array1<S>,
    res_xbar_prev: Array1<S>,
}

impl<S: Real, D> ZeroFprState<S, D> {
    pub fn point(&self) -> &ForwardBackwardPoint<S> {
        &self.point
    }

    pub fn x(&self) -> ArrayView1<'_, S> {
        self.point.x()
    }

    /// The forward-backward point $`\bar x`$
    pub fn xbar(&self) -> ArrayView1<'_, S> {
        self.point.z()
    }

    pub fn tau(&self) -> S {
        self.tau
    }

    pub fn fbe(&self) -> S {
        self.fbe
    }

    pub fn directions(&self) -> &D {
        &self.H
    }
}

impl<S: Real, D> IterationState<S> for ZeroFprState<S, D> {
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

impl<S, F, G, M, D> Iteration for ZeroFpr<S, F, G, M, D>
where
    S: Real,
    F: Smooth<S>,
    G: Proximable<S>,
    M: LinearMap<S>,
    D: Directions<S> + Clone,
{
    type Scalar = S;
    type State = ZeroFprState<S, D>;

    fn start(&self) -> Result<ZeroFprState<S, D>> {
        check_open("sigma", self.sigma, S::zero(), S::one())?;
        check_backtracks(self.max_backtracks)?;
        self.directions.validate()?;
        let point = initial_point(&self.f, &self.A, &self.g, &self.x0, self.gamma, self.alpha)?;
        let mut H = self.directions.clone();
        H.reset();
        let n = self.x0.len();
        Ok(ZeroFprState {
            bar: point.clone(),
            H,
            has_prev: false,
            tau: S::one(),
            fbe: point.envelope(),
            d: Array1::zeros(n),
            ad: Array1::zeros(point.ax.len()),
            xbar_prev: Array1::zeros(n),
            res_xbar_prev: Array1::zeros(n),
            point,
        })
    }

    fn step(&self, state: &mut ZeroFprState<S, D>) -> Result<()> {
        let gamma = state.point.gamma;
        if self.is_adaptive() {
            backtrack(&self.f, &self.A, &self.g, &mut state.point, state.bar.ax.view_mut())?;
            if state.point.gamma < gamma {
                state.H.reset();
                state.has_prev = false;
            }
        } else {
            self.A.apply_mut(state.bar.ax.view_mut(), state.point.z.view());
        }
        let p = &mut state.point;
        let bar = &mut state.bar;
        let fbe = p.envelope();

        // residual at xbar
        bar.x.assign(&p.z);
        bar.gamma = p.gamma;
        bar.gradient_at_image(&self.f, &self.A);
        bar.forward_backward(&self.g);

        if state.has_prev {
            state.H.update(
                bar.x.view(),
                state.xbar_prev.view(),
                bar.res.view(),
                state.res_xbar_prev.view(),
            );
        }
        Zip::from(&mut state.d)
            .and(&bar.res)
            .for_each(|d, &r| *d = -r);
        state.H.apply_mut(state.d.view_mut());
        state.xbar_prev.assign(&bar.x);
        state.res_xbar_prev.assign(&bar.res);
        state.has_prev = true;
        self.A.apply_mut(state.ad.view_mut(), state.d.view());

        let two = S::one() + S::one();
        let sigma = self.sigma * (S::one() - self.alpha) / (two * p.gamma);
        let threshold = fbe - sigma * p.res.dot(&p.res) + merit_tolerance(fbe);

        let mut tau = S::one();
        for k in 1..=self.max_backtracks {
            Zip::from(&mut p.x)
                .and(&bar.x)
                .and(&state.d)
                .for_each(|x, &xbar, &d| *x = xbar + tau * d);
            Zip::from(&mut p.ax)
                .and(&bar.ax)
                .and(&state.ad)
                .for_each(|ax, &axbar, &ad| *ax = axbar + tau * ad);
            p.gradient_at_image(&self.f, &self.A);
            p.forward_backward(&self.g);
            if p.envelope() <= threshold {
                break;
            }
            if k == self.max_backtracks {
                log::debug!("line search exhausted at tau = {:e}", tau);
                break;
            }
            tau = if k + 1 >= self.max_backtracks {
                S::zero()
            } else {
                tau / two
            };
        }

        state.tau = tau;
        state.fbe = p.envelope();
        Ok(())
    }
}
