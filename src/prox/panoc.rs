//! Proximal averaged Newton-type method for optimal control (PANOC)
#![allow(non_snake_case)]

use super::{check_backtracks, check_open, initial_point, interpolate, merit_tolerance};
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

/// Forward-backward splitting accelerated by quasi-Newton directions
///
/// Minimizes $`f(Ax) + g(x)`$ for $`L`$-smooth $`f`$ and prox-friendly $`g`$
/// [\[STP18\]](#references). Each step moves along the convex combination
/// of a quasi-Newton step on the fixed-point residual and the plain
/// forward-backward step, with the forward-backward envelope
/// $`\varphi_\gamma`$ as merit function.
///
/// Algorithm
/// ---------
/// ```math
/// \begin{aligned}
/// r_k &= x_k - \mathrm{prox}_{\gamma g}(x_k - \gamma A^H\nabla f(Ax_k)) \\
/// d_k &= -H_kr_k \\
/// x_{k+1} &= \tau_k(x_k + d_k) + (1 - \tau_k)(x_k - r_k)
/// \end{aligned}
/// ```
/// with $`\tau_k`$ the first of $`1, \frac{1}{2}, \frac{1}{4}, ...`$ such that
/// ```math
/// \varphi_\gamma(x_{k+1}) \le \varphi_\gamma(x_k) - \frac{\sigma(1 - \alpha)}{2\gamma}\|r_k\|^2
/// ```
/// The last trial uses $`\tau = 0`$, a forward-backward step.
///
/// Parameters
/// ----------
/// - __gamma:__          stepsize, estimated when absent which makes the run adaptive
/// - __alpha:__          in (0, 1), $`\gamma = \alpha/L`$ for an estimated stepsize (0.95)
/// - __sigma:__          in (0, 1), sufficient decrease of the line search (0.5)
/// - __max_backtracks:__ line search trials per step, at least 2 (10)
/// - __directions:__     quasi-Newton engine, L-BFGS with memory 5
///
/// References
/// ----------
/// \[STP18\]: [ Stella, L., Themelis, A., Sopasakis, P. & Patrinos, P.
///      "A simple and efficient algorithm for nonlinear model predictive control",
///         56th IEEE Conference on Decision and Control (2017)](https://doi.org/10.1109/CDC.2017.8263933)
#[derive(Clone, Debug)]
pub struct Panoc<S, F, G, M = Identity, D = Lbfgs<S>> {
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

impl<S: Real, F, G> Panoc<S, F, G> {
    pub fn new(f: F, g: G, x0: Array1<S>) -> Panoc<S, F, G> {
        Panoc {
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

impl<S: Real, F, G, M> Panoc<S, F, G, M, Lbfgs<S>> {
    pub fn with_memory(mut self, memory: usize) -> Self {
        self.directions = Lbfgs::new(memory);
        self
    }
}

impl<S: Real, F, G, M, D> Panoc<S, F, G, M, D> {
    pub fn with_linear_map<M2>(self, A: M2) -> Panoc<S, F, G, M2, D> {
        Panoc {
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

    pub fn with_directions<D2>(self, directions: D2) -> Panoc<S, F, G, M, D2> {
        Panoc {
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
pub struct PanocState<S, D> {
    point: ForwardBackwardPoint<S>,
    H: D,
    tau: S,
    fbe: S,
    d: Array1<S>,
    ad: Array1<S>,
    x_d: Array1<S>,
    ax_d: Array1<S>,
    x_prev: Array1<S>,
    res_prev: Array1<S>,
    z_curr: Array1<S>,
    az: Array1<S>,
}

impl<S: Real, D> PanocState<S, D> {
    pub fn point(&self) -> &ForwardBackwardPoint<S> {
        &self.point
    }

    pub fn x(&self) -> ArrayView1<'_, S> {
        self.point.x()
    }

    pub fn z(&self) -> ArrayView1<'_, S> {
        self.point.z()
    }

    /// Step length accepted by the last line search
    pub fn tau(&self) -> S {
        self.tau
    }

    /// Forward-backward envelope at `x`
    pub fn fbe(&self) -> S {
        self.fbe
    }

    pub fn directions(&self) -> &D {
        &self.H
    }
}

impl<S: Real, D> IterationState<S> for PanocState<S, D> {
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

impl<S, F, G, M, D> Iteration for Panoc<S, F, G, M, D>
where
    S: Real,
    F: Smooth<S>,
    G: Proximable<S>,
    M: LinearMap<S>,
    D: Directions<S> + Clone,
{
    type Scalar = S;
    type State = PanocState<S, D>;

    fn start(&self) -> Result<PanocState<S, D>> {
        check_open("sigma", self.sigma, S::zero(), S::one())?;
        check_backtracks(self.max_backtracks)?;
        self.directions.validate()?;
        let point = initial_point(&self.f, &self.A, &self.g, &self.x0, self.gamma, self.alpha)?;
        let mut H = self.directions.clone();
        H.reset();
        let n = self.x0.len();
        let m = point.ax.len();
        Ok(PanocState {
            H,
            tau: S::one(),
            fbe: point.envelope(),
            d: Array1::zeros(n),
            ad: Array1::zeros(m),
            x_d: Array1::zeros(n),
            ax_d: Array1::zeros(m),
            x_prev: Array1::zeros(n),
            res_prev: Array1::zeros(n),
            z_curr: Array1::zeros(n),
            az: Array1::zeros(m),
            point,
        })
    }

    fn step(&self, state: &mut PanocState<S, D>) -> Result<()> {
        let gamma = state.point.gamma;
        if self.is_adaptive() {
            backtrack(&self.f, &self.A, &self.g, &mut state.point, state.az.view_mut())?;
            if state.point.gamma < gamma {
                state.H.reset();
            }
        } else {
            self.A.apply_mut(state.az.view_mut(), state.point.z.view());
        }
        let p = &mut state.point;
        let fbe = p.envelope();

        // quasi-Newton direction from the committed pairs only
        Zip::from(&mut state.d)
            .and(&p.res)
            .for_each(|d, &r| *d = -r);
        state.H.apply_mut(state.d.view_mut());

        state.x_prev.assign(&p.x);
        state.res_prev.assign(&p.res);
        state.z_curr.assign(&p.z);
        Zip::from(&mut state.x_d)
            .and(&p.x)
            .and(&state.d)
            .for_each(|xd, &x, &d| *xd = x + d);
        self.A.apply_mut(state.ad.view_mut(), state.d.view());
        Zip::from(&mut state.ax_d)
            .and(&p.ax)
            .and(&state.ad)
            .for_each(|axd, &ax, &ad| *axd = ax + ad);

        let two = S::one() + S::one();
        let sigma = self.sigma * (S::one() - self.alpha) / (two * p.gamma);
        let threshold = fbe - sigma * state.res_prev.dot(&state.res_prev) + merit_tolerance(fbe);

        let mut tau = S::one();
        p.x.assign(&state.x_d);
        p.ax.assign(&state.ax_d);
        for k in 1..=self.max_backtracks {
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
            interpolate(p.x.view_mut(), tau, state.x_d.view(), state.z_curr.view());
            interpolate(p.ax.view_mut(), tau, state.ax_d.view(), state.az.view());
        }

        state.H.update(p.x.view(), state.x_prev.view(), p.res.view(), state.res_prev.view());
        state.tau = tau;
        state.fbe = p.envelope();
        Ok(())
    }
}
