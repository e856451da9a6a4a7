//! Douglas-Rachford line search (DRLS)

use super::{check_backtracks, check_gamma, check_open, interpolate, merit_tolerance};
use crate::direction::{Directions, Lbfgs};
use crate::error::Result;
use crate::iteration::{Iteration, IterationState};
use crate::oracle::{ensure_finite, Proximable};
use crate::Real;
use ndarray::prelude::*;
use ndarray::Zip;

/// Douglas-Rachford splitting accelerated by quasi-Newton directions
///
/// Writes the Douglas-Rachford update as the fixed-point map
/// $`\bar x = T(x)`$ and moves along $`d = H(\bar x - x)`$, with the
/// Douglas-Rachford envelope [\[TP18\]](#references)
/// ```math
/// \varphi_\gamma(x) = f(u) + g(v) - \frac{1}{\gamma}\langle x - u, u - v\rangle + \frac{1}{2\gamma}\|u - v\|^2
/// ```
/// as merit function, where $`u = \mathrm{prox}_{\gamma f}(x)`$ and
/// $`v = \mathrm{prox}_{\gamma g}(2u - x)`$. The envelope is only a merit
/// function when $`f`$ is smooth and $`\gamma < 1/L`$.
///
/// The line search tries $`x + \tau d`$ blended towards $`\bar x`$ for
/// $`\tau = 1, \frac{1}{2}, ...`$ until
/// ```math
/// \varphi_\gamma(x_{k+1}) \le \varphi_\gamma(x_k) - \frac{c}{\gamma}\|u_k - v_k\|^2
/// ```
/// and takes the plain step $`\bar x_k`$ on the last trial.
///
/// Parameters
/// ----------
/// - __gamma:__          stepsize
/// - __lambda:__         relaxation in (0, 2), 1 by default
/// - __c:__              sufficient decrease (0.25), $`-\infty`$ accepts every direction
/// - __max_backtracks:__ line search trials per step, at least 2 (20)
/// - __directions:__     quasi-Newton engine, L-BFGS with memory 5
///
/// References
/// ----------
/// \[TP18\]: [ Themelis, A. & Patrinos, P.
///      "Douglas-Rachford splitting and ADMM for nonconvex optimization: tight convergence results",
///         SIAM Journal on Optimization, 30(1), 149–181 (2020)](https://doi.org/10.1137/18M1163993)
#[derive(Clone, Debug)]
pub struct Drls<S, F, G, D = Lbfgs<S>> {
    f: F,
    g: G,
    x0: Array1<S>,
    gamma: S,
    lambda: S,
    c: S,
    max_backtracks: usize,
    directions: D,
}

impl<S: Real, F, G> Drls<S, F, G> {
    pub fn new(f: F, g: G, x0: Array1<S>, gamma: S) -> Drls<S, F, G> {
        Drls {
            f,
            g,
            x0,
            gamma,
            lambda: S::one(),
            c: S::from(0.25).unwrap(),
            max_backtracks: 20,
            directions: Lbfgs::new(5),
        }
    }
}

impl<S: Real, F, G> Drls<S, F, G, Lbfgs<S>> {
    pub fn with_memory(mut self, memory: usize) -> Self {
        self.directions = Lbfgs::new(memory);
        self
    }
}

impl<S: Real, F, G, D> Drls<S, F, G, D> {
    pub fn with_directions<D2>(self, directions: D2) -> Drls<S, F, G, D2> {
        Drls {
            f: self.f,
            g: self.g,
            x0: self.x0,
            gamma: self.gamma,
            lambda: self.lambda,
            c: self.c,
            max_backtracks: self.max_backtracks,
            directions,
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

    pub fn with_c(mut self, c: S) -> Self {
        self.c = c;
        self
    }

    pub fn with_max_backtracks(mut self, max_backtracks: usize) -> Self {
        self.max_backtracks = max_backtracks;
        self
    }
}

#[derive(Clone, Debug)]
pub struct DrlsState<S, D> {
    x: Array1<S>,
    u: Array1<S>,
    w: Array1<S>,
    v: Array1<S>,
    res: Array1<S>,
    xbar: Array1<S>,
    f_u: S,
    g_v: S,
    gamma: S,
    H: D,
    tau: S,
    dre: S,
    d: Array1<S>,
    x_d: Array1<S>,
    x_prev: Array1<S>,
    xbar_prev: Array1<S>,
    r: Array1<S>,
    r_prev: Array1<S>,
}

impl<S: Real, D> DrlsState<S, D> {
    pub fn x(&self) -> ArrayView1<'_, S> {
        self.x.view()
    }

    /// The Douglas-Rachford image of `x`
    pub fn xbar(&self) -> ArrayView1<'_, S> {
        self.xbar.view()
    }

    pub fn u(&self) -> ArrayView1<'_, S> {
        self.u.view()
    }

    pub fn v(&self) -> ArrayView1<'_, S> {
        self.v.view()
    }

    pub fn tau(&self) -> S {
        self.tau
    }

    /// Douglas-Rachford envelope at `x`
    pub fn dre(&self) -> S {
        self.dre
    }

    pub fn directions(&self) -> &D {
        &self.H
    }

    fn reflect<F, G>(&mut self, f: &F, g: &G, lambda: S)
    where
        F: Proximable<S>,
        G: Proximable<S>,
    {
        let two = S::one() + S::one();
        self.f_u = f.prox_mut(self.u.view_mut(), self.x.view(), self.gamma);
        Zip::from(&mut self.w)
            .and(&self.u)
            .and(&self.x)
            .for_each(|w, &u, &x| *w = two * u - x);
        self.g_v = g.prox_mut(self.v.view_mut(), self.w.view(), self.gamma);
        Zip::from(&mut self.res)
            .and(&self.u)
            .and(&self.v)
            .for_each(|res, &u, &v| *res = u - v);
        Zip::from(&mut self.xbar)
            .and(&self.x)
            .and(&self.res)
            .for_each(|xbar, &x, &res| *xbar = x - lambda * res);
    }

    fn envelope(&self) -> S {
        let two = S::one() + S::one();
        let cross = Zip::from(&self.x)
            .and(&self.u)
            .and(&self.res)
            .fold(S::zero(), |acc, &x, &u, &r| acc + (x - u) * r);
        self.f_u + self.g_v - cross / self.gamma + self.res.dot(&self.res) / (two * self.gamma)
    }
}

impl<S: Real, D> IterationState<S> for DrlsState<S, D> {
    fn gamma(&self) -> S {
        self.gamma
    }

    fn residual(&self) -> ArrayView1<'_, S> {
        self.res.view()
    }

    fn solution(&self) -> ArrayView1<'_, S> {
        self.v.view()
    }
}

impl<S, F, G, D> Iteration for Drls<S, F, G, D>
where
    S: Real,
    F: Proximable<S>,
    G: Proximable<S>,
    D: Directions<S> + Clone,
{
    type Scalar = S;
    type State = DrlsState<S, D>;

    fn start(&self) -> Result<DrlsState<S, D>> {
        check_gamma(Some(self.gamma))?;
        check_open("lambda", self.lambda, S::zero(), S::one() + S::one())?;
        check_backtracks(self.max_backtracks)?;
        self.directions.validate()?;
        let mut H = self.directions.clone();
        H.reset();
        let n = self.x0.len();
        let mut state = DrlsState {
            x: self.x0.clone(),
            u: Array1::zeros(n),
            w: Array1::zeros(n),
            v: Array1::zeros(n),
            res: Array1::zeros(n),
            xbar: Array1::zeros(n),
            f_u: S::zero(),
            g_v: S::zero(),
            gamma: self.gamma,
            H,
            tau: S::one(),
            dre: S::zero(),
            d: Array1::zeros(n),
            x_d: Array1::zeros(n),
            x_prev: Array1::zeros(n),
            xbar_prev: Array1::zeros(n),
            r: Array1::zeros(n),
            r_prev: Array1::zeros(n),
        };
        state.reflect(&self.f, &self.g, self.lambda);
        ensure_finite(state.f_u + state.g_v)?;
        state.dre = state.envelope();
        Ok(state)
    }

    fn step(&self, state: &mut DrlsState<S, D>) -> Result<()> {
        let dre = state.envelope();
        let threshold = if self.c == S::neg_infinity() {
            S::infinity()
        } else {
            dre - self.c / state.gamma * state.res.dot(&state.res) + merit_tolerance(dre)
        };

        Zip::from(&mut state.d)
            .and(&state.xbar)
            .and(&state.x)
            .for_each(|d, &xbar, &x| *d = xbar - x);
        state.H.apply_mut(state.d.view_mut());
        Zip::from(&mut state.x_d)
            .and(&state.x)
            .and(&state.d)
            .for_each(|xd, &x, &d| *xd = x + d);
        state.x_prev.assign(&state.x);
        state.xbar_prev.assign(&state.xbar);
        Zip::from(&mut state.r_prev)
            .and(&state.x)
            .and(&state.xbar)
            .for_each(|r, &x, &xbar| *r = x - xbar);

        let two = S::one() + S::one();
        let mut tau = S::one();
        state.x.assign(&state.x_d);
        for k in 1..=self.max_backtracks {
            state.reflect(&self.f, &self.g, self.lambda);
            if state.envelope() <= threshold {
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
            interpolate(state.x.view_mut(), tau, state.x_d.view(), state.xbar_prev.view());
        }

        Zip::from(&mut state.r)
            .and(&state.x)
            .and(&state.xbar)
            .for_each(|r, &x, &xbar| *r = x - xbar);
        state.H.update(state.x.view(), state.x_prev.view(), state.r.view(), state.r_prev.view());
        state.tau = tau;
        state.dre = state.envelope();
        Ok(())
    }
}
