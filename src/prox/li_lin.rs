//! Accelerated proximal gradient for nonconvex problems
#![allow(non_snake_case)]

use super::initial_point;
use crate::error::{Error, Result};
use crate::fbe::ForwardBackwardPoint;
use crate::iteration::{Iteration, IterationState};
use crate::linop::{Identity, LinearMap};
use crate::oracle::{Proximable, Smooth};
use crate::stepsize::backtrack;
use crate::Real;
use ndarray::prelude::*;
use ndarray::Zip;

/// Nonmonotone accelerated proximal gradient method [\[LL15\]](#references)
///
/// Minimizes $`\varphi(x) = f(Ax) + g(x)`$ where neither term needs to be
/// convex. The extrapolated point $`y_k`$ gives $`z_k = T_\gamma(y_k)`$,
/// which is accepted when it decreases the running average
/// ```math
/// \varphi(z_k) \le \bar\varphi_k - \delta\|y_k - z_k\|^2
/// ```
/// Otherwise the plain step $`v_k = T_\gamma(x_k)`$ is computed as well and
/// the better of the two becomes $`x_{k+1}`$, with ties going to $`z_k`$.
/// The next extrapolation is
/// ```math
/// y_{k+1} = \begin{cases}
/// z_k + \frac{\theta_k - 1}{\theta_{k+1}}(z_k - x_k) & x_{k+1} = z_k \\
/// v_k + \frac{\theta_k}{\theta_{k+1}}(z_k - v_k) + \frac{\theta_k - 1}{\theta_{k+1}}(v_k - x_k) & x_{k+1} = v_k
/// \end{cases}
/// ```
/// with $`\theta_{k+1} = (1 + \sqrt{1 + 4\theta_k^2})/2`$, and the average
/// follows $`q_{k+1} = \eta q_k + 1`$,
/// $`\bar\varphi_{k+1} = (\eta q_k\bar\varphi_k + \varphi(x_{k+1}))/q_{k+1}`$.
///
/// Parameters
/// ----------
/// - __gamma:__    stepsize, estimated when absent which makes the run adaptive
/// - __alpha:__    in (0, 1), $`\gamma = \alpha/L`$ for an estimated stepsize (0.95)
/// - __adaptive:__ shrink the stepsize by backtracking when needed
/// - __delta:__    sufficient decrease against the average (1e-3)
/// - __eta:__      in [0, 1), memory of the average (0.8)
///
/// References
/// ----------
/// \[LL15\]: [ Li, H. & Lin, Z.
///      "Accelerated Proximal Gradient Methods for Nonconvex Programming",
///         Advances in Neural Information Processing Systems 28 (2015)](https://papers.nips.cc/paper/5728-accelerated-proximal-gradient-methods-for-nonconvex-programming)
#[derive(Clone, Debug)]
pub struct LiLin<S, F, G, M = Identity> {
    f: F,
    g: G,
    A: M,
    x0: Array1<S>,
    gamma: Option<S>,
    alpha: S,
    adaptive: bool,
    delta: S,
    eta: S,
}

impl<S: Real, F, G> LiLin<S, F, G> {
    pub fn new(f: F, g: G, x0: Array1<S>) -> LiLin<S, F, G> {
        LiLin {
            f,
            g,
            A: Identity,
            x0,
            gamma: None,
            alpha: S::from(0.95).unwrap(),
            adaptive: false,
            delta: S::from(1e-3).unwrap(),
            eta: S::from(0.8).unwrap(),
        }
    }
}

impl<S: Real, F, G, M> LiLin<S, F, G, M> {
    pub fn with_linear_map<M2>(self, A: M2) -> LiLin<S, F, G, M2> {
        LiLin {
            f: self.f,
            g: self.g,
            A,
            x0: self.x0,
            gamma: self.gamma,
            alpha: self.alpha,
            adaptive: self.adaptive,
            delta: self.delta,
            eta: self.eta,
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

    pub fn with_delta(mut self, delta: S) -> Self {
        self.delta = delta;
        self
    }

    pub fn with_eta(mut self, eta: S) -> Self {
        self.eta = eta;
        self
    }

    fn is_adaptive(&self) -> bool {
        self.adaptive || self.gamma.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct LiLinState<S> {
    // forward-backward step from the extrapolated point y
    point: ForwardBackwardPoint<S>,
    // forward-backward step from x, refreshed when the safeguard needs it
    plain: ForwardBackwardPoint<S>,
    az: Array1<S>,
    av: Array1<S>,
    f_average: S,
    q: S,
    theta: S,
}

impl<S: Real> LiLinState<S> {
    pub fn point(&self) -> &ForwardBackwardPoint<S> {
        &self.point
    }

    pub fn x(&self) -> ArrayView1<'_, S> {
        self.plain.x()
    }

    /// The extrapolated point
    pub fn y(&self) -> ArrayView1<'_, S> {
        self.point.x()
    }

    pub fn z(&self) -> ArrayView1<'_, S> {
        self.point.z()
    }

    /// Running average of the objective
    pub fn f_average(&self) -> S {
        self.f_average
    }
}

impl<S: Real> IterationState<S> for LiLinState<S> {
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

impl<S, F, G, M> Iteration for LiLin<S, F, G, M>
where
    S: Real,
    F: Smooth<S>,
    G: Proximable<S>,
    M: LinearMap<S>,
{
    type Scalar = S;
    type State = LiLinState<S>;

    fn start(&self) -> Result<LiLinState<S>> {
        if !(self.eta >= S::zero() && self.eta < S::one()) {
            return Err(Error::InvalidParameter(format!("eta must lie in [0, 1), got {}", self.eta)));
        }
        if !(self.delta > S::zero()) {
            return Err(Error::InvalidParameter(format!("delta must be positive, got {}", self.delta)));
        }
        let point = initial_point(&self.f, &self.A, &self.g, &self.x0, self.gamma, self.alpha)?;
        let m = point.ax.len();
        Ok(LiLinState {
            f_average: point.f_ax + self.g.value(self.x0.view()),
            plain: point.clone(),
            az: Array1::zeros(m),
            av: Array1::zeros(m),
            q: S::one(),
            theta: S::one(),
            point,
        })
    }

    fn step(&self, state: &mut LiLinState<S>) -> Result<()> {
        let f_az = if self.is_adaptive() {
            backtrack(&self.f, &self.A, &self.g, &mut state.point, state.az.view_mut())?
        } else {
            self.A.apply_mut(state.az.view_mut(), state.point.z.view());
            self.f.value(state.az.view())
        };
        let f_z = f_az + state.point.g_z;

        let p = &state.point;
        let mut extrapolated = f_z <= state.f_average - self.delta * p.res.dot(&p.res);
        let mut f_x = f_z;
        if !extrapolated {
            let plain = &mut state.plain;
            plain.evaluate(&self.f, &self.A);
            plain.gamma = state.point.gamma;
            plain.forward_backward(&self.g);
            let f_av = if self.is_adaptive() {
                backtrack(&self.f, &self.A, &self.g, &mut *plain, state.av.view_mut())?
            } else {
                self.A.apply_mut(state.av.view_mut(), plain.z.view());
                self.f.value(state.av.view())
            };
            let f_v = f_av + plain.g_z;
            state.point.gamma = plain.gamma;
            extrapolated = f_z <= f_v;
            if !extrapolated {
                f_x = f_v;
            }
        }

        let two = S::one() + S::one();
        let four = two * two;
        let theta = state.theta;
        let theta_next = (S::one() + (S::one() + four * theta * theta).sqrt()) / two;
        let momentum = (theta - S::one()) / theta_next;
        let p = &mut state.point;
        let plain = &mut state.plain;
        if extrapolated {
            Zip::from(&mut p.x)
                .and(&p.z)
                .and(&plain.x)
                .for_each(|y, &z, &x| *y = z + momentum * (z - x));
            std::mem::swap(&mut plain.x, &mut p.z);
        } else {
            let weight = theta / theta_next;
            Zip::from(&mut p.x)
                .and(&p.z)
                .and(&plain.z)
                .and(&plain.x)
                .for_each(|y, &z, &v, &x| *y = v + weight * (z - v) + momentum * (v - x));
            std::mem::swap(&mut plain.x, &mut plain.z);
        }
        p.evaluate(&self.f, &self.A);
        p.forward_backward(&self.g);

        let q_next = self.eta * state.q + S::one();
        state.f_average = (self.eta * state.q * state.f_average + f_x) / q_next;
        state.q = q_next;
        state.theta = theta_next;
        Ok(())
    }
}
