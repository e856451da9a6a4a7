//! Forward-backward point and envelope
//!
//! For $`\varphi(x) = f(Ax) + g(x)`$ and a stepsize $`\gamma`$, the
//! forward-backward step and its fixed-point residual are
//! ```math
//! \begin{aligned}
//! y &= x - \gamma A^H\nabla f(Ax) \\
//! z &= \mathrm{prox}_{\gamma g}(y) \\
//! r &= x - z
//! \end{aligned}
//! ```
//! and the forward-backward envelope (FBE) is
//! ```math
//! \varphi_\gamma(x) = f(Ax) - \langle A^H\nabla f(Ax), r\rangle + \frac{1}{2\gamma}\|r\|^2 + g(z)
//! ```
//! a continuous merit function sharing its minimizers with $`\varphi`$.
#![allow(non_snake_case)]

use crate::linop::LinearMap;
use crate::oracle::{Proximable, Smooth};
use crate::Real;
use ndarray::prelude::*;
use ndarray::Zip;

/// A point together with everything the forward-backward step computes there
#[derive(Clone, Debug)]
pub struct ForwardBackwardPoint<S> {
    pub(crate) x: Array1<S>,
    pub(crate) ax: Array1<S>,
    pub(crate) f_ax: S,
    pub(crate) grad_f_ax: Array1<S>,
    pub(crate) at_grad_f_ax: Array1<S>,
    pub(crate) gamma: S,
    pub(crate) y: Array1<S>,
    pub(crate) z: Array1<S>,
    pub(crate) g_z: S,
    pub(crate) res: Array1<S>,
}

impl<S: Real> ForwardBackwardPoint<S> {
    /// Allocates the buffers and evaluates $`f`$ and its gradient at `x`
    ///
    /// The forward-backward step is not taken yet, as `gamma` may still
    /// need to be estimated.
    pub(crate) fn new<F, M>(f: &F, A: &M, x: Array1<S>, gamma: S) -> ForwardBackwardPoint<S>
    where
        F: Smooth<S>,
        M: LinearMap<S>,
    {
        let n = x.len();
        let m = A.output_len(n);
        let mut point = ForwardBackwardPoint {
            ax: Array1::zeros(m),
            f_ax: S::zero(),
            grad_f_ax: Array1::zeros(m),
            at_grad_f_ax: Array1::zeros(n),
            gamma,
            y: Array1::zeros(n),
            z: Array1::zeros(n),
            g_z: S::zero(),
            res: Array1::zeros(n),
            x,
        };
        point.evaluate(f, A);
        point
    }

    /// Refreshes $`Ax`$ and the gradient after `x` changed
    pub(crate) fn evaluate<F, M>(&mut self, f: &F, A: &M)
    where
        F: Smooth<S>,
        M: LinearMap<S>,
    {
        A.apply_mut(self.ax.view_mut(), self.x.view());
        self.gradient_at_image(f, A);
    }

    /// Refreshes the gradient after `ax` was updated directly
    pub(crate) fn gradient_at_image<F, M>(&mut self, f: &F, A: &M)
    where
        F: Smooth<S>,
        M: LinearMap<S>,
    {
        self.f_ax = f.gradient_mut(self.grad_f_ax.view_mut(), self.ax.view());
        A.adjoint_mut(self.at_grad_f_ax.view_mut(), self.grad_f_ax.view());
    }

    /// Takes the forward-backward step from `x` with the current `gamma`
    pub(crate) fn forward_backward<G: Proximable<S>>(&mut self, g: &G) {
        let gamma = self.gamma;
        Zip::from(&mut self.y)
            .and(&self.x)
            .and(&self.at_grad_f_ax)
            .for_each(|y, &x, &d| *y = x - gamma * d);
        self.g_z = g.prox_mut(self.z.view_mut(), self.y.view(), gamma);
        Zip::from(&mut self.res)
            .and(&self.x)
            .and(&self.z)
            .for_each(|r, &x, &z| *r = x - z);
    }

    /// Quadratic model of $`f\circ A`$ around `x`, evaluated at `z`
    pub(crate) fn model(&self) -> S {
        let two = S::one() + S::one();
        self.f_ax - self.at_grad_f_ax.dot(&self.res) + self.res.dot(&self.res) / (two * self.gamma)
    }

    /// Forward-backward envelope at `x`
    pub fn envelope(&self) -> S {
        self.model() + self.g_z
    }

    pub fn x(&self) -> ArrayView1<'_, S> {
        self.x.view()
    }

    /// The forward-backward point $`z`$
    pub fn z(&self) -> ArrayView1<'_, S> {
        self.z.view()
    }

    pub fn res(&self) -> ArrayView1<'_, S> {
        self.res.view()
    }

    pub fn gamma(&self) -> S {
        self.gamma
    }

    /// $`f(Ax)`$
    pub fn f_ax(&self) -> S {
        self.f_ax
    }

    /// $`g(z)`$
    pub fn g_z(&self) -> S {
        self.g_z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{small_lasso, spectral_norm, LeastSquares, NormL1};
    use crate::oracle::{Term, Zero};
    use approx::assert_abs_diff_eq;

    #[test]
    fn envelope_bounds() {
        let (A, b, lambda) = small_lasso::<f64>();
        let f = LeastSquares::new(Array2::eye(4), b);
        let g = NormL1::new(lambda);
        let x = array![0.1, -0.2, 0.3, 0.0, 0.5];
        let L = spectral_norm(&A).powi(2);
        let mut p = ForwardBackwardPoint::new(&f, &A, x.clone(), 0.9 / L);
        p.forward_backward(&g);

        // FBE <= phi(x), and phi(z) <= FBE when gamma < 1/L
        let phi = |v: ArrayView1<f64>| f.value(A.dot(&v).view()) + g.value(v);
        assert!(p.envelope() <= phi(x.view()) + 1e-12);
        assert!(phi(p.z()) <= p.envelope() + 1e-12);
        assert_abs_diff_eq!(&p.x - &p.z, p.res);
    }

    #[test]
    fn gradient_step_without_g() {
        // f = 1/2 |x - b|^2, the FB step with gamma = 1 lands on b
        let b = array![1.0f32, -2.0, 3.0];
        let f = LeastSquares::new(Array2::eye(3), b.clone());
        let A = crate::linop::Identity::new();
        let mut p = ForwardBackwardPoint::new(&f, &A, Array1::zeros(3), 1.0);
        p.forward_backward(&Zero);
        assert_abs_diff_eq!(p.z, b, epsilon = 1e-6);
        // the envelope of a quadratic at gamma = 1/L is its minimum
        assert_abs_diff_eq!(p.envelope(), 0.0f32, epsilon = 1e-6);
    }
}
