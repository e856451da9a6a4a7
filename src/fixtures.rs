//! Terms and problems shared by the unit tests
#![allow(non_snake_case)]

use crate::direction::Directions;
use crate::linop::norm_inf;
use crate::oracle::{Proximable, Smooth, Term};
use crate::Real;
use ndarray::prelude::*;
use ndarray::Zip;
use ndarray_linalg::cholesky::SolveC;
use ndarray_linalg::svd::SVD;
use ndarray_linalg::Lapack;

/// $`f(x) = \frac{1}{2}\|Ax - b\|_2^2`$
#[derive(Clone, Debug)]
pub(crate) struct LeastSquares<S> {
    A: Array2<S>,
    b: Array1<S>,
}

impl<S: Real> LeastSquares<S> {
    pub(crate) fn new(A: Array2<S>, b: Array1<S>) -> LeastSquares<S> {
        LeastSquares { A, b }
    }

    fn misfit(&self, x: ArrayView1<'_, S>) -> Array1<S> {
        self.A.dot(&x) - &self.b
    }
}

impl<S: Real> Term<S> for LeastSquares<S> {
    fn value(&self, x: ArrayView1<'_, S>) -> S {
        let r = self.misfit(x);
        r.dot(&r) / S::from(2.).unwrap()
    }
}

impl<S: Real> Smooth<S> for LeastSquares<S> {
    fn gradient_mut(&self, mut grad: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>) -> S {
        let r = self.misfit(x);
        grad.assign(&self.A.t().dot(&r));
        r.dot(&r) / S::from(2.).unwrap()
    }
}

impl<S> Proximable<S> for LeastSquares<S>
where
    S: Real + Lapack,
{
    /// Solves $`(I + \gamma A^TA)u = x + \gamma A^Tb`$ by Cholesky
    fn prox_mut(&self, mut out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>, gamma: S) -> S {
        let n = x.len();
        let M = self.A.t().dot(&self.A) * gamma + Array2::<S>::eye(n);
        let rhs = &x + &(self.A.t().dot(&self.b) * gamma);
        out.assign(&M.solvec(&rhs).unwrap());
        self.value(out.view())
    }
}

/// $`g(x) = \lambda\|x\|_1`$
#[derive(Clone, Debug)]
pub(crate) struct NormL1<S> {
    lambda: S,
}

impl<S: Real> NormL1<S> {
    pub(crate) fn new(lambda: S) -> NormL1<S> {
        NormL1 { lambda }
    }
}

impl<S: Real> Term<S> for NormL1<S> {
    fn value(&self, x: ArrayView1<'_, S>) -> S {
        self.lambda * x.fold(S::zero(), |acc, &v| acc + v.abs())
    }
}

impl<S: Real> Proximable<S> for NormL1<S> {
    fn prox_mut(&self, mut out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>, gamma: S) -> S {
        let t = gamma * self.lambda;
        Zip::from(&mut out).and(&x).for_each(|o, &v| {
            *o = v.signum() * (v.abs() - t).max(S::zero());
        });
        self.value(out.view())
    }
}

/// The 4x5 LASSO problem: returns $`A`$, $`b`$ and $`\lambda = 0.1\|A^Tb\|_\infty`$
pub(crate) fn small_lasso<S: Real>() -> (Array2<S>, Array1<S>, S) {
    let A = array![
        [1.0, -2.0, 3.0, -4.0, 5.0],
        [2.0, -1.0, 0.0, -1.0, 3.0],
        [-1.0, 0.0, 4.0, -3.0, 2.0],
        [-1.0, -1.0, -1.0, 1.0, 3.0]
    ]
    .mapv(|v| S::from(v).unwrap());
    let b = array![1.0, 2.0, 3.0, 4.0].mapv(|v| S::from(v).unwrap());
    let lambda = S::from(0.1).unwrap() * norm_inf(A.t().dot(&b).view());
    (A, b, lambda)
}

/// Directions pointing uphill, $`-10d`$ for every proposed $`d`$
#[derive(Clone, Copy, Debug)]
pub(crate) struct Uphill;

impl Directions<f64> for Uphill {
    fn update(
        &mut self,
        _x: ArrayView1<'_, f64>,
        _x_prev: ArrayView1<'_, f64>,
        _res: ArrayView1<'_, f64>,
        _res_prev: ArrayView1<'_, f64>,
    ) -> bool {
        true
    }

    fn apply_mut(&mut self, mut d: ArrayViewMut1<'_, f64>) {
        d *= -10.0;
    }

    fn reset(&mut self) {}
}

/// Largest singular value $`\|A\|_2`$
pub(crate) fn spectral_norm<S>(A: &Array2<S>) -> S
where
    S: Real + Lapack<Real = S>,
{
    A.svd(false, false).unwrap().1[0]
}

/// $`\frac{1}{2}\|Ax - b\|^2 + \lambda\|x\|_1`$
pub(crate) fn lasso_objective<S: Real>(A: &Array2<S>, b: &Array1<S>, lambda: S, x: ArrayView1<'_, S>) -> S {
    let r = A.dot(&x) - b;
    r.dot(&r) / S::from(2.).unwrap() + NormL1::new(lambda).value(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn least_squares_prox_is_optimal() {
        let (A, b, _) = small_lasso::<f64>();
        let f = LeastSquares::new(A.clone(), b);
        let x = array![1.0, -1.0, 0.5, 0.0, 2.0];
        let gamma = 0.3;
        let (u, _) = f.prox(x.view(), gamma);
        // optimality: grad f(u) + (u - x) / gamma = 0
        let (grad, _) = f.gradient(u.view());
        assert_abs_diff_eq!(grad + (&u - &x) / gamma, Array1::<f64>::zeros(5), epsilon = 1e-10);
    }

    #[test]
    fn soft_threshold() {
        let g = NormL1::new(2.0f32);
        let (p, value) = g.prox(array![3.0, -0.5, -4.0].view(), 0.5);
        assert_abs_diff_eq!(p, array![2.0f32, 0.0, -3.0]);
        assert_abs_diff_eq!(value, 10.0f32);
    }
}
