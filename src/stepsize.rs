//! Stepsize estimation and backtracking
//!
//! When no stepsize is given, $`\gamma = \alpha / L`$ is set from a local
//! estimate of the Lipschitz constant $`L`$ of $`\nabla(f\circ A)`$. The
//! estimate is a single finite difference, so it may be too optimistic;
//! runs using it are adaptive and shrink $`\gamma`$ whenever the quadratic
//! upper bound
//! ```math
//! f(Az) \le f(Ax) - \langle A^H\nabla f(Ax), x - z\rangle + \frac{1}{2\gamma}\|x - z\|^2
//! ```
//! fails at the forward-backward point $`z`$.
#![allow(non_snake_case)]

use crate::error::{Error, Result};
use crate::fbe::ForwardBackwardPoint;
use crate::linop::{norm2, norm_inf, LinearMap};
use crate::oracle::{Proximable, Smooth};
use crate::Real;
use ndarray::prelude::*;

/// Halvings of the stepsize before the smooth term is deemed not Lipschitz
pub const MAX_HALVINGS: usize = 100;

/// Estimates $`\gamma = \alpha / L`$ at `point.x` by a finite difference
///
/// The gradient is compared at `x` and at `x + h` with
/// $`h = \sqrt{\epsilon}\max(1, \|x\|_\infty)`$ in every entry. This is a
/// best-effort guess, not a bound; backtracking corrects it during the run.
pub fn estimate_gamma<S, F, M>(f: &F, A: &M, point: &ForwardBackwardPoint<S>, alpha: S) -> Result<S>
where
    S: Real,
    F: Smooth<S>,
    M: LinearMap<S>,
{
    let n = point.x.len();
    let h = S::epsilon().sqrt() * norm_inf(point.x.view()).max(S::one());
    let x_eps = point.x.mapv(|v| v + h);
    let mut ax_eps = Array1::zeros(point.ax.len());
    A.apply_mut(ax_eps.view_mut(), x_eps.view());
    let mut grad_eps = Array1::zeros(point.ax.len());
    f.gradient_mut(grad_eps.view_mut(), ax_eps.view());
    let mut at_grad_eps = Array1::zeros(n);
    A.adjoint_mut(at_grad_eps.view_mut(), grad_eps.view());

    at_grad_eps -= &point.at_grad_f_ax;
    let shift = h * S::from(n).unwrap().sqrt();
    let L = norm2(at_grad_eps.view()) / shift;
    if !L.is_finite() || L <= S::zero() {
        return Err(Error::InvalidParameter(format!(
            "cannot estimate gamma from a local Lipschitz constant of {}, supply gamma",
            L
        )));
    }
    log::debug!("estimated Lipschitz constant {:e}, gamma = {:e}", L, alpha / L);
    Ok(alpha / L)
}

/// Shrinks `point.gamma` until $`f(Az)`$ lies below the quadratic model
///
/// Writes $`Az`$ into `az` and returns $`f(Az)`$. Each halving retakes the
/// forward-backward step, so `point` stays consistent with its stepsize.
pub fn backtrack<S, F, M, G>(
    f: &F,
    A: &M,
    g: &G,
    point: &mut ForwardBackwardPoint<S>,
    mut az: ArrayViewMut1<'_, S>,
) -> Result<S>
where
    S: Real,
    F: Smooth<S>,
    M: LinearMap<S>,
    G: Proximable<S>,
{
    let two = S::one() + S::one();
    let ten = S::from(10.).unwrap();
    let mut halvings = 0;
    loop {
        A.apply_mut(az.view_mut(), point.z.view());
        let f_az = f.value(az.view());
        let tol = ten * S::epsilon() * (S::one() + point.f_ax.abs());
        if f_az <= point.model() + tol {
            return Ok(f_az);
        }
        if halvings == MAX_HALVINGS {
            return Err(Error::LipschitzEstimationFailure {
                attempts: halvings,
                gamma: point.gamma.to_f64().unwrap_or(std::f64::NAN),
            });
        }
        halvings += 1;
        point.gamma = point.gamma / two;
        log::debug!("stepsize shrunk to {:e}", point.gamma);
        point.forward_backward(g);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{small_lasso, spectral_norm, LeastSquares, NormL1};
    use crate::linop::Identity;
    use crate::oracle::{SmoothFn, Term, Zero};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn quadratic_lipschitz_constant() {
        // f(x) = 1/2 |Dx|^2 has gradient D^2 x
        let f = LeastSquares::new(Array2::from_diag(&array![1.0, 2.0, 3.0]), Array1::zeros(3));
        let A = Identity::new();
        let point = ForwardBackwardPoint::new(&f, &A, array![1.0, -1.0, 0.5], 1.0);
        let gamma = estimate_gamma(&f, &A, &point, 0.95).unwrap();
        // |D^2 1| / |1| = sqrt(98 / 3)
        assert_relative_eq!(gamma, 0.95 / (98.0f64 / 3.0).sqrt(), max_relative = 1e-6);
    }

    #[test]
    fn flat_term_needs_gamma() {
        let point = ForwardBackwardPoint::new(&Zero, &Identity::new(), array![1.0f32, 2.0], 1.0);
        assert!(matches!(
            estimate_gamma(&Zero, &Identity::new(), &point, 0.95),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn backtracking_reaches_the_bound() {
        let (A, b, lambda) = small_lasso::<f64>();
        let f = LeastSquares::new(Array2::eye(4), b);
        let g = NormL1::new(lambda);
        let L = spectral_norm(&A).powi(2);
        let mut point = ForwardBackwardPoint::new(&f, &A, Array1::zeros(5), 10.0);
        point.forward_backward(&g);
        let mut az = Array1::zeros(4);
        let f_az = backtrack(&f, &A, &g, &mut point, az.view_mut()).unwrap();

        assert!(point.gamma < 10.0);
        // halving stops once gamma <= 1/L, so it never goes much below 1/(2L)
        assert!(point.gamma >= 0.4 / L);
        assert_abs_diff_eq!(az, A.dot(&point.z), epsilon = 1e-12);
        assert_relative_eq!(f_az, f.value(az.view()));
        assert!(f_az <= point.model() + 1e-12);
    }

    #[test]
    fn accepted_stepsize_is_kept() {
        let (A, b, lambda) = small_lasso::<f32>();
        let f = LeastSquares::new(Array2::eye(4), b);
        let g = NormL1::new(lambda);
        let gamma = 0.9 / spectral_norm(&A).powi(2);
        let mut point = ForwardBackwardPoint::new(&f, &A, Array1::zeros(5), gamma);
        point.forward_backward(&g);
        let mut az = Array1::zeros(4);
        backtrack(&f, &A, &g, &mut point, az.view_mut()).unwrap();
        assert_eq!(point.gamma, gamma);
    }

    #[test]
    fn inconsistent_gradient_fails() {
        // a gradient that does not belong to its value can never be majorized
        let f = SmoothFn::new(
            |_x: ArrayView1<f64>| 0.0,
            |x: ArrayView1<f64>| Array1::from_elem(x.len(), 1e10),
        );
        let A = Identity::new();
        let mut point = ForwardBackwardPoint::new(&f, &A, Array1::zeros(2), 1.0);
        point.forward_backward(&Zero);
        let mut az = Array1::zeros(2);
        match backtrack(&f, &A, &Zero, &mut point, az.view_mut()) {
            Err(Error::LipschitzEstimationFailure { attempts, gamma }) => {
                assert_eq!(attempts, MAX_HALVINGS);
                assert!(gamma < 1e-29);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
