//! Quasi-Newton directions for the fixed-point residual
//!
//! The accelerated methods treat the residual $`r(x) = x - T(x)`$ of a
//! nonexpansive map $`T`$ like a gradient and look for its zero with a
//! quasi-Newton method. The differences of iterates and residuals take the
//! place of the usual $`s_k`$ and $`y_k`$:
//! ```math
//! \begin{aligned}
//! s_k &= x_{k+1} - x_k \\
//! y_k &= r(x_{k+1}) - r(x_k)
//! \end{aligned}
//! ```
#![allow(non_snake_case)]

use crate::error::{Error, Result};
use crate::Real;
use ndarray::prelude::*;
use ndarray::Zip;
use std::collections::VecDeque;

/// A direction engine approximating the inverse Jacobian of the residual
pub trait Directions<S> {
    /// Records the pair $`(x - x_{prev},\; r - r_{prev})`$
    ///
    /// Returns `false` when the pair was skipped by the curvature safeguard.
    fn update(
        &mut self,
        x: ArrayView1<'_, S>,
        x_prev: ArrayView1<'_, S>,
        res: ArrayView1<'_, S>,
        res_prev: ArrayView1<'_, S>,
    ) -> bool;

    /// Replaces `d` with $`Hd`$
    fn apply_mut(&mut self, d: ArrayViewMut1<'_, S>);

    /// $`Hv`$ out-place
    fn apply(&mut self, v: ArrayView1<'_, S>) -> Array1<S>
    where
        S: Clone,
    {
        let mut d = v.to_owned();
        self.apply_mut(d.view_mut());
        d
    }

    /// Forgets all curvature information
    fn reset(&mut self);

    /// Checks the parameters before a run starts
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Limited-memory BFGS
///
/// Keeps the last `memory` curvature pairs and applies the inverse
/// Hessian approximation with the two-loop recursion [\[N80\]](#references)
/// ```math
/// \begin{aligned}
/// H_{k+1} &= (I - \rho_k s_k y_k^T)H_k(I - \rho_k y_k s_k^T) + \rho_k s_k s_k^T \\
/// H_0 &= \frac{s_k^Ty_k}{y_k^Ty_k} I \\
/// \rho_k &= 1/y_k^Ts_k
/// \end{aligned}
/// ```
/// A pair is only stored if $`s^Ty > \epsilon\|s\|\|y\|`$, otherwise it is
/// dropped and the history left as it is. With no pairs stored the
/// approximation is the identity.
///
/// References
/// ----------
/// \[N80\]: [ Nocedal, J,
///      "Updating Quasi-Newton Matrices With Limited Storage",
///         Mathematics of Computation, Vol 35, #151, July 1980, 773-782 ](https://courses.engr.illinois.edu/ece544na/fa2014/nocedal80.pdf)
#[derive(Clone, Debug)]
pub struct Lbfgs<S> {
    memory: usize,
    // (s'y, s, y), oldest first
    pairs: VecDeque<(S, Array1<S>, Array1<S>)>,
    alphas: Vec<S>,
    scaling: S,
}

impl<S: Real> Lbfgs<S> {
    /// Parameters
    /// ----------
    /// - __memory:__ number of curvature pairs to remember, at least one
    ///                 (checked when a run starts). 3 to 7 is usually sufficient.
    pub fn new(memory: usize) -> Lbfgs<S> {
        Lbfgs {
            memory,
            pairs: VecDeque::with_capacity(memory),
            alphas: Vec::with_capacity(memory),
            scaling: S::one(),
        }
    }

    pub fn memory(&self) -> usize {
        self.memory
    }

    /// Number of pairs currently stored
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<S: Real> Directions<S> for Lbfgs<S> {
    fn update(
        &mut self,
        x: ArrayView1<'_, S>,
        x_prev: ArrayView1<'_, S>,
        res: ArrayView1<'_, S>,
        res_prev: ArrayView1<'_, S>,
    ) -> bool {
        let zero = S::zero();
        let (ys, ss, yy) = Zip::from(&x)
            .and(&x_prev)
            .and(&res)
            .and(&res_prev)
            .fold((zero, zero, zero), |(ys, ss, yy), &x, &xp, &r, &rp| {
                let s = x - xp;
                let y = r - rp;
                (ys + y * s, ss + s * s, yy + y * y)
            });
        if !(ys > S::epsilon() * (ss * yy).sqrt()) {
            log::debug!("skipping L-BFGS pair with s'y = {:e}", ys);
            return false;
        }

        // recycle the buffers of the evicted pair
        let (mut s, mut y) = if self.pairs.len() == self.memory {
            match self.pairs.pop_front() {
                Some((_, s, y)) => (s, y),
                None => (Array1::zeros(x.len()), Array1::zeros(x.len())),
            }
        } else {
            (Array1::zeros(x.len()), Array1::zeros(x.len()))
        };
        Zip::from(&mut s)
            .and(&x)
            .and(&x_prev)
            .for_each(|s, &x, &xp| *s = x - xp);
        Zip::from(&mut y)
            .and(&res)
            .and(&res_prev)
            .for_each(|y, &r, &rp| *y = r - rp);
        self.pairs.push_back((ys, s, y));
        self.scaling = ys / yy;
        true
    }

    fn apply_mut(&mut self, mut d: ArrayViewMut1<'_, S>) {
        if self.pairs.is_empty() {
            return;
        }
        self.alphas.clear();
        for (ys, s, y) in self.pairs.iter().rev() {
            let alpha = s.dot(&d) / *ys;
            d.scaled_add(-alpha, y);
            self.alphas.push(alpha);
        }
        d *= self.scaling;
        for ((ys, s, y), &alpha) in self.pairs.iter().zip(self.alphas.iter().rev()) {
            let beta = y.dot(&d) / *ys;
            d.scaled_add(alpha - beta, s);
        }
    }

    fn reset(&mut self) {
        self.pairs.clear();
        self.scaling = S::one();
    }

    fn validate(&self) -> Result<()> {
        if self.memory == 0 {
            return Err(Error::InvalidParameter(
                "L-BFGS memory must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// No acceleration, the direction is the residual itself
#[derive(Clone, Copy, Debug, Default)]
pub struct Noaccel;

impl<S: Real> Directions<S> for Noaccel {
    #[inline]
    fn update(
        &mut self,
        _x: ArrayView1<'_, S>,
        _x_prev: ArrayView1<'_, S>,
        _res: ArrayView1<'_, S>,
        _res_prev: ArrayView1<'_, S>,
    ) -> bool {
        false
    }

    #[inline]
    fn apply_mut(&mut self, _d: ArrayViewMut1<'_, S>) {}

    #[inline]
    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn empty_history_is_identity(v: Vec<i32>) -> bool {
        let v = Array1::from(v).mapv(f64::from);
        let mut H = Lbfgs::new(5);
        H.apply(v.view()) == v
    }

    #[quickcheck]
    fn noaccel_is_identity(v: Vec<i32>) -> bool {
        let v = Array1::from(v).mapv(|e| e as f32);
        let mut H = Noaccel;
        H.update(v.view(), v.view(), v.view(), v.view());
        H.apply(v.view()) == v
    }

    #[test]
    fn zero_memory_is_invalid() {
        assert!(matches!(
            Lbfgs::<f64>::new(0).validate(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(Lbfgs::<f64>::new(1).validate().is_ok());
    }

    /// Pairs from the residual $`r(x) = Qx`$ of a diagonal quadratic
    fn quadratic_pairs(H: &mut Lbfgs<f64>, points: &[Array1<f64>]) -> (Array1<f64>, Array1<f64>) {
        let Q = array![1.0, 4.0, 9.0];
        let mut last = (Array1::zeros(3), Array1::zeros(3));
        for w in points.windows(2) {
            let (xp, x) = (&w[0], &w[1]);
            let rp = &Q * xp;
            let r = &Q * x;
            assert!(H.update(x.view(), xp.view(), r.view(), rp.view()));
            last = (x - xp, &r - &rp);
        }
        last
    }

    #[test]
    fn secant_equation() {
        let mut H = Lbfgs::new(5);
        let points = [
            array![1.0, 1.0, 1.0],
            array![0.5, -1.0, 2.0],
            array![0.0, 0.3, -0.7],
            array![0.2, 0.1, 0.4],
        ];
        let (s, y) = quadratic_pairs(&mut H, &points);
        assert_eq!(H.len(), 3);
        assert_abs_diff_eq!(H.apply(y.view()), s, epsilon = 1e-10);
    }

    #[test]
    fn single_pair() {
        let mut H = Lbfgs::new(3);
        let (s, y) = quadratic_pairs(&mut H, &[array![0.0, 0.0, 0.0], array![1.0, 1.0, 1.0]]);
        // s'y = 14, y'y = 98
        assert_abs_diff_eq!(H.apply(y.view()), s, epsilon = 1e-12);
        let e = array![0.0, 0.0, 0.0];
        assert_abs_diff_eq!(H.apply(e.view()), e);
    }

    #[test]
    fn memory_is_bounded() {
        let mut H = Lbfgs::new(2);
        let points: Vec<Array1<f64>> = (0..6)
            .map(|k| array![k as f64, (k * k) as f64, 1.0 / (k as f64 + 1.0)])
            .collect();
        let (s, y) = quadratic_pairs(&mut H, &points);
        assert_eq!(H.len(), 2);
        assert_abs_diff_eq!(H.apply(y.view()), s, epsilon = 1e-9);
    }

    #[test]
    fn negative_curvature_is_skipped() {
        let mut H = Lbfgs::new(4);
        quadratic_pairs(&mut H, &[array![0.0, 0.0, 0.0], array![1.0, 0.0, 0.0]]);
        assert_eq!(H.len(), 1);

        let x = array![2.0, 0.0, 0.0];
        let xp = array![1.0, 0.0, 0.0];
        let r = array![-1.0, 0.0, 0.0];
        let rp = array![1.0, 0.0, 0.0];
        assert!(!H.update(x.view(), xp.view(), r.view(), rp.view()));
        // zero step carries no curvature either
        assert!(!H.update(x.view(), x.view(), r.view(), rp.view()));
        assert_eq!(H.len(), 1);

        H.reset();
        assert!(H.is_empty());
        let v = array![1.0, 2.0, 3.0];
        assert!(H.apply(v.view()) == v);
    }
}

#[cfg(all(rustc_nightly, test))]
mod benches {
    use super::*;
    use test::Bencher;

    #[bench]
    fn two_loop_recursion(bench: &mut Bencher) {
        const N: usize = 1000;
        let mut H = Lbfgs::<f64>::new(10);
        let mut xp = Array1::zeros(N);
        for k in 1..=10 {
            let x = Array1::from_shape_fn(N, |i| ((i * k) % 7) as f64 - 3.0);
            let r = Array1::from_shape_fn(N, |i| (1 + i % 5) as f64) * &x;
            let rp = Array1::from_shape_fn(N, |i| (1 + i % 5) as f64) * &xp;
            H.update(x.view(), xp.view(), r.view(), rp.view());
            xp = x;
        }
        let mut d = Array1::from_elem(N, 1.0);
        bench.iter(|| H.apply_mut(d.view_mut()));
    }
}
