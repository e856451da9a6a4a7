//! Oracles for the terms of a composite objective
//!
//! The iterations never look inside $`f`$ or $`g`$: they evaluate values,
//! gradients and proximal mappings through the traits below. Mutating
//! variants write into buffers owned by the iteration state and only
//! return the function value.

use crate::Real;
use ndarray::prelude::*;

/// A term of the objective that can be evaluated
pub trait Term<S> {
    /// Value at `x`, without side effects
    fn value(&self, x: ArrayView1<'_, S>) -> S;
}

/// A differentiable term
pub trait Smooth<S>: Term<S> {
    /// Writes $`\nabla f(x)`$ into `grad` and returns $`f(x)`$
    fn gradient_mut(&self, grad: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>) -> S;

    /// Gradient and value out-place
    fn gradient(&self, x: ArrayView1<'_, S>) -> (Array1<S>, S)
    where
        S: Real,
    {
        let mut grad = Array1::zeros(x.len());
        let value = self.gradient_mut(grad.view_mut(), x);
        (grad, value)
    }
}

/// A term with an inexpensive proximal mapping
///
/// ```math
/// \mathrm{prox}_{\gamma g}(x) = \mathrm{arg}\!\min_z \; g(z) + \frac{1}{2\gamma}\|z - x\|_2^2
/// ```
pub trait Proximable<S>: Term<S> {
    /// Writes $`\mathrm{prox}_{\gamma g}(x)`$ into `out` and returns $`g`$ there
    fn prox_mut(&self, out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>, gamma: S) -> S;

    /// Proximal point and value out-place
    fn prox(&self, x: ArrayView1<'_, S>, gamma: S) -> (Array1<S>, S)
    where
        S: Real,
    {
        let mut out = Array1::zeros(x.len());
        let value = self.prox_mut(out.view_mut(), x, gamma);
        (out, value)
    }
}

/// The zero function, stand-in for a term that is not present
#[derive(Clone, Copy, Debug, Default)]
pub struct Zero;

impl<S: Real> Term<S> for Zero {
    #[inline]
    fn value(&self, _x: ArrayView1<'_, S>) -> S {
        S::zero()
    }
}

impl<S: Real> Smooth<S> for Zero {
    #[inline]
    fn gradient_mut(&self, mut grad: ArrayViewMut1<'_, S>, _x: ArrayView1<'_, S>) -> S {
        grad.fill(S::zero());
        S::zero()
    }
}

impl<S: Real> Proximable<S> for Zero {
    #[inline]
    fn prox_mut(&self, mut out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>, _gamma: S) -> S {
        out.assign(&x);
        S::zero()
    }
}

// `None` is the zero function
impl<S: Real, T: Term<S>> Term<S> for Option<T> {
    fn value(&self, x: ArrayView1<'_, S>) -> S {
        match self {
            Some(term) => term.value(x),
            None => S::zero(),
        }
    }
}

impl<S: Real, T: Smooth<S>> Smooth<S> for Option<T> {
    fn gradient_mut(&self, grad: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>) -> S {
        match self {
            Some(term) => term.gradient_mut(grad, x),
            None => Zero.gradient_mut(grad, x),
        }
    }
}

impl<S: Real, T: Proximable<S>> Proximable<S> for Option<T> {
    fn prox_mut(&self, out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>, gamma: S) -> S {
        match self {
            Some(term) => term.prox_mut(out, x, gamma),
            None => Zero.prox_mut(out, x, gamma),
        }
    }
}

impl<'a, S, T: Term<S> + ?Sized> Term<S> for &'a T {
    #[inline]
    fn value(&self, x: ArrayView1<'_, S>) -> S {
        (**self).value(x)
    }
}

impl<'a, S, T: Smooth<S> + ?Sized> Smooth<S> for &'a T {
    #[inline]
    fn gradient_mut(&self, grad: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>) -> S {
        (**self).gradient_mut(grad, x)
    }
}

impl<'a, S, T: Proximable<S> + ?Sized> Proximable<S> for &'a T {
    #[inline]
    fn prox_mut(&self, out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>, gamma: S) -> S {
        (**self).prox_mut(out, x, gamma)
    }
}

/// Smooth term from a value closure and a gradient closure
pub struct SmoothFn<V, G> {
    value: V,
    gradient: G,
}

impl<V, G> SmoothFn<V, G> {
    pub fn new<S>(value: V, gradient: G) -> SmoothFn<V, G>
    where
        V: Fn(ArrayView1<S>) -> S,
        G: Fn(ArrayView1<S>) -> Array1<S>,
    {
        SmoothFn { value, gradient }
    }
}

impl<S, V, G> Term<S> for SmoothFn<V, G>
where
    V: Fn(ArrayView1<S>) -> S,
{
    fn value(&self, x: ArrayView1<'_, S>) -> S {
        (self.value)(x)
    }
}

impl<S, V, G> Smooth<S> for SmoothFn<V, G>
where
    S: Real,
    V: Fn(ArrayView1<S>) -> S,
    G: Fn(ArrayView1<S>) -> Array1<S>,
{
    fn gradient_mut(&self, mut grad: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>) -> S {
        grad.assign(&(self.gradient)(x));
        (self.value)(x)
    }
}

/// Proximable term from a value closure and a proximal closure `(x, gamma)`
pub struct ProxFn<V, P> {
    value: V,
    prox: P,
}

impl<V, P> ProxFn<V, P> {
    pub fn new<S>(value: V, prox: P) -> ProxFn<V, P>
    where
        V: Fn(ArrayView1<S>) -> S,
        P: Fn(ArrayView1<S>, S) -> Array1<S>,
    {
        ProxFn { value, prox }
    }
}

impl<S, V, P> Term<S> for ProxFn<V, P>
where
    V: Fn(ArrayView1<S>) -> S,
{
    fn value(&self, x: ArrayView1<'_, S>) -> S {
        (self.value)(x)
    }
}

impl<S, V, P> Proximable<S> for ProxFn<V, P>
where
    S: Real,
    V: Fn(ArrayView1<S>) -> S,
    P: Fn(ArrayView1<S>, S) -> Array1<S>,
{
    fn prox_mut(&self, mut out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>, gamma: S) -> S {
        out.assign(&(self.prox)(x, gamma));
        (self.value)(out.view())
    }
}

/// Separable sum $`h(u) = h_1(u_{1:k}) + h_2(u_{k+1:n})`$
///
/// Paired with [`Stacked`](crate::linop::Stacked) it expresses
/// $`f_s(A_s x) + f_q(A_q x)`$, where `split` is the output length of $`A_s`$.
#[derive(Clone, Debug)]
pub struct SeparableSum<F1, F2> {
    first: F1,
    second: F2,
    split: usize,
}

impl<F1, F2> SeparableSum<F1, F2> {
    pub fn new(first: F1, second: F2, split: usize) -> SeparableSum<F1, F2> {
        SeparableSum {
            first,
            second,
            split,
        }
    }
}

impl<S, F1, F2> Term<S> for SeparableSum<F1, F2>
where
    S: Real,
    F1: Term<S>,
    F2: Term<S>,
{
    fn value(&self, x: ArrayView1<'_, S>) -> S {
        let (x1, x2) = x.split_at(Axis(0), self.split);
        self.first.value(x1) + self.second.value(x2)
    }
}

impl<S, F1, F2> Smooth<S> for SeparableSum<F1, F2>
where
    S: Real,
    F1: Smooth<S>,
    F2: Smooth<S>,
{
    fn gradient_mut(&self, grad: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>) -> S {
        let (x1, x2) = x.split_at(Axis(0), self.split);
        let (g1, g2) = grad.split_at(Axis(0), self.split);
        self.first.gradient_mut(g1, x1) + self.second.gradient_mut(g2, x2)
    }
}

impl<S, F1, F2> Proximable<S> for SeparableSum<F1, F2>
where
    S: Real,
    F1: Proximable<S>,
    F2: Proximable<S>,
{
    fn prox_mut(&self, out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>, gamma: S) -> S {
        let (x1, x2) = x.split_at(Axis(0), self.split);
        let (o1, o2) = out.split_at(Axis(0), self.split);
        self.first.prox_mut(o1, x1, gamma) + self.second.prox_mut(o2, x2, gamma)
    }
}

/// Checks the objective at the starting point
pub(crate) fn ensure_finite<S: Real>(value: S) -> crate::Result<S> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(crate::Error::InfeasibleStart {
            value: value.to_f64().unwrap_or(std::f64::NAN),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{LeastSquares, NormL1};
    use approx::assert_abs_diff_eq;

    #[test]
    fn zero_term() {
        let x = array![1.0, -2.0];
        assert_eq!(Term::<f64>::value(&Zero, x.view()), 0.0);
        let (grad, value) = Smooth::<f64>::gradient(&Zero, x.view());
        assert_eq!(value, 0.0);
        assert!(grad == array![0.0, 0.0]);
        let (p, value) = Proximable::<f64>::prox(&Zero, x.view(), 3.0);
        assert_eq!(value, 0.0);
        assert!(p == x);
    }

    #[test]
    fn absent_term_is_zero() {
        let x = array![1.0, -2.0];
        let g: Option<NormL1<f64>> = None;
        assert_eq!(g.value(x.view()), 0.0);
        let (p, _) = g.prox(x.view(), 1.0);
        assert!(p == x);

        let g = Some(NormL1::new(0.5));
        assert_abs_diff_eq!(g.value(x.view()), 1.5);
        let (p, value) = g.prox(x.view(), 1.0);
        assert!(p == array![0.5, -1.5]);
        assert_abs_diff_eq!(value, 1.0);
    }

    #[test]
    fn closures() {
        let f = SmoothFn::new(
            |x: ArrayView1<f64>| 0.5 * x.dot(&x),
            |x: ArrayView1<f64>| x.to_owned(),
        );
        let (grad, value) = f.gradient(array![3.0, 4.0].view());
        assert_abs_diff_eq!(value, 12.5);
        assert!(grad == array![3.0, 4.0]);

        // projection onto the nonnegative orthant
        let g = ProxFn::new(
            |x: ArrayView1<f64>| {
                if x.iter().all(|&v| v >= 0.0) {
                    0.0
                } else {
                    std::f64::INFINITY
                }
            },
            |x: ArrayView1<f64>, _gamma: f64| x.mapv(|v| v.max(0.0)),
        );
        let (p, value) = g.prox(array![-1.0, 2.0].view(), 0.1);
        assert!(p == array![0.0, 2.0]);
        assert_eq!(value, 0.0);
    }

    #[test]
    fn separable_sum_splits_input() {
        let f = SeparableSum::new(
            LeastSquares::new(array![[1.0]], array![1.0]),
            LeastSquares::new(array![[2.0, 0.0], [0.0, 1.0]], array![0.0, 1.0]),
            1,
        );
        let x = array![3.0, 1.0, 1.0];
        assert_abs_diff_eq!(f.value(x.view()), 2.0 + 2.0);
        let (grad, value) = f.gradient(x.view());
        assert_abs_diff_eq!(value, 4.0);
        assert_abs_diff_eq!(grad, array![2.0, 4.0, 0.0]);

        let g = SeparableSum::new(NormL1::new(1.0), Zero, 2);
        let (p, value) = g.prox(array![3.0, -0.5, 7.0].view(), 1.0);
        assert!(p == array![2.0, 0.0, 7.0]);
        assert_abs_diff_eq!(value, 2.0);
    }

    #[test]
    fn infinite_start_is_rejected() {
        assert!(ensure_finite(1.0f32).is_ok());
        match ensure_finite(std::f64::INFINITY) {
            Err(crate::Error::InfeasibleStart { value }) => assert!(value.is_infinite()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
