//! Abstract Linear Operators and Adjoints
//!
//! The iterations only ever need $`Ax`$ and $`A^Hy`$, written into buffers
//! they own, so any matrix-free operator can be plugged in by implementing
//! [`LinearMap`].

use std::cell::RefCell;

use ndarray::linalg::general_mat_vec_mul;
use ndarray::prelude::*;
use ndarray::{Data, NdFloat};
pub use ndarray_linalg::diagonal::Diagonal;
use ndarray_linalg::norm::Norm;
use ndarray_linalg::Scalar;
use num_traits::Zero;

/// Real scalars the algorithms run on
///
/// Adds the vector norms of `ndarray_linalg` to [`NdFloat`] without
/// bringing the complex-capable [`Scalar`] methods into generic code.
pub trait Real: NdFloat {
    /// Euclidean norm
    fn norm_l2(x: ArrayView1<'_, Self>) -> Self;

    /// Maximum absolute entry
    fn norm_max(x: ArrayView1<'_, Self>) -> Self;
}

macro_rules! impl_real {
    ($($t:ty),*) => {$(
        impl Real for $t {
            #[inline]
            fn norm_l2(x: ArrayView1<'_, $t>) -> $t {
                x.norm_l2()
            }

            #[inline]
            fn norm_max(x: ArrayView1<'_, $t>) -> $t {
                x.norm_max()
            }
        }
    )*};
}

impl_real!(f32, f64);

/// A linear map $`A`$ together with its adjoint $`A^H`$
pub trait LinearMap<S> {
    /// Length of $`Ax`$ for an input of length `input_len`
    fn output_len(&self, input_len: usize) -> usize;

    /// Apply operator, writing $`Ax`$ into `out`
    fn apply_mut(&self, out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>);

    /// Apply adjoint, writing $`A^Hy`$ into `out`
    fn adjoint_mut(&self, out: ArrayViewMut1<'_, S>, y: ArrayView1<'_, S>);

    /// Apply operator out-place
    fn apply(&self, x: ArrayView1<'_, S>) -> Array1<S>
    where
        S: Clone + Zero,
    {
        let mut out = Array1::zeros(self.output_len(x.len()));
        self.apply_mut(out.view_mut(), x);
        out
    }
}

impl<'a, S, T> LinearMap<S> for &'a T
where
    T: LinearMap<S> + ?Sized,
{
    #[inline]
    fn output_len(&self, input_len: usize) -> usize {
        (**self).output_len(input_len)
    }

    #[inline]
    fn apply_mut(&self, out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>) {
        (**self).apply_mut(out, x)
    }

    #[inline]
    fn adjoint_mut(&self, out: ArrayViewMut1<'_, S>, y: ArrayView1<'_, S>) {
        (**self).adjoint_mut(out, y)
    }
}

impl<S, D> LinearMap<S> for ArrayBase<D, Ix2>
where
    S: Real,
    D: Data<Elem = S>,
{
    fn output_len(&self, _input_len: usize) -> usize {
        self.nrows()
    }

    fn apply_mut(&self, mut out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>) {
        general_mat_vec_mul(S::one(), self, &x, S::zero(), &mut out);
    }

    fn adjoint_mut(&self, mut out: ArrayViewMut1<'_, S>, y: ArrayView1<'_, S>) {
        general_mat_vec_mul(S::one(), &self.t(), &y, S::zero(), &mut out);
    }
}

/// The identity map, default for problems without a linear operator
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Identity {
    #[must_use]
    pub fn new() -> Identity {
        Identity
    }
}

impl<S: Real> LinearMap<S> for Identity {
    #[inline]
    fn output_len(&self, input_len: usize) -> usize {
        input_len
    }

    #[inline]
    fn apply_mut(&self, mut out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>) {
        out.assign(&x);
    }

    #[inline]
    fn adjoint_mut(&self, mut out: ArrayViewMut1<'_, S>, y: ArrayView1<'_, S>) {
        out.assign(&y);
    }
}

impl<S, D> LinearMap<S> for Diagonal<D>
where
    S: Real + Scalar,
    D: Data<Elem = S>,
{
    fn output_len(&self, input_len: usize) -> usize {
        input_len
    }

    fn apply_mut(&self, mut out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>) {
        out.assign(&x);
        ndarray_linalg::operator::LinearOperator::apply_mut(self, &mut out);
    }

    /// Real diagonals are self-adjoint
    fn adjoint_mut(&self, out: ArrayViewMut1<'_, S>, y: ArrayView1<'_, S>) {
        LinearMap::apply_mut(self, out, y)
    }
}

/// Vertical concatenation $`\begin{bmatrix} A_1 \\ A_2 \end{bmatrix}`$
///
/// Together with [`SeparableSum`](crate::oracle::SeparableSum) this turns
/// $`f_s(A_s x) + f_q(A_q x)`$ into a single smooth term of a single map.
#[derive(Clone, Debug)]
pub struct Stacked<S, M1, M2> {
    top: M1,
    bottom: M2,
    scratch: RefCell<Array1<S>>,
}

impl<S, M1, M2> Stacked<S, M1, M2> {
    pub fn new(top: M1, bottom: M2) -> Stacked<S, M1, M2> {
        Stacked {
            top,
            bottom,
            scratch: RefCell::new(Array1::from(Vec::new())),
        }
    }
}

impl<S, M1, M2> LinearMap<S> for Stacked<S, M1, M2>
where
    S: Real,
    M1: LinearMap<S>,
    M2: LinearMap<S>,
{
    fn output_len(&self, input_len: usize) -> usize {
        self.top.output_len(input_len) + self.bottom.output_len(input_len)
    }

    fn apply_mut(&self, mut out: ArrayViewMut1<'_, S>, x: ArrayView1<'_, S>) {
        let m = self.top.output_len(x.len());
        self.top.apply_mut(out.slice_mut(s![..m]), x);
        self.bottom.apply_mut(out.slice_mut(s![m..]), x);
    }

    /// Writes $`A_1^Hy_1`$ into `out`, then accumulates $`A_2^Hy_2`$
    /// through `scratch`, which is resized on first use
    fn adjoint_mut(&self, mut out: ArrayViewMut1<'_, S>, y: ArrayView1<'_, S>) {
        let m = self.top.output_len(out.len());
        self.top.adjoint_mut(out.view_mut(), y.slice(s![..m]));
        let mut scratch = self.scratch.borrow_mut();
        if scratch.len() != out.len() {
            *scratch = Array1::zeros(out.len());
        }
        self.bottom.adjoint_mut(scratch.view_mut(), y.slice(s![m..]));
        out += &*scratch;
    }
}

/// Euclidean norm
#[inline]
pub fn norm2<S: Real>(x: ArrayView1<'_, S>) -> S {
    S::norm_l2(x)
}

/// Maximum absolute entry
#[inline]
pub fn norm_inf<S: Real>(x: ArrayView1<'_, S>) -> S {
    S::norm_max(x)
}
