//! Minimization for Composite Functions consisting of
//! L-smooth _f_ and non-smooth prox-friendly _g_
//!
//! This includes common objective functions such as the LASSO
//! as well as smooth constrained methods, as a projection is
//! the proximal operator of a constraint set.
//!
//! Every algorithm is an owned problem description built with `new` and
//! `with_*` methods, implementing [`Iteration`](crate::iteration::Iteration).
//! Parameters are checked when a run starts.
#![allow(non_snake_case)]

use crate::error::{Error, Result};
use crate::fbe::ForwardBackwardPoint;
use crate::linop::LinearMap;
use crate::oracle::{ensure_finite, Proximable, Smooth};
use crate::stepsize::estimate_gamma;
use crate::Real;
use ndarray::prelude::*;
use ndarray::Zip;

mod forward_backward;
pub use forward_backward::*;

mod panoc;
pub use panoc::*;

mod zerofpr;
pub use zerofpr::*;

mod douglas_rachford;
pub use douglas_rachford::*;

mod drls;
pub use drls::*;

mod li_lin;
pub use li_lin::*;

pub(crate) fn check_gamma<S: Real>(gamma: Option<S>) -> Result<()> {
    match gamma {
        Some(gamma) if !(gamma > S::zero() && gamma.is_finite()) => Err(Error::InvalidParameter(
            format!("gamma must be positive and finite, got {}", gamma),
        )),
        _ => Ok(()),
    }
}

/// Checks `lower < value < upper`
pub(crate) fn check_open<S: Real>(name: &str, value: S, lower: S, upper: S) -> Result<()> {
    if value > lower && value < upper {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "{} must lie in ({}, {}), got {}",
            name, lower, upper, value
        )))
    }
}

/// The last line search trial is the plain forward-backward step, so a
/// search needs the unit step plus that fallback
pub(crate) fn check_backtracks(max_backtracks: usize) -> Result<()> {
    if max_backtracks < 2 {
        return Err(Error::InvalidParameter(format!(
            "max_backtracks must be at least 2, got {}",
            max_backtracks
        )));
    }
    Ok(())
}

/// Forward-backward point at `x0`, with `gamma` estimated when not given
pub(crate) fn initial_point<S, F, M, G>(
    f: &F,
    A: &M,
    g: &G,
    x0: &Array1<S>,
    gamma: Option<S>,
    alpha: S,
) -> Result<ForwardBackwardPoint<S>>
where
    S: Real,
    F: Smooth<S>,
    M: LinearMap<S>,
    G: Proximable<S>,
{
    check_gamma(gamma)?;
    check_open("alpha", alpha, S::zero(), S::one())?;
    let mut point = ForwardBackwardPoint::new(f, A, x0.to_owned(), gamma.unwrap_or_else(S::one));
    ensure_finite(point.f_ax + g.value(x0.view()))?;
    if gamma.is_none() {
        point.gamma = estimate_gamma(f, A, &point, alpha)?;
    }
    point.forward_backward(g);
    Ok(point)
}

/// $`\tau a + (1 - \tau) b`$
pub(crate) fn interpolate<S: Real>(mut out: ArrayViewMut1<'_, S>, tau: S, a: ArrayView1<'_, S>, b: ArrayView1<'_, S>) {
    let rest = S::one() - tau;
    Zip::from(&mut out)
        .and(&a)
        .and(&b)
        .for_each(|o, &a, &b| *o = tau * a + rest * b);
}

/// Sufficient-decrease tolerance for merit function values near `value`
pub(crate) fn merit_tolerance<S: Real>(value: S) -> S {
    S::from(10.).unwrap() * S::epsilon() * (S::one() + value.abs())
}
