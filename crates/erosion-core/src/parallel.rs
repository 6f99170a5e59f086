//! Per-cell pass helpers.
//!
//! With the `threading` feature every pass runs on the rayon pool; cells are
//! independent and the call returns only after every cell is written, so each
//! call is a full barrier between stages.

#[cfg(feature = "threading")]
use rayon::prelude::*;

/// Write `f(i)` into every cell of `out`.
pub(crate) fn fill_cells<T, F>(out: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    #[cfg(feature = "threading")]
    out.par_iter_mut().enumerate().for_each(|(i, v)| *v = f(i));
    #[cfg(not(feature = "threading"))]
    out.iter_mut().enumerate().for_each(|(i, v)| *v = f(i));
}

/// Replace every cell of `data` with `f(value)`.
pub(crate) fn map_cells<F>(data: &mut [f32], f: F)
where
    F: Fn(f32) -> f32 + Sync + Send,
{
    #[cfg(feature = "threading")]
    data.par_iter_mut().for_each(|v| *v = f(*v));
    #[cfg(not(feature = "threading"))]
    data.iter_mut().for_each(|v| *v = f(*v));
}

/// Write a pair of outputs per cell into two equally sized slices.
pub(crate) fn fill_cells2<A, B, F>(a: &mut [A], b: &mut [B], f: F)
where
    A: Send,
    B: Send,
    F: Fn(usize) -> (A, B) + Sync + Send,
{
    debug_assert_eq!(a.len(), b.len());
    #[cfg(feature = "threading")]
    a.par_iter_mut()
        .zip(b.par_iter_mut())
        .enumerate()
        .for_each(|(i, (va, vb))| (*va, *vb) = f(i));
    #[cfg(not(feature = "threading"))]
    a.iter_mut()
        .zip(b.iter_mut())
        .enumerate()
        .for_each(|(i, (va, vb))| (*va, *vb) = f(i));
}

const EMPTY_RANGE: (f32, f32) = (f32::INFINITY, f32::NEG_INFINITY);

fn merge_ranges((lo, hi): (f32, f32), (a, b): (f32, f32)) -> (f32, f32) {
    (lo.min(a), hi.max(b))
}

/// Minimum and maximum of `data`; `(+∞, −∞)` when empty.
///
/// min/max are exact and associative, so the result does not depend on how
/// the reduction is split across workers.
#[cfg(feature = "threading")]
pub(crate) fn min_max(data: &[f32]) -> (f32, f32) {
    data.par_iter()
        .fold(|| EMPTY_RANGE, |acc, &v| merge_ranges(acc, (v, v)))
        .reduce(|| EMPTY_RANGE, merge_ranges)
}

#[cfg(not(feature = "threading"))]
pub(crate) fn min_max(data: &[f32]) -> (f32, f32) {
    data.iter().fold(EMPTY_RANGE, |acc, &v| merge_ranges(acc, (v, v)))
}
