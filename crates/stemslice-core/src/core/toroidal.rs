//! Toroidal index arithmetic shared by the anti-aliasing mask, the diffraction
//! export and the single-probe crop.
//!
//! The "quarter window" of an `ny x nx` periodic field is the `ny/2 x nx/2`
//! block centred on the zero frequency. Window element `(y, x)` reads the
//! source pixel `((y - ny/4) mod ny, (x - nx/4) mod nx)`, so the zero frequency
//! lands at window index `(ny/4, nx/4)`.

use ndarray::{Array2, ArrayView2};

/// Source index along one axis of length `n` for window index `i`.
#[inline]
pub fn wrap_offset(i: usize, n: usize) -> usize {
    (i + n - n / 4) % n
}

/// Iterates the quarter window in row-major (y, then x) order, yielding
/// `(window_index, source_index)` pairs as `[y, x]`.
pub fn quarter_window(
    ny: usize,
    nx: usize,
) -> impl Iterator<Item = ([usize; 2], [usize; 2])> {
    (0..ny / 2).flat_map(move |y| {
        (0..nx / 2).map(move |x| ([y, x], [wrap_offset(y, ny), wrap_offset(x, nx)]))
    })
}

/// Copies the quarter window out of `field`, indexed `[[y, x]]`.
pub fn quarter_shift<T: Clone>(field: ArrayView2<'_, T>) -> Array2<T> {
    let (ny, nx) = field.dim();
    Array2::from_shape_fn((ny / 2, nx / 2), |(y, x)| {
        field[[wrap_offset(y, ny), wrap_offset(x, nx)]].clone()
    })
}

/// Copies the quarter window out of `field`, indexed `[[x, y]]`.
pub fn quarter_shift_transposed<T: Clone>(field: ArrayView2<'_, T>) -> Array2<T> {
    let (ny, nx) = field.dim();
    Array2::from_shape_fn((nx / 2, ny / 2), |(x, y)| {
        field[[wrap_offset(y, ny), wrap_offset(x, nx)]].clone()
    })
}

/// Moves element `(y, x)` to `((y + ny/2) mod ny, (x + nx/2) mod nx)`.
pub fn fftshift2<T: Clone>(field: ArrayView2<'_, T>) -> Array2<T> {
    let (ny, nx) = field.dim();
    let (hy, hx) = (ny / 2, nx / 2);
    Array2::from_shape_fn((ny, nx), |(y, x)| {
        field[[(y + ny - hy) % ny, (x + nx - hx) % nx]].clone()
    })
}
