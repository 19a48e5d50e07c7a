//! Photon-count masking and spatial median smoothing.

use flimkit_core::error::{Error, Result};
use ndarray::{Array2, ArrayView2, ArrayViewD, Axis, Ix2, Ix3, Zip};
use rayon::prelude::*;

/// Pixel below the photon minimum.
pub const LABEL_BELOW: u8 = 0;
/// Pixel inside the photon range.
pub const LABEL_KEPT: u8 = 1;
/// Pixel above the photon maximum.
pub const LABEL_ABOVE: u8 = 2;

/// Sums a `(time, row, column)` count array over time.
///
/// # Errors
/// Returns [`Error::InputShape`] unless `counts` is 3-D.
pub fn photon_sum(counts: ArrayViewD<'_, u32>) -> Result<Array2<u64>> {
    let ndim = counts.ndim();
    let counts = counts
        .into_dimensionality::<Ix3>()
        .map_err(|_| Error::wrong_ndim("photon counts", 3, ndim))?;
    Ok(flimkit_core::signal::photon_sum(counts))
}

/// Labels each pixel as below, inside or above an inclusive photon range.
///
/// With `max = None` the range is unbounded above and no pixel is labeled
/// [`LABEL_ABOVE`].
///
/// # Errors
/// Returns [`Error::InputShape`] unless `counts` is 2-D.
pub fn photon_range_mask(
    counts: ArrayViewD<'_, u64>,
    min: u64,
    max: Option<u64>,
) -> Result<Array2<u8>> {
    let ndim = counts.ndim();
    let counts = counts
        .into_dimensionality::<Ix2>()
        .map_err(|_| Error::wrong_ndim("photon counts", 2, ndim))?;
    Ok(counts.mapv(|c| {
        if c < min {
            LABEL_BELOW
        } else if max.is_some_and(|m| c > m) {
            LABEL_ABOVE
        } else {
            LABEL_KEPT
        }
    }))
}

/// Returns copies of `g` and `s` with NaN wherever `labels` is not
/// [`LABEL_KEPT`].
///
/// # Errors
/// Returns [`Error::InputShape`] if the three arrays differ in shape.
pub fn apply_threshold(
    g: ArrayView2<'_, f64>,
    s: ArrayView2<'_, f64>,
    labels: ArrayView2<'_, u8>,
) -> Result<(Array2<f64>, Array2<f64>)> {
    if g.shape() != s.shape() {
        return Err(Error::shape_mismatch("g/s", g.shape(), s.shape()));
    }
    if g.shape() != labels.shape() {
        return Err(Error::shape_mismatch("g/labels", g.shape(), labels.shape()));
    }
    let mask = |&v: &f64, &l: &u8| if l == LABEL_KEPT { v } else { f64::NAN };
    let g_out = Zip::from(&g).and(&labels).map_collect(mask);
    let s_out = Zip::from(&s).and(&labels).map_collect(mask);
    Ok((g_out, s_out))
}

fn validate_median(kernel: usize, repeat: usize) -> Result<()> {
    if kernel == 0 || kernel % 2 == 0 {
        return Err(Error::Config(format!(
            "median kernel must be odd and >= 1, got {kernel}"
        )));
    }
    if repeat == 0 {
        return Err(Error::Config("median repeat must be >= 1".to_string()));
    }
    Ok(())
}

/// Median of the finite values in `window`; reorders the slice.
fn finite_median(window: &mut Vec<f64>) -> f64 {
    window.retain(|v| v.is_finite());
    if window.is_empty() {
        return f64::NAN;
    }
    window.sort_unstable_by(f64::total_cmp);
    let mid = window.len() / 2;
    if window.len() % 2 == 0 {
        (window[mid - 1] + window[mid]) / 2.0
    } else {
        window[mid]
    }
}

fn median_pass(image: ArrayView2<'_, f64>, kernel: usize) -> Array2<f64> {
    let (rows, cols) = image.dim();
    let half = kernel / 2;
    let mut out = Array2::<f64>::zeros((rows, cols));

    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(r, mut row)| {
            let mut window = Vec::with_capacity(kernel * kernel);
            for c in 0..cols {
                let center = image[[r, c]];
                if center.is_nan() {
                    row[c] = f64::NAN;
                    continue;
                }
                window.clear();
                for dr in 0..kernel {
                    // nearest-edge: clamp into the image
                    let rr = (r + dr).saturating_sub(half).min(rows - 1);
                    for dc in 0..kernel {
                        let cc = (c + dc).saturating_sub(half).min(cols - 1);
                        window.push(image[[rr, cc]]);
                    }
                }
                row[c] = finite_median(&mut window);
            }
        });
    out
}

/// 2-D median filter with nearest-edge handling, applied `repeat` times.
///
/// NaN pixels stay NaN and are left out of their neighbours' medians.
///
/// # Errors
/// Returns [`Error::Config`] for an even or zero kernel, or zero repeats.
pub fn median_filter(image: ArrayView2<'_, f64>, kernel: usize, repeat: usize) -> Result<Array2<f64>> {
    validate_median(kernel, repeat)?;
    let mut current = image.to_owned();
    if image.is_empty() {
        return Ok(current);
    }
    for _ in 0..repeat {
        current = median_pass(current.view(), kernel);
    }
    Ok(current)
}

/// Median-filters both phasor coordinate images with the same parameters.
///
/// # Errors
/// Returns [`Error::InputShape`] if `g` and `s` differ in shape, otherwise
/// as [`median_filter`].
pub fn median_filter_phasor(
    g: ArrayView2<'_, f64>,
    s: ArrayView2<'_, f64>,
    kernel: usize,
    repeat: usize,
) -> Result<(Array2<f64>, Array2<f64>)> {
    if g.shape() != s.shape() {
        return Err(Error::shape_mismatch("g/s", g.shape(), s.shape()));
    }
    log::debug!("median filter: kernel {kernel}, {repeat} pass(es)");
    Ok((
        median_filter(g, kernel, repeat)?,
        median_filter(s, kernel, repeat)?,
    ))
}
