//! Data for drawing phasor plots.
//!
//! Nothing here renders; these helpers produce the point sets and binned
//! counts a plotting collaborator needs.
#![allow(clippy::cast_precision_loss)]

use crate::lifetime::{angular_frequency, semicircle_point};
use flimkit_core::error::{Error, Result};
use ndarray::{Array2, ArrayView2, Zip};
use std::f64::consts::PI;

/// Default cap on the number of scatter points handed to a plot.
pub const DEFAULT_MAX_POINTS: usize = 200_000;

/// Lifetimes (ns) marked on the semicircle by default.
pub const DEFAULT_MARKER_LIFETIMES: [f64; 5] = [0.5, 1.0, 2.0, 4.0, 8.0];

/// Polyline of the universal semicircle from (1, 0) to (0, 0).
///
/// Returns `samples` points, at least two.
#[must_use]
pub fn universal_semicircle(samples: usize) -> Vec<(f64, f64)> {
    let samples = samples.max(2);
    let last = (samples - 1) as f64;
    (0..samples)
        .map(|i| {
            let theta = PI * i as f64 / last;
            (0.5 + 0.5 * theta.cos(), 0.5 * theta.sin())
        })
        .collect()
}

/// A labelled lifetime position on the semicircle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifetimeMarker {
    pub lifetime_ns: f64,
    pub real: f64,
    pub imag: f64,
}

/// Semicircle positions of the given lifetimes.
///
/// # Errors
/// Returns [`Error::Config`] for a non-positive frequency or zero harmonic.
pub fn lifetime_markers(
    frequency_mhz: f64,
    harmonic: u32,
    lifetimes: &[f64],
) -> Result<Vec<LifetimeMarker>> {
    let omega = angular_frequency(frequency_mhz, harmonic)?;
    Ok(lifetimes
        .iter()
        .map(|&lifetime_ns| {
            let (real, imag) = semicircle_point(omega, lifetime_ns);
            LifetimeMarker {
                lifetime_ns,
                real,
                imag,
            }
        })
        .collect())
}

/// Pairs of finite `(g, s)` values, decimated by a uniform stride so that
/// at most `max_points` are returned.
///
/// # Errors
/// Returns [`Error::InputShape`] if `g` and `s` differ in shape.
pub fn finite_points(
    g: ArrayView2<'_, f64>,
    s: ArrayView2<'_, f64>,
    max_points: usize,
) -> Result<Vec<(f64, f64)>> {
    if g.shape() != s.shape() {
        return Err(Error::shape_mismatch("g/s", g.shape(), s.shape()));
    }
    let mut points = Vec::new();
    Zip::from(&g).and(&s).for_each(|&g, &s| {
        if g.is_finite() && s.is_finite() {
            points.push((g, s));
        }
    });
    if max_points == 0 {
        return Ok(Vec::new());
    }
    if points.len() > max_points {
        let stride = points.len().div_ceil(max_points);
        log::debug!(
            "decimating {} phasor points by {stride}",
            points.len()
        );
        points = points.into_iter().step_by(stride).collect();
    }
    Ok(points)
}

/// 2-D histogram of phasor coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PhasorHistogram {
    /// Counts indexed by `(s bin, g bin)`, so row 0 is the lowest `s`.
    pub counts: Array2<u64>,
    pub g_range: (f64, f64),
    pub s_range: (f64, f64),
}

impl PhasorHistogram {
    /// Default plot window of the phasor plane.
    pub const DEFAULT_G_RANGE: (f64, f64) = (-0.1, 1.1);
    pub const DEFAULT_S_RANGE: (f64, f64) = (-0.1, 0.7);

    /// Bins the finite points inside the ranges; everything else is dropped.
    ///
    /// Ranges are half-open except that the upper edge belongs to the last bin.
    ///
    /// # Errors
    /// Returns [`Error::InputShape`] on mismatched shapes and
    /// [`Error::Config`] for zero bins or an empty range.
    pub fn compute(
        g: ArrayView2<'_, f64>,
        s: ArrayView2<'_, f64>,
        bins: usize,
        g_range: (f64, f64),
        s_range: (f64, f64),
    ) -> Result<Self> {
        if g.shape() != s.shape() {
            return Err(Error::shape_mismatch("g/s", g.shape(), s.shape()));
        }
        if bins == 0 {
            return Err(Error::Config("histogram needs at least one bin".to_string()));
        }
        for (lo, hi) in [g_range, s_range] {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(Error::Config(format!("invalid histogram range ({lo}, {hi})")));
            }
        }

        let bin_of = |v: f64, (lo, hi): (f64, f64)| -> Option<usize> {
            if !(v >= lo && v <= hi) {
                return None;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let b = ((v - lo) / (hi - lo) * bins as f64) as usize;
            Some(b.min(bins - 1))
        };

        let mut counts = Array2::<u64>::zeros((bins, bins));
        Zip::from(&g).and(&s).for_each(|&g, &s| {
            if let (Some(gb), Some(sb)) = (bin_of(g, g_range), bin_of(s, s_range)) {
                counts[[sb, gb]] += 1;
            }
        });
        Ok(Self {
            counts,
            g_range,
            s_range,
        })
    }

    /// Total number of binned points.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_semicircle_endpoints() {
        let curve = universal_semicircle(101);
        assert_eq!(curve.len(), 101);
        assert_abs_diff_eq!(curve[0].0, 1.0);
        assert_abs_diff_eq!(curve[100].0, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(curve[50].1, 0.5, epsilon = 1e-12);
        for (g, s) in curve {
            assert_abs_diff_eq!((g - 0.5).hypot(s), 0.5, epsilon = 1e-12);
        }
        assert_eq!(universal_semicircle(0).len(), 2);
    }

    #[test]
    fn test_markers_lie_on_semicircle() {
        let markers = lifetime_markers(80.0, 1, &DEFAULT_MARKER_LIFETIMES).unwrap();
        assert_eq!(markers.len(), 5);
        for m in &markers {
            assert_abs_diff_eq!((m.real - 0.5).hypot(m.imag), 0.5, epsilon = 1e-12);
        }
        // longer lifetimes sit further from (1, 0)
        assert!(markers[0].real > markers[4].real);
        assert!(lifetime_markers(0.0, 1, &[1.0]).is_err());
    }

    #[test]
    fn test_finite_points_drops_nan_and_decimates() {
        let g = array![[0.1, f64::NAN, 0.3, 0.4]];
        let s = array![[0.1, 0.2, f64::INFINITY, 0.4]];
        let points = finite_points(g.view(), s.view(), DEFAULT_MAX_POINTS).unwrap();
        assert_eq!(points, vec![(0.1, 0.1), (0.4, 0.4)]);

        let g = Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as f64);
        let points = finite_points(g.view(), g.view(), 30).unwrap();
        assert!(points.len() <= 30);
        assert_eq!(points.len(), 25);
        assert_eq!(points[1], (4.0, 4.0));
        assert!(finite_points(g.view(), g.view(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_histogram_bins() {
        let g = array![[0.0, 0.5, 1.0, 2.0, f64::NAN]];
        let s = array![[0.0, 0.5, 1.0, 0.5, 0.5]];
        let hist = PhasorHistogram::compute(g.view(), s.view(), 2, (0.0, 1.0), (0.0, 1.0)).unwrap();
        assert_eq!(hist.total(), 3);
        assert_eq!(hist.counts, array![[1u64, 0], [0, 2]]);

        assert!(matches!(
            PhasorHistogram::compute(g.view(), s.view(), 0, (0.0, 1.0), (0.0, 1.0)),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            PhasorHistogram::compute(g.view(), s.view(), 4, (1.0, 1.0), (0.0, 1.0)),
            Err(Error::Config(_))
        ));
    }
}
