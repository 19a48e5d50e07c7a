//! Phasor transform of time-resolved photon counts.
//!
//! For harmonic `h` over `K` time bins the phasor of a pixel's histogram `c`
//! is
//!
//! ```text
//! g = Σ c_k cos(2π h k / K) / Σ c_k
//! s = Σ c_k sin(2π h k / K) / Σ c_k
//! ```
//!
//! Pixels that recorded no photons get NaN coordinates.
#![allow(clippy::cast_precision_loss)]

use flimkit_core::error::{Error, Result};
use flimkit_core::phasor::PhasorMap;
use flimkit_core::signal::{photon_sum, RawSignal};
use ndarray::{Array1, Array2, ArrayView3, ArrayViewD, Axis, Ix3, Zip};
use std::f64::consts::PI;

/// Computes the phasor map of `signal` at one harmonic.
///
/// # Errors
/// Returns [`Error::InputShape`] if the signal has fewer than 2 time bins and
/// [`Error::Config`] if the harmonic is outside `1..=bins/2`.
pub fn phasor_from_signal(signal: &RawSignal, harmonic: u32) -> Result<PhasorMap> {
    let mut maps = phasor_from_view(signal.counts(), &[harmonic])?;
    maps.pop()
        .ok_or_else(|| Error::Config("no harmonic requested".to_string()))
}

/// Computes one phasor map per requested harmonic.
///
/// The intensity pass is shared between harmonics.
///
/// # Errors
/// Same conditions as [`phasor_from_signal`], plus [`Error::Config`] for an
/// empty harmonic list.
pub fn phasor_from_signal_harmonics(
    signal: &RawSignal,
    harmonics: &[u32],
) -> Result<Vec<PhasorMap>> {
    phasor_from_view(signal.counts(), harmonics)
}

/// Computes phasor maps from a dynamically shaped `(time, row, column)` array.
///
/// # Errors
/// Returns [`Error::InputShape`] unless `counts` is 3-D with at least two
/// time bins; harmonic errors as in [`phasor_from_signal_harmonics`].
pub fn phasor_from_counts(counts: ArrayViewD<'_, u32>, harmonics: &[u32]) -> Result<Vec<PhasorMap>> {
    let ndim = counts.ndim();
    let view = counts
        .into_dimensionality::<Ix3>()
        .map_err(|_| Error::wrong_ndim("raw signal", 3, ndim))?;
    phasor_from_view(view, harmonics)
}

fn phasor_from_view(counts: ArrayView3<'_, u32>, harmonics: &[u32]) -> Result<Vec<PhasorMap>> {
    let bins = counts.len_of(Axis(0));
    if bins < 2 {
        return Err(Error::InputShape(format!(
            "raw signal needs at least 2 time bins, found {bins}"
        )));
    }
    if harmonics.is_empty() {
        return Err(Error::Config("no harmonic requested".to_string()));
    }
    for &harmonic in harmonics {
        validate_harmonic(harmonic, bins)?;
    }

    let shape = (counts.len_of(Axis(1)), counts.len_of(Axis(2)));
    let mean = photon_sum(counts).mapv(|t| t as f64);

    harmonics
        .iter()
        .map(|&harmonic| {
            let (cos_lookup, sin_lookup) = lookup_tables(bins, harmonic);
            let mut real = Array2::<f64>::zeros(shape);
            let mut imag = Array2::<f64>::zeros(shape);

            for (k, plane) in counts.axis_iter(Axis(0)).enumerate() {
                let (c, s) = (cos_lookup[k], sin_lookup[k]);
                Zip::from(&mut real)
                    .and(&mut imag)
                    .and(&plane)
                    .par_for_each(|re, im, &n| {
                        let n = f64::from(n);
                        *re += n * c;
                        *im += n * s;
                    });
            }

            Zip::from(&mut real)
                .and(&mut imag)
                .and(&mean)
                .par_for_each(|re, im, &m| {
                    if m > 0.0 {
                        *re /= m;
                        *im /= m;
                    } else {
                        *re = f64::NAN;
                        *im = f64::NAN;
                    }
                });

            log::debug!(
                "phasor transform: harmonic {harmonic}, {bins} bins, {}x{} pixels",
                shape.0,
                shape.1
            );
            PhasorMap::new(harmonic, mean.clone(), real, imag)
        })
        .collect()
}

fn validate_harmonic(harmonic: u32, bins: usize) -> Result<()> {
    if harmonic == 0 || harmonic as usize > bins / 2 {
        return Err(Error::Config(format!(
            "harmonic {harmonic} out of range 1..={} for {bins} time bins",
            bins / 2
        )));
    }
    Ok(())
}

/// Cosine and sine of the harmonic phase at each time bin.
fn lookup_tables(bins: usize, harmonic: u32) -> (Array1<f64>, Array1<f64>) {
    let step = 2.0 * PI * f64::from(harmonic) / bins as f64;
    let cos = Array1::from_shape_fn(bins, |k| (step * k as f64).cos());
    let sin = Array1::from_shape_fn(bins, |k| (step * k as f64).sin());
    (cos, sin)
}
