//! Apparent and projected fluorescence lifetimes.
//!
//! All per-pixel degeneracies come out as NaN. Only whole-array
//! preconditions (a non-positive frequency, mismatched shapes) are errors.

use flimkit_core::error::{Error, Result};
use ndarray::{Array, Array2, ArrayView, ArrayView2, Dimension, Zip};
use std::f64::consts::PI;

/// Angular frequency in rad/ns for a repetition rate in MHz.
///
/// # Errors
/// Returns [`Error::Config`] if the frequency is not finite and positive, or
/// the harmonic is zero.
pub fn angular_frequency(frequency_mhz: f64, harmonic: u32) -> Result<f64> {
    if !(frequency_mhz.is_finite() && frequency_mhz > 0.0) {
        return Err(Error::Config(format!(
            "frequency must be finite and > 0 MHz, got {frequency_mhz}"
        )));
    }
    if harmonic == 0 {
        return Err(Error::Config("harmonic must be >= 1".to_string()));
    }
    // MHz * ns = 1e-3
    Ok(2.0 * PI * frequency_mhz * f64::from(harmonic) * 1e-3)
}

/// Point on the universal semicircle for a mono-exponential decay.
#[inline]
#[must_use]
pub fn semicircle_point(omega: f64, lifetime_ns: f64) -> (f64, f64) {
    let wt = omega * lifetime_ns;
    let denom = 1.0 + wt * wt;
    (1.0 / denom, wt / denom)
}

/// Phasor coordinates of a mono-exponential decay with the given lifetime.
///
/// # Errors
/// Same conditions as [`angular_frequency`].
pub fn phasor_from_lifetime(
    lifetime_ns: f64,
    frequency_mhz: f64,
    harmonic: u32,
) -> Result<(f64, f64)> {
    let omega = angular_frequency(frequency_mhz, harmonic)?;
    Ok(semicircle_point(omega, lifetime_ns))
}

#[inline]
fn phase_lifetime_at(g: f64, s: f64, omega: f64) -> f64 {
    s.atan2(g).tan() / omega
}

#[inline]
fn modulation_lifetime_at(g: f64, s: f64, omega: f64) -> f64 {
    let radicand = 1.0 / (g * g + s * s) - 1.0;
    if radicand >= 0.0 {
        radicand.sqrt() / omega
    } else {
        // also catches NaN
        f64::NAN
    }
}

#[inline]
fn normal_lifetime_at(g: f64, s: f64, omega: f64) -> f64 {
    if !(g > 0.0 && g < 1.0) {
        return f64::NAN;
    }
    // mirror points below the axis; NaN `s` stays NaN through atan2
    let alpha = s.abs().atan2(g - 0.5);
    (alpha / 2.0).tan() / omega
}

fn check_shapes<D: Dimension>(g: &ArrayView<'_, f64, D>, s: &ArrayView<'_, f64, D>) -> Result<()> {
    if g.shape() != s.shape() {
        return Err(Error::shape_mismatch("g/s", g.shape(), s.shape()));
    }
    Ok(())
}

/// Apparent phase and modulation lifetimes in ns.
///
/// Returns `(phase, modulation)`.
///
/// # Errors
/// Returns [`Error::InputShape`] on mismatched shapes and [`Error::Config`]
/// for a non-positive frequency.
pub fn apparent_lifetime<D: Dimension>(
    g: ArrayView<'_, f64, D>,
    s: ArrayView<'_, f64, D>,
    frequency_mhz: f64,
    harmonic: u32,
) -> Result<(Array<f64, D>, Array<f64, D>)> {
    check_shapes(&g, &s)?;
    let omega = angular_frequency(frequency_mhz, harmonic)?;
    let phase = Zip::from(&g)
        .and(&s)
        .par_map_collect(|&g, &s| phase_lifetime_at(g, s, omega));
    let modulation = Zip::from(&g)
        .and(&s)
        .par_map_collect(|&g, &s| modulation_lifetime_at(g, s, omega));
    Ok((phase, modulation))
}

/// Lifetime of each point projected radially onto the universal semicircle.
///
/// The projection runs along the ray from the semicircle center `(0.5, 0)`,
/// so a point at angle `α` around the center maps to `tan(α/2) / ω`.
/// The projection is symmetric in `s`: points slightly below the axis get
/// the lifetime of their mirror image. `g` outside `(0, 1)` gives NaN.
///
/// # Errors
/// Same conditions as [`apparent_lifetime`].
pub fn normal_lifetime<D: Dimension>(
    g: ArrayView<'_, f64, D>,
    s: ArrayView<'_, f64, D>,
    frequency_mhz: f64,
    harmonic: u32,
) -> Result<Array<f64, D>> {
    check_shapes(&g, &s)?;
    let omega = angular_frequency(frequency_mhz, harmonic)?;
    Ok(Zip::from(&g)
        .and(&s)
        .par_map_collect(|&g, &s| normal_lifetime_at(g, s, omega)))
}

/// The three lifetime images of a dataset plus the frequency they used.
#[derive(Debug, Clone, PartialEq)]
pub struct LifetimeMaps {
    pub phase: Array2<f64>,
    pub modulation: Array2<f64>,
    pub normal: Array2<f64>,
    pub frequency_mhz: f64,
    pub harmonic: u32,
}

impl LifetimeMaps {
    /// Computes all three maps from working coordinates.
    ///
    /// # Errors
    /// Same conditions as [`apparent_lifetime`].
    pub fn compute(
        g: ArrayView2<'_, f64>,
        s: ArrayView2<'_, f64>,
        frequency_mhz: f64,
        harmonic: u32,
    ) -> Result<Self> {
        let (phase, modulation) = apparent_lifetime(g, s, frequency_mhz, harmonic)?;
        let normal = normal_lifetime(g, s, frequency_mhz, harmonic)?;
        Ok(Self {
            phase,
            modulation,
            normal,
            frequency_mhz,
            harmonic,
        })
    }
}
