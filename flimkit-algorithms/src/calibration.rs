//! Phase/modulation calibration against a reference of known lifetime.
//!
//! Fitting rotates and scales the reference centroid onto the semicircle
//! point of its known lifetime:
//!
//! ```text
//! phase_zero      = angle(expected) - angle(actual)
//! modulation_zero = |expected| / |actual|
//! g' = g·M·cos(φ) - s·M·sin(φ)
//! s' = g·M·sin(φ) + s·M·cos(φ)
//! ```

use crate::lifetime::{angular_frequency, semicircle_point};
use crate::transform::phasor_from_signal;
use flimkit_core::config::CalibrationConfig;
use flimkit_core::error::{Error, Result};
use flimkit_core::phasor::PhasorMap;
use flimkit_core::signal::{Frequency, RawSignal};
use ndarray::{Array, ArrayView, Dimension, Zip};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fitted correction plus the inputs it was fitted from.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationState {
    /// Rotation in radians.
    pub phase_zero: f64,
    /// Scale factor, always > 0.
    pub modulation_zero: f64,
    pub reference_lifetime_ns: f64,
    pub frequency_mhz: f64,
    pub harmonic: u32,
}

impl CalibrationState {
    /// Maps one raw coordinate pair to calibrated coordinates.
    #[inline]
    #[must_use]
    pub fn apply_point(&self, g: f64, s: f64) -> (f64, f64) {
        rotate_scale(g, s, self.modulation_zero, self.phase_zero)
    }
}

#[inline]
fn rotate_scale(g: f64, s: f64, modulation: f64, phase: f64) -> (f64, f64) {
    let g_trans = modulation * phase.cos();
    let s_trans = modulation * phase.sin();
    (g * g_trans - s * s_trans, g * s_trans + s * g_trans)
}

/// Intensity-weighted centroid of the finite coordinates of a phasor map.
///
/// Pixels with NaN coordinates or non-positive intensity are ignored.
///
/// # Errors
/// Returns [`Error::Calibration`] when no pixel carries weight.
pub fn phasor_center(map: &PhasorMap) -> Result<(f64, f64)> {
    let mut weight = 0.0;
    let mut sum_g = 0.0;
    let mut sum_s = 0.0;
    Zip::from(map.mean())
        .and(map.real())
        .and(map.imag())
        .for_each(|&m, &g, &s| {
            if m > 0.0 && m.is_finite() && g.is_finite() && s.is_finite() {
                weight += m;
                sum_g += m * g;
                sum_s += m * s;
            }
        });
    if weight <= 0.0 {
        return Err(Error::Calibration(
            "reference has no pixels with photons".to_string(),
        ));
    }
    Ok((sum_g / weight, sum_s / weight))
}

/// Calibration owner shared by every dataset in a session.
///
/// Starts uncalibrated, where [`Calibration::apply`] is the identity. Each
/// successful fit replaces the state in one assignment and bumps
/// [`Calibration::revision`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calibration {
    state: Option<CalibrationState>,
    revision: u64,
}

impl Calibration {
    /// Creates an uncalibrated instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fits the correction from a reference phasor map.
    ///
    /// The harmonic is taken from the map. On error the previous state is
    /// left in place.
    ///
    /// # Errors
    /// Returns [`Error::Calibration`] for a non-positive frequency, a negative
    /// or non-finite lifetime, or a reference whose centroid is undefined or
    /// at the origin.
    pub fn fit(
        &mut self,
        reference: &PhasorMap,
        reference_lifetime_ns: f64,
        frequency_mhz: f64,
    ) -> Result<&CalibrationState> {
        if !(frequency_mhz.is_finite() && frequency_mhz > 0.0) {
            return Err(Error::Calibration(format!(
                "frequency must be finite and > 0 MHz, got {frequency_mhz}"
            )));
        }
        if !(reference_lifetime_ns.is_finite() && reference_lifetime_ns >= 0.0) {
            return Err(Error::Calibration(format!(
                "reference lifetime must be finite and >= 0 ns, got {reference_lifetime_ns}"
            )));
        }

        let harmonic = reference.harmonic();
        let omega = angular_frequency(frequency_mhz, harmonic)?;
        let (expected_g, expected_s) = semicircle_point(omega, reference_lifetime_ns);
        let (actual_g, actual_s) = phasor_center(reference)?;

        let actual_modulation = actual_g.hypot(actual_s);
        if !(actual_modulation.is_finite() && actual_modulation > 0.0) {
            return Err(Error::Calibration(format!(
                "reference centroid ({actual_g}, {actual_s}) has zero magnitude"
            )));
        }

        let state = CalibrationState {
            phase_zero: expected_s.atan2(expected_g) - actual_s.atan2(actual_g),
            modulation_zero: expected_g.hypot(expected_s) / actual_modulation,
            reference_lifetime_ns,
            frequency_mhz,
            harmonic,
        };
        log::debug!(
            "calibration fit: phase_zero={:.6} rad, modulation_zero={:.6} (tau={reference_lifetime_ns} ns, f={frequency_mhz} MHz, h={harmonic})",
            state.phase_zero,
            state.modulation_zero
        );

        self.revision += 1;
        let state: &CalibrationState = self.state.insert(state);
        Ok(state)
    }

    /// Computes the reference phasor from a raw signal and fits against it.
    ///
    /// The configured frequency wins over the signal's own; without either
    /// the 80 MHz fallback is used and a warning logged.
    ///
    /// # Errors
    /// Propagates configuration, transform and fit errors.
    pub fn fit_signal(
        &mut self,
        reference: &RawSignal,
        config: &CalibrationConfig,
    ) -> Result<&CalibrationState> {
        config.validate()?;
        let frequency = match config.frequency_mhz {
            Some(f) => Frequency::Embedded(f),
            None => reference.metadata().resolve_frequency(),
        };
        if frequency.is_fallback() {
            log::warn!(
                "reference signal has no repetition frequency, using {} MHz",
                frequency.mhz()
            );
        }
        let map = phasor_from_signal(reference, config.harmonic)?;
        self.fit(&map, config.reference_lifetime_ns, frequency.mhz())
    }

    /// Calibrates coordinate arrays of any shape.
    ///
    /// NaN inputs stay NaN.
    ///
    /// # Errors
    /// Returns [`Error::InputShape`] if the arrays differ in shape.
    pub fn apply<D: Dimension>(
        &self,
        real: ArrayView<'_, f64, D>,
        imag: ArrayView<'_, f64, D>,
    ) -> Result<(Array<f64, D>, Array<f64, D>)> {
        if real.shape() != imag.shape() {
            return Err(Error::shape_mismatch("real/imag", real.shape(), imag.shape()));
        }
        let Some(state) = self.state else {
            return Ok((real.to_owned(), imag.to_owned()));
        };

        let mut g_out = Array::zeros(real.raw_dim());
        let mut s_out = Array::zeros(real.raw_dim());
        Zip::from(&mut g_out)
            .and(&mut s_out)
            .and(&real)
            .and(&imag)
            .par_for_each(|go, so, &g, &s| {
                (*go, *so) = state.apply_point(g, s);
            });
        Ok((g_out, s_out))
    }

    /// Calibrates a single point.
    #[must_use]
    pub fn apply_point(&self, g: f64, s: f64) -> (f64, f64) {
        match self.state {
            Some(state) => state.apply_point(g, s),
            None => (g, s),
        }
    }

    /// Returns the fitted state, if any.
    #[must_use]
    pub fn state(&self) -> Option<&CalibrationState> {
        self.state.as_ref()
    }

    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.state.is_some()
    }

    /// Number of successful fits so far.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Frequency the calibration was fitted at.
    #[must_use]
    pub fn frequency_mhz(&self) -> Option<f64> {
        self.state.map(|s| s.frequency_mhz)
    }

    /// `(phase_zero, modulation_zero)`, identity when uncalibrated.
    #[must_use]
    pub fn parameters(&self) -> (f64, f64) {
        self.state
            .map_or((0.0, 1.0), |s| (s.phase_zero, s.modulation_zero))
    }
}
