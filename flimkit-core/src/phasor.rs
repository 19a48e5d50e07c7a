//! Phasor coordinate maps.

use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView2};

/// Per-pixel intensity and phasor coordinates for one harmonic.
///
/// All three arrays share the same `(rows, columns)` shape. Pixels without
/// photons carry NaN coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PhasorMap {
    harmonic: u32,
    mean: Array2<f64>,
    real: Array2<f64>,
    imag: Array2<f64>,
}

impl PhasorMap {
    /// Builds a phasor map from its components.
    ///
    /// # Errors
    /// Returns [`Error::InputShape`] if the arrays differ in shape and
    /// [`Error::Config`] if `harmonic` is zero.
    pub fn new(
        harmonic: u32,
        mean: Array2<f64>,
        real: Array2<f64>,
        imag: Array2<f64>,
    ) -> Result<Self> {
        if harmonic == 0 {
            return Err(Error::Config("harmonic must be >= 1".to_string()));
        }
        if mean.shape() != real.shape() {
            return Err(Error::shape_mismatch("mean/real", mean.shape(), real.shape()));
        }
        if real.shape() != imag.shape() {
            return Err(Error::shape_mismatch("real/imag", real.shape(), imag.shape()));
        }
        Ok(Self {
            harmonic,
            mean,
            real,
            imag,
        })
    }

    /// Harmonic these coordinates were computed at.
    #[must_use]
    pub fn harmonic(&self) -> u32 {
        self.harmonic
    }

    /// Integrated intensity (sum of photon counts over time bins).
    #[must_use]
    pub fn mean(&self) -> ArrayView2<'_, f64> {
        self.mean.view()
    }

    /// Real phasor coordinate (g).
    #[must_use]
    pub fn real(&self) -> ArrayView2<'_, f64> {
        self.real.view()
    }

    /// Imaginary phasor coordinate (s).
    #[must_use]
    pub fn imag(&self) -> ArrayView2<'_, f64> {
        self.imag.view()
    }

    /// Returns `(rows, columns)`.
    #[must_use]
    pub fn dim(&self) -> (usize, usize) {
        self.mean.dim()
    }

    /// Consumes the map and returns `(mean, real, imag)`.
    #[must_use]
    pub fn into_parts(self) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
        (self.mean, self.real, self.imag)
    }
}
