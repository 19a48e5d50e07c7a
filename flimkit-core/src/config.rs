//! Pipeline configuration types.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Quality filter parameters applied to a dataset's working coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FilterConfig {
    /// Median kernel edge length in pixels (odd).
    pub median_kernel: usize,
    /// Number of median passes; 0 disables the median filter.
    pub median_repeat: usize,
    /// Pixels with fewer photons are discarded.
    pub min_photons: u64,
    /// Pixels with more photons are discarded; `None` means unbounded.
    pub max_photons: Option<u64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            median_kernel: 3,
            median_repeat: 0,
            min_photons: 0,
            max_photons: None,
        }
    }
}

impl FilterConfig {
    /// Creates a filter configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the median kernel size and repeat count.
    #[must_use]
    pub fn with_median(mut self, kernel: usize, repeat: usize) -> Self {
        self.median_kernel = kernel;
        self.median_repeat = repeat;
        self
    }

    /// Sets the minimum photon count.
    #[must_use]
    pub fn with_min_photons(mut self, min: u64) -> Self {
        self.min_photons = min;
        self
    }

    /// Sets the maximum photon count.
    #[must_use]
    pub fn with_max_photons(mut self, max: Option<u64>) -> Self {
        self.max_photons = max;
        self
    }

    /// Returns true when the median stage should run.
    ///
    /// Kernels smaller than 3 and zero repeats are treated as "off".
    #[must_use]
    pub fn median_enabled(&self) -> bool {
        self.median_repeat >= 1 && self.median_kernel >= 3
    }
}

/// Inputs for fitting a calibration against a reference sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationConfig {
    /// Known mono-exponential lifetime of the reference dye (ns).
    pub reference_lifetime_ns: f64,
    /// Laser repetition frequency (MHz). `None` uses the reference signal's own.
    pub frequency_mhz: Option<f64>,
    /// Harmonic to compute phasors at.
    pub harmonic: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            // fluorescein in buffer
            reference_lifetime_ns: 4.1,
            frequency_mhz: None,
            harmonic: 1,
        }
    }
}

impl CalibrationConfig {
    /// Creates a calibration configuration for a reference of known lifetime.
    #[must_use]
    pub fn new(reference_lifetime_ns: f64) -> Self {
        Self {
            reference_lifetime_ns,
            ..Self::default()
        }
    }

    /// Sets the repetition frequency.
    #[must_use]
    pub fn with_frequency(mut self, frequency_mhz: f64) -> Self {
        self.frequency_mhz = Some(frequency_mhz);
        self
    }

    /// Sets the harmonic.
    #[must_use]
    pub fn with_harmonic(mut self, harmonic: u32) -> Self {
        self.harmonic = harmonic;
        self
    }

    /// Checks the harmonic and lifetime.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for a zero harmonic and
    /// [`Error::Calibration`] for a negative or non-finite lifetime.
    pub fn validate(&self) -> Result<()> {
        if self.harmonic == 0 {
            return Err(Error::Config("harmonic must be >= 1".to_string()));
        }
        if !(self.reference_lifetime_ns.is_finite() && self.reference_lifetime_ns >= 0.0) {
            return Err(Error::Calibration(format!(
                "reference lifetime must be finite and >= 0, got {}",
                self.reference_lifetime_ns
            )));
        }
        Ok(())
    }
}
