//! Raw time-resolved signal types.

use crate::error::{Error, Result};
use ndarray::{Array2, Array3, ArrayD, ArrayView3, Axis, Ix3};
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Laser repetition frequency used when a signal carries no usable value.
///
/// Every downstream lifetime depends on this number, so callers that hit the
/// fallback are told about it through [`Frequency::Fallback`].
pub const DEFAULT_FREQUENCY_MHZ: f64 = 80.0;

/// A repetition frequency together with where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Frequency {
    /// Read from the signal's own metadata.
    Embedded(f64),
    /// Taken from the calibration the data was corrected with.
    Calibration(f64),
    /// Neither was available; [`DEFAULT_FREQUENCY_MHZ`] is used.
    Fallback(f64),
}

impl Frequency {
    /// Returns the frequency in MHz.
    #[inline]
    #[must_use]
    pub fn mhz(&self) -> f64 {
        match *self {
            Self::Embedded(f) | Self::Calibration(f) | Self::Fallback(f) => f,
        }
    }

    /// Returns true when the documented default had to be used.
    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Metadata attached to a loaded signal.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignalMetadata {
    /// Laser repetition frequency in MHz, if the source recorded one.
    pub frequency_mhz: Option<f64>,
    /// File the signal was read from.
    pub path: Option<PathBuf>,
    /// Detector channel index within the file.
    pub channel: usize,
}

impl SignalMetadata {
    /// Creates metadata for the given channel.
    #[must_use]
    pub fn new(channel: usize) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    /// Sets the repetition frequency.
    #[must_use]
    pub fn with_frequency(mut self, frequency_mhz: f64) -> Self {
        self.frequency_mhz = Some(frequency_mhz);
        self
    }

    /// Sets the originating path.
    #[must_use]
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Resolves the frequency to use for lifetime computations.
    ///
    /// A missing, zero, negative or non-finite embedded value resolves to
    /// [`Frequency::Fallback`].
    #[must_use]
    pub fn resolve_frequency(&self) -> Frequency {
        match self.frequency_mhz {
            Some(f) if f.is_finite() && f > 0.0 => Frequency::Embedded(f),
            _ => Frequency::Fallback(DEFAULT_FREQUENCY_MHZ),
        }
    }
}

/// Photon counts indexed by `(time-bin, row, column)`.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignal {
    counts: Array3<u32>,
    metadata: SignalMetadata,
}

impl RawSignal {
    /// Wraps a 3-D count array.
    #[must_use]
    pub fn new(counts: Array3<u32>, metadata: SignalMetadata) -> Self {
        Self { counts, metadata }
    }

    /// Wraps a dynamically shaped count array.
    ///
    /// # Errors
    /// Returns [`Error::InputShape`] unless the array has exactly three axes.
    pub fn from_dyn(counts: ArrayD<u32>, metadata: SignalMetadata) -> Result<Self> {
        let ndim = counts.ndim();
        let counts = counts
            .into_dimensionality::<Ix3>()
            .map_err(|_| Error::wrong_ndim("raw signal", 3, ndim))?;
        Ok(Self::new(counts, metadata))
    }

    /// Replaces the recorded repetition frequency.
    #[must_use]
    pub fn with_frequency(mut self, frequency_mhz: f64) -> Self {
        self.metadata.frequency_mhz = Some(frequency_mhz);
        self
    }

    /// Returns a view of the counts.
    #[must_use]
    pub fn counts(&self) -> ArrayView3<'_, u32> {
        self.counts.view()
    }

    /// Returns the signal metadata.
    #[must_use]
    pub fn metadata(&self) -> &SignalMetadata {
        &self.metadata
    }

    /// Number of time bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.counts.len_of(Axis(0))
    }

    /// Image height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.counts.len_of(Axis(1))
    }

    /// Image width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.counts.len_of(Axis(2))
    }

    /// Returns `(rows, columns)` of the image plane.
    #[must_use]
    pub fn image_shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    /// Total photon count per pixel, accumulated in `u64`.
    #[must_use]
    pub fn photon_sum(&self) -> Array2<u64> {
        photon_sum(self.counts.view())
    }
}

/// Sums a `(time, row, column)` count array over time, in `u64`.
#[must_use]
pub fn photon_sum(counts: ArrayView3<'_, u32>) -> Array2<u64> {
    let mut sum = Array2::<u64>::zeros((counts.len_of(Axis(1)), counts.len_of(Axis(2))));
    for plane in counts.axis_iter(Axis(0)) {
        sum.zip_mut_with(&plane, |acc, &c| *acc += u64::from(c));
    }
    sum
}
