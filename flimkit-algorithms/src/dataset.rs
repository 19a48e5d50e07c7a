//! One loaded sample and everything derived from it.
//!
//! Every mutating operation builds a complete [`DerivedState`] off to the
//! side and swaps it in only once all stages succeeded, so a failed call
//! leaves the dataset exactly as it was.

use crate::calibration::Calibration;
use crate::lifetime::LifetimeMaps;
use crate::quality::{apply_threshold, median_filter_phasor, photon_range_mask};
use crate::transform::phasor_from_signal;
use flimkit_core::config::FilterConfig;
use flimkit_core::error::{Error, Result};
use flimkit_core::phasor::PhasorMap;
use flimkit_core::signal::{Frequency, RawSignal};
use ndarray::{Array2, ArrayView2};
use std::sync::Arc;

/// Which calibration a dataset's calibrated coordinates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationLink {
    /// Raw coordinates were used unchanged.
    Identity,
    /// Corrected with the given [`Calibration::revision`].
    Revision(u64),
}

/// The immutable part of a dataset.
#[derive(Debug, Clone)]
pub struct LoadedSample {
    name: String,
    signal: Arc<RawSignal>,
}

impl LoadedSample {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn signal(&self) -> &Arc<RawSignal> {
        &self.signal
    }

    #[must_use]
    pub fn channel(&self) -> usize {
        self.signal.metadata().channel
    }
}

/// Snapshot of every array derived from a sample.
#[derive(Debug, Clone)]
pub struct DerivedState {
    raw: PhasorMap,
    photons: Array2<u64>,
    frequency: Frequency,
    real_calibrated: Array2<f64>,
    imag_calibrated: Array2<f64>,
    link: CalibrationLink,
    g: Array2<f64>,
    s: Array2<f64>,
    filters: Option<FilterConfig>,
    photon_mask: Option<Array2<u8>>,
    lifetimes: LifetimeMaps,
}

impl DerivedState {
    /// Builds a snapshot whose working coordinates equal the calibrated ones.
    fn calibrated(
        raw: PhasorMap,
        photons: Array2<u64>,
        frequency: Frequency,
        (real_calibrated, imag_calibrated): (Array2<f64>, Array2<f64>),
        link: CalibrationLink,
    ) -> Result<Self> {
        let lifetimes = LifetimeMaps::compute(
            real_calibrated.view(),
            imag_calibrated.view(),
            frequency.mhz(),
            raw.harmonic(),
        )?;
        Ok(Self {
            g: real_calibrated.clone(),
            s: imag_calibrated.clone(),
            raw,
            photons,
            frequency,
            real_calibrated,
            imag_calibrated,
            link,
            filters: None,
            photon_mask: None,
            lifetimes,
        })
    }
}

/// A sample in the working set.
#[derive(Debug, Clone)]
pub struct Dataset {
    sample: LoadedSample,
    group: String,
    derived: DerivedState,
}

fn signal_frequency(signal: &RawSignal, name: &str) -> Frequency {
    let frequency = signal.metadata().resolve_frequency();
    if frequency.is_fallback() {
        log::warn!(
            "{name}: no usable repetition frequency in signal, using {} MHz",
            frequency.mhz()
        );
    }
    frequency
}

impl Dataset {
    /// Loads a sample: computes its phasor at `harmonic`, leaves it
    /// uncalibrated and computes lifetimes.
    ///
    /// # Errors
    /// Propagates phasor transform errors.
    pub fn load(name: impl Into<String>, signal: Arc<RawSignal>, harmonic: u32) -> Result<Self> {
        let sample = LoadedSample {
            name: name.into(),
            signal,
        };
        let derived = Self::fresh_state(&sample, harmonic)?;
        log::debug!(
            "loaded dataset '{}' (channel {}, {:?} image, harmonic {harmonic})",
            sample.name,
            sample.channel(),
            sample.signal.image_shape()
        );
        Ok(Self {
            sample,
            group: String::new(),
            derived,
        })
    }

    fn fresh_state(sample: &LoadedSample, harmonic: u32) -> Result<DerivedState> {
        let raw = phasor_from_signal(&sample.signal, harmonic)?;
        let photons = sample.signal.photon_sum();
        let frequency = signal_frequency(&sample.signal, &sample.name);
        let coords = (raw.real().to_owned(), raw.imag().to_owned());
        DerivedState::calibrated(raw, photons, frequency, coords, CalibrationLink::Identity)
    }

    /// Recomputes the raw phasor at `harmonic`.
    ///
    /// The dataset returns to the uncalibrated state with no filters, since
    /// a calibration only holds for the harmonic it was fitted at.
    ///
    /// # Errors
    /// Propagates phasor transform errors.
    pub fn compute_phasor(&mut self, harmonic: u32) -> Result<()> {
        self.derived = Self::fresh_state(&self.sample, harmonic)?;
        Ok(())
    }

    /// Calibrates the raw coordinates and resets the working coordinates.
    ///
    /// `None` or an unfitted calibration means identity. Filters must be
    /// re-applied afterwards. A fitted calibration's frequency replaces the
    /// signal's own for lifetime computation.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the calibration was fitted at a different
    /// harmonic.
    pub fn calibrate(&mut self, calibration: Option<&Calibration>) -> Result<()> {
        let state = calibration.and_then(|c| c.state().copied().map(|s| (c, s)));
        let raw = self.derived.raw.clone();

        let derived = match state {
            Some((calibration, state)) => {
                if state.harmonic != raw.harmonic() {
                    return Err(Error::Config(format!(
                        "calibration fitted at harmonic {}, dataset '{}' uses harmonic {}",
                        state.harmonic,
                        self.sample.name,
                        raw.harmonic()
                    )));
                }
                let coords = calibration.apply(raw.real(), raw.imag())?;
                DerivedState::calibrated(
                    raw,
                    self.derived.photons.clone(),
                    Frequency::Calibration(state.frequency_mhz),
                    coords,
                    CalibrationLink::Revision(calibration.revision()),
                )?
            }
            None => {
                let coords = (raw.real().to_owned(), raw.imag().to_owned());
                DerivedState::calibrated(
                    raw,
                    self.derived.photons.clone(),
                    signal_frequency(&self.sample.signal, &self.sample.name),
                    coords,
                    CalibrationLink::Identity,
                )?
            }
        };
        log::debug!("calibrated '{}' ({:?})", self.sample.name, derived.link);
        self.derived = derived;
        Ok(())
    }

    /// Restores the working coordinates to the calibrated ones.
    ///
    /// # Errors
    /// Propagates lifetime errors.
    pub fn reset_working_coords(&mut self) -> Result<()> {
        let d = &self.derived;
        let derived = DerivedState::calibrated(
            d.raw.clone(),
            d.photons.clone(),
            d.frequency,
            (d.real_calibrated.clone(), d.imag_calibrated.clone()),
            d.link,
        )?;
        self.derived = derived;
        Ok(())
    }

    /// Filters the calibrated coordinates into new working coordinates.
    ///
    /// Runs the median filter first (skipped when `median_repeat < 1` or
    /// `median_kernel < 3`), then the photon threshold, then recomputes
    /// lifetimes. Always starts from the calibrated coordinates, so applying
    /// the same config twice gives the same result.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for an even median kernel or a maximum
    /// below the minimum. The dataset is unchanged on error.
    pub fn apply_filters(&mut self, config: &FilterConfig) -> Result<()> {
        if config.max_photons.is_some_and(|max| max < config.min_photons) {
            return Err(Error::Config(format!(
                "max photons {:?} below min photons {}",
                config.max_photons, config.min_photons
            )));
        }
        let d = &self.derived;

        let (g, s) = if config.median_enabled() {
            median_filter_phasor(
                d.real_calibrated.view(),
                d.imag_calibrated.view(),
                config.median_kernel,
                config.median_repeat,
            )?
        } else {
            if config.median_repeat >= 1 {
                log::warn!(
                    "{}: median kernel {} < 3, skipping median filter",
                    self.sample.name,
                    config.median_kernel
                );
            }
            (d.real_calibrated.clone(), d.imag_calibrated.clone())
        };

        let mask = photon_range_mask(
            d.photons.view().into_dyn(),
            config.min_photons,
            config.max_photons,
        )?;
        let (g, s) = apply_threshold(g.view(), s.view(), mask.view())?;
        let lifetimes = LifetimeMaps::compute(g.view(), s.view(), d.frequency.mhz(), d.raw.harmonic())?;

        let derived = DerivedState {
            raw: d.raw.clone(),
            photons: d.photons.clone(),
            frequency: d.frequency,
            real_calibrated: d.real_calibrated.clone(),
            imag_calibrated: d.imag_calibrated.clone(),
            link: d.link,
            g,
            s,
            filters: Some(config.clone()),
            photon_mask: Some(mask),
            lifetimes,
        };
        log::debug!("filtered '{}' with {config:?}", self.sample.name);
        self.derived = derived;
        Ok(())
    }

    /// Returns true when `calibration` has been fitted since this dataset
    /// was last calibrated with it.
    #[must_use]
    pub fn is_stale(&self, calibration: &Calibration) -> bool {
        calibration.is_calibrated()
            && self.derived.link != CalibrationLink::Revision(calibration.revision())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.sample.name()
    }

    #[must_use]
    pub fn channel(&self) -> usize {
        self.sample.channel()
    }

    #[must_use]
    pub fn sample(&self) -> &LoadedSample {
        &self.sample
    }

    #[must_use]
    pub fn signal(&self) -> &RawSignal {
        &self.sample.signal
    }

    /// Free-text label used to aggregate datasets.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn set_group(&mut self, group: impl Into<String>) {
        self.group = group.into();
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.set_group(group);
        self
    }

    #[must_use]
    pub fn harmonic(&self) -> u32 {
        self.derived.raw.harmonic()
    }

    /// Uncalibrated phasor map.
    #[must_use]
    pub fn raw(&self) -> &PhasorMap {
        &self.derived.raw
    }

    /// Integrated intensity.
    #[must_use]
    pub fn intensity(&self) -> ArrayView2<'_, f64> {
        self.derived.raw.mean()
    }

    #[must_use]
    pub fn photon_sum(&self) -> ArrayView2<'_, u64> {
        self.derived.photons.view()
    }

    /// Frequency used for lifetimes, with its provenance.
    #[must_use]
    pub fn frequency(&self) -> Frequency {
        self.derived.frequency
    }

    #[must_use]
    pub fn real_calibrated(&self) -> ArrayView2<'_, f64> {
        self.derived.real_calibrated.view()
    }

    #[must_use]
    pub fn imag_calibrated(&self) -> ArrayView2<'_, f64> {
        self.derived.imag_calibrated.view()
    }

    #[must_use]
    pub fn calibration_link(&self) -> CalibrationLink {
        self.derived.link
    }

    /// Working real coordinate.
    #[must_use]
    pub fn g(&self) -> ArrayView2<'_, f64> {
        self.derived.g.view()
    }

    /// Working imaginary coordinate.
    #[must_use]
    pub fn s(&self) -> ArrayView2<'_, f64> {
        self.derived.s.view()
    }

    /// Filters the working coordinates were produced with, if any.
    #[must_use]
    pub fn filters(&self) -> Option<&FilterConfig> {
        self.derived.filters.as_ref()
    }

    /// Photon-range labels from the last [`Dataset::apply_filters`].
    #[must_use]
    pub fn photon_mask(&self) -> Option<ArrayView2<'_, u8>> {
        self.derived.photon_mask.as_ref().map(|m| m.view())
    }

    #[must_use]
    pub fn lifetimes(&self) -> &LifetimeMaps {
        &self.derived.lifetimes
    }

    #[must_use]
    pub fn derived(&self) -> &DerivedState {
        &self.derived
    }
}
