//! Working set of datasets sharing one calibration.

use crate::calibration::{Calibration, CalibrationState};
use crate::dataset::Dataset;
use flimkit_core::config::CalibrationConfig;
use flimkit_core::error::{Error, Result};
use flimkit_core::phasor::PhasorMap;
use flimkit_core::signal::RawSignal;

/// Datasets plus the calibration they are corrected with.
///
/// Re-fitting the calibration never touches the datasets; it reports which
/// of them are now stale and leaves recalibration to the caller.
#[derive(Debug, Clone, Default)]
pub struct Session {
    calibration: Calibration,
    datasets: Vec<Dataset>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    #[must_use]
    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    #[must_use]
    pub fn dataset(&self, index: usize) -> Option<&Dataset> {
        self.datasets.get(index)
    }

    pub fn dataset_mut(&mut self, index: usize) -> Option<&mut Dataset> {
        self.datasets.get_mut(index)
    }

    /// Appends a dataset and returns its index.
    pub fn add_dataset(&mut self, dataset: Dataset) -> usize {
        self.datasets.push(dataset);
        self.datasets.len() - 1
    }

    /// Removes and returns the dataset at `index`.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for an out-of-range index.
    pub fn remove_dataset(&mut self, index: usize) -> Result<Dataset> {
        self.check_index(index)?;
        Ok(self.datasets.remove(index))
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.datasets.len() {
            return Err(Error::Config(format!(
                "dataset index {index} out of range ({} loaded)",
                self.datasets.len()
            )));
        }
        Ok(())
    }

    /// Fits the shared calibration and returns the indices of datasets that
    /// are stale as a result.
    ///
    /// # Errors
    /// Propagates [`Calibration::fit`] errors; nothing changes on error.
    pub fn fit_calibration(
        &mut self,
        reference: &PhasorMap,
        reference_lifetime_ns: f64,
        frequency_mhz: f64,
    ) -> Result<Vec<usize>> {
        self.calibration
            .fit(reference, reference_lifetime_ns, frequency_mhz)?;
        Ok(self.report_stale())
    }

    /// Like [`Session::fit_calibration`], starting from a raw reference signal.
    ///
    /// # Errors
    /// Propagates [`Calibration::fit_signal`] errors.
    pub fn fit_calibration_signal(
        &mut self,
        reference: &RawSignal,
        config: &CalibrationConfig,
    ) -> Result<Vec<usize>> {
        self.calibration.fit_signal(reference, config)?;
        Ok(self.report_stale())
    }

    fn report_stale(&self) -> Vec<usize> {
        let stale = self.stale_datasets();
        if let Some(state) = self.calibration.state() {
            log_fit(state, self.calibration.revision(), stale.len());
        }
        stale
    }

    /// Indices of datasets not calibrated with the current revision.
    #[must_use]
    pub fn stale_datasets(&self) -> Vec<usize> {
        self.datasets
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_stale(&self.calibration))
            .map(|(i, _)| i)
            .collect()
    }

    /// Calibrates one dataset with the shared calibration.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for an out-of-range index, otherwise
    /// propagates [`Dataset::calibrate`] errors.
    pub fn calibrate_dataset(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        let calibration = &self.calibration;
        self.datasets[index].calibrate(Some(calibration))
    }

    /// Recalibrates every stale dataset and returns how many were updated.
    ///
    /// Stops at the first failure; datasets already recalibrated keep their
    /// new state.
    ///
    /// # Errors
    /// Propagates [`Dataset::calibrate`] errors.
    pub fn recalibrate_stale(&mut self) -> Result<usize> {
        let stale = self.stale_datasets();
        for &index in &stale {
            self.calibrate_dataset(index)?;
        }
        Ok(stale.len())
    }

    /// Distinct group labels in first-seen order.
    #[must_use]
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for dataset in &self.datasets {
            if !groups.contains(&dataset.group()) {
                groups.push(dataset.group());
            }
        }
        groups
    }
}

fn log_fit(state: &CalibrationState, revision: u64, stale: usize) {
    log::info!(
        "calibration revision {revision}: phase_zero={:.4} rad, modulation_zero={:.4}; {stale} dataset(s) stale",
        state.phase_zero,
        state.modulation_zero
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use flimkit_core::signal::SignalMetadata;
    use ndarray::Array3;
    use std::sync::Arc;

    fn signal(scale: u32) -> Arc<RawSignal> {
        let counts = Array3::from_shape_fn((8, 2, 2), |(k, _, _)| scale * (8 - k as u32));
        Arc::new(RawSignal::new(counts, SignalMetadata::new(0).with_frequency(80.0)))
    }

    fn session_with(n: usize) -> Session {
        let mut session = Session::new();
        for i in 0..n {
            let ds = Dataset::load(format!("d{i}"), signal(10), 1).unwrap();
            session.add_dataset(ds);
        }
        session
    }

    #[test]
    fn test_fit_reports_all_stale() {
        let mut session = session_with(3);
        assert!(session.stale_datasets().is_empty());

        let reference = Dataset::load("ref", signal(20), 1).unwrap();
        let stale = session
            .fit_calibration(reference.raw(), 3.0, 80.0)
            .unwrap();
        assert_eq!(stale, vec![0, 1, 2]);
        // nothing was recomputed
        assert_eq!(session.datasets()[0].real_calibrated(), session.datasets()[0].raw().real());
    }

    #[test]
    fn test_recalibrate_stale() {
        let mut session = session_with(3);
        let reference = Dataset::load("ref", signal(20), 1).unwrap();
        session.fit_calibration(reference.raw(), 3.0, 80.0).unwrap();

        session.calibrate_dataset(1).unwrap();
        assert_eq!(session.stale_datasets(), vec![0, 2]);
        assert_eq!(session.recalibrate_stale().unwrap(), 2);
        assert!(session.stale_datasets().is_empty());

        let stale = session.fit_calibration(reference.raw(), 3.5, 80.0).unwrap();
        assert_eq!(stale, vec![0, 1, 2]);
    }

    #[test]
    fn test_failed_fit_reports_nothing_new() {
        let mut session = session_with(2);
        let reference = Dataset::load("ref", signal(20), 1).unwrap();
        assert!(session.fit_calibration(reference.raw(), 3.0, -1.0).is_err());
        assert_eq!(session.calibration().revision(), 0);
        assert!(session.stale_datasets().is_empty());
    }

    #[test]
    fn test_remove_and_index_errors() {
        let mut session = session_with(2);
        assert!(matches!(session.calibrate_dataset(5), Err(Error::Config(_))));
        assert!(matches!(session.remove_dataset(2), Err(Error::Config(_))));
        let removed = session.remove_dataset(0).unwrap();
        assert_eq!(removed.name(), "d0");
        assert_eq!(session.datasets().len(), 1);
        assert_eq!(session.dataset(0).map(Dataset::name), Some("d1"));
    }

    #[test]
    fn test_groups_first_seen_order() {
        let mut session = session_with(3);
        session.dataset_mut(0).unwrap().set_group("b");
        session.dataset_mut(1).unwrap().set_group("a");
        session.dataset_mut(2).unwrap().set_group("b");
        assert_eq!(session.groups(), vec!["b", "a"]);
    }
}
