//! High-level helpers that run calibration, filtering and classification in
//! one call.

use crate::calibration::Calibration;
use crate::dataset::Dataset;
use crate::session::Session;
use crate::summary::{classify_dataset, Classification};
use flimkit_core::config::FilterConfig;
use flimkit_core::error::Result;
use flimkit_core::roi::Roi;

/// Calibrates a dataset, applies filters, then classifies it.
///
/// # Errors
/// Propagates the first failing stage's error. Stages that already
/// succeeded keep their effect on the dataset.
pub fn analyze_dataset(
    dataset: &mut Dataset,
    calibration: Option<&Calibration>,
    filters: &FilterConfig,
    rois: &[Roi],
) -> Result<Classification> {
    dataset.calibrate(calibration)?;
    dataset.apply_filters(filters)?;
    classify_dataset(dataset, rois)
}

/// Runs [`analyze_dataset`] on every dataset of a session with the session
/// calibration, in dataset order.
///
/// # Errors
/// Stops at the first failing dataset.
pub fn analyze_session(
    session: &mut Session,
    filters: &FilterConfig,
    rois: &[Roi],
) -> Result<Vec<Classification>> {
    let count = session.datasets().len();
    let mut results = Vec::with_capacity(count);
    for index in 0..count {
        session.calibrate_dataset(index)?;
        if let Some(dataset) = session.dataset_mut(index) {
            dataset.apply_filters(filters)?;
            results.push(classify_dataset(dataset, rois)?);
        }
    }
    log::info!("analyzed {count} dataset(s) against {} ROI(s)", rois.len());
    Ok(results)
}
