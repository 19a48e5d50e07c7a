//! Assignment of pixels to circular phasor ROIs.

use flimkit_core::error::{Error, Result};
use flimkit_core::roi::{Roi, MAX_ROIS};
use ndarray::{Array, ArrayView, Dimension, Zip};

/// Labels each point with the 1-based index of the first ROI containing it.
///
/// Points inside no ROI, and NaN points, get 0. When circles overlap the
/// earlier ROI in `rois` wins.
///
/// # Errors
/// Returns [`Error::InputShape`] if `real` and `imag` differ in shape and
/// [`Error::Config`] for an invalid ROI or more than [`MAX_ROIS`] ROIs.
pub fn classify<D: Dimension>(
    real: ArrayView<'_, f64, D>,
    imag: ArrayView<'_, f64, D>,
    rois: &[Roi],
) -> Result<Array<u8, D>> {
    if real.shape() != imag.shape() {
        return Err(Error::shape_mismatch("real/imag", real.shape(), imag.shape()));
    }
    if rois.len() > MAX_ROIS {
        return Err(Error::Config(format!(
            "at most {MAX_ROIS} ROIs can be labeled, got {}",
            rois.len()
        )));
    }
    for roi in rois {
        roi.validate()?;
    }

    Ok(Zip::from(&real).and(&imag).par_map_collect(|&g, &s| {
        rois.iter()
            .position(|roi| roi.contains(g, s))
            // position < MAX_ROIS, so index + 1 fits in u8
            .map_or(0, |index| u8::try_from(index + 1).unwrap_or(0))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_first_match_wins() {
        let rois = vec![Roi::new("wide", 0.5, 0.3, 0.2), Roi::new("narrow", 0.5, 0.3, 0.05)];
        let g = array![0.5, 0.6, 0.9];
        let s = array![0.3, 0.3, 0.3];
        let labels = classify(g.view(), s.view(), &rois).unwrap();
        assert_eq!(labels, array![1u8, 1, 0]);
    }

    #[test]
    fn test_order_changes_labels() {
        let rois = vec![Roi::new("narrow", 0.5, 0.3, 0.05), Roi::new("wide", 0.5, 0.3, 0.2)];
        let g = array![0.5, 0.6];
        let s = array![0.3, 0.3];
        let labels = classify(g.view(), s.view(), &rois).unwrap();
        assert_eq!(labels, array![1u8, 2]);
    }

    #[test]
    fn test_nan_is_background() {
        let rois = vec![Roi::new("a", 0.0, 0.0, 10.0)];
        let g = array![[f64::NAN, 0.1]];
        let s = array![[0.1, f64::NAN]];
        let labels = classify(g.view(), s.view(), &rois).unwrap();
        assert_eq!(labels, array![[0u8, 0]]);
    }

    #[test]
    fn test_empty_roi_list() {
        let g = Array1::from_elem(4, 0.5);
        let labels = classify(g.view(), g.view(), &[]).unwrap();
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_errors() {
        let g = array![0.5, 0.5];
        let s = array![0.3];
        let rois = vec![Roi::new("a", 0.5, 0.3, 0.1)];
        assert!(matches!(classify(g.view(), s.view(), &rois), Err(Error::InputShape(_))));

        let s = array![0.3, 0.3];
        let bad = vec![Roi::new("a", 0.5, 0.3, 0.0)];
        assert!(matches!(classify(g.view(), s.view(), &bad), Err(Error::Config(_))));

        let many: Vec<Roi> = (0..256).map(|i| Roi::new(format!("r{i}"), 0.5, 0.3, 0.1)).collect();
        assert!(matches!(classify(g.view(), s.view(), &many), Err(Error::Config(_))));

        let max: Vec<Roi> = (0..255).map(|i| Roi::new(format!("r{i}"), 0.0, 0.0, 0.01)).collect();
        assert!(classify(g.view(), s.view(), &max).is_ok());
    }
}
