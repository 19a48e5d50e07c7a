//! Per-ROI statistics of classified datasets and their aggregation by group.

use crate::classify::classify;
use crate::dataset::Dataset;
use flimkit_core::error::{Error, Result};
use flimkit_core::roi::{LabelMask, Roi};
use ndarray::{ArrayView2, Zip};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Statistics of the pixels one ROI claimed in one dataset.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoiSummary {
    /// 1-based label value.
    pub index: usize,
    pub name: String,
    pub pixel_count: usize,
    /// Share of the dataset's valid (finite-coordinate) pixels.
    pub fraction: f64,
    pub total_intensity: f64,
    pub mean_g: f64,
    pub mean_s: f64,
    pub mean_phase_lifetime: f64,
    pub mean_modulation_lifetime: f64,
    pub mean_normal_lifetime: f64,
    /// Pixels that contributed to `mean_normal_lifetime`.
    pub lifetime_pixels: usize,
}

#[derive(Default)]
struct Accumulator {
    pixels: usize,
    intensity: f64,
    g: NanMean,
    s: NanMean,
    phase: NanMean,
    modulation: NanMean,
    normal: NanMean,
}

#[derive(Default, Clone, Copy)]
struct NanMean {
    sum: f64,
    count: usize,
}

impl NanMean {
    fn push(&mut self, value: f64) {
        if value.is_finite() {
            self.sum += value;
            self.count += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Number of pixels whose working coordinates are both finite.
#[must_use]
pub fn valid_pixels(dataset: &Dataset) -> usize {
    Zip::from(dataset.g())
        .and(dataset.s())
        .fold(0, |n, g, s| n + usize::from(g.is_finite() && s.is_finite()))
}

/// Computes one summary per ROI, in ROI order, from a label mask.
///
/// # Errors
/// Returns [`Error::InputShape`] if `labels` does not match the dataset's
/// image shape.
#[allow(clippy::cast_precision_loss)]
pub fn summarize_rois(
    dataset: &Dataset,
    labels: ArrayView2<'_, u8>,
    rois: &[Roi],
) -> Result<Vec<RoiSummary>> {
    if labels.shape() != dataset.g().shape() {
        return Err(Error::shape_mismatch(
            "labels/dataset",
            labels.shape(),
            dataset.g().shape(),
        ));
    }

    let mut acc: Vec<Accumulator> = rois.iter().map(|_| Accumulator::default()).collect();
    let lifetimes = dataset.lifetimes();
    Zip::indexed(labels).for_each(|idx, &label| {
        let Some(a) = usize::from(label).checked_sub(1).and_then(|i| acc.get_mut(i)) else {
            return;
        };
        a.pixels += 1;
        let intensity = dataset.intensity()[idx];
        if intensity.is_finite() {
            a.intensity += intensity;
        }
        a.g.push(dataset.g()[idx]);
        a.s.push(dataset.s()[idx]);
        a.phase.push(lifetimes.phase[idx]);
        a.modulation.push(lifetimes.modulation[idx]);
        a.normal.push(lifetimes.normal[idx]);
    });

    let valid = valid_pixels(dataset);
    Ok(rois
        .iter()
        .zip(acc)
        .enumerate()
        .map(|(i, (roi, a))| RoiSummary {
            index: i + 1,
            name: roi.name.clone(),
            pixel_count: a.pixels,
            fraction: if valid == 0 {
                0.0
            } else {
                a.pixels as f64 / valid as f64
            },
            total_intensity: a.intensity,
            mean_g: a.g.mean(),
            mean_s: a.s.mean(),
            mean_phase_lifetime: a.phase.mean(),
            mean_modulation_lifetime: a.modulation.mean(),
            mean_normal_lifetime: a.normal.mean(),
            lifetime_pixels: a.normal.count,
        })
        .collect())
}

/// Labels and per-ROI statistics of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub labels: LabelMask,
    pub summaries: Vec<RoiSummary>,
    pub valid_pixels: usize,
}

/// Classifies a dataset's working coordinates and summarizes each ROI.
///
/// # Errors
/// Propagates [`classify`] errors.
pub fn classify_dataset(dataset: &Dataset, rois: &[Roi]) -> Result<Classification> {
    let labels = classify(dataset.g(), dataset.s(), rois)?;
    let summaries = summarize_rois(dataset, labels.view(), rois)?;
    log::debug!(
        "classified '{}' into {} ROI(s)",
        dataset.name(),
        rois.len()
    );
    Ok(Classification {
        labels,
        summaries,
        valid_pixels: valid_pixels(dataset),
    })
}

/// Pooled statistics of one ROI across the datasets of a group.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupRoiSummary {
    pub index: usize,
    pub name: String,
    pub pixel_count: usize,
    /// Pooled pixels over pooled valid pixels.
    pub fraction: f64,
    /// Pixel-weighted mean of the per-dataset normal lifetimes.
    pub mean_normal_lifetime: f64,
}

/// Statistics of all datasets sharing a group label.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupSummary {
    pub group: String,
    pub dataset_count: usize,
    pub rois: Vec<GroupRoiSummary>,
}

/// Aggregates classifications by group label, groups in first-seen order.
///
/// Every classification must come from the same ROI list.
///
/// # Errors
/// Returns [`Error::Config`] if the classifications disagree on the number
/// of ROIs.
#[allow(clippy::cast_precision_loss)]
pub fn summarize_groups<'a, I>(entries: I) -> Result<Vec<GroupSummary>>
where
    I: IntoIterator<Item = (&'a str, &'a Classification)>,
{
    struct Pool<'p> {
        group: &'p str,
        datasets: usize,
        valid: usize,
        pixels: Vec<usize>,
        weighted: Vec<NanMean>,
        names: Vec<&'p str>,
    }

    let mut pools: Vec<Pool<'a>> = Vec::new();
    for (group, classification) in entries {
        let n = classification.summaries.len();
        let pos = match pools.iter().position(|p| p.group == group) {
            Some(pos) => pos,
            None => {
                pools.push(Pool {
                    group,
                    datasets: 0,
                    valid: 0,
                    pixels: vec![0; n],
                    weighted: vec![NanMean::default(); n],
                    names: classification.summaries.iter().map(|s| s.name.as_str()).collect(),
                });
                pools.len() - 1
            }
        };
        let pool = &mut pools[pos];
        if pool.pixels.len() != n {
            return Err(Error::Config(format!(
                "group '{group}' mixes classifications with {} and {n} ROIs",
                pool.pixels.len()
            )));
        }
        pool.datasets += 1;
        pool.valid += classification.valid_pixels;
        for (i, summary) in classification.summaries.iter().enumerate() {
            pool.pixels[i] += summary.pixel_count;
            if summary.lifetime_pixels > 0 && summary.mean_normal_lifetime.is_finite() {
                let w = &mut pool.weighted[i];
                w.sum += summary.mean_normal_lifetime * summary.lifetime_pixels as f64;
                w.count += summary.lifetime_pixels;
            }
        }
    }

    Ok(pools
        .into_iter()
        .map(|pool| GroupSummary {
            group: pool.group.to_string(),
            dataset_count: pool.datasets,
            rois: (0..pool.pixels.len())
                .map(|i| GroupRoiSummary {
                    index: i + 1,
                    name: pool.names[i].to_string(),
                    pixel_count: pool.pixels[i],
                    fraction: if pool.valid == 0 {
                        0.0
                    } else {
                        pool.pixels[i] as f64 / pool.valid as f64
                    },
                    mean_normal_lifetime: pool.weighted[i].mean(),
                })
                .collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use flimkit_core::signal::{RawSignal, SignalMetadata};
    use ndarray::{array, Array3};
    use std::sync::Arc;

    /// Two-pixel-wide image: left column decays fast, right column slow.
    fn two_population_dataset() -> Dataset {
        let counts = Array3::from_shape_fn((32, 2, 2), |(k, _, c)| {
            let tau_bins = if c == 0 { 2.0 } else { 12.0 };
            (1000.0 * (-(k as f64) / tau_bins).exp()) as u32 + 1
        });
        let signal = RawSignal::new(counts, SignalMetadata::new(0).with_frequency(80.0));
        Dataset::load("two", Arc::new(signal), 1).unwrap()
    }

    #[test]
    fn test_summaries_count_pixels() {
        let ds = two_population_dataset();
        let (g_fast, s_fast) = (ds.g()[[0, 0]], ds.s()[[0, 0]]);
        let rois = vec![Roi::new("fast", g_fast, s_fast, 0.01), Roi::new("none", 5.0, 5.0, 0.1)];
        let result = classify_dataset(&ds, &rois).unwrap();

        assert_eq!(result.labels, array![[1u8, 0], [1, 0]]);
        assert_eq!(result.valid_pixels, 4);
        let fast = &result.summaries[0];
        assert_eq!(fast.index, 1);
        assert_eq!(fast.pixel_count, 2);
        assert_abs_diff_eq!(fast.fraction, 0.5);
        assert_abs_diff_eq!(fast.mean_g, g_fast, epsilon = 1e-12);
        assert_abs_diff_eq!(
            fast.total_intensity,
            ds.intensity()[[0, 0]] + ds.intensity()[[1, 0]]
        );

        let none = &result.summaries[1];
        assert_eq!(none.pixel_count, 0);
        assert!(none.mean_g.is_nan());
        assert_eq!(none.lifetime_pixels, 0);
    }

    #[test]
    fn test_summarize_shape_mismatch() {
        let ds = two_population_dataset();
        let labels = LabelMask::zeros((3, 3));
        assert!(matches!(
            summarize_rois(&ds, labels.view(), &[]),
            Err(Error::InputShape(_))
        ));
    }

    fn classification(pixels: usize, valid: usize, lifetime: f64) -> Classification {
        Classification {
            labels: LabelMask::zeros((1, 1)),
            summaries: vec![RoiSummary {
                index: 1,
                name: "a".to_string(),
                pixel_count: pixels,
                fraction: 0.0,
                total_intensity: 0.0,
                mean_g: f64::NAN,
                mean_s: f64::NAN,
                mean_phase_lifetime: f64::NAN,
                mean_modulation_lifetime: f64::NAN,
                mean_normal_lifetime: lifetime,
                lifetime_pixels: pixels,
            }],
            valid_pixels: valid,
        }
    }

    #[test]
    fn test_group_pooling() {
        let a = classification(10, 100, 2.0);
        let b = classification(30, 100, 4.0);
        let c = classification(5, 50, 1.0);
        let groups =
            summarize_groups([("control", &a), ("treated", &c), ("control", &b)]).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].group, "control");
        assert_eq!(groups[0].dataset_count, 2);
        let roi = &groups[0].rois[0];
        assert_eq!(roi.pixel_count, 40);
        assert_abs_diff_eq!(roi.fraction, 0.2);
        assert_abs_diff_eq!(roi.mean_normal_lifetime, 3.5);

        assert_eq!(groups[1].group, "treated");
        assert_abs_diff_eq!(groups[1].rois[0].fraction, 0.1);
    }

    #[test]
    fn test_group_roi_count_mismatch() {
        let a = classification(1, 1, 1.0);
        let mut b = classification(1, 1, 1.0);
        b.summaries.push(b.summaries[0].clone());
        assert!(matches!(
            summarize_groups([("g", &a), ("g", &b)]),
            Err(Error::Config(_))
        ));
    }
}
