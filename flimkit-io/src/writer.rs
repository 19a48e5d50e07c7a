//! CSV writers for layers and ROI statistics.

use crate::registry::{check_same_shape, Layer};
use crate::Result;
use flimkit_algorithms::{GroupSummary, RoiSummary};
use std::fs::File;
use std::path::Path;

const ROI_HEADER: [&str; 12] = [
    "dataset",
    "roi",
    "name",
    "pixel_count",
    "fraction",
    "total_intensity",
    "mean_g",
    "mean_s",
    "mean_phase_lifetime",
    "mean_modulation_lifetime",
    "mean_normal_lifetime",
    "lifetime_pixels",
];

const GROUP_HEADER: [&str; 7] = [
    "group",
    "dataset_count",
    "roi",
    "name",
    "pixel_count",
    "fraction",
    "mean_normal_lifetime",
];

/// Writer for analysis output in CSV form.
///
/// Floating-point values are written with Rust's shortest round-trip
/// formatting; missing values appear as `NaN`. Fields holding a separator,
/// quote or newline are quoted.
pub struct CsvWriter {
    writer: csv::Writer<File>,
}

impl CsvWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        // each method writes its own table with its own width
        let writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
        Ok(Self { writer })
    }

    /// Writes one layer as a matrix, one image row per line.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_layer_matrix(&mut self, layer: &Layer) -> Result<()> {
        let (rows, cols) = layer.data.dim();
        for r in 0..rows {
            self.writer
                .write_record((0..cols).map(|c| layer.data.format_at(r, c)))?;
        }
        self.flush()
    }

    /// Writes a long table with one line per pixel: `row,col,<layer>...`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidFormat`] if the layers differ in
    /// shape, or a write error.
    pub fn write_pixel_table(&mut self, layers: &[&Layer]) -> Result<()> {
        check_same_shape(layers)?;
        let header = ["row", "col"]
            .into_iter()
            .chain(layers.iter().map(|l| l.name.as_str()));
        self.writer.write_record(header)?;

        let (rows, cols) = layers.first().map_or((0, 0), |l| l.data.dim());
        let mut record = Vec::with_capacity(layers.len() + 2);
        for r in 0..rows {
            for c in 0..cols {
                record.clear();
                record.push(r.to_string());
                record.push(c.to_string());
                record.extend(layers.iter().map(|layer| layer.data.format_at(r, c)));
                self.writer.write_record(&record)?;
            }
        }
        self.flush()
    }

    /// Writes per-ROI statistics of one dataset.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_roi_summaries(&mut self, dataset: &str, summaries: &[RoiSummary]) -> Result<()> {
        self.writer.write_record(ROI_HEADER)?;
        for s in summaries {
            self.writer.write_record([
                dataset.to_string(),
                s.index.to_string(),
                s.name.clone(),
                s.pixel_count.to_string(),
                s.fraction.to_string(),
                s.total_intensity.to_string(),
                s.mean_g.to_string(),
                s.mean_s.to_string(),
                s.mean_phase_lifetime.to_string(),
                s.mean_modulation_lifetime.to_string(),
                s.mean_normal_lifetime.to_string(),
                s.lifetime_pixels.to_string(),
            ])?;
        }
        self.flush()
    }

    /// Writes pooled per-group ROI statistics.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_group_summaries(&mut self, groups: &[GroupSummary]) -> Result<()> {
        self.writer.write_record(GROUP_HEADER)?;
        for g in groups {
            for roi in &g.rois {
                self.writer.write_record([
                    g.group.clone(),
                    g.dataset_count.to_string(),
                    roi.index.to_string(),
                    roi.name.clone(),
                    roi.pixel_count.to_string(),
                    roi.fraction.to_string(),
                    roi.mean_normal_lifetime.to_string(),
                ])?;
            }
        }
        self.flush()
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
