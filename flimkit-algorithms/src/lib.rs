//! flimkit-algorithms: FLIM phasor pipeline.
//!
//! This crate turns raw time-resolved signals into calibrated phasor
//! coordinates and everything derived from them:
//! - **Transform** - per-pixel phasor coordinates at one or more harmonics
//! - **Calibration** - phase/modulation correction from a reference dye
//! - **Lifetime** - apparent phase, modulation and projected lifetimes
//! - **Quality** - photon-range masking and NaN-aware median filtering
//! - **Dataset / Session** - orchestration and calibration staleness
//! - **Classification** - first-match circular ROIs and per-ROI summaries
//!

mod calibration;
mod classify;
mod dataset;
pub mod lifetime;
pub mod plot;
mod processing;
pub mod quality;
mod session;
mod summary;
mod transform;

pub use calibration::{phasor_center, Calibration, CalibrationState};
pub use classify::classify;
pub use dataset::{CalibrationLink, Dataset, DerivedState, LoadedSample};
pub use lifetime::{
    angular_frequency, apparent_lifetime, normal_lifetime, phasor_from_lifetime, LifetimeMaps,
};
pub use plot::{finite_points, lifetime_markers, universal_semicircle, PhasorHistogram};
pub use processing::{analyze_dataset, analyze_session};
pub use quality::{apply_threshold, median_filter, median_filter_phasor, photon_range_mask};
pub use session::Session;
pub use summary::{
    classify_dataset, summarize_groups, summarize_rois, Classification, GroupRoiSummary,
    GroupSummary, RoiSummary,
};
pub use transform::{phasor_from_counts, phasor_from_signal, phasor_from_signal_harmonics};

// Re-export core types
pub use flimkit_core::{
    CalibrationConfig, Error, FilterConfig, Frequency, PhasorMap, RawSignal, Result, Roi,
    RoiColor, SignalMetadata,
};
