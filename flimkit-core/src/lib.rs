//! flimkit-core: Core types for FLIM phasor analysis.
//!
//! This crate provides the shared data model (raw signals, phasor maps,
//! regions of interest), pipeline configuration and the error taxonomy used
//! by the rest of the workspace.
//!

pub mod config;
pub mod error;
pub mod phasor;
pub mod roi;
pub mod signal;

pub use config::{CalibrationConfig, FilterConfig};
pub use error::{Error, Result};
pub use phasor::PhasorMap;
pub use roi::{LabelMask, Roi, RoiColor, MAX_ROIS};
pub use signal::{Frequency, RawSignal, SignalMetadata, DEFAULT_FREQUENCY_MHZ};
