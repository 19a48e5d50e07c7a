//! flimkit-io: Signal sources and exporters for flimkit.
//!
//! Raw stacks are read through memory maps (memmap2); HDF5 input and
//! output sit behind the `hdf5` feature. Analysis results are collected in
//! a [`LayerRegistry`] and written as CSV or HDF5.
//!

mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
mod registry;
mod source;
mod writer;

pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use hdf5::{write_layers_hdf5, write_signal_hdf5, Hdf5SignalSource};
pub use registry::{Layer, LayerData, LayerKind, LayerRegistry};
pub use source::{open_source, MappedFileReader, RawFileSource, RawLayout, SampleType, SignalSource};
pub use writer::CsvWriter;
