//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Contents do not match the declared or expected format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Recognized container that this build cannot read.
    #[error("unsupported input: {0}")]
    Unsupported(String),

    /// Requested channel does not exist in the source.
    #[error("channel {channel} out of range (source has {channels})")]
    ChannelOutOfRange { channel: usize, channels: usize },

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] flimkit_core::Error),
}
