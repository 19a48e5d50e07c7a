//! Signal sources: where raw time-resolved stacks come from.
//!

use crate::{Error, Result};
use flimkit_core::signal::{RawSignal, SignalMetadata};
use memmap2::Mmap;
use ndarray::Array3;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Anything that can hand out per-channel raw signals.
pub trait SignalSource {
    /// Number of channels available.
    fn channels(&self) -> usize;

    /// Loads one channel as a `(bins, height, width)` signal.
    ///
    /// # Errors
    /// Returns [`Error::ChannelOutOfRange`] for a missing channel, or a
    /// format error if the stored data cannot be decoded.
    fn load(&self, channel: usize) -> Result<RawSignal>;

    /// Loads every channel in order.
    ///
    /// # Errors
    /// Stops at the first channel that fails to load.
    fn load_all(&self) -> Result<Vec<RawSignal>> {
        (0..self.channels()).map(|c| self.load(c)).collect()
    }
}

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Arc<Mmap>,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap: Arc::new(mmap),
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Element type of a headerless raw stack. Always little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SampleType {
    U8,
    #[default]
    U16,
    U32,
}

impl SampleType {
    /// Bytes per element.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
        })
    }
}

impl FromStr for SampleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Ok(Self::U8),
            "u16" | "uint16" => Ok(Self::U16),
            "u32" | "uint32" => Ok(Self::U32),
            other => Err(Error::InvalidFormat(format!("unknown sample type '{other}'"))),
        }
    }
}

/// Declared geometry of a headerless raw stack laid out
/// `(channel, time, row, column)` in C order.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawLayout {
    pub bins: usize,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub sample_type: SampleType,
    /// Laser repetition frequency to attach to loaded signals.
    pub frequency_mhz: Option<f64>,
}

impl RawLayout {
    /// Single-channel u16 layout.
    #[must_use]
    pub fn new(bins: usize, height: usize, width: usize) -> Self {
        Self {
            bins,
            height,
            width,
            channels: 1,
            sample_type: SampleType::default(),
            frequency_mhz: None,
        }
    }

    #[must_use]
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    #[must_use]
    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    #[must_use]
    pub fn with_frequency(mut self, frequency_mhz: f64) -> Self {
        self.frequency_mhz = Some(frequency_mhz);
        self
    }

    /// Elements in one channel, or `None` on overflow.
    #[must_use]
    pub fn channel_len(&self) -> Option<usize> {
        self.bins.checked_mul(self.height)?.checked_mul(self.width)
    }

    /// Bytes the whole file must have, or `None` on overflow.
    #[must_use]
    pub fn byte_len(&self) -> Option<usize> {
        self.channel_len()?
            .checked_mul(self.channels)?
            .checked_mul(self.sample_type.size())
    }

    /// Checks that every extent is non-zero.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] naming the offending extent.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("bins", self.bins),
            ("height", self.height),
            ("width", self.width),
            ("channels", self.channels),
        ] {
            if value == 0 {
                return Err(Error::InvalidFormat(format!("raw layout has zero {name}")));
            }
        }
        Ok(())
    }
}

/// Headerless little-endian stack read through a memory map.
pub struct RawFileSource {
    reader: MappedFileReader,
    layout: RawLayout,
}

impl RawFileSource {
    /// Maps `path` and checks its length against `layout`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the layout is degenerate or the
    /// file size differs from what the layout requires.
    pub fn open<P: AsRef<Path>>(path: P, layout: RawLayout) -> Result<Self> {
        layout.validate()?;
        let reader = MappedFileReader::open(path)?;
        let expected = layout
            .byte_len()
            .ok_or_else(|| Error::InvalidFormat("raw layout size overflows".to_string()))?;
        if reader.len() != expected {
            return Err(Error::InvalidFormat(format!(
                "file size {} does not match layout {}x{}x{}x{} {} ({} bytes, file: {})",
                reader.len(),
                layout.channels,
                layout.bins,
                layout.height,
                layout.width,
                layout.sample_type,
                expected,
                reader.path().display()
            )));
        }
        log::debug!(
            "mapped raw stack {} ({} channel(s), {} bins, {}x{})",
            reader.path().display(),
            layout.channels,
            layout.bins,
            layout.height,
            layout.width
        );
        Ok(Self { reader, layout })
    }

    #[must_use]
    pub fn layout(&self) -> &RawLayout {
        &self.layout
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.reader.path()
    }
}

impl SignalSource for RawFileSource {
    fn channels(&self) -> usize {
        self.layout.channels
    }

    fn load(&self, channel: usize) -> Result<RawSignal> {
        let layout = &self.layout;
        if channel >= layout.channels {
            return Err(Error::ChannelOutOfRange {
                channel,
                channels: layout.channels,
            });
        }
        // open() already proved the full size fits
        let len = layout.bins * layout.height * layout.width;
        let size = layout.sample_type.size();
        let start = channel * len * size;
        let bytes = &self.reader.as_bytes()[start..start + len * size];

        let values: Vec<u32> = match layout.sample_type {
            SampleType::U8 => bytes.iter().map(|&b| u32::from(b)).collect(),
            SampleType::U16 => bytes
                .chunks_exact(2)
                .map(|c| u32::from(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
            SampleType::U32 => bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        };
        let counts = Array3::from_shape_vec((layout.bins, layout.height, layout.width), values)
            .map_err(|e| Error::InvalidFormat(e.to_string()))?;

        let mut metadata = SignalMetadata::new(channel).with_path(self.reader.path());
        metadata.frequency_mhz = layout.frequency_mhz;
        Ok(RawSignal::new(counts, metadata))
    }
}

/// Opens a signal source, choosing the reader from the file extension.
///
/// `.h5`/`.hdf5`/`.nxs` go to the HDF5 reader (feature `hdf5`); anything
/// else is treated as a headerless raw stack and needs `layout`.
///
/// # Errors
/// Returns [`Error::Unsupported`] for TIFF and PicoQuant containers or for
/// HDF5 files in a build without HDF5, and [`Error::InvalidFormat`] for a
/// raw file without a layout.
pub fn open_source<P: AsRef<Path>>(
    path: P,
    layout: Option<RawLayout>,
) -> Result<Box<dyn SignalSource>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "tif" | "tiff" | "ptu" => Err(Error::Unsupported(format!(
            "{} files are not supported: {}",
            extension,
            path.display()
        ))),
        "h5" | "hdf5" | "nxs" => open_hdf5(path, layout),
        _ => {
            let layout = layout.ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "raw input {} needs an explicit layout",
                    path.display()
                ))
            })?;
            Ok(Box::new(RawFileSource::open(path, layout)?))
        }
    }
}

#[cfg(feature = "hdf5")]
fn open_hdf5(path: &Path, layout: Option<RawLayout>) -> Result<Box<dyn SignalSource>> {
    let mut source = crate::hdf5::Hdf5SignalSource::open(path)?;
    if let Some(frequency) = layout.and_then(|l| l.frequency_mhz) {
        source = source.with_frequency_override(frequency);
    }
    Ok(Box::new(source))
}

#[cfg(not(feature = "hdf5"))]
fn open_hdf5(path: &Path, _layout: Option<RawLayout>) -> Result<Box<dyn SignalSource>> {
    Err(Error::Unsupported(format!(
        "built without HDF5 support: {}",
        path.display()
    )))
}
