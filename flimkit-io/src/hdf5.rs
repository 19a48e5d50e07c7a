//! HDF5 signal input and layer export.
//!
//! Signals live at `/entry/signal/counts` as `(bins, y, x)` or
//! `(channel, bins, y, x)` integer data. The repetition frequency is read
//! from a `frequency_mhz` attribute on the dataset, falling back to the
//! `signal` group.

use crate::registry::{LayerData, LayerRegistry};
use crate::source::SignalSource;
use crate::{Error, Result};
use flimkit_core::signal::{RawSignal, SignalMetadata};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{File, Group, Location};
use ndarray::{s, Array3, Ix3};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const SIGNAL_GROUP: &str = "signal";
const COUNTS: &str = "counts";
const FREQUENCY_ATTR: &str = "frequency_mhz";

/// HDF5 file holding one or more channels of counts.
pub struct Hdf5SignalSource {
    path: PathBuf,
    shape: Vec<usize>,
    frequency_mhz: Option<f64>,
}

impl Hdf5SignalSource {
    /// Opens `path` and checks the counts dataset's rank.
    ///
    /// # Errors
    /// Returns an HDF5 error if the dataset is missing, or
    /// [`Error::InvalidFormat`] if it is not 3-D or 4-D.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let group = file.group("entry")?.group(SIGNAL_GROUP)?;
        let counts = group.dataset(COUNTS)?;
        let shape = counts.shape();
        if !(3..=4).contains(&shape.len()) {
            return Err(Error::InvalidFormat(format!(
                "counts dataset must be 3-D (bins, y, x) or 4-D (channel, bins, y, x), got {shape:?}"
            )));
        }

        let frequency_mhz = match read_attr_opt::<f64>(&counts, FREQUENCY_ATTR)? {
            Some(value) => Some(value),
            None => read_attr_opt::<f64>(&group, FREQUENCY_ATTR)?,
        };
        log::debug!(
            "opened HDF5 signal {} with shape {shape:?}, frequency {frequency_mhz:?}",
            path.as_ref().display()
        );
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            shape,
            frequency_mhz,
        })
    }

    /// Uses `frequency_mhz` instead of whatever the file declares.
    #[must_use]
    pub fn with_frequency_override(mut self, frequency_mhz: f64) -> Self {
        self.frequency_mhz = Some(frequency_mhz);
        self
    }

    #[must_use]
    pub fn frequency_mhz(&self) -> Option<f64> {
        self.frequency_mhz
    }
}

impl SignalSource for Hdf5SignalSource {
    fn channels(&self) -> usize {
        if self.shape.len() == 4 {
            self.shape[0]
        } else {
            1
        }
    }

    fn load(&self, channel: usize) -> Result<RawSignal> {
        let channels = self.channels();
        if channel >= channels {
            return Err(Error::ChannelOutOfRange { channel, channels });
        }
        let file = File::open(&self.path)?;
        let counts = file.group("entry")?.group(SIGNAL_GROUP)?.dataset(COUNTS)?;
        let data: Array3<u32> = if self.shape.len() == 4 {
            counts.read_slice::<u32, _, Ix3>(s![channel, .., .., ..])?
        } else {
            counts.read::<u32, Ix3>()?
        };

        let mut metadata = SignalMetadata::new(channel).with_path(&self.path);
        metadata.frequency_mhz = self.frequency_mhz;
        Ok(RawSignal::new(data, metadata))
    }
}

/// Writes a single-channel signal in the layout [`Hdf5SignalSource`] reads.
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn write_signal_hdf5<P: AsRef<Path>>(path: P, signal: &RawSignal) -> Result<()> {
    let file = File::create(path)?;
    let entry = file.create_group("entry")?;
    set_attr_str(&entry, "NX_class", "NXentry")?;
    let group = entry.create_group(SIGNAL_GROUP)?;
    set_attr_str(&group, "NX_class", "NXdata")?;
    set_attr_str(&group, "signal", COUNTS)?;

    let counts = group
        .new_dataset_builder()
        .deflate(4)
        .with_data(&signal.counts())
        .create(COUNTS)?;
    if let Some(frequency) = signal.metadata().frequency_mhz {
        counts
            .new_attr::<f64>()
            .create(FREQUENCY_ATTR)?
            .write_scalar(&frequency)?;
    }
    Ok(())
}

/// Writes every registry layer under `/entry/layers`.
///
/// A `/` in a layer name becomes a nested group. Each dataset carries a
/// `kind` attribute.
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn write_layers_hdf5<P: AsRef<Path>>(path: P, registry: &LayerRegistry) -> Result<()> {
    let file = File::create(path)?;
    let entry = file.create_group("entry")?;
    set_attr_str(&entry, "NX_class", "NXentry")?;
    let root = entry.create_group("layers")?;

    for layer in registry.iter() {
        let (parents, leaf) = match layer.name.rsplit_once('/') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, layer.name.as_str()),
        };
        let group = match parents {
            Some(parents) => ensure_group(&root, parents)?,
            None => root.clone(),
        };
        let builder = group.new_dataset_builder();
        let dataset = match &layer.data {
            LayerData::F64(a) => builder.with_data(a).create(leaf)?,
            LayerData::U8(a) => builder.with_data(a).create(leaf)?,
            LayerData::U64(a) => builder.with_data(a).create(leaf)?,
        };
        set_attr_str(&dataset, "kind", layer.kind.as_str())?;
    }
    log::debug!("wrote {} layer(s) to HDF5", registry.len());
    Ok(())
}

fn ensure_group(root: &Group, path: &str) -> Result<Group> {
    let mut group = root.clone();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        group = match group.group(part) {
            Ok(existing) => existing,
            Err(_) => group.create_group(part)?,
        };
    }
    Ok(group)
}

fn set_attr_str(location: &Location, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn read_attr_opt<T: H5Type + Clone>(location: &Location, name: &str) -> Result<Option<T>> {
    match location.attr(name) {
        Ok(attr) => Ok(Some(attr.read_scalar::<T>()?)),
        Err(_) => Ok(None),
    }
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Layer, LayerKind};
    use ndarray::{array, Array4};
    use tempfile::NamedTempFile;

    #[test]
    fn test_signal_roundtrip() {
        let counts = Array3::from_shape_fn((4, 2, 3), |(k, r, c)| (k * 100 + r * 10 + c) as u32);
        let signal = RawSignal::new(counts.clone(), SignalMetadata::new(0).with_frequency(40.0));
        let file = NamedTempFile::new().unwrap();
        write_signal_hdf5(file.path(), &signal).unwrap();

        let source = Hdf5SignalSource::open(file.path()).unwrap();
        assert_eq!(source.channels(), 1);
        assert_eq!(source.frequency_mhz(), Some(40.0));
        let loaded = source.load(0).unwrap();
        assert_eq!(loaded.counts(), counts);
        assert_eq!(loaded.metadata().frequency_mhz, Some(40.0));
        assert!(source.load(1).is_err());
    }

    #[test]
    fn test_four_dimensional_channels() {
        let file = NamedTempFile::new().unwrap();
        {
            let h5 = File::create(file.path()).unwrap();
            let group = h5.create_group("entry").unwrap().create_group("signal").unwrap();
            let data = Array4::from_shape_fn((2, 3, 1, 1), |(c, k, _, _)| (c * 10 + k) as u16);
            group.new_dataset_builder().with_data(&data).create("counts").unwrap();
        }
        let source = Hdf5SignalSource::open(file.path()).unwrap();
        assert_eq!(source.channels(), 2);
        assert_eq!(source.frequency_mhz(), None);
        let second = source.load(1).unwrap();
        assert_eq!(second.bins(), 3);
        assert_eq!(second.counts()[[2, 0, 0]], 12);
    }

    #[test]
    fn test_write_layers() {
        let mut registry = LayerRegistry::new();
        registry.publish(Layer::new(
            "ds0/g",
            LayerKind::PhasorReal,
            LayerData::F64(array![[0.5, 0.25]]),
        ));
        registry.publish(Layer::new("ds0/mask", LayerKind::Mask, LayerData::U8(array![[1u8, 0]])));
        let file = NamedTempFile::new().unwrap();
        write_layers_hdf5(file.path(), &registry).unwrap();

        let h5 = File::open(file.path()).unwrap();
        let g = h5.dataset("entry/layers/ds0/g").unwrap();
        assert_eq!(g.read_raw::<f64>().unwrap(), vec![0.5, 0.25]);
        let mask = h5.dataset("entry/layers/ds0/mask").unwrap();
        let kind: VarLenUnicode = mask.attr("kind").unwrap().read_scalar().unwrap();
        assert_eq!(kind.as_str(), "mask");
    }
}
