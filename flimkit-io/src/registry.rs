//! Named 2-D layers published for display or export.

use crate::{Error, Result};
use flimkit_algorithms::{Classification, Dataset};
use ndarray::Array2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What a layer represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LayerKind {
    Intensity,
    PhotonCount,
    PhasorReal,
    PhasorImag,
    Lifetime,
    Mask,
    Labels,
}

impl LayerKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intensity => "intensity",
            Self::PhotonCount => "photon_count",
            Self::PhasorReal => "phasor_real",
            Self::PhasorImag => "phasor_imag",
            Self::Lifetime => "lifetime",
            Self::Mask => "mask",
            Self::Labels => "labels",
        }
    }
}

/// Pixel data of a layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerData {
    F64(Array2<f64>),
    U8(Array2<u8>),
    U64(Array2<u64>),
}

impl LayerData {
    #[must_use]
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Self::F64(a) => a.dim(),
            Self::U8(a) => a.dim(),
            Self::U64(a) => a.dim(),
        }
    }

    /// Pixel value as text, `NaN` included.
    #[must_use]
    pub fn format_at(&self, row: usize, col: usize) -> String {
        match self {
            Self::F64(a) => a[[row, col]].to_string(),
            Self::U8(a) => a[[row, col]].to_string(),
            Self::U64(a) => a[[row, col]].to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
    pub data: LayerData,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: LayerKind, data: LayerData) -> Self {
        Self {
            name: name.into(),
            kind,
            data,
        }
    }
}

/// Ordered set of uniquely named layers.
///
/// Publishing a name that already exists replaces that layer in place.
#[derive(Debug, Clone, Default)]
pub struct LayerRegistry {
    layers: Vec<Layer>,
}

impl LayerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a layer, returning the one it replaced.
    pub fn publish(&mut self, layer: Layer) -> Option<Layer> {
        if let Some(slot) = self.layers.iter_mut().find(|l| l.name == layer.name) {
            return Some(std::mem::replace(slot, layer));
        }
        log::debug!("published layer '{}' ({})", layer.name, layer.kind.as_str());
        self.layers.push(layer);
        None
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Layer> {
        let index = self.layers.iter().position(|l| l.name == name)?;
        Some(self.layers.remove(index))
    }

    /// Removes every layer whose name starts with `prefix/`.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let before = self.layers.len();
        let scope = format!("{prefix}/");
        self.layers.retain(|l| !l.name.starts_with(&scope));
        before - self.layers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Publishes the images of a dataset as `prefix/<layer>`.
    ///
    /// Always publishes intensity, photon counts, the working coordinates
    /// and the three lifetime maps; the photon mask only once filters ran.
    /// Returns the number of layers published.
    pub fn publish_dataset(&mut self, prefix: &str, dataset: &Dataset) -> usize {
        let lifetimes = dataset.lifetimes();
        let mut layers = vec![
            (
                "intensity",
                LayerKind::Intensity,
                LayerData::F64(dataset.intensity().to_owned()),
            ),
            (
                "photon_count",
                LayerKind::PhotonCount,
                LayerData::U64(dataset.photon_sum().to_owned()),
            ),
            ("g", LayerKind::PhasorReal, LayerData::F64(dataset.g().to_owned())),
            ("s", LayerKind::PhasorImag, LayerData::F64(dataset.s().to_owned())),
            (
                "phase_lifetime",
                LayerKind::Lifetime,
                LayerData::F64(lifetimes.phase.clone()),
            ),
            (
                "modulation_lifetime",
                LayerKind::Lifetime,
                LayerData::F64(lifetimes.modulation.clone()),
            ),
            (
                "normal_lifetime",
                LayerKind::Lifetime,
                LayerData::F64(lifetimes.normal.clone()),
            ),
        ];
        if let Some(mask) = dataset.photon_mask() {
            layers.push(("photon_mask", LayerKind::Mask, LayerData::U8(mask.to_owned())));
        }

        let count = layers.len();
        for (name, kind, data) in layers {
            self.publish(Layer::new(format!("{prefix}/{name}"), kind, data));
        }
        count
    }

    /// Publishes the label image of a classification as `prefix/roi_labels`.
    pub fn publish_labels(&mut self, prefix: &str, classification: &Classification) {
        self.publish(Layer::new(
            format!("{prefix}/roi_labels"),
            LayerKind::Labels,
            LayerData::U8(classification.labels.clone()),
        ));
    }

    /// Looks up several layers and checks that they share one shape.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for an unknown name or mismatched
    /// shapes.
    pub fn select(&self, names: &[&str]) -> Result<Vec<&Layer>> {
        let layers = names
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| Error::InvalidFormat(format!("no layer named '{name}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        check_same_shape(&layers)?;
        Ok(layers)
    }
}

pub(crate) fn check_same_shape(layers: &[&Layer]) -> Result<()> {
    if let Some(first) = layers.first() {
        let dim = first.data.dim();
        if let Some(other) = layers.iter().find(|l| l.data.dim() != dim) {
            return Err(Error::InvalidFormat(format!(
                "layer '{}' is {:?} but '{}' is {:?}",
                other.name,
                other.data.dim(),
                first.name,
                dim
            )));
        }
    }
    Ok(())
}
