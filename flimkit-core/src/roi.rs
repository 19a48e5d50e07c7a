//! Circular regions of interest in phasor space.

use crate::error::{Error, Result};
use ndarray::Array2;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-pixel ROI labels: 0 is background, `i` is the i-th ROI (1-based).
pub type LabelMask = Array2<u8>;

/// Largest number of ROIs a [`LabelMask`] can address.
pub const MAX_ROIS: usize = u8::MAX as usize;

/// Display color of an ROI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct RoiColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RoiColor {
    /// Creates a color from RGB components.
    #[must_use]
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Color assigned to the ROI at `index` when none was chosen.
    #[must_use]
    pub fn palette(index: usize) -> Self {
        const PALETTE: [RoiColor; 10] = [
            RoiColor::from_rgb(0x4a, 0x9e, 0xff),
            RoiColor::from_rgb(0xef, 0x44, 0x44),
            RoiColor::from_rgb(0x10, 0xb9, 0x81),
            RoiColor::from_rgb(0xf5, 0x9e, 0x0b),
            RoiColor::from_rgb(0x8b, 0x5c, 0xff),
            RoiColor::from_rgb(0xf4, 0x72, 0xb6),
            RoiColor::from_rgb(0x22, 0xc5, 0xe5),
            RoiColor::from_rgb(0x84, 0xcc, 0x16),
            RoiColor::from_rgb(0xf9, 0x73, 0x16),
            RoiColor::from_rgb(0x06, 0xb6, 0xd4),
        ];
        PALETTE[index % PALETTE.len()]
    }

    /// Stable color derived from a label such as a group name.
    ///
    /// The label's FNV-1a hash picks the hue; saturation and value are fixed
    /// at 0.65 and 0.95 so every label gets an equally bright color.
    #[must_use]
    pub fn for_label(label: &str) -> Self {
        let hash = label.bytes().fold(0x811c_9dc5_u32, |h, b| {
            (h ^ u32::from(b)).wrapping_mul(0x0100_0193)
        });
        hsv_to_rgb(f64::from(hash % 360) / 360.0, 0.65, 0.95)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::many_single_char_names)]
fn hsv_to_rgb(h: f64, s: f64, v: f64) -> RoiColor {
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match sector as u32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    let channel = |x: f64| (x * 255.0) as u8;
    RoiColor::from_rgb(channel(r), channel(g), channel(b))
}

impl fmt::Display for RoiColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for RoiColor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(Error::Config(format!("invalid color '{s}', expected #rrggbb")));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|_| Error::Config(format!("invalid color '{s}', expected #rrggbb")))
        };
        Ok(Self::from_rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl TryFrom<String> for RoiColor {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RoiColor> for String {
    fn from(color: RoiColor) -> Self {
        color.to_string()
    }
}

/// A named circle in phasor space.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Roi {
    /// Display name.
    pub name: String,
    /// Center real coordinate (g).
    pub real: f64,
    /// Center imaginary coordinate (s).
    pub imag: f64,
    /// Radius in phasor units.
    pub radius: f64,
    /// Display color.
    #[cfg_attr(feature = "serde", serde(default))]
    pub color: Option<RoiColor>,
}

impl Roi {
    /// Creates an ROI without an explicit color.
    pub fn new(name: impl Into<String>, real: f64, imag: f64, radius: f64) -> Self {
        Self {
            name: name.into(),
            real,
            imag,
            radius,
            color: None,
        }
    }

    /// Sets the display color.
    #[must_use]
    pub fn with_color(mut self, color: RoiColor) -> Self {
        self.color = Some(color);
        self
    }

    /// Color to draw this ROI with, falling back to the palette entry for `index`.
    #[must_use]
    pub fn display_color(&self, index: usize) -> RoiColor {
        self.color.unwrap_or_else(|| RoiColor::palette(index))
    }

    /// Returns true if `(g, s)` lies inside or on the circle.
    ///
    /// NaN coordinates are never inside.
    #[inline]
    #[must_use]
    pub fn contains(&self, g: f64, s: f64) -> bool {
        let dg = g - self.real;
        let ds = s - self.imag;
        dg * dg + ds * ds <= self.radius * self.radius
    }

    /// Checks that the circle is usable for classification.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for a non-positive or non-finite radius or a
    /// non-finite center.
    pub fn validate(&self) -> Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(Error::Config(format!(
                "ROI '{}' has invalid radius {}",
                self.name, self.radius
            )));
        }
        if !(self.real.is_finite() && self.imag.is_finite()) {
            return Err(Error::Config(format!(
                "ROI '{}' has non-finite center ({}, {})",
                self.name, self.real, self.imag
            )));
        }
        Ok(())
    }
}
