//! Baking a [`Spectrum`] into an N-dimensional colour lookup table.
//!
//! The GPU path does not evaluate colour-mapping stages per fragment.
//! Instead the whole spectrum is evaluated once over a regular grid,
//! and the resulting table is sampled by a synthesized shader
//! as a dependent texture lookup
//! (see [`synthesize`][crate::shader::synthesize]).

use crate::spectrum::{ChannelUsage, Spectrum};

/// Grid resolution for a one-component spectrum.
pub const RESOLUTION_1D: usize = 1024;
/// Grid resolution per axis for a two-component spectrum.
pub const RESOLUTION_2D: usize = 256;
/// Grid resolution per axis for a three-component spectrum.
pub const RESOLUTION_3D: usize = 32;

/// The per-axis grid resolution used for a given component count.
///
/// Fewer components get finer grids;
/// the total memory footprint stays in the tens of kilobytes either way.
/// Component counts above 3 have no lookup-texture representation.
pub fn resolution(component_count: usize) -> Option<usize> {
    match component_count {
        1 => Some(RESOLUTION_1D),
        2 => Some(RESOLUTION_2D),
        3 => Some(RESOLUTION_3D),
        _ => None,
    }
}

/// The offset and scale a sampler coordinate needs on an axis of
/// the given size, so that normalized [0, 1] inputs land on texel centers.
///
/// Compensates for linear filtering at the edges of the table:
/// without it, inputs near 0 and 1 would blend with the clamped border.
pub fn coordinate_offset_scale(size: usize) -> (f64, f64) {
    let size = size as f64;
    (0.5 / size, (size - 1.0) / size)
}

/// Byte layout of one lookup-table texel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelLayout {
    /// Three bytes per texel: red, green, blue.
    Color,
    /// One byte per texel: alpha.
    Alpha,
    /// Four bytes per texel: red, green, blue, alpha.
    ColorAlpha,
}

impl ChannelLayout {
    /// Number of bytes each texel occupies.
    pub fn bytes_per_texel(self) -> usize {
        match self {
            Self::Color => 3,
            Self::Alpha => 1,
            Self::ColorAlpha => 4,
        }
    }

    fn from_usage(usage: ChannelUsage) -> Option<Self> {
        match (usage.color, usage.alpha) {
            (true, false) => Some(Self::Color),
            (false, true) => Some(Self::Alpha),
            (true, true) => Some(Self::ColorAlpha),
            (false, false) => None,
        }
    }
}

/// A baked colour lookup table.
///
/// `bytes` holds quantized channel values in row-major order
/// with the first component axis varying fastest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupTable {
    /// Size of each component axis. Length is the component count.
    pub dimensions: Vec<usize>,
    /// Which channels each texel stores.
    pub layout: ChannelLayout,
    /// The packed pixel data.
    pub bytes: Vec<u8>,
}

impl LookupTable {
    /// Total number of texels in the table.
    pub fn texel_count(&self) -> usize {
        self.dimensions.iter().product()
    }
}

/// Error in baking a spectrum into a lookup table.
#[derive(thiserror::Error, Debug)]
pub enum BakeError {
    /// The spectrum reads more data components than a texture can index.
    #[error("spectrum reads {0} data components, lookup tables support at most 3")]
    TooManyComponents(usize),
    /// The spectrum has no active stages, so there is nothing to bake.
    #[error("spectrum has no active stages to bake")]
    NoActiveStages,
}

/// Evaluate a spectrum over a regular grid and pack the result for upload.
///
/// The grid resolution is fixed by the spectrum's component count
/// (see [`resolution`]); texel `(i_0, .., i_n)` is the spectrum evaluated
/// at the synthetic input `(i_0 / (r - 1), .., i_n / (r - 1))`,
/// quantized to bytes.
/// The first component axis iterates fastest.
pub fn bake(spectrum: &Spectrum) -> Result<LookupTable, BakeError> {
    let components = spectrum.component_count();
    let Some(layout) = ChannelLayout::from_usage(spectrum.channel_usage()) else {
        return Err(BakeError::NoActiveStages);
    };
    let res = match resolution(components) {
        Some(res) => res,
        None if components == 0 => return Err(BakeError::NoActiveStages),
        None => return Err(BakeError::TooManyComponents(components)),
    };

    let texel_count = res.pow(components as u32);
    let mut bytes = Vec::with_capacity(texel_count * layout.bytes_per_texel());
    let mut input = vec![0.0; components];

    log::debug!(
        "baking spectrum `{}`: {} axes of {} texels, {:?} layout",
        spectrum.name,
        components,
        res,
        layout,
    );

    for texel in 0..texel_count {
        let mut rem = texel;
        for axis_value in input.iter_mut() {
            *axis_value = (rem % res) as f64 / (res - 1) as f64;
            rem /= res;
        }
        let color = spectrum.evaluate(&input);
        match layout {
            ChannelLayout::Color => {
                bytes.push(quantize(color.red));
                bytes.push(quantize(color.green));
                bytes.push(quantize(color.blue));
            }
            ChannelLayout::Alpha => {
                bytes.push(quantize(color.alpha));
            }
            ChannelLayout::ColorAlpha => {
                bytes.push(quantize(color.red));
                bytes.push(quantize(color.green));
                bytes.push(quantize(color.blue));
                bytes.push(quantize(color.alpha));
            }
        }
    }

    Ok(LookupTable {
        dimensions: vec![res; components],
        layout,
        bytes,
    })
}

fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

//
// tests
//
