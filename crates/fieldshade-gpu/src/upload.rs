//! Uploading baked lookup tables and banding tables as textures.

use std::mem::size_of;

use fieldshade_core::lookup::{ChannelLayout, LookupTable};
use fieldshade_core::spectrum::{SpectrumStage, BAND_TABLE_SIZE};

/// Error in uploading a lookup table.
#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    /// The table's axis count has no texture dimensionality.
    #[error("lookup tables have 1 to 3 axes, got {0}")]
    BadAxisCount(usize),
}

/// A lookup table on the GPU, with the sampler the
/// synthesized programs expect
/// (clamp to edge, linear filtering).
#[derive(Debug)]
pub struct LookupTexture {
    /// The texture itself.
    pub texture: wgpu::Texture,
    /// A view over the whole texture.
    pub view: wgpu::TextureView,
    /// Clamping, linearly filtering sampler.
    pub sampler: wgpu::Sampler,
}

/// The texture format a channel layout uploads as,
/// and the per-texel byte count after padding.
///
/// `wgpu` has no three-channel 8-bit format,
/// so RGB tables are padded to RGBA with opaque alpha at the
/// upload boundary.
pub fn texture_format(layout: ChannelLayout) -> (wgpu::TextureFormat, usize) {
    match layout {
        ChannelLayout::Alpha => (wgpu::TextureFormat::R8Unorm, 1),
        ChannelLayout::Color | ChannelLayout::ColorAlpha => (wgpu::TextureFormat::Rgba8Unorm, 4),
    }
}

/// The table's bytes in upload layout,
/// padding RGB texels to RGBA.
pub fn padded_bytes(table: &LookupTable) -> Vec<u8> {
    match table.layout {
        ChannelLayout::Alpha | ChannelLayout::ColorAlpha => table.bytes.clone(),
        ChannelLayout::Color => {
            let mut padded = Vec::with_capacity(table.texel_count() * 4);
            for texel in table.bytes.chunks_exact(3) {
                padded.extend_from_slice(texel);
                padded.push(255);
            }
            padded
        }
    }
}

fn extent_and_dimension(
    dimensions: &[usize],
) -> Result<(wgpu::Extent3d, wgpu::TextureDimension), UploadError> {
    let size = |axis: usize| dimensions.get(axis).copied().unwrap_or(1) as u32;
    let extent = wgpu::Extent3d {
        width: size(0),
        height: size(1),
        depth_or_array_layers: size(2),
    };
    let dimension = match dimensions.len() {
        1 => wgpu::TextureDimension::D1,
        2 => wgpu::TextureDimension::D2,
        3 => wgpu::TextureDimension::D3,
        n => return Err(UploadError::BadAxisCount(n)),
    };
    Ok((extent, dimension))
}

fn clamping_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

/// Upload a baked lookup table.
///
/// The synthesized dependent-lookup code assumes exactly this sampler:
/// clamp to edge on every axis with linear filtering,
/// compensated by the offset/scale constants in the shader
/// (see [`coordinate_offset_scale`][fieldshade_core::lookup::coordinate_offset_scale]).
pub fn upload_lookup_table(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    table: &LookupTable,
) -> Result<LookupTexture, UploadError> {
    let (extent, dimension) = extent_and_dimension(&table.dimensions)?;
    let (format, bytes_per_texel) = texture_format(table.layout);
    let bytes = padded_bytes(table);

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("color lookup"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &bytes,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(extent.width * bytes_per_texel as u32),
            rows_per_image: Some(extent.height),
        },
        extent,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = clamping_sampler(device, "color lookup");
    Ok(LookupTexture {
        texture,
        view,
        sampler,
    })
}

/// Upload a stage's 1-D banding/step table.
///
/// Only meaningful for stages with the `Step` or `Banded` mapping;
/// other stages produce an all-transparent table.
pub fn upload_band_table(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    stage: &SpectrumStage,
) -> LookupTexture {
    let table = stage.band_table();
    let extent = wgpu::Extent3d {
        width: BAND_TABLE_SIZE as u32,
        height: 1,
        depth_or_array_layers: 1,
    };

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("band table"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D1,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(&table),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(extent.width * size_of::<[u8; 4]>() as u32),
            rows_per_image: Some(1),
        },
        extent,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = clamping_sampler(device, "band table");
    LookupTexture {
        texture,
        view,
        sampler,
    }
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use fieldshade_core::spectrum::{builtin_spectra, ColorMapping, Spectrum, SpectrumStage};

    #[test]
    fn rgb_tables_pad_to_rgba() {
        let table = fieldshade_core::lookup::bake(&builtin_spectra::rainbow()).unwrap();
        assert_eq!(table.layout, ChannelLayout::Color);
        let padded = padded_bytes(&table);
        assert_eq!(padded.len(), table.texel_count() * 4);
        // alpha padding is opaque
        assert!(padded.iter().skip(3).step_by(4).all(|&a| a == 255));
        // colour bytes are untouched
        assert_eq!(&padded[0..3], &table.bytes[0..3]);
    }

    #[test]
    fn alpha_tables_upload_single_channel() {
        let mut spectrum = Spectrum::new("fade");
        spectrum.push_stage(SpectrumStage::new(ColorMapping::Alpha));
        let table = fieldshade_core::lookup::bake(&spectrum).unwrap();
        let (format, bytes_per_texel) = texture_format(table.layout);
        assert_eq!(format, wgpu::TextureFormat::R8Unorm);
        assert_eq!(bytes_per_texel, 1);
        assert_eq!(padded_bytes(&table), table.bytes);
    }

    #[test]
    fn extent_mirrors_table_dimensions() {
        let (extent, dim) = extent_and_dimension(&[256, 256]).unwrap();
        assert_eq!(dim, wgpu::TextureDimension::D2);
        assert_eq!((extent.width, extent.height, extent.depth_or_array_layers), (256, 256, 1));

        let (extent, dim) = extent_and_dimension(&[32, 32, 32]).unwrap();
        assert_eq!(dim, wgpu::TextureDimension::D3);
        assert_eq!(extent.depth_or_array_layers, 32);

        assert!(matches!(
            extent_and_dimension(&[8, 8, 8, 8]),
            Err(UploadError::BadAxisCount(4))
        ));
    }
}
