//! Capability types describing which shader features a draw needs.
//!
//! A [`Capabilities`] value is composed from the resources attached to a
//! renderable surface (textures, a colour-lookup spectrum, volume and
//! transparency flags) with [`compose`].
//! It then drives shader synthesis
//! ([`synthesize`][crate::shader::synthesize])
//! and program deduplication
//! ([`ProgramCache`][crate::program::ProgramCache]).
//!
//! Facets are stored as explicit enums and options;
//! bit packing only happens at the cache-key boundary in
//! [`Capabilities::key`].

use crate::shader::Dialect;
use crate::spectrum::Spectrum;

/// Number of axes a texture has.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureDimension {
    /// A 1-D strip texture.
    One,
    /// An ordinary 2-D texture.
    Two,
    /// A volume texture.
    Three,
}

impl TextureDimension {
    /// Number of coordinate axes.
    pub fn axes(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// The dimension with the given number of axes, if it exists.
    pub fn from_axes(axes: usize) -> Option<Self> {
        match axes {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }
}

/// How a sampled texel combines with the lit surface colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombineMode {
    /// The texel replaces the surface colour.
    Decal,
    /// The texel multiplies the surface colour.
    Modulate,
}

/// What the secondary texture is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecondaryRole {
    /// Modulated over the primary colour as a detail layer.
    Detail,
    /// Interpreted as a tangent-space normal map.
    BumpMap,
}

/// The baseline lighting model of a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightingModel {
    /// Lighting evaluated per vertex and interpolated.
    Gouraud,
    /// Lighting evaluated per fragment from an interpolated normal.
    PerPixel,
}

/// Where volume lighting takes its surface normal from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormalSource {
    /// The texture stores a normal directly in its RGB channels.
    Texture,
    /// The normal is derived from finite differences
    /// of neighbouring texels.
    FiniteDifference,
}

/// Volume-lighting facet options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VolumeLighting {
    /// Where the normal comes from.
    pub normal_source: NormalSource,
    /// Scale fragment alpha by the magnitude of the derived normal,
    /// fading out homogeneous regions of the volume.
    pub alpha_from_normal: bool,
}

/// Which order-independent-transparency pass a program serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeelLayer {
    /// The first layer: no previous depth to test against.
    First,
    /// A peeling layer: fragments at or in front of the
    /// previous layer's depth are discarded.
    Subsequent,
}

/// The feed slots of a dependent lookup:
/// which of the four logical input channels (red, green, blue, alpha)
/// carry data into the lookup table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct FeedSlots(pub [bool; 4]);

impl FeedSlots {
    /// Slots for the first `n` channels, in red, green, blue, alpha order.
    pub fn first(n: usize) -> Self {
        let mut slots = [false; 4];
        for slot in slots.iter_mut().take(n) {
            *slot = true;
        }
        Self(slots)
    }

    /// Number of populated slots.
    pub fn count(&self) -> usize {
        self.0.iter().filter(|p| **p).count()
    }

    /// Indices of the populated slots (0 = red .. 3 = alpha).
    pub fn populated(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.then_some(i))
    }
}

/// The shape of a dependent texture lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupMode {
    /// One joint 1/2/3-D lookup producing colour and/or alpha.
    Joint {
        /// The table holds red/green/blue values.
        color: bool,
        /// The table holds alpha values.
        alpha: bool,
    },
    /// Four independent 1-D lookups, one per output channel,
    /// all driven by the same one-component table.
    PerChannel,
}

/// Dependent-texture-lookup facet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DependentLookup {
    /// Which input channels feed the lookup.
    pub feeds: FeedSlots,
    /// The shape of the lookup.
    pub mode: LookupMode,
}

impl DependentLookup {
    /// Number of axes of the lookup table this facet samples.
    pub fn table_axes(&self) -> usize {
        match self.mode {
            LookupMode::Joint { .. } => self.feeds.count(),
            LookupMode::PerChannel => 1,
        }
    }
}

/// The primary-texture facet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureFacet {
    /// Number of texture axes.
    pub dimension: TextureDimension,
    /// Number of channels the texture stores, 1 to 4.
    pub channels: u8,
    /// How the texel combines with the surface colour.
    pub combine: CombineMode,
}

/// The secondary-texture facet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecondaryFacet {
    /// Number of texture axes.
    pub dimension: TextureDimension,
    /// What the texture is used for.
    pub role: SecondaryRole,
}

/// A complete description of the shader features one draw requires.
///
/// Composed with [`compose`]; identical values synthesize
/// byte-identical programs, which is what makes
/// [`ProgramCache`][crate::program::ProgramCache] sharing sound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// The baseline lighting model. Exactly one per program.
    pub lighting: LightingModel,
    /// The primary texture, if any.
    pub primary_texture: Option<TextureFacet>,
    /// The secondary texture, if any.
    pub secondary_texture: Option<SecondaryFacet>,
    /// The dependent colour lookup, if any.
    pub lookup: Option<DependentLookup>,
    /// Volume lighting, if any.
    pub volume: Option<VolumeLighting>,
    /// The transparency-peeling pass this program serves, if any.
    pub peel: Option<PeelLayer>,
}

impl Capabilities {
    /// A plain Gouraud-lit program with no optional facets.
    pub fn plain() -> Self {
        Self {
            lighting: LightingModel::Gouraud,
            primary_texture: None,
            secondary_texture: None,
            lookup: None,
            volume: None,
            peel: None,
        }
    }

    /// Pack the facets into an integer cache key.
    ///
    /// The packing is an implementation detail of the cache;
    /// nothing decodes it.
    /// Equal capabilities always produce equal keys,
    /// and distinct facet combinations produce distinct keys.
    pub fn key(&self) -> u64 {
        let mut key = 0u64;
        let mut push = |bits: u64, width: u32| {
            key = (key << width) | bits;
        };

        push(matches!(self.lighting, LightingModel::PerPixel) as u64, 1);

        match &self.primary_texture {
            None => push(0, 8),
            Some(t) => {
                push(1, 1);
                push(t.dimension.axes() as u64 - 1, 2);
                push(t.channels as u64 - 1, 2);
                push(matches!(t.combine, CombineMode::Modulate) as u64, 1);
                push(0, 2);
            }
        }

        match &self.secondary_texture {
            None => push(0, 4),
            Some(t) => {
                push(1, 1);
                push(t.dimension.axes() as u64 - 1, 2);
                push(matches!(t.role, SecondaryRole::BumpMap) as u64, 1);
            }
        }

        match &self.lookup {
            None => push(0, 8),
            Some(l) => {
                push(1, 1);
                let mut mask = 0u64;
                for i in l.feeds.populated() {
                    mask |= 1 << i;
                }
                push(mask, 4);
                match l.mode {
                    LookupMode::Joint { color, alpha } => {
                        push(0, 1);
                        push(color as u64, 1);
                        push(alpha as u64, 1);
                    }
                    LookupMode::PerChannel => push(0b100, 3),
                }
            }
        }

        match &self.volume {
            None => push(0, 3),
            Some(v) => {
                push(1, 1);
                push(matches!(v.normal_source, NormalSource::FiniteDifference) as u64, 1);
                push(v.alpha_from_normal as u64, 1);
            }
        }

        match &self.peel {
            None => push(0, 2),
            Some(p) => {
                push(1, 1);
                push(matches!(p, PeelLayer::Subsequent) as u64, 1);
            }
        }

        key
    }
}

/// Metadata of a concrete texture, as reported by the texture itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureInfo {
    /// Number of texture axes.
    pub dimension: TextureDimension,
    /// Number of stored channels, 1 to 4.
    pub channels: u8,
}

/// A primary texture attachment: the texture plus caller intent.
#[derive(Clone, Copy, Debug)]
pub struct PrimaryAttachment {
    /// The attached texture's own metadata.
    pub texture: TextureInfo,
    /// How to combine the texel with the surface colour.
    pub combine: CombineMode,
}

/// A secondary texture attachment.
#[derive(Clone, Copy, Debug)]
pub struct SecondaryAttachment {
    /// The attached texture's own metadata.
    pub texture: TextureInfo,
    /// What the texture is used for.
    pub role: SecondaryRole,
}

/// A colour-lookup spectrum attachment.
#[derive(Clone, Copy, Debug)]
pub struct SpectrumBinding<'a> {
    /// The spectrum whose baked table the lookup samples.
    pub spectrum: &'a Spectrum,
    /// Which input channels carry data into the lookup.
    pub feeds: FeedSlots,
}

/// Everything attached to a renderable surface
/// that influences its shader program.
#[derive(Clone, Copy, Debug, Default)]
pub struct AttachedResources<'a> {
    /// Request per-fragment lighting instead of Gouraud shading.
    pub per_pixel_lighting: bool,
    /// The primary texture attachment.
    pub primary_texture: Option<PrimaryAttachment>,
    /// The secondary texture attachment.
    pub secondary_texture: Option<SecondaryAttachment>,
    /// The colour-lookup spectrum attachment.
    pub lookup: Option<SpectrumBinding<'a>>,
    /// Volume-lighting options.
    pub volume: Option<VolumeLighting>,
    /// The transparency-peeling pass being rendered.
    pub peel: Option<PeelLayer>,
}

/// What the current platform supports.
///
/// `fieldshade-gpu` derives one of these from a live adapter;
/// tests build them by hand.
#[derive(Clone, Copy, Debug)]
pub struct DeviceProfile {
    /// The shading dialect the platform consumes.
    pub dialect: Dialect,
    /// Volume textures are available.
    pub supports_3d_textures: bool,
    /// Dependent (texture-coordinate-from-texel) lookups are available.
    pub supports_dependent_lookup: bool,
    /// Per-fragment lighting is available.
    pub supports_per_pixel_lighting: bool,
    /// Depth-peeling transparency is available.
    pub supports_depth_peeling: bool,
}

impl DeviceProfile {
    /// A profile with every feature available.
    pub fn full(dialect: Dialect) -> Self {
        Self {
            dialect,
            supports_3d_textures: true,
            supports_dependent_lookup: true,
            supports_per_pixel_lighting: true,
            supports_depth_peeling: true,
        }
    }

    /// A profile with only the baseline features.
    pub fn minimal(dialect: Dialect) -> Self {
        Self {
            dialect,
            supports_3d_textures: false,
            supports_dependent_lookup: false,
            supports_per_pixel_lighting: false,
            supports_depth_peeling: false,
        }
    }
}

/// Error in composing capabilities from attached resources.
#[derive(thiserror::Error, Debug)]
pub enum ComposeError {
    /// The device lacks a feature the attachments require.
    /// The caller is expected to fall back to the fixed-function path.
    #[error("device lacks support for {0}")]
    Unsupported(&'static str),
    /// A texture reported a channel count outside 1..=4.
    #[error("texture channel count {0} is outside 1..=4")]
    InvalidChannelCount(u8),
    /// The populated feed slots cannot drive the attached spectrum.
    #[error(
        "{populated} populated feed channels cannot drive a \
         {components}-component spectrum lookup"
    )]
    FeedMismatch {
        /// Number of populated feed slots.
        populated: usize,
        /// The spectrum's component count.
        components: usize,
    },
    /// Volume lighting was requested without a volume texture to light.
    #[error("volume lighting requires a 3-D primary texture")]
    VolumeNeedsVolumeTexture,
    /// Texture-sourced volume normals need RGB channels to read from.
    #[error("texture-sourced normals require at least 3 texture channels")]
    NormalsNeedColorChannels,
    /// Bump mapping needs a 2-D normal map.
    #[error("bump mapping requires a 2-D secondary texture")]
    BumpNeedsSurfaceTexture,
}

fn check_texture(info: &TextureInfo, profile: &DeviceProfile) -> Result<(), ComposeError> {
    if !(1..=4).contains(&info.channels) {
        return Err(ComposeError::InvalidChannelCount(info.channels));
    }
    if info.dimension == TextureDimension::Three && !profile.supports_3d_textures {
        return Err(ComposeError::Unsupported("3-D textures"));
    }
    Ok(())
}

/// Deterministically compute the capabilities a surface's attachments need.
///
/// Texture facets come from the concrete textures' own metadata.
/// The dependent-lookup facet follows from cross-checking the populated
/// feed slots against the spectrum's component count:
/// an equal count selects a joint lookup of that many axes,
/// while a one-component spectrum fed from a different number of slots
/// degrades to four independent per-channel 1-D lookups.
/// Any other mismatch is an error.
///
/// On failure the caller is expected to fall back to rendering without a
/// program (the fixed-function-equivalent path);
/// see [`compose_or_fallback`].
pub fn compose(
    resources: &AttachedResources,
    profile: &DeviceProfile,
) -> Result<Capabilities, ComposeError> {
    let lighting = if resources.per_pixel_lighting {
        if !profile.supports_per_pixel_lighting {
            return Err(ComposeError::Unsupported("per-pixel lighting"));
        }
        LightingModel::PerPixel
    } else {
        LightingModel::Gouraud
    };

    let primary_texture = resources
        .primary_texture
        .as_ref()
        .map(|att| {
            check_texture(&att.texture, profile)?;
            Ok(TextureFacet {
                dimension: att.texture.dimension,
                channels: att.texture.channels,
                combine: att.combine,
            })
        })
        .transpose()?;

    let secondary_texture = resources
        .secondary_texture
        .as_ref()
        .map(|att| {
            check_texture(&att.texture, profile)?;
            if att.role == SecondaryRole::BumpMap
                && att.texture.dimension != TextureDimension::Two
            {
                return Err(ComposeError::BumpNeedsSurfaceTexture);
            }
            Ok(SecondaryFacet {
                dimension: att.texture.dimension,
                role: att.role,
            })
        })
        .transpose()?;

    let lookup = resources
        .lookup
        .as_ref()
        .map(|binding| {
            if !profile.supports_dependent_lookup {
                return Err(ComposeError::Unsupported("dependent texture lookups"));
            }
            let populated = binding.feeds.count();
            let components = binding.spectrum.component_count();
            let mode = if populated == components && (1..=3).contains(&populated) {
                let usage = binding.spectrum.channel_usage();
                LookupMode::Joint {
                    color: usage.color,
                    alpha: usage.alpha,
                }
            } else if components == 1 && populated > 0 {
                LookupMode::PerChannel
            } else {
                return Err(ComposeError::FeedMismatch {
                    populated,
                    components,
                });
            };
            if matches!(mode, LookupMode::Joint { .. })
                && populated == 3
                && !profile.supports_3d_textures
            {
                return Err(ComposeError::Unsupported("3-D textures"));
            }
            Ok(DependentLookup {
                feeds: binding.feeds,
                mode,
            })
        })
        .transpose()?;

    let volume = resources
        .volume
        .map(|v| {
            let Some(primary) = &primary_texture else {
                return Err(ComposeError::VolumeNeedsVolumeTexture);
            };
            if primary.dimension != TextureDimension::Three {
                return Err(ComposeError::VolumeNeedsVolumeTexture);
            }
            if v.normal_source == NormalSource::Texture && primary.channels < 3 {
                return Err(ComposeError::NormalsNeedColorChannels);
            }
            Ok(v)
        })
        .transpose()?;

    let peel = resources
        .peel
        .map(|p| {
            if !profile.supports_depth_peeling {
                return Err(ComposeError::Unsupported("depth peeling"));
            }
            Ok(p)
        })
        .transpose()?;

    Ok(Capabilities {
        lighting,
        primary_texture,
        secondary_texture,
        lookup,
        volume,
        peel,
    })
}

/// [`compose`], with the fixed-function fallback made explicit:
/// an unsupported combination logs a warning and yields `None`,
/// meaning "render this surface without a program".
pub fn compose_or_fallback(
    resources: &AttachedResources,
    profile: &DeviceProfile,
) -> Option<Capabilities> {
    match compose(resources, profile) {
        Ok(caps) => Some(caps),
        Err(e) => {
            log::warn!("falling back to the fixed-function path: {e}");
            None
        }
    }
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::{builtin_spectra, ColorMapping, Spectrum, SpectrumStage};

    fn full_profile() -> DeviceProfile {
        DeviceProfile::full(Dialect::Wgsl)
    }

    fn tex(dimension: TextureDimension, channels: u8) -> TextureInfo {
        TextureInfo {
            dimension,
            channels,
        }
    }

    #[test]
    fn plain_texture_composes_expected_facets() {
        let resources = AttachedResources {
            primary_texture: Some(PrimaryAttachment {
                texture: tex(TextureDimension::Two, 3),
                combine: CombineMode::Modulate,
            }),
            ..Default::default()
        };
        let caps = compose(&resources, &full_profile()).unwrap();
        assert_eq!(caps.lighting, LightingModel::Gouraud);
        let primary = caps.primary_texture.unwrap();
        assert_eq!(primary.dimension, TextureDimension::Two);
        assert_eq!(primary.channels, 3);
        assert!(caps.lookup.is_none());
        assert!(caps.secondary_texture.is_none());
        assert!(caps.volume.is_none());
    }

    #[test]
    fn matching_feed_count_selects_joint_lookup() {
        let mut spectrum = Spectrum::new("two-component");
        spectrum.push_stage(SpectrumStage::new(ColorMapping::Red).with_component(0));
        spectrum.push_stage(SpectrumStage::new(ColorMapping::Blue).with_component(1));

        let resources = AttachedResources {
            lookup: Some(SpectrumBinding {
                spectrum: &spectrum,
                feeds: FeedSlots::first(2),
            }),
            ..Default::default()
        };
        let caps = compose(&resources, &full_profile()).unwrap();
        let lookup = caps.lookup.unwrap();
        assert_eq!(
            lookup.mode,
            LookupMode::Joint {
                color: true,
                alpha: false
            }
        );
        assert_eq!(lookup.table_axes(), 2);
    }

    #[test]
    fn single_component_spectrum_degrades_to_per_channel() {
        let spectrum = builtin_spectra::monochrome();
        let resources = AttachedResources {
            lookup: Some(SpectrumBinding {
                spectrum: &spectrum,
                feeds: FeedSlots::first(4),
            }),
            ..Default::default()
        };
        let caps = compose(&resources, &full_profile()).unwrap();
        let lookup = caps.lookup.unwrap();
        assert_eq!(lookup.mode, LookupMode::PerChannel);
        assert_eq!(lookup.table_axes(), 1);
    }

    #[test]
    fn mismatched_feed_count_is_rejected() {
        let mut spectrum = Spectrum::new("three-component");
        for i in 0..3 {
            spectrum.push_stage(SpectrumStage::new(ColorMapping::Red).with_component(i));
        }
        let resources = AttachedResources {
            lookup: Some(SpectrumBinding {
                spectrum: &spectrum,
                feeds: FeedSlots::first(2),
            }),
            ..Default::default()
        };
        assert!(matches!(
            compose(&resources, &full_profile()),
            Err(ComposeError::FeedMismatch {
                populated: 2,
                components: 3
            })
        ));
    }

    #[test]
    fn missing_device_features_fail_composition() {
        let mut no_3d = full_profile();
        no_3d.supports_3d_textures = false;
        let resources = AttachedResources {
            primary_texture: Some(PrimaryAttachment {
                texture: tex(TextureDimension::Three, 1),
                combine: CombineMode::Modulate,
            }),
            ..Default::default()
        };
        assert!(matches!(
            compose(&resources, &no_3d),
            Err(ComposeError::Unsupported("3-D textures"))
        ));
        assert!(compose_or_fallback(&resources, &no_3d).is_none());
        assert!(compose(&resources, &full_profile()).is_ok());
    }

    #[test]
    fn volume_lighting_requires_a_volume_texture() {
        let volume = VolumeLighting {
            normal_source: NormalSource::FiniteDifference,
            alpha_from_normal: true,
        };
        let resources = AttachedResources {
            volume: Some(volume),
            primary_texture: Some(PrimaryAttachment {
                texture: tex(TextureDimension::Two, 3),
                combine: CombineMode::Modulate,
            }),
            ..Default::default()
        };
        assert!(matches!(
            compose(&resources, &full_profile()),
            Err(ComposeError::VolumeNeedsVolumeTexture)
        ));

        let resources = AttachedResources {
            volume: Some(volume),
            primary_texture: Some(PrimaryAttachment {
                texture: tex(TextureDimension::Three, 1),
                combine: CombineMode::Modulate,
            }),
            ..Default::default()
        };
        assert!(compose(&resources, &full_profile()).is_ok());
    }

    #[test]
    fn keys_are_distinct_across_facet_combinations() {
        let mut caps = vec![Capabilities::plain()];
        caps.push(Capabilities {
            lighting: LightingModel::PerPixel,
            ..Capabilities::plain()
        });
        caps.push(Capabilities {
            primary_texture: Some(TextureFacet {
                dimension: TextureDimension::Two,
                channels: 3,
                combine: CombineMode::Modulate,
            }),
            ..Capabilities::plain()
        });
        caps.push(Capabilities {
            primary_texture: Some(TextureFacet {
                dimension: TextureDimension::Two,
                channels: 4,
                combine: CombineMode::Modulate,
            }),
            ..Capabilities::plain()
        });
        caps.push(Capabilities {
            peel: Some(PeelLayer::First),
            ..Capabilities::plain()
        });
        caps.push(Capabilities {
            peel: Some(PeelLayer::Subsequent),
            ..Capabilities::plain()
        });
        caps.push(Capabilities {
            lookup: Some(DependentLookup {
                feeds: FeedSlots::first(1),
                mode: LookupMode::PerChannel,
            }),
            ..Capabilities::plain()
        });

        let keys: Vec<u64> = caps.iter().map(|c| c.key()).collect();
        for (i, a) in keys.iter().enumerate() {
            for (j, b) in keys.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "caps {i} and {j} collide");
                }
            }
        }
        // and the key is a pure function of the value
        for (c, k) in caps.iter().zip(&keys) {
            assert_eq!(c.key(), *k);
        }
    }
}
