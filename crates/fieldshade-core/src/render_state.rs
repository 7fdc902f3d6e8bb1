//! Data-only descriptions of the state a synthesized program needs.
//!
//! This core never touches a graphics API.
//! Instead it describes *what* a program needs bound,
//! as plain data derived from its [`Capabilities`],
//! and the submission layer decides *how* to apply it.

use nalgebra as na;

use crate::capability::{Capabilities, NormalSource, PeelLayer, TextureDimension};

/// What a bound texture is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TexturePurpose {
    /// The primary data/image texture.
    Primary,
    /// The secondary detail or bump texture.
    Secondary,
    /// The baked colour lookup table
    /// (see [`bake`][crate::lookup::bake]).
    ColorLookup,
    /// The previous transparency-peel layer's depth.
    PreviousDepth,
}

/// One texture the program samples, on a fixed logical unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureBinding {
    /// The logical texture unit. Units are assigned in purpose order:
    /// primary 0, secondary 1, lookup 2, previous depth 3.
    pub unit: u32,
    /// What the texture is used for.
    pub purpose: TexturePurpose,
    /// The number of axes the bound texture must have.
    pub dimension: TextureDimension,
}

/// A uniform value, in the small set of shapes synthesis emits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    /// A single float.
    Scalar(f32),
    /// A 3-vector.
    Vec3(na::Vector3<f32>),
    /// A 4-vector.
    Vec4(na::Vector4<f32>),
}

/// One uniform the program reads, with a sensible default.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformBinding {
    /// The uniform's name in the synthesized source.
    pub name: &'static str,
    /// The value to apply until a collaborator overrides it.
    pub default: UniformValue,
}

/// Everything a program needs applied before drawing with it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderState {
    /// Textures by logical unit.
    pub textures: Vec<TextureBinding>,
    /// Uniforms and their defaults.
    pub uniforms: Vec<UniformBinding>,
}

/// Describe the render state a capability set's program requires.
///
/// The description is dialect-independent.
/// The `texel_step_*` uniforms are consumed only by the legacy dialect;
/// the expression dialect derives the same values from texture metadata
/// in the shader itself.
pub fn render_state_for(caps: &Capabilities) -> RenderState {
    let mut state = RenderState::default();

    if let Some(tex) = &caps.primary_texture {
        state.textures.push(TextureBinding {
            unit: 0,
            purpose: TexturePurpose::Primary,
            dimension: tex.dimension,
        });
    }
    if let Some(sec) = &caps.secondary_texture {
        state.textures.push(TextureBinding {
            unit: 1,
            purpose: TexturePurpose::Secondary,
            dimension: sec.dimension,
        });
    }
    if let Some(lut) = &caps.lookup {
        if let Some(dimension) = TextureDimension::from_axes(lut.table_axes()) {
            state.textures.push(TextureBinding {
                unit: 2,
                purpose: TexturePurpose::ColorLookup,
                dimension,
            });
        }
    }
    if caps.peel == Some(PeelLayer::Subsequent) {
        state.textures.push(TextureBinding {
            unit: 3,
            purpose: TexturePurpose::PreviousDepth,
            dimension: TextureDimension::Two,
        });
    }

    state.uniforms.push(UniformBinding {
        name: "base_color",
        default: UniformValue::Vec4(na::Vector4::new(1.0, 1.0, 1.0, 1.0)),
    });
    state.uniforms.push(UniformBinding {
        name: "specular",
        default: UniformValue::Vec3(na::Vector3::new(0.8, 0.8, 0.8)),
    });
    state.uniforms.push(UniformBinding {
        name: "shininess",
        default: UniformValue::Scalar(32.0),
    });

    if let Some(vol) = &caps.volume {
        state.uniforms.push(UniformBinding {
            name: "normal_scale",
            default: UniformValue::Vec3(na::Vector3::new(1.0, 1.0, 1.0)),
        });
        if vol.normal_source == NormalSource::FiniteDifference {
            for name in ["texel_step_x", "texel_step_y", "texel_step_z"] {
                state.uniforms.push(UniformBinding {
                    name,
                    default: UniformValue::Vec3(na::Vector3::zeros()),
                });
            }
        }
    }

    state
}

//
// tests
//
