//! The legacy per-instruction backend, emitting ARB-program-style listings.
//!
//! Old fixed-register hardware consumes these instead of WGSL.
//! Varyings travel through numbered texcoord interpolators:
//! 0 carries texture coordinates, 1 the normal, 2 the world position
//! and 3 the lookup feed data.
//! Local parameters 0..=2 hold the per-axis volume texel steps
//! and 3 the normal-scaling vector
//! (see [`render_state_for`][crate::render_state::render_state_for]).

use super::{Dialect, ShaderSource, StageWriter, SynthesisError};
use crate::capability::{
    Capabilities, CombineMode, LightingModel, LookupMode, NormalSource, PeelLayer, SecondaryRole,
    TextureDimension,
};
use crate::lookup;

struct Plan {
    per_pixel: bool,
    uv: bool,
    normal: bool,
    world_pos: bool,
    data: bool,
}

impl Plan {
    fn new(caps: &Capabilities) -> Self {
        let per_pixel = caps.lighting == LightingModel::PerPixel;
        let bump = matches!(
            caps.secondary_texture,
            Some(s) if s.role == SecondaryRole::BumpMap
        );
        Self {
            per_pixel,
            uv: caps.primary_texture.is_some() || caps.secondary_texture.is_some(),
            normal: per_pixel || bump,
            world_pos: per_pixel,
            data: caps.lookup.is_some() && caps.primary_texture.is_none(),
        }
    }
}

fn target(dimension: TextureDimension) -> &'static str {
    match dimension {
        TextureDimension::One => "1D",
        TextureDimension::Two => "2D",
        TextureDimension::Three => "3D",
    }
}

fn temp(w: &mut StageWriter, name: &str) -> Result<(), SynthesisError> {
    w.declare(name, &format!("TEMP {name};"))
}

/// `{ 0.0, 1.0, 0.5, 2.0 }`, the scalar constants the instruction stream
/// reaches for as swizzles of one parameter register.
fn declare_constants(w: &mut StageWriter) -> Result<(), SynthesisError> {
    w.declare("constants", "PARAM constants = { 0.0, 1.0, 0.5, 2.0 };")
}

//
// vertex program
//

fn build_vertex(caps: &Capabilities, plan: &Plan) -> Result<String, SynthesisError> {
    let mut w = StageWriter::new();

    w.declare("in_pos", "ATTRIB in_pos = vertex.position;")?;
    w.declare("in_normal", "ATTRIB in_normal = vertex.normal;")?;
    w.declare("mvp", "PARAM mvp[4] = { state.matrix.mvp };")?;
    temp(&mut w, "clip")?;
    w.stmt(
        "DP4 clip.x, mvp[0], in_pos;\n\
         DP4 clip.y, mvp[1], in_pos;\n\
         DP4 clip.z, mvp[2], in_pos;\n\
         DP4 clip.w, mvp[3], in_pos;\n\
         MOV result.position, clip;",
    );

    if plan.uv {
        w.declare("in_uv", "ATTRIB in_uv = vertex.texcoord[0];")?;
        w.stmt("MOV result.texcoord[0], in_uv;");
    }
    if plan.normal {
        w.stmt("MOV result.texcoord[1], in_normal;");
    }
    if plan.world_pos {
        w.stmt("MOV result.texcoord[2], in_pos;");
    }
    if plan.data {
        w.declare("in_data", "ATTRIB in_data = vertex.texcoord[3];")?;
        w.stmt("MOV result.texcoord[3], in_data;");
    }

    if !plan.per_pixel {
        // Gouraud baseline: light here, interpolate the result
        declare_constants(&mut w)?;
        w.declare("light_dir", "PARAM light_dir = state.light[0].position;")?;
        w.declare("light_diffuse", "PARAM light_diffuse = state.light[0].diffuse;")?;
        w.declare("light_ambient", "PARAM light_ambient = state.lightmodel.ambient;")?;
        w.declare("mat_diffuse", "PARAM mat_diffuse = state.material.diffuse;")?;
        temp(&mut w, "n")?;
        temp(&mut w, "ndotl")?;
        temp(&mut w, "lit")?;
        w.stmt(
            "DP3 n.w, in_normal, in_normal;\n\
             RSQ n.w, n.w;\n\
             MUL n.xyz, in_normal, n.w;\n\
             DP3 ndotl.x, n, -light_dir;\n\
             MAX ndotl.x, ndotl.x, constants.x;\n\
             MUL lit.xyz, light_diffuse, ndotl.x;\n\
             ADD lit.xyz, lit, light_ambient;\n\
             MUL lit.xyz, mat_diffuse, lit;\n\
             MOV lit.w, mat_diffuse.w;\n\
             MOV result.color, lit;",
        );
    }

    let mut out = format!(
        "!!ARBvp1.0\n# fieldshade generated program, capability key {:#x}\n",
        caps.key()
    );
    out.push_str(&w.decls);
    out.push_str(&w.body);
    out.push_str("\nEND\n");
    Ok(out)
}

//
// fragment program, one emitter per facet in fixed priority order
//

fn fragment_baseline(_caps: &Capabilities, plan: &Plan, w: &mut StageWriter) -> Result<(), SynthesisError> {
    declare_constants(w)?;
    temp(w, "color")?;
    if plan.per_pixel {
        w.declare("mat_diffuse", "PARAM mat_diffuse = state.material.diffuse;")?;
        w.stmt("MOV color, mat_diffuse;");
    } else {
        w.stmt("MOV color, fragment.color;");
    }
    if plan.normal {
        temp(w, "normal")?;
        w.stmt(
            "DP3 normal.w, fragment.texcoord[1], fragment.texcoord[1];\n\
             RSQ normal.w, normal.w;\n\
             MUL normal.xyz, fragment.texcoord[1], normal.w;",
        );
    }
    Ok(())
}

fn fragment_texturing(caps: &Capabilities, _plan: &Plan, w: &mut StageWriter) -> Result<(), SynthesisError> {
    if let Some(tex) = &caps.primary_texture {
        temp(w, "texel")?;
        w.stmt(&format!(
            "TEX texel, fragment.texcoord[0], texture[0], {};",
            target(tex.dimension)
        ));
        let combine = match (tex.channels, tex.combine) {
            (1, CombineMode::Modulate) => "MUL color.xyz, color, texel.x;",
            (1, CombineMode::Decal) => "MOV color.xyz, texel.x;",
            (2, CombineMode::Modulate) => {
                "MUL color.xyz, color, texel.x;\nMUL color.w, color.w, texel.y;"
            }
            (2, CombineMode::Decal) => "MOV color.xyz, texel.x;\nMUL color.w, color.w, texel.y;",
            (3, CombineMode::Modulate) => "MUL color.xyz, color, texel;",
            (3, CombineMode::Decal) => "MOV color.xyz, texel;",
            (_, CombineMode::Modulate) => "MUL color, color, texel;",
            (_, CombineMode::Decal) => "MOV color.xyz, texel;\nMUL color.w, color.w, texel.w;",
        };
        w.stmt(combine);
    }

    if let Some(sec) = &caps.secondary_texture {
        if sec.role == SecondaryRole::Detail {
            temp(w, "detail")?;
            w.stmt(&format!(
                "TEX detail, fragment.texcoord[0], texture[1], {};\n\
                 MUL color.xyz, color, detail;",
                target(sec.dimension)
            ));
        }
    }
    Ok(())
}

fn fragment_lookup(caps: &Capabilities, _plan: &Plan, w: &mut StageWriter) -> Result<(), SynthesisError> {
    let Some(lut) = &caps.lookup else {
        return Ok(());
    };
    let feed = if caps.primary_texture.is_some() {
        "texel"
    } else {
        "fragment.texcoord[3]"
    };

    let axes = lut.table_axes();
    let (Some(size), Some(dim)) = (lookup::resolution(axes), TextureDimension::from_axes(axes))
    else {
        return Err(SynthesisError::UnsupportedCombination {
            dialect: Dialect::Asm,
            feature: "dependent lookups of more than 3 axes",
        });
    };
    let (offset, scale) = lookup::coordinate_offset_scale(size);
    w.declare(
        "lut_offset",
        &format!("PARAM lut_offset = {{ {offset}, {offset}, {offset}, {offset} }};"),
    )?;
    w.declare(
        "lut_scale",
        &format!("PARAM lut_scale = {{ {scale}, {scale}, {scale}, {scale} }};"),
    )?;
    temp(w, "lut_coord")?;
    temp(w, "lut_texel")?;

    match lut.mode {
        LookupMode::Joint { color, alpha } => {
            let axis_names = ["x", "y", "z"];
            for (axis, channel) in lut.feeds.populated().enumerate() {
                w.stmt(&format!(
                    "MOV lut_coord.{}, {feed}.{};",
                    axis_names[axis],
                    ["x", "y", "z", "w"][channel]
                ));
            }
            w.stmt(&format!(
                "MAD lut_coord, lut_coord, lut_scale, lut_offset;\n\
                 TEX lut_texel, lut_coord, texture[2], {};",
                target(dim)
            ));
            let assign = match (color, alpha) {
                (true, true) => "MOV color, lut_texel;",
                (true, false) => "MOV color.xyz, lut_texel;",
                // an alpha-only table is uploaded as a single-channel texture
                _ => "MOV color.w, lut_texel.x;",
            };
            w.stmt(assign);
        }
        LookupMode::PerChannel => {
            for channel in ["x", "y", "z", "w"] {
                w.stmt(&format!(
                    "MAD lut_coord.x, {feed}.{channel}, lut_scale.x, lut_offset.x;\n\
                     TEX lut_texel, lut_coord, texture[2], 1D;\n\
                     MOV color.{channel}, lut_texel.{channel};"
                ));
            }
        }
    }
    Ok(())
}

fn fragment_normals(caps: &Capabilities, _plan: &Plan, w: &mut StageWriter) -> Result<(), SynthesisError> {
    if let Some(sec) = &caps.secondary_texture {
        if sec.role == SecondaryRole::BumpMap {
            temp(w, "bump")?;
            w.stmt(&format!(
                "TEX bump, fragment.texcoord[0], texture[1], {};\n\
                 MAD bump.xyz, bump, constants.w, -constants.y;\n\
                 ADD normal.xyz, normal, bump;\n\
                 DP3 normal.w, normal, normal;\n\
                 RSQ normal.w, normal.w;\n\
                 MUL normal.xyz, normal, normal.w;",
                target(sec.dimension)
            ));
        }
    }

    if let Some(vol) = &caps.volume {
        w.declare("normal_scale", "PARAM normal_scale = program.local[3];")?;
        temp(w, "grad")?;
        if !w.is_declared("normal") {
            temp(w, "normal")?;
        }
        match vol.normal_source {
            NormalSource::Texture => {
                w.stmt("MAD grad.xyz, texel, constants.w, -constants.y;");
            }
            NormalSource::FiniteDifference => {
                let multi = caps.primary_texture.map(|t| t.channels >= 3).unwrap_or(false);
                for (axis, letter) in ["x", "y", "z"].iter().enumerate() {
                    w.declare(
                        &format!("texel_step_{letter}"),
                        &format!("PARAM texel_step_{letter} = program.local[{axis}];"),
                    )?;
                }
                temp(w, "fd_ahead")?;
                temp(w, "fd_behind")?;
                for letter in ["x", "y", "z"] {
                    // one texel ahead, half a texel behind
                    w.stmt(&format!(
                        "ADD fd_ahead, fragment.texcoord[0], texel_step_{letter};\n\
                         MAD fd_behind, texel_step_{letter}, -constants.z, fragment.texcoord[0];\n\
                         TEX fd_ahead, fd_ahead, texture[0], 3D;\n\
                         TEX fd_behind, fd_behind, texture[0], 3D;"
                    ));
                    if multi {
                        // magnitude of the RGB difference
                        w.stmt(&format!(
                            "SUB fd_ahead.xyz, fd_ahead, fd_behind;\n\
                             DP3 grad.{letter}, fd_ahead, fd_ahead;\n\
                             RSQ fd_behind.x, grad.{letter};\n\
                             MUL grad.{letter}, grad.{letter}, fd_behind.x;"
                        ));
                    } else {
                        w.stmt(&format!("SUB grad.{letter}, fd_ahead.x, fd_behind.x;"));
                    }
                }
            }
        }
        w.stmt(
            "MUL grad.xyz, grad, normal_scale;\n\
             DP3 grad.w, grad, grad;\n\
             RSQ grad.w, grad.w;\n\
             MUL normal.xyz, grad, grad.w;",
        );
        if vol.alpha_from_normal {
            temp(w, "grad_mag")?;
            w.stmt(
                "DP3 grad_mag.x, grad, grad;\n\
                 RSQ grad_mag.y, grad_mag.x;\n\
                 MUL grad_mag.x, grad_mag.x, grad_mag.y;\n\
                 MIN grad_mag.x, grad_mag.x, constants.y;\n\
                 MAX grad_mag.x, grad_mag.x, constants.x;\n\
                 MUL color.w, color.w, grad_mag.x;",
            );
        }
    }
    Ok(())
}

fn fragment_peel(caps: &Capabilities, _plan: &Plan, _w: &mut StageWriter) -> Result<(), SynthesisError> {
    match caps.peel {
        // the first layer has nothing to test against, so it needs no code
        None | Some(PeelLayer::First) => Ok(()),
        // no depth texture comparison on the fixed-register path
        Some(PeelLayer::Subsequent) => Err(SynthesisError::UnsupportedCombination {
            dialect: Dialect::Asm,
            feature: "transparency-peeling depth tests",
        }),
    }
}

fn build_fragment(caps: &Capabilities, plan: &Plan) -> Result<String, SynthesisError> {
    let mut w = StageWriter::new();

    fragment_baseline(caps, plan, &mut w)?;
    fragment_texturing(caps, plan, &mut w)?;
    fragment_lookup(caps, plan, &mut w)?;
    fragment_normals(caps, plan, &mut w)?;
    fragment_peel(caps, plan, &mut w)?;

    if plan.per_pixel {
        w.declare("light_dir", "PARAM light_dir = state.light[0].position;")?;
        w.declare("light_diffuse", "PARAM light_diffuse = state.light[0].diffuse;")?;
        w.declare("light_ambient", "PARAM light_ambient = state.lightmodel.ambient;")?;
        temp(&mut w, "ndotl")?;
        temp(&mut w, "lit")?;
        w.stmt(
            "DP3 ndotl.x, normal, -light_dir;\n\
             MAX ndotl.x, ndotl.x, constants.x;\n\
             MUL lit.xyz, light_diffuse, ndotl.x;\n\
             ADD lit.xyz, lit, light_ambient;\n\
             MUL color.xyz, color, lit;",
        );
    }
    w.stmt("MOV result.color, color;");

    let mut out = format!(
        "!!ARBfp1.0\n# fieldshade generated program, capability key {:#x}\n",
        caps.key()
    );
    out.push_str(&w.decls);
    out.push_str(&w.body);
    out.push_str("\nEND\n");
    Ok(out)
}

pub(super) fn synthesize(caps: &Capabilities) -> Result<ShaderSource, SynthesisError> {
    let plan = Plan::new(caps);
    Ok(ShaderSource {
        vertex: build_vertex(caps, &plan)?,
        fragment: build_fragment(caps, &plan)?,
        geometry: None,
    })
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{DependentLookup, FeedSlots, TextureFacet, VolumeLighting};

    #[test]
    fn gouraud_vertex_lights_and_fragment_passes_through() {
        let src = synthesize(&Capabilities::plain()).unwrap();
        assert!(src.vertex.contains("state.light[0].diffuse"));
        assert!(src.vertex.contains("MOV result.color, lit;"));
        assert!(src.fragment.contains("MOV color, fragment.color;"));
        assert!(!src.fragment.contains("state.light"));
    }

    #[test]
    fn texture_target_matches_dimension() {
        for (dim, tgt) in [
            (TextureDimension::One, "1D"),
            (TextureDimension::Two, "2D"),
            (TextureDimension::Three, "3D"),
        ] {
            let caps = Capabilities {
                primary_texture: Some(TextureFacet {
                    dimension: dim,
                    channels: 3,
                    combine: CombineMode::Modulate,
                }),
                ..Capabilities::plain()
            };
            let src = synthesize(&caps).unwrap();
            assert!(src
                .fragment
                .contains(&format!("TEX texel, fragment.texcoord[0], texture[0], {tgt};")));
        }
    }

    #[test]
    fn joint_lookup_reorders_feed_channels() {
        // feeds on red and alpha: a 2-axis lookup from channels x and w
        let caps = Capabilities {
            primary_texture: Some(TextureFacet {
                dimension: TextureDimension::Two,
                channels: 4,
                combine: CombineMode::Modulate,
            }),
            lookup: Some(DependentLookup {
                feeds: FeedSlots([true, false, false, true]),
                mode: LookupMode::Joint {
                    color: true,
                    alpha: false,
                },
            }),
            ..Capabilities::plain()
        };
        let src = synthesize(&caps).unwrap();
        assert!(src.fragment.contains("MOV lut_coord.x, texel.x;"));
        assert!(src.fragment.contains("MOV lut_coord.y, texel.w;"));
        assert!(src.fragment.contains("TEX lut_texel, lut_coord, texture[2], 2D;"));
        // 256-texel table constants
        assert!(src.fragment.contains("PARAM lut_offset = { 0.001953125,"));
    }

    #[test]
    fn finite_difference_normals_use_local_parameters() {
        let caps = Capabilities {
            lighting: LightingModel::PerPixel,
            primary_texture: Some(TextureFacet {
                dimension: TextureDimension::Three,
                channels: 1,
                combine: CombineMode::Modulate,
            }),
            volume: Some(VolumeLighting {
                normal_source: NormalSource::FiniteDifference,
                alpha_from_normal: true,
            }),
            ..Capabilities::plain()
        };
        let src = synthesize(&caps).unwrap();
        assert!(src.fragment.contains("PARAM texel_step_x = program.local[0];"));
        assert!(src.fragment.contains("PARAM normal_scale = program.local[3];"));
        // single-channel source: component-wise difference
        assert!(src.fragment.contains("SUB grad.x, fd_ahead.x, fd_behind.x;"));
        // alpha scaled by the gradient magnitude
        assert!(src.fragment.contains("MUL color.w, color.w, grad_mag.x;"));
    }

    #[test]
    fn programs_are_bracketed() {
        let src = synthesize(&Capabilities::plain()).unwrap();
        assert!(src.vertex.starts_with("!!ARBvp1.0"));
        assert!(src.vertex.trim_end().ends_with("END"));
        assert!(src.fragment.starts_with("!!ARBfp1.0"));
        assert!(src.fragment.trim_end().ends_with("END"));
        assert!(src.geometry.is_none());
    }
}
