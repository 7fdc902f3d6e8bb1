//! The modern expression-based backend, emitting WGSL.
//!
//! Bind group layout (mirrored by
//! [`render_state_for`][crate::render_state::render_state_for]):
//! group 0 holds per-frame uniforms (camera, light),
//! group 1 the material uniforms,
//! group 2 the textures in fixed slots
//! (primary 0/1, secondary 2/3, lookup 4/5, previous depth 6).

use std::fmt::Write as _;

use super::{ShaderSource, StageWriter, SynthesisError};
use crate::capability::{
    Capabilities, CombineMode, LightingModel, LookupMode, NormalSource, PeelLayer, SecondaryRole,
    TextureDimension,
};
use crate::lookup;

/// What data flows between the vertex and fragment stages
/// for a given capability set.
struct Plan {
    per_pixel: bool,
    world_pos: bool,
    normal: bool,
    uv: bool,
    tangent: bool,
    data: bool,
    lit_color: bool,
}

impl Plan {
    fn new(caps: &Capabilities) -> Self {
        let per_pixel = caps.lighting == LightingModel::PerPixel;
        let bump = matches!(
            caps.secondary_texture,
            Some(s) if s.role == SecondaryRole::BumpMap
        );
        let has_texture = caps.primary_texture.is_some() || caps.secondary_texture.is_some();
        Self {
            per_pixel,
            world_pos: per_pixel,
            normal: per_pixel || bump || caps.volume.is_some(),
            uv: has_texture,
            tangent: bump,
            data: caps.lookup.is_some() && caps.primary_texture.is_none(),
            lit_color: !per_pixel,
        }
    }

    /// The varying struct shared by both stages, with sequential locations.
    fn varying_struct(&self) -> String {
        let mut s = String::from("struct VertexOut {\n");
        s.push_str("    @builtin(position) clip_position: vec4<f32>,\n");
        let mut loc = 0;
        let mut field = |name: &str, ty: &str, s: &mut String| {
            writeln!(s, "    @location({loc}) {name}: {ty},").unwrap();
            loc += 1;
        };
        if self.world_pos {
            field("world_pos", "vec3<f32>", &mut s);
        }
        if self.normal {
            field("normal", "vec3<f32>", &mut s);
        }
        if self.uv {
            field("uv", "vec3<f32>", &mut s);
        }
        if self.tangent {
            field("tangent", "vec3<f32>", &mut s);
        }
        if self.data {
            field("data", "vec4<f32>", &mut s);
        }
        if self.lit_color {
            field("lit_color", "vec4<f32>", &mut s);
        }
        s.push('}');
        s
    }

    fn vertex_input_struct(&self) -> String {
        let mut s = String::from("struct VertexIn {\n");
        s.push_str("    @location(0) position: vec3<f32>,\n");
        s.push_str("    @location(1) normal: vec3<f32>,\n");
        let mut loc = 2;
        let mut field = |name: &str, ty: &str, s: &mut String| {
            writeln!(s, "    @location({loc}) {name}: {ty},").unwrap();
            loc += 1;
        };
        if self.uv {
            field("uv", "vec3<f32>", &mut s);
        }
        if self.tangent {
            field("tangent", "vec3<f32>", &mut s);
        }
        if self.data {
            field("data", "vec4<f32>", &mut s);
        }
        s.push('}');
        s
    }
}

fn material_struct(caps: &Capabilities) -> String {
    let mut s = String::from(
        "struct MaterialUniforms {\n    \
         base_color: vec4<f32>,\n    \
         specular: vec3<f32>,\n    \
         shininess: f32,\n",
    );
    if caps.volume.is_some() {
        s.push_str("    normal_scale: vec3<f32>,\n");
    }
    s.push('}');
    s
}

fn declare_camera(w: &mut StageWriter) -> Result<(), SynthesisError> {
    w.declare(
        "camera",
        "struct CameraUniforms {\n    \
         view_proj: mat4x4<f32>,\n    \
         eye: vec3<f32>,\n}\n\
         @group(0) @binding(0) var<uniform> camera: CameraUniforms;",
    )
}

fn declare_light(w: &mut StageWriter) -> Result<(), SynthesisError> {
    w.declare(
        "light",
        "struct LightUniforms {\n    \
         direction: vec3<f32>,\n    \
         ambient: vec3<f32>,\n    \
         diffuse: vec3<f32>,\n}\n\
         @group(0) @binding(1) var<uniform> light: LightUniforms;",
    )
}

fn declare_material(caps: &Capabilities, w: &mut StageWriter) -> Result<(), SynthesisError> {
    let mut text = material_struct(caps);
    text.push_str("\n@group(1) @binding(0) var<uniform> material: MaterialUniforms;");
    w.declare("material", &text)
}

fn texture_type(dimension: TextureDimension) -> &'static str {
    match dimension {
        TextureDimension::One => "texture_1d<f32>",
        TextureDimension::Two => "texture_2d<f32>",
        TextureDimension::Three => "texture_3d<f32>",
    }
}

fn uv_swizzle(dimension: TextureDimension) -> &'static str {
    match dimension {
        TextureDimension::One => "in.uv.x",
        TextureDimension::Two => "in.uv.xy",
        TextureDimension::Three => "in.uv.xyz",
    }
}

//
// vertex stage
//

fn build_vertex(caps: &Capabilities, plan: &Plan) -> Result<String, SynthesisError> {
    let mut w = StageWriter::new();

    w.declare("VertexIn", &plan.vertex_input_struct())?;
    w.declare("VertexOut", &plan.varying_struct())?;
    declare_camera(&mut w)?;

    w.stmt("    out.clip_position = camera.view_proj * vec4<f32>(in.position, 1.0);");
    if plan.world_pos {
        w.stmt("    out.world_pos = in.position;");
    }
    if plan.normal {
        w.stmt("    out.normal = in.normal;");
    }
    if plan.uv {
        w.stmt("    out.uv = in.uv;");
    }
    if plan.tangent {
        w.stmt("    out.tangent = in.tangent;");
    }
    if plan.data {
        w.stmt("    out.data = in.data;");
    }

    if plan.lit_color {
        // Gouraud baseline: the full lighting equation runs here
        // and the fragment stage only interpolates
        declare_light(&mut w)?;
        declare_material(caps, &mut w)?;
        w.stmt(
            "    let n = normalize(in.normal);\n    \
             let ndotl = max(dot(n, -light.direction), 0.0);\n    \
             out.lit_color = vec4<f32>(\n        \
             material.base_color.rgb * (light.ambient + light.diffuse * ndotl),\n        \
             material.base_color.a,\n    );",
        );
    }

    let mut out = format!("// fieldshade generated program, capability key {:#x}\n\n", caps.key());
    out.push_str(&w.decls);
    out.push('\n');
    out.push_str(&w.functions);
    out.push_str("@vertex\nfn vs_main(in: VertexIn) -> VertexOut {\n    var out: VertexOut;\n");
    out.push_str(&w.body);
    out.push_str("    return out;\n}\n");
    Ok(out)
}

//
// fragment stage, one emitter per facet in fixed priority order
//

fn fragment_baseline(caps: &Capabilities, plan: &Plan, w: &mut StageWriter) -> Result<(), SynthesisError> {
    w.declare("VertexOut", &plan.varying_struct())?;

    if plan.per_pixel {
        declare_camera(w)?;
        declare_light(w)?;
        declare_material(caps, w)?;
        w.function(
            "apply_lighting",
            "fn apply_lighting(color: vec4<f32>, normal: vec3<f32>, world_pos: vec3<f32>) -> vec4<f32> {\n    \
             let n = normalize(normal);\n    \
             let ndotl = max(dot(n, -light.direction), 0.0);\n    \
             let view = normalize(camera.eye - world_pos);\n    \
             let halfway = normalize(view - light.direction);\n    \
             let spec = pow(max(dot(n, halfway), 0.0), material.shininess);\n    \
             return vec4<f32>(\n        \
             color.rgb * (light.ambient + light.diffuse * ndotl) + material.specular * spec,\n        \
             color.a,\n    );\n}",
        )?;
        w.stmt("    var surface_color = material.base_color;");
    } else {
        if caps.volume.is_some() && !w.is_declared("material") {
            declare_material(caps, w)?;
        }
        w.stmt("    var surface_color = in.lit_color;");
    }
    if plan.normal {
        w.stmt("    var surface_normal = normalize(in.normal);");
    }
    Ok(())
}

fn fragment_texturing(caps: &Capabilities, _plan: &Plan, w: &mut StageWriter) -> Result<(), SynthesisError> {
    if let Some(tex) = &caps.primary_texture {
        w.declare(
            "t_primary",
            &format!(
                "@group(2) @binding(0) var t_primary: {};",
                texture_type(tex.dimension)
            ),
        )?;
        w.declare("s_primary", "@group(2) @binding(1) var s_primary: sampler;")?;
        w.stmt(&format!(
            "    let texel = textureSample(t_primary, s_primary, {});",
            uv_swizzle(tex.dimension)
        ));
        let combine = match (tex.channels, tex.combine) {
            (1, CombineMode::Modulate) => {
                "surface_color = vec4<f32>(surface_color.rgb * texel.r, surface_color.a);"
            }
            (1, CombineMode::Decal) => {
                "surface_color = vec4<f32>(vec3<f32>(texel.r), surface_color.a);"
            }
            (2, CombineMode::Modulate) => {
                "surface_color = vec4<f32>(surface_color.rgb * texel.r, surface_color.a * texel.g);"
            }
            (2, CombineMode::Decal) => {
                "surface_color = vec4<f32>(vec3<f32>(texel.r), surface_color.a * texel.g);"
            }
            (3, CombineMode::Modulate) => {
                "surface_color = vec4<f32>(surface_color.rgb * texel.rgb, surface_color.a);"
            }
            (3, CombineMode::Decal) => {
                "surface_color = vec4<f32>(texel.rgb, surface_color.a);"
            }
            (_, CombineMode::Modulate) => "surface_color = surface_color * texel;",
            (_, CombineMode::Decal) => {
                "surface_color = vec4<f32>(texel.rgb, surface_color.a * texel.a);"
            }
        };
        w.stmt(&format!("    {combine}"));
    }

    if let Some(sec) = &caps.secondary_texture {
        if sec.role == SecondaryRole::Detail {
            w.declare(
                "t_secondary",
                &format!(
                    "@group(2) @binding(2) var t_secondary: {};",
                    texture_type(sec.dimension)
                ),
            )?;
            w.declare("s_secondary", "@group(2) @binding(3) var s_secondary: sampler;")?;
            w.stmt(&format!(
                "    let detail = textureSample(t_secondary, s_secondary, {});\n    \
                 surface_color = vec4<f32>(surface_color.rgb * detail.rgb, surface_color.a);",
                uv_swizzle(sec.dimension)
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
        "in.data"
    };

    let axes = lut.table_axes();
    let (Some(size), Some(dim)) = (lookup::resolution(axes), TextureDimension::from_axes(axes))
    else {
        return Err(SynthesisError::UnsupportedCombination {
            dialect: super::Dialect::Wgsl,
            feature: "dependent lookups of more than 3 axes",
        });
    };
    let (offset, scale) = lookup::coordinate_offset_scale(size);
    // the offset/scale pair lands normalized inputs on texel centers,
    // keeping linear filtering away from the clamped table edges
    w.declare(
        "LUT_OFFSET",
        &format!("const LUT_OFFSET: f32 = {offset};\nconst LUT_SCALE: f32 = {scale};"),
    )?;

    w.declare(
        "t_lookup",
        &format!(
            "@group(2) @binding(4) var t_lookup: {};",
            texture_type(dim)
        ),
    )?;
    w.declare("s_lookup", "@group(2) @binding(5) var s_lookup: sampler;")?;

    match lut.mode {
        LookupMode::Joint { color, alpha } => {
            use itertools::Itertools;
            let joined = lut
                .feeds
                .populated()
                .map(|i| format!("{feed}.{}", ["r", "g", "b", "a"][i]))
                .join(", ");
            let coord = match axes {
                1 => format!("{joined} * LUT_SCALE + LUT_OFFSET"),
                2 => format!("vec2<f32>({joined}) * LUT_SCALE + vec2<f32>(LUT_OFFSET)"),
                _ => format!("vec3<f32>({joined}) * LUT_SCALE + vec3<f32>(LUT_OFFSET)"),
            };
            w.stmt(&format!(
                "    let lut_texel = textureSample(t_lookup, s_lookup, {coord});"
            ));
            let assign = match (color, alpha) {
                (true, true) => "surface_color = lut_texel;",
                (true, false) => "surface_color = vec4<f32>(lut_texel.rgb, surface_color.a);",
                // an alpha-only table is uploaded as a single-channel texture
                _ => "surface_color = vec4<f32>(surface_color.rgb, lut_texel.r);",
            };
            w.stmt(&format!("    {assign}"));
        }
        LookupMode::PerChannel => {
            for ch in ["r", "g", "b", "a"] {
                w.stmt(&format!(
                    "    let lut_{ch} = textureSample(t_lookup, s_lookup, {feed}.{ch} * LUT_SCALE + LUT_OFFSET).{ch};"
                ));
            }
            w.stmt("    surface_color = vec4<f32>(lut_r, lut_g, lut_b, lut_a);");
        }
    }
    Ok(())
}

fn fragment_normals(caps: &Capabilities, _plan: &Plan, w: &mut StageWriter) -> Result<(), SynthesisError> {
    if let Some(sec) = &caps.secondary_texture {
        if sec.role == SecondaryRole::BumpMap {
            w.declare(
                "t_secondary",
                &format!(
                    "@group(2) @binding(2) var t_secondary: {};",
                    texture_type(sec.dimension)
                ),
            )?;
            w.declare("s_secondary", "@group(2) @binding(3) var s_secondary: sampler;")?;
            w.stmt(&format!(
                "    let bump_texel = textureSample(t_secondary, s_secondary, {}).rgb * 2.0 - vec3<f32>(1.0);\n    \
                 let bump_tangent = normalize(in.tangent);\n    \
                 let bump_bitangent = cross(surface_normal, bump_tangent);\n    \
                 surface_normal = normalize(\n        \
                 bump_texel.x * bump_tangent + bump_texel.y * bump_bitangent + bump_texel.z * surface_normal,\n    );",
                uv_swizzle(sec.dimension)
            ));
        }
    }

    if let Some(vol) = &caps.volume {
        match vol.normal_source {
            NormalSource::Texture => {
                w.stmt(
                    "    let grad = (texel.rgb * 2.0 - vec3<f32>(1.0)) * material.normal_scale;",
                );
            }
            NormalSource::FiniteDifference => {
                let Some(channels) = caps.primary_texture.map(|t| t.channels) else {
                    return Err(SynthesisError::UnsupportedCombination {
                        dialect: super::Dialect::Wgsl,
                        feature: "volume lighting without a primary texture",
                    });
                };
                let diff = if channels >= 3 {
                    "return length(a.rgb - b.rgb);"
                } else {
                    "return a.r - b.r;"
                };
                w.function(
                    "volume_diff",
                    &format!(
                        "fn volume_diff(ahead: vec3<f32>, behind: vec3<f32>) -> f32 {{\n    \
                         let a = textureSample(t_primary, s_primary, ahead);\n    \
                         let b = textureSample(t_primary, s_primary, behind);\n    \
                         {diff}\n}}"
                    ),
                )?;
                // step one texel ahead and half a texel behind on each axis
                w.stmt(
                    "    let vol_texel = vec3<f32>(1.0) / vec3<f32>(textureDimensions(t_primary));\n    \
                     let grad = vec3<f32>(\n        \
                     volume_diff(in.uv.xyz + vec3<f32>(vol_texel.x, 0.0, 0.0), in.uv.xyz - vec3<f32>(0.5 * vol_texel.x, 0.0, 0.0)),\n        \
                     volume_diff(in.uv.xyz + vec3<f32>(0.0, vol_texel.y, 0.0), in.uv.xyz - vec3<f32>(0.0, 0.5 * vol_texel.y, 0.0)),\n        \
                     volume_diff(in.uv.xyz + vec3<f32>(0.0, 0.0, vol_texel.z), in.uv.xyz - vec3<f32>(0.0, 0.0, 0.5 * vol_texel.z)),\n    \
                     ) * material.normal_scale;",
                );
            }
        }
        w.stmt("    surface_normal = normalize(grad);");
        if vol.alpha_from_normal {
            w.stmt(
                "    surface_color = vec4<f32>(\n        \
                 surface_color.rgb,\n        \
                 surface_color.a * clamp(length(grad), 0.0, 1.0),\n    );",
            );
        }
    }
    Ok(())
}

fn fragment_peel(caps: &Capabilities, _plan: &Plan, w: &mut StageWriter) -> Result<(), SynthesisError> {
    match caps.peel {
        // the first layer has no previous depth to test against
        None | Some(PeelLayer::First) => Ok(()),
        Some(PeelLayer::Subsequent) => {
            w.declare(
                "t_prev_depth",
                "@group(2) @binding(6) var t_prev_depth: texture_depth_2d;",
            )?;
            w.stmt(
                "    let peel_coord = vec2<i32>(in.clip_position.xy);\n    \
                 if in.clip_position.z <= textureLoad(t_prev_depth, peel_coord, 0) {\n        \
                 discard;\n    }",
            );
            Ok(())
        }
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
        w.stmt("    surface_color = apply_lighting(surface_color, surface_normal, in.world_pos);");
    }

    let mut out = format!("// fieldshade generated program, capability key {:#x}\n\n", caps.key());
    out.push_str(&w.decls);
    out.push('\n');
    out.push_str(&w.functions);
    out.push_str("@fragment\nfn fs_main(in: VertexOut) -> @location(0) vec4<f32> {\n");
    out.push_str(&w.body);
    out.push_str("    return surface_color;\n}\n");
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

    fn textured(dimension: TextureDimension, channels: u8, combine: CombineMode) -> Capabilities {
        Capabilities {
            primary_texture: Some(TextureFacet {
                dimension,
                channels,
                combine,
            }),
            ..Capabilities::plain()
        }
    }

    #[test]
    fn lookup_constants_land_on_texel_centers() {
        let caps = Capabilities {
            lookup: Some(DependentLookup {
                feeds: FeedSlots::first(1),
                mode: LookupMode::Joint {
                    color: true,
                    alpha: false,
                },
            }),
            ..Capabilities::plain()
        };
        let src = synthesize(&caps).unwrap();
        // 1024-texel table: offset 0.5/1024, scale 1023/1024
        assert!(src.fragment.contains("const LUT_OFFSET: f32 = 0.00048828125;"));
        assert!(src.fragment.contains("const LUT_SCALE: f32 = 0.9990234375;"));
        assert!(src.fragment.contains("texture_1d<f32>"));
    }

    #[test]
    fn two_axis_lookup_uses_256_texel_constants() {
        let caps = Capabilities {
            lookup: Some(DependentLookup {
                feeds: FeedSlots::first(2),
                mode: LookupMode::Joint {
                    color: true,
                    alpha: true,
                },
            }),
            ..Capabilities::plain()
        };
        let src = synthesize(&caps).unwrap();
        assert!(src.fragment.contains("const LUT_OFFSET: f32 = 0.001953125;"));
        assert!(src.fragment.contains("const LUT_SCALE: f32 = 0.99609375;"));
        assert!(src.fragment.contains("texture_2d<f32>"));
        // no primary texture, so the lookup feeds from interpolated data
        assert!(src.fragment.contains("in.data.r"));
        assert!(src.vertex.contains("out.data = in.data;"));
    }

    #[test]
    fn per_channel_lookup_samples_four_times() {
        let caps = Capabilities {
            primary_texture: Some(TextureFacet {
                dimension: TextureDimension::Two,
                channels: 4,
                combine: CombineMode::Modulate,
            }),
            lookup: Some(DependentLookup {
                feeds: FeedSlots::first(4),
                mode: LookupMode::PerChannel,
            }),
            ..Capabilities::plain()
        };
        let src = synthesize(&caps).unwrap();
        for ch in ["r", "g", "b", "a"] {
            assert!(src.fragment.contains(&format!("let lut_{ch} = ")));
            assert!(src.fragment.contains(&format!("texel.{ch} * LUT_SCALE")));
        }
    }

    #[test]
    fn decal_replaces_and_modulate_multiplies() {
        let decal = synthesize(&textured(TextureDimension::Two, 3, CombineMode::Decal)).unwrap();
        assert!(decal
            .fragment
            .contains("surface_color = vec4<f32>(texel.rgb, surface_color.a);"));

        let modulate =
            synthesize(&textured(TextureDimension::Two, 3, CombineMode::Modulate)).unwrap();
        assert!(modulate
            .fragment
            .contains("surface_color = vec4<f32>(surface_color.rgb * texel.rgb, surface_color.a);"));
    }

    #[test]
    fn finite_difference_normals_step_a_texel_ahead_and_half_behind() {
        let caps = Capabilities {
            lighting: LightingModel::PerPixel,
            primary_texture: Some(TextureFacet {
                dimension: TextureDimension::Three,
                channels: 4,
                combine: CombineMode::Modulate,
            }),
            volume: Some(VolumeLighting {
                normal_source: NormalSource::FiniteDifference,
                alpha_from_normal: false,
            }),
            ..Capabilities::plain()
        };
        let src = synthesize(&caps).unwrap();
        assert!(src
            .fragment
            .contains("in.uv.xyz + vec3<f32>(vol_texel.x, 0.0, 0.0)"));
        assert!(src
            .fragment
            .contains("in.uv.xyz - vec3<f32>(0.5 * vol_texel.x, 0.0, 0.0)"));
        // a multi-channel source differences by RGB magnitude
        assert!(src.fragment.contains("length(a.rgb - b.rgb)"));
        assert!(src.fragment.contains("material.normal_scale"));

        // single-channel sources difference component-wise
        let mut caps = caps;
        caps.primary_texture.as_mut().unwrap().channels = 1;
        let src = synthesize(&caps).unwrap();
        assert!(src.fragment.contains("return a.r - b.r;"));
    }

    #[test]
    fn gouraud_lights_in_the_vertex_stage() {
        let src = synthesize(&Capabilities::plain()).unwrap();
        assert!(src.vertex.contains("out.lit_color"));
        assert!(src.vertex.contains("light.diffuse"));
        assert!(!src.fragment.contains("apply_lighting"));

        let per_pixel = Capabilities {
            lighting: LightingModel::PerPixel,
            ..Capabilities::plain()
        };
        let src = synthesize(&per_pixel).unwrap();
        assert!(!src.vertex.contains("lit_color"));
        assert!(src.fragment.contains("apply_lighting(surface_color, surface_normal, in.world_pos)"));
    }

    #[test]
    fn first_peel_layer_has_no_depth_test() {
        let first = Capabilities {
            peel: Some(PeelLayer::First),
            ..Capabilities::plain()
        };
        let src = synthesize(&first).unwrap();
        assert!(!src.fragment.contains("t_prev_depth"));

        let subsequent = Capabilities {
            peel: Some(PeelLayer::Subsequent),
            ..Capabilities::plain()
        };
        let src = synthesize(&subsequent).unwrap();
        assert!(src.fragment.contains("t_prev_depth"));
        assert!(src.fragment.contains("discard"));
    }
}
