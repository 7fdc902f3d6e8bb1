//! Shader program compilation and caching on a wgpu device.
//!
//! This is the submission side of the graphics contract:
//! synthesized source text goes in,
//! an opaque compiled-program handle or a compile failure with
//! diagnostic text comes out.
//! Nothing here retries; on failure the caller decides whether to
//! fall back to a simpler capability set.

use std::sync::Arc;

use nalgebra as na;

use fieldshade_core::capability::Capabilities;
use fieldshade_core::program::ProgramCache;
use fieldshade_core::render_state::{render_state_for, RenderState, UniformValue};
use fieldshade_core::shader::{synthesize, Dialect, ShaderSource, SynthesisError};

/// Error in compiling a synthesized program.
#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    /// Synthesis itself failed; a programming-contract violation.
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    /// wgpu consumes WGSL only; the legacy dialect has no path here.
    #[error("the {0:?} dialect cannot be submitted to wgpu")]
    UnsupportedDialect(Dialect),
    /// The device rejected the source. The diagnostic text is attached.
    #[error("shader validation failed: {0}")]
    Validation(String),
}

/// A compiled program and the state it needs applied before drawing.
#[derive(Debug)]
pub struct CompiledProgram {
    /// The compiled vertex stage.
    pub vertex: wgpu::ShaderModule,
    /// The compiled fragment stage.
    pub fragment: wgpu::ShaderModule,
    /// The bindings and uniform defaults the program expects.
    pub render_state: RenderState,
    /// The capability key the program was synthesized for.
    pub key: u64,
}

/// Submit one shader stage's source to the device.
///
/// Validation errors are collected through an error scope
/// so they surface here as diagnostics instead of device loss.
pub fn compile_module(
    device: &wgpu::Device,
    label: &str,
    source: &str,
) -> Result<wgpu::ShaderModule, CompileError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    if let Some(err) = futures::executor::block_on(device.pop_error_scope()) {
        return Err(CompileError::Validation(err.to_string()));
    }
    Ok(module)
}

/// Submit a full synthesized program.
pub fn compile_source(
    device: &wgpu::Device,
    source: &ShaderSource,
    caps: &Capabilities,
) -> Result<CompiledProgram, CompileError> {
    Ok(CompiledProgram {
        vertex: compile_module(device, "vertex", &source.vertex)?,
        fragment: compile_module(device, "fragment", &source.fragment)?,
        render_state: render_state_for(caps),
        key: caps.key(),
    })
}

/// Synthesize and compile a program for a capability set
/// in the given dialect.
///
/// wgpu consumes WGSL only;
/// requesting the legacy dialect of this submission layer is an error
/// (the capability probe would never have selected it, see
/// [`profile_from_limits`][crate::profile_from_limits]).
pub fn compile_program(
    device: &wgpu::Device,
    caps: &Capabilities,
    dialect: Dialect,
) -> Result<CompiledProgram, CompileError> {
    if dialect != Dialect::Wgsl {
        return Err(CompileError::UnsupportedDialect(dialect));
    }
    let source = synthesize(caps, dialect)?;
    compile_source(device, &source, caps)
}

/// A [`ProgramCache`] bound to a device:
/// capabilities in, shared compiled programs out.
#[derive(Default)]
pub struct ProgramStore {
    cache: ProgramCache<CompiledProgram>,
}

impl ProgramStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct programs compiled so far.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no programs have been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get the compiled program for a capability set,
    /// synthesizing and compiling it on first use.
    pub fn get_or_compile(
        &mut self,
        device: &wgpu::Device,
        caps: &Capabilities,
    ) -> Result<Arc<CompiledProgram>, CompileError> {
        self.cache
            .get_or_insert_with(caps, || compile_program(device, caps, Dialect::Wgsl))
    }
}

//
// uniform buffer packing
//

/// The material uniform block of programs without a volume facet.
#[derive(Clone, Copy, Debug, encase::ShaderType)]
struct MaterialUniforms {
    base_color: na::Vector4<f32>,
    specular: na::Vector3<f32>,
    shininess: f32,
}

/// The material uniform block of programs with a volume facet.
#[derive(Clone, Copy, Debug, encase::ShaderType)]
struct VolumeMaterialUniforms {
    base_color: na::Vector4<f32>,
    specular: na::Vector3<f32>,
    shininess: f32,
    normal_scale: na::Vector3<f32>,
}

fn uniform_default<'a>(state: &'a RenderState, name: &str) -> Option<&'a UniformValue> {
    state
        .uniforms
        .iter()
        .find(|u| u.name == name)
        .map(|u| &u.default)
}

fn vec3_or(state: &RenderState, name: &str, fallback: na::Vector3<f32>) -> na::Vector3<f32> {
    match uniform_default(state, name) {
        Some(UniformValue::Vec3(v)) => *v,
        _ => fallback,
    }
}

/// Pack a program's default material uniforms
/// in the layout its synthesized source declares.
pub fn material_uniform_bytes(state: &RenderState) -> Vec<u8> {
    let base_color = match uniform_default(state, "base_color") {
        Some(UniformValue::Vec4(v)) => *v,
        _ => na::Vector4::new(1.0, 1.0, 1.0, 1.0),
    };
    let specular = vec3_or(state, "specular", na::Vector3::new(0.8, 0.8, 0.8));
    let shininess = match uniform_default(state, "shininess") {
        Some(UniformValue::Scalar(v)) => *v,
        _ => 32.0,
    };

    let mut buffer = encase::UniformBuffer::new(Vec::new());
    if uniform_default(state, "normal_scale").is_some() {
        let uniforms = VolumeMaterialUniforms {
            base_color,
            specular,
            shininess,
            normal_scale: vec3_or(state, "normal_scale", na::Vector3::new(1.0, 1.0, 1.0)),
        };
        buffer.write(&uniforms).expect("vector uniforms always encode");
    } else {
        let uniforms = MaterialUniforms {
            base_color,
            specular,
            shininess,
        };
        buffer.write(&uniforms).expect("vector uniforms always encode");
    }
    buffer.into_inner()
}

//
// tests
//
