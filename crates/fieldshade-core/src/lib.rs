//! This is the core crate containing most of `fieldshade`'s functionality
//! (specifically, everything that doesn't touch a GPU).
//! See the `fieldshade` crate's documentation for an in-depth introduction.
//!
//! Two subsystems live here.
//! [`Spectrum`] and its stages convert field data values into colour,
//! either per evaluation on the CPU or pre-baked into a
//! [lookup table][lookup::bake] for GPU sampling.
//! [`Capabilities`] describe the shader features a draw needs;
//! [`shader::synthesize`] turns them into program source text
//! and [`ProgramCache`] deduplicates the compiled results.

#![warn(missing_docs)]

pub mod spectrum;
#[doc(inline)]
pub use spectrum::{builtin_spectra, Color, ColorMapping, Spectrum, SpectrumStage, Transform};

pub mod lookup;
#[doc(inline)]
pub use lookup::{bake, ChannelLayout, LookupTable};

pub mod capability;
#[doc(inline)]
pub use capability::{
    compose, AttachedResources, Capabilities, ComposeError, DeviceProfile, TextureDimension,
};

pub mod shader;
#[doc(inline)]
pub use shader::{synthesize, Dialect, ShaderSource, SynthesisError};

pub mod program;
#[doc(inline)]
pub use program::ProgramCache;

pub mod render_state;
#[doc(inline)]
pub use render_state::{render_state_for, RenderState};

// re-exports of the colour and math crates used in public APIs

pub use nalgebra as na;
pub use palette;
