//! The wgpu submission layer for `fieldshade`.
//!
//! `fieldshade-core` stops at source text, pixel buffers and render-state
//! descriptions; this crate turns them into live GPU objects:
//! a [`GpuContext`] to own the device,
//! [`upload_lookup_table`] for baked colour tables,
//! and a [`ProgramStore`] that compiles synthesized programs
//! and shares them by capability.

#![warn(missing_docs)]

mod context;
#[doc(inline)]
pub use context::{profile_from_limits, ContextError, GpuContext};

mod upload;
#[doc(inline)]
pub use upload::{
    padded_bytes, texture_format, upload_band_table, upload_lookup_table, LookupTexture,
    UploadError,
};

mod compile;
#[doc(inline)]
pub use compile::{
    compile_module, compile_program, compile_source, material_uniform_bytes, CompileError,
    CompiledProgram, ProgramStore,
};

pub use wgpu;
