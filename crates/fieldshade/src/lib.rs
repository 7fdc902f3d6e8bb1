//! `fieldshade` renders scalar and vector field data as colour on surfaces.
//!
//! Field samples flow through a [`Spectrum`]:
//! an ordered pipeline of colour-mapping stages,
//! each normalizing one data component into a domain
//! (linearly or logarithmically)
//! and writing it into colour channels.
//! Evaluate it directly on the CPU,
//! or bake it into a [lookup table][lookup::bake]
//! that a synthesized shader samples on the GPU:
//!
//! ```
//! use fieldshade::{builtin_spectra, lookup};
//!
//! let spectrum = builtin_spectra::rainbow();
//! let color = spectrum.evaluate(&[0.5]);
//! assert!(color.green > 0.9);
//!
//! let table = lookup::bake(&spectrum).unwrap();
//! assert_eq!(table.dimensions, vec![1024]);
//! ```
//!
//! On the GPU side, [`Capabilities`] describe which shader features a
//! surface's attachments need, and [`shader::synthesize`] turns them into
//! program source:
//!
//! ```
//! use fieldshade::{capability, shader, AttachedResources, DeviceProfile, Dialect};
//!
//! let profile = DeviceProfile::full(Dialect::Wgsl);
//! let caps = capability::compose(&AttachedResources::default(), &profile).unwrap();
//! let source = shader::synthesize(&caps, profile.dialect).unwrap();
//! assert!(source.fragment.contains("fs_main"));
//! ```
//!
//! Submitting the results to a device lives in `fieldshade-gpu`,
//! re-exported here as [`gpu`] behind the `gpu` feature.

#![warn(missing_docs)]

pub use fieldshade_core::*;

/// The wgpu submission layer. Only available with the `gpu` feature.
#[cfg(feature = "gpu")]
pub use fieldshade_gpu as gpu;
