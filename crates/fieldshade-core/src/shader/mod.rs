//! Synthesis of shader program source text from [`Capabilities`].
//!
//! Synthesis is a pure function: the same capabilities and dialect always
//! produce byte-identical source, which is what makes deduplication by
//! [`ProgramCache`][crate::program::ProgramCache] sound.
//!
//! Each backend builds its programs from per-facet emitters appended in a
//! fixed priority order:
//! baseline lighting, texture sampling, dependent lookup,
//! bump/volume normal derivation, transparency-peel depth test.
//! Every emitter declares the uniform/attribute/texture names it introduces
//! through a shared registry, so an accidental re-declaration across facets
//! is caught as a contract error instead of producing invalid source.

mod asm;
mod wgsl;

use crate::capability::Capabilities;

/// The shading-language dialect to synthesize.
///
/// Which dialect a platform consumes is an external capability probe
/// (see [`DeviceProfile`][crate::capability::DeviceProfile]);
/// it is not part of [`Capabilities`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// The modern expression-based dialect, consumed by `wgpu`.
    Wgsl,
    /// The legacy per-instruction assembly dialect
    /// for old fixed-register hardware.
    Asm,
}

/// Synthesized program source, ready for submission to the graphics layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSource {
    /// Vertex program text.
    pub vertex: String,
    /// Fragment program text.
    pub fragment: String,
    /// Geometry program text.
    ///
    /// No current capability requires one; the slot exists so the
    /// submission contract doesn't change when one does.
    pub geometry: Option<String>,
}

/// Error in synthesizing a program.
///
/// Capability composition is expected to have filtered out anything the
/// device cannot run, so these indicate a programming-contract violation
/// rather than a user-facing condition.
#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    /// The dialect cannot express a required facet.
    #[error("the {dialect:?} dialect cannot express {feature}")]
    UnsupportedCombination {
        /// The dialect that was requested.
        dialect: Dialect,
        /// The facet it cannot express.
        feature: &'static str,
    },
    /// Two facet emitters declared the same name.
    #[error("facet emitters both declare `{0}`")]
    DuplicateDeclaration(String),
}

/// Synthesize vertex/fragment program source for a capability set.
pub fn synthesize(caps: &Capabilities, dialect: Dialect) -> Result<ShaderSource, SynthesisError> {
    log::debug!(
        "synthesizing {:?} program for capability key {:#x}",
        dialect,
        caps.key()
    );
    match dialect {
        Dialect::Wgsl => wgsl::synthesize(caps),
        Dialect::Asm => asm::synthesize(caps),
    }
}

/// Accumulates one shader stage's source as facet emitters append to it.
///
/// Declarations, helper functions and main-body statements are kept in
/// separate sections so emitters can run strictly in facet order while the
/// finished text still reads declarations-first.
pub(crate) struct StageWriter {
    names: Vec<String>,
    pub decls: String,
    pub functions: String,
    pub body: String,
}

impl StageWriter {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            decls: String::new(),
            functions: String::new(),
            body: String::new(),
        }
    }

    /// Register a name introduced by a facet and append its declaration.
    pub fn declare(&mut self, name: &str, text: &str) -> Result<(), SynthesisError> {
        if self.names.iter().any(|n| n == name) {
            return Err(SynthesisError::DuplicateDeclaration(name.to_string()));
        }
        self.names.push(name.to_string());
        self.decls.push_str(text);
        self.decls.push('\n');
        Ok(())
    }

    /// Register a helper function introduced by a facet.
    pub fn function(&mut self, name: &str, text: &str) -> Result<(), SynthesisError> {
        if self.names.iter().any(|n| n == name) {
            return Err(SynthesisError::DuplicateDeclaration(name.to_string()));
        }
        self.names.push(name.to_string());
        self.functions.push_str(text);
        self.functions.push('\n');
        Ok(())
    }

    /// Append statements to the main body.
    pub fn stmt(&mut self, text: &str) {
        self.body.push_str(text);
        self.body.push('\n');
    }

    /// Whether a name has been declared in this stage.
    pub fn is_declared(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

//
// tests
//
