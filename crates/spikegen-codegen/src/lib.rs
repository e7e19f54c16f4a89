//! Code generation for spikegen.
//!
//! Turns abstract per-entity statements into backend code and assembles it
//! into whole-program templates.
//!
//! ## Pipeline
//!
//! 1. [`registry::TargetRegistry`] resolves the requested [`registry::Target`].
//! 2. [`sequence::compile`] analyses the statements and emits per-iteration
//!    code plus template keywords for the target's [`language::Language`].
//! 3. [`template::Template::render`] fills the target's template.
//! 4. The target wraps the result in a [`codeobject::CodeObject`]: the
//!    in-process [`runtime`] target can invoke it, source-emitting targets
//!    only build it.
//!
//! ## Modules
//!
//! - [`render`]: Expression rendering
//! - [`language`]: The per-backend language trait
//! - [`languages`]: Reference, C++ and Java + RenderScript languages
//! - [`library`]: Default functions (`exp`, `clip`, ...)
//! - [`sequence`]: Sequence compiler
//! - [`template`]: Template parsing and rendering
//! - [`codeobject`]: Requests and code objects
//! - [`registry`]: Target registry
//! - [`runtime`]: In-process execution
//! - [`preferences`]: TOML preferences

pub mod codeobject;
pub mod error;
pub mod language;
pub mod languages;
pub mod library;
pub mod preferences;
pub mod registry;
pub mod render;
pub mod runtime;
pub mod sequence;
pub mod template;

pub use codeobject::{
    create_codeobject, CodeObject, CodeObjectRequest, GeneratedCode, InvokeOutcome, KeywordPolicy,
    TargetSelector,
};
pub use error::{CodegenError, Result, TemplateError};
pub use language::{Keywords, Language};
pub use preferences::Preferences;
pub use registry::{Target, TargetRegistry};
pub use runtime::{RuntimeCodeObject, RuntimeTarget, RUNTIME};
pub use sequence::{compile, CompiledSequence, SequenceInput, SequencePlan, DEFAULT_INDEX};
pub use template::{Artifact, RuntimeKernel, Template, TemplateMeta, Templater};
