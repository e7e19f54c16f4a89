//! The in-process `runtime` target.
//!
//! Code is rendered in the reference language for inspection, and executed
//! by interpreting the compiled [`SequencePlan`](crate::sequence::SequencePlan)
//! against the shared array storage.

mod interpreter;

pub use interpreter::RuntimeCodeObject;

use crate::codeobject::{CodeObject, GeneratedCode};
use crate::error::Result;
use crate::language::Language;
use crate::languages::ReferenceLanguage;
use crate::registry::Target;
use crate::template::Templater;

/// Id of the runtime target.
pub const RUNTIME: &str = "runtime";

const TEMPLATES: [(&str, &str); 3] = [
    ("stateupdate", include_str!("../../templates/runtime/stateupdate.tmpl")),
    ("threshold", include_str!("../../templates/runtime/threshold.tmpl")),
    ("reset", include_str!("../../templates/runtime/reset.tmpl")),
];

/// Executes code objects in-process.
#[derive(Debug)]
pub struct RuntimeTarget {
    language: ReferenceLanguage,
    templater: Templater,
}

impl RuntimeTarget {
    /// Runtime target with the built-in `stateupdate`, `threshold` and
    /// `reset` templates.
    pub fn new() -> Result<Self> {
        Ok(Self::with_templater(Templater::from_sources(TEMPLATES)?))
    }

    /// Runtime target with a caller-supplied template set.
    pub fn with_templater(templater: Templater) -> Self {
        Self {
            language: ReferenceLanguage,
            templater,
        }
    }
}

impl Target for RuntimeTarget {
    fn id(&self) -> &str {
        RUNTIME
    }

    fn language(&self) -> &dyn Language {
        &self.language
    }

    fn templater(&self) -> &Templater {
        &self.templater
    }

    fn instantiate(&self, generated: GeneratedCode) -> Result<Box<dyn CodeObject>> {
        Ok(Box::new(RuntimeCodeObject::new(generated)?))
    }
}
