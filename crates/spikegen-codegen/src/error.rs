//! Code generation errors.

use std::path::PathBuf;

use spikegen_core::{CoreError, NumericType};
use thiserror::Error;

/// Errors raised while loading or rendering templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template '{template}' requires slot '{slot}' but no value was supplied")]
    MissingSlot { template: String, slot: String },

    #[error("template '{template}' line {line}: malformed slot: {detail}")]
    MalformedSlot {
        template: String,
        line: usize,
        detail: String,
    },

    #[error("template '{template}' declares section '{section}' more than once")]
    DuplicateSection { template: String, section: String },

    #[error("template '{template}' line {line}: {detail}")]
    InvalidDirective {
        template: String,
        line: usize,
        detail: String,
    },

    #[error("failed to read template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while generating or invoking a code object.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("language '{language}' has no type for {dtype}")]
    UnmappedType {
        language: String,
        dtype: NumericType,
    },

    #[error("operator '{op}' is not supported by language '{language}'")]
    UnsupportedOperator { language: String, op: String },

    #[error("function '{function}' has no implementation for language '{language}'")]
    NoImplementation { function: String, language: String },

    #[error("unknown target '{id}'; registered targets: {}", known.join(", "))]
    UnknownTarget { id: String, known: Vec<String> },

    #[error("target '{target}' has no template named '{template}'")]
    UnknownTemplate { target: String, template: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("template keyword '{keyword}' is set by both the caller and the compiler")]
    KeywordCollision { keyword: String },

    #[error("code objects of target '{target}' cannot be invoked in-process; build the project instead")]
    NotExecutable { target: String },

    #[error("runtime error in '{codeobject}': {message}")]
    Runtime { codeobject: String, message: String },

    #[error("invalid preferences: {detail}")]
    Preferences { detail: String },
}

/// Result type for code generation operations.
pub type Result<T> = std::result::Result<T, CodegenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_target_lists_known_ids() {
        let err = CodegenError::UnknownTarget {
            id: "quantum".into(),
            known: vec!["android_standalone".into(), "cpp_standalone".into(), "runtime".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("quantum"));
        assert!(msg.contains("android_standalone, cpp_standalone, runtime"));
    }

    #[test]
    fn core_errors_pass_through() {
        let err: CodegenError = CoreError::UnresolvedReference {
            name: "ghost".into(),
            context: None,
        }
        .into();
        assert_eq!(err.to_string(), "unresolvable reference to 'ghost'");
    }
}
