//! Standalone build errors.

use std::path::PathBuf;

use spikegen_codegen::{CodegenError, TemplateError};

/// Errors that can occur while writing or building a standalone project.
#[derive(Debug, thiserror::Error)]
pub enum StandaloneError {
    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Filesystem error while writing the project.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A code object's artifact lacks a section the device needs.
    #[error("code object '{codeobject}' has no '{section}' section; its template must declare it")]
    MissingSection { codeobject: String, section: String },

    /// Two code objects claim the same storage name with different shapes.
    #[error("array '{storage_name}' is declared with conflicting type or length")]
    ConflictingArray { storage_name: String },

    #[error("invalid build options: {detail}")]
    InvalidOptions { detail: String },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for standalone operations.
pub type Result<T> = std::result::Result<T, StandaloneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_name_the_path() {
        let err = StandaloneError::Io {
            path: PathBuf::from("out/main.cpp"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert_eq!(err.to_string(), "I/O error at out/main.cpp: permission denied");
    }

    #[test]
    fn codegen_errors_pass_through() {
        let err: StandaloneError = CodegenError::NotExecutable {
            target: "cpp_standalone".into(),
        }
        .into();
        assert!(err.to_string().contains("cpp_standalone"));
    }
}
