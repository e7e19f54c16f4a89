//! Error types for the variable, namespace and abstract code model.

/// Errors raised while building or resolving the abstract code model.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A statement or expression refers to a name that is neither a variable,
    /// a namespace entry, a local, nor a loop index.
    #[error("unresolvable reference to '{name}'{}", context_suffix(.context))]
    UnresolvedReference {
        /// The unknown name.
        name: String,
        /// Where the reference was found (statement text, function, ...).
        context: Option<String>,
    },

    /// Abstract code or an expression could not be parsed.
    #[error("parse error at column {column}: {detail}")]
    Parse {
        /// 1-based column of the failure.
        column: usize,
        /// Description of the failure.
        detail: String,
    },

    /// Merging a function namespace hit an existing name under the `Error` policy.
    #[error("namespace already contains '{name}' (while merging namespace of function '{function}')")]
    NamespaceCollision {
        /// Colliding name.
        name: String,
        /// Function whose namespace was being merged.
        function: String,
    },

    /// A variable definition is inconsistent.
    #[error("invalid variable '{name}': {detail}")]
    InvalidVariable {
        /// Variable name.
        name: String,
        /// Description of the problem.
        detail: String,
    },

    /// A numeric type name was not recognised.
    #[error("unknown numeric type '{name}'; expected one of int32, int64, float32, float64, bool")]
    UnknownNumericType {
        /// The offending name.
        name: String,
    },
}

fn context_suffix(context: &Option<String>) -> String {
    match context {
        Some(ctx) => format!(" in `{ctx}`"),
        None => String::new(),
    }
}

/// Result type for core model operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_reference_message() {
        let err = CoreError::UnresolvedReference {
            name: "ghost".into(),
            context: Some("v = ghost".into()),
        };
        assert_eq!(err.to_string(), "unresolvable reference to 'ghost' in `v = ghost`");

        let bare = CoreError::UnresolvedReference {
            name: "ghost".into(),
            context: None,
        };
        assert_eq!(bare.to_string(), "unresolvable reference to 'ghost'");
    }
}
